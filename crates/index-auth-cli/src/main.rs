//! index-auth CLI - fetch a URL through an authenticated session
//!
//! Usage:
//!   index-auth https://pypi.org/simple/click/             # GET, prompt on 401
//!   index-auth --no-prompt --index-url https://u:p@idx/simple https://idx/simple/x/
//!   index-auth --check-origin http://10.0.0.5:8080/       # print origin verdict
//!
//! The response body goes to stdout; status and history go to stderr.
//! Set `RUST_LOG` to adjust logging (default: warn).

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use index_auth::{
    AuthSession, HttpTransport, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS, Method, SessionConfig,
    TerminalPrompter, redact_url,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Fetch a URL with index credentials
#[derive(Parser, Debug)]
#[command(name = "index-auth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to fetch
    url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Index URL, may embed user:password@ (repeatable)
    #[arg(long = "index-url")]
    index_urls: Vec<String>,

    /// Host or host:port allowed to receive credentials over HTTP (repeatable)
    #[arg(long = "trusted-host")]
    trusted_hosts: Vec<String>,

    /// Never prompt; a 401 is returned as-is
    #[arg(long)]
    no_prompt: bool,

    /// JSON session configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS))]
    timeout: Option<u64>,

    /// Print intermediate responses (e.g. the 401 before a retry)
    #[arg(long)]
    show_history: bool,

    /// Only report whether the URL is a secure origin
    #[arg(long)]
    check_origin: bool,
}

/// Merge the config file (if any) with command-line flags. Flags win.
fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.index_urls.extend(args.index_urls.iter().cloned());
    config.trusted_hosts.extend(args.trusted_hosts.iter().cloned());
    if args.no_prompt {
        config.prompting = false;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    Ok(config)
}

fn build_session(config: &SessionConfig) -> Result<AuthSession> {
    let transport = HttpTransport::with_config(
        Duration::from_secs(config.timeout_secs),
        config.max_response_bytes,
    )
    .context("Failed to create HTTP transport")?;

    let mut builder = AuthSession::builder()
        .transport(transport)
        .config(config)
        .context("Invalid session configuration")?;
    if config.prompting {
        builder = builder.prompter(TerminalPrompter::stdio());
    }
    builder.build().context("Failed to build session")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let session = build_session(&config)?;
    let url = Url::parse(&args.url).context("Invalid URL")?;

    if args.check_origin {
        let verdict = session.policy().check(&url);
        println!("{} {:?}", redact_url(&url), verdict);
        std::process::exit(if verdict.is_secure() { 0 } else { 1 });
    }

    let response = session
        .send(args.method, url, None)
        .await
        .context("Request failed")?;

    if args.show_history {
        for earlier in &response.history {
            eprintln!("< {} {}", earlier.status, redact_url(&earlier.url));
        }
    }
    eprintln!("< {} {}", response.status, redact_url(&response.url));

    use std::io::Write;
    std::io::stdout()
        .write_all(&response.body)
        .context("Failed to write response body")?;

    std::process::exit(if response.is_success() { 0 } else { 1 });
}
