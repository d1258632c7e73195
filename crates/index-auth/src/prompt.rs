//! Interactive credential prompting.
//!
//! Prompting blocks on user input, so it sits behind the synchronous
//! [`CredentialPrompter`] capability. The credential store runs it on
//! tokio's blocking pool.
//!
//! - [`TerminalPrompter`]: username from stdin, password read with echo
//!   disabled via `rpassword`
//! - [`LinePrompter`]: both answers from any line-oriented reader
//! - [`NoPrompt`]: always declines

use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::{Mutex, PoisonError};

use crate::credentials::Credential;

/// Capability to ask a user for credentials.
pub trait CredentialPrompter: Send + Sync {
    /// Ask for credentials for `host`.
    ///
    /// `Ok(None)` means the user declined (empty username or end of input).
    fn prompt(&self, host: &str) -> io::Result<Option<Credential>>;

    /// Whether this prompter can actually reach a user.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Prompter for non-interactive environments: always declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialPrompter for NoPrompt {
    fn prompt(&self, _host: &str) -> io::Result<Option<Credential>> {
        Ok(None)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Line-oriented prompter.
///
/// Reads the username from the first line and the password from the second.
/// An empty username line, or end of input, declines. An empty password line
/// yields a username-only credential. Prompt text goes to `writer`.
pub struct LinePrompter<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> LinePrompter<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    /// Prompt on `writer`, read answers from `reader`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

/// Read one line without its terminator. `None` at end of input.
fn read_answer(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Prompt for and read a username. `None` when declined.
fn read_username(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    host: &str,
) -> io::Result<Option<String>> {
    write!(writer, "User for {}: ", host)?;
    writer.flush()?;
    Ok(read_answer(reader)?
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty()))
}

impl<R, W> CredentialPrompter for LinePrompter<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn prompt(&self, host: &str) -> io::Result<Option<Credential>> {
        let mut guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let (reader, writer) = &mut *guard;

        let Some(username) = read_username(reader, writer, host)? else {
            return Ok(None);
        };

        write!(writer, "Password: ")?;
        writer.flush()?;
        let password = read_answer(reader)?.filter(|p| !p.is_empty());

        Ok(Some(Credential::new(username, password)))
    }
}

/// Interactive terminal prompter.
///
/// The username is read as a line from `reader` (stdin by default) with the
/// prompt on stderr. The password is read from the controlling terminal with
/// echo disabled. An empty password yields a username-only credential.
pub struct TerminalPrompter<R = BufReader<Stdin>> {
    input: Mutex<(R, Stderr)>,
}

impl TerminalPrompter {
    /// Read the username from stdin.
    pub fn stdio() -> Self {
        Self::with_reader(BufReader::new(io::stdin()))
    }
}

impl<R> TerminalPrompter<R>
where
    R: BufRead + Send,
{
    /// Read the username from `reader`.
    pub fn with_reader(reader: R) -> Self {
        Self {
            input: Mutex::new((reader, io::stderr())),
        }
    }
}

impl<R> CredentialPrompter for TerminalPrompter<R>
where
    R: BufRead + Send,
{
    fn prompt(&self, host: &str) -> io::Result<Option<Credential>> {
        let mut guard = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let (reader, writer) = &mut *guard;

        let Some(username) = read_username(reader, writer, host)? else {
            return Ok(None);
        };

        let password = rpassword::prompt_password("Password: ")?;
        let password = Some(password).filter(|p| !p.is_empty());

        Ok(Some(Credential::new(username, password)))
    }
}
