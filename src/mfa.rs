use std::io::{self, BufRead, Write};

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::error::{Error, Result};

const PROMPT: &str = "MFA code: ";

/// Source of one-time MFA codes.
#[cfg_attr(test, automock)]
pub trait MfaPrompt {
    fn read_code(&self, mfa_serial: &str) -> Result<String>;
}

/// Prompts on stderr and reads a line from stdin. Nothing is cached between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl MfaPrompt for TerminalPrompt {
    fn read_code(&self, mfa_serial: &str) -> Result<String> {
        debug!(mfa_serial, "Reading MFA code");
        let stdin = io::stdin();
        let mut input = stdin.lock();
        read_code_from(&mut input, &mut io::stderr())
    }
}

/// Writes the prompt to `output` and returns the trimmed line read from `input`.
pub fn read_code_from<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String> {
    output
        .write_all(PROMPT.as_bytes())
        .and_then(|_| output.flush())
        .map_err(Error::Input)?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(Error::Input)?;
    if read == 0 {
        return Err(Error::Input(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before an MFA code was entered",
        )));
    }
    Ok(line.trim().to_string())
}
