use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by role resolution, credential issuance and hand-off.
#[derive(Error, Debug)]
pub enum Error {
    /// No role mapping or profile matched the requested name.
    #[error("{name} not found in {source_name}")]
    ConfigNotFound { name: String, source_name: String },

    /// A configuration file could not be read or lacks a required key.
    #[error("failed to parse {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    /// Reading the MFA code failed or the input stream was closed.
    #[error("failed to read MFA code: {0}")]
    Input(#[source] std::io::Error),

    /// The identity service rejected the request or could not be reached.
    #[error("failed to assume {role}: {message}")]
    AssumeRole { role: String, message: String },

    #[error("command not found: {program}")]
    CommandNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    /// The operating system refused to replace the process image.
    #[error("failed to execute {program}: {message}")]
    Exec { program: String, message: String },

    /// The child already reported its own failure; carries its exit code.
    #[error("child process exited with status {0}")]
    ChildProcess(i32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
