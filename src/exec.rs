use std::convert::Infallible;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};

/// A located program and its argv, ready to take over the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub program: PathBuf,
    /// Full argv, including the program name as given by the user.
    pub args: Vec<String>,
}

impl ExecRequest {
    /// Looks `argv[0]` up on `PATH`. Nothing is touched when it is missing.
    pub fn locate(argv: &[String]) -> Result<Self> {
        let name = argv
            .first()
            .ok_or_else(|| Error::InvalidArgument("no command given".to_string()))?;
        let program = which::which(name).map_err(|source| Error::CommandNotFound {
            program: name.clone(),
            source,
        })?;
        Ok(Self {
            program,
            args: argv.to_vec(),
        })
    }
}

/// Replaces the current process image with `request`, keeping the process id
/// and the full environment. Only returns on failure.
#[cfg(unix)]
pub fn replace_process(request: &ExecRequest) -> Result<Infallible> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let program = request.program.display().to_string();
    let invalid = |e: std::ffi::NulError| Error::Exec {
        program: program.clone(),
        message: e.to_string(),
    };

    let path = CString::new(request.program.as_os_str().as_bytes()).map_err(invalid)?;
    let args = request
        .args
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(invalid)?;

    debug!(command = %program, "Executing command with credentials");
    nix::unistd::execv(&path, &args).map_err(|errno| Error::Exec {
        program,
        message: errno.desc().to_string(),
    })
}

/// Windows cannot replace a process image: run the child, wait, and mirror its exit code.
#[cfg(not(unix))]
pub fn replace_process(request: &ExecRequest) -> Result<Infallible> {
    let program = request.program.display().to_string();
    debug!(command = %program, "Running command with credentials");
    let status = std::process::Command::new(&request.program)
        .args(request.args.iter().skip(1))
        .status()
        .map_err(|e| Error::Exec {
            program,
            message: e.to_string(),
        })?;
    match status.code() {
        Some(0) => std::process::exit(0),
        Some(code) => Err(Error::ChildProcess(code)),
        None => Err(Error::ChildProcess(1)),
    }
}
