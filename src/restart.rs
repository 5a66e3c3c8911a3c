use std::{convert::Infallible, ffi::OsString, path::PathBuf};

use tracing::info;

use crate::error::Error;

/// The program and arguments (including `argv[0]`) to start over with.
pub fn command_line() -> Result<(PathBuf, Vec<OsString>), Error> {
    let program = std::env::current_exe()?;
    let args = std::env::args_os().collect();

    Ok((program, args))
}

/// Replace the running process with a fresh copy of itself.
///
/// Nothing is drained or cleaned up. On success, this does not return.
#[cfg(unix)]
pub fn reexec() -> Result<Infallible, Error> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let (program, args) = command_line()?;
    info!(?program, ?args, "Re-executing");

    let to_c = |s: &std::ffi::OsStr| {
        CString::new(s.as_bytes()).map_err(|e| Error::Restart(e.to_string()))
    };

    let program = to_c(program.as_os_str())?;
    let args = args
        .iter()
        .map(|arg| to_c(arg.as_os_str()))
        .collect::<Result<Vec<_>, _>>()?;

    nix::unistd::execv(&program, &args).map_err(|e| Error::Restart(e.to_string()))
}

/// Start a fresh copy of the process, then exit this one.
#[cfg(not(unix))]
pub fn reexec() -> Result<Infallible, Error> {
    let (program, args) = command_line()?;
    info!(?program, ?args, "Re-executing");

    std::process::Command::new(program)
        .args(args.into_iter().skip(1))
        .spawn()?;

    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_this_process() {
        let (program, args) = command_line().unwrap();

        assert!(program.is_absolute());
        assert!(!args.is_empty());
    }
}
