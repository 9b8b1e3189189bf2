use crate::utils::{libc_call, RawFd};

use std::io::{Read, Write};
use std::os::unix::prelude::FromRawFd;
use std::{fmt, fs, io, mem};

pub struct PipeTx(RawFd);
pub struct PipeRx(RawFd);

impl Drop for PipeTx {
    fn drop(&mut self) {
        let _ = unsafe { libc::close(self.0) };
    }
}

impl Drop for PipeRx {
    fn drop(&mut self) {
        let _ = unsafe { libc::close(self.0) };
    }
}

/// Setup failure reported by the child before `execve`.
#[derive(Debug)]
pub struct ChildSetupError(pub String);

impl fmt::Display for ChildSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ChildSetupError {}

pub fn create() -> io::Result<(PipeTx, PipeRx)> {
    let mut fds = [0, 0];
    libc_call(|| unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    let rx = PipeRx(fds[0]);
    let tx = PipeTx(fds[1]);
    Ok((tx, rx))
}

impl PipeTx {
    pub fn write_error(self, err: anyhow::Error) -> io::Result<()> {
        let buf = format!("{:?}", err);
        unsafe {
            let mut file = fs::File::from_raw_fd(self.0);
            let ret = file.write_all(buf.as_bytes());
            mem::forget(file);
            ret?;
        }
        Ok(())
    }
}

impl PipeRx {
    /// Blocks until the child either execs (the write end closes on exec)
    /// or reports a setup error.
    pub fn read_result(self) -> io::Result<Result<(), ChildSetupError>> {
        let mut buf = String::new();
        unsafe {
            let mut file = fs::File::from_raw_fd(self.0);
            let ret = file.read_to_string(&mut buf);
            mem::forget(file);
            ret?;
        }
        if buf.is_empty() {
            Ok(Ok(()))
        } else {
            Ok(Err(ChildSetupError(buf)))
        }
    }
}
