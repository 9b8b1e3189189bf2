use std::ffi::{CStr, CString};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use nix::NixPath;

pub type RawFd = std::os::unix::io::RawFd;

pub fn libc_call(f: impl FnOnce() -> i32) -> io::Result<u32> {
    let ret = f();
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as u32)
}

pub fn with_c_str<T>(bytes: &[u8], f: impl FnOnce(&CStr) -> io::Result<T>) -> io::Result<T> {
    let c = CString::new(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    f(&c)
}

pub fn is_dir(path: &(impl NixPath + ?Sized)) -> nix::Result<bool> {
    nix::sys::stat::stat(path).map(|stat| stat.st_mode & libc::S_IFMT == libc::S_IFDIR)
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolves a program name through `PATH` the way a shell would.
/// Names containing a slash are taken as paths.
pub fn resolve_bin(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return if is_executable(&path) { Some(path) } else { None };
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_sh() {
        let sh = resolve_bin("sh").expect("sh should be on PATH");
        assert!(sh.is_absolute());
        assert!(resolve_bin("/bin/sh").is_some());
    }

    #[test]
    fn resolve_missing() {
        assert!(resolve_bin("arbiter-no-such-toolchain").is_none());
        assert!(resolve_bin("/nonexistent/bin/python3").is_none());
    }
}
