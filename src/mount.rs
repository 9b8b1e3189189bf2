use crate::utils::{is_dir, libc_call, with_c_str};

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::{fs, io, ptr};

use anyhow::Result;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{self, AccessFlags};

/// Size cap of the scratch tmpfs handed to submissions.
const TMPFS_OPTIONS: &[u8] = b"size=64m,mode=1777\0";

/// Creates the mount point for `src` at `dst`, mirroring its file type.
fn ensure_mount_point(src_is_dir: bool, dst_path: &Path) -> Result<()> {
    if unistd::access(dst_path, AccessFlags::F_OK).is_ok() {
        return Ok(());
    }
    if src_is_dir {
        fs::create_dir_all(dst_path)?;
        return Ok(());
    }
    if let Some(parent_dir) = dst_path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    let fd = fcntl::open(
        dst_path,
        OFlag::O_CREAT | OFlag::O_RDONLY | OFlag::O_CLOEXEC,
        Mode::from_bits_truncate(0o644),
    )?;
    let _ = unistd::close(fd);
    Ok(())
}

pub fn bind_mount(src_path: &Path, dst_path: &Path, readonly: bool) -> Result<()> {
    let src = CString::new(src_path.as_os_str().as_bytes())?;
    let dst = CString::new(dst_path.as_os_str().as_bytes())?;

    ensure_mount_point(is_dir(src.as_c_str())?, dst_path)?;

    let do_mount = |flags| unsafe {
        libc_call(|| libc::mount(src.as_ptr(), dst.as_ptr(), ptr::null(), flags, ptr::null()))
    };

    do_mount(libc::MS_BIND | libc::MS_REC)?;

    if readonly {
        // a bind mount ignores MS_RDONLY until it is remounted
        do_mount(libc::MS_REMOUNT | libc::MS_BIND | libc::MS_RDONLY | libc::MS_NOSUID)?;
    }

    Ok(())
}

fn mount_special(
    dst: &Path,
    fstype: &'static [u8],
    flags: libc::c_ulong,
    data: &[u8],
) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    with_c_str(dst.as_os_str().as_bytes(), |dst| {
        let src = b"none\0".as_ptr().cast();
        let data = if data.is_empty() {
            ptr::null()
        } else {
            data.as_ptr().cast()
        };
        libc_call(|| unsafe {
            libc::mount(src, dst.as_ptr(), fstype.as_ptr().cast(), flags, data)
        })?;
        Ok(())
    })
}

pub fn mount_proc(dst: &Path) -> io::Result<()> {
    let flags = libc::MS_NOSUID | libc::MS_NODEV | libc::MS_NOEXEC;
    mount_special(dst, b"proc\0", flags, &[])
}

pub fn mount_tmpfs(dst: &Path) -> io::Result<()> {
    let flags = libc::MS_NOSUID | libc::MS_NODEV;
    mount_special(dst, b"tmpfs\0", flags, TMPFS_OPTIONS)
}

/// prevent propagation of mount events to other mount namespaces
/// https://man7.org/linux/man-pages/man7/mount_namespaces.7.html
pub fn make_root_private() -> io::Result<()> {
    libc_call(|| unsafe {
        let flags = libc::MS_PRIVATE | libc::MS_REC;
        let dst = b"/\0".as_ptr().cast();
        let null = ptr::null();
        libc::mount(null, dst, null, flags, null.cast())
    })?;
    Ok(())
}
