use crate::utils::libc_call;

use std::mem::{self, ManuallyDrop};
use std::panic::{self, AssertUnwindSafe};
use std::{io, ptr};

use nix::sched::CloneFlags;
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy)]
pub struct ChildStatus {
    pub code: i32,
    pub signal: i32,
    pub user_time: u64, // microseconds
    pub sys_time: u64,  // microseconds
    pub max_rss: u64,   // KiB
}

/// Blocks until `child_pid` has terminated, leaving it unreaped.
pub fn wait_exit(child_pid: Pid) -> io::Result<()> {
    loop {
        let mut info: libc::siginfo_t = unsafe { mem::zeroed() };
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                child_pid.as_raw() as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Reaps `child_pid` with `wait4`, collecting its resource usage.
pub fn wait_child(child_pid: Pid) -> io::Result<ChildStatus> {
    let mut status: libc::c_int = 0;
    let mut ru: libc::rusage = unsafe { mem::zeroed() };

    loop {
        let ret = unsafe { libc::wait4(child_pid.as_raw(), &mut status, 0, &mut ru) };
        if ret >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let (code, signal) = if libc::WIFEXITED(status) {
        (libc::WEXITSTATUS(status), 0)
    } else if libc::WIFSIGNALED(status) {
        (0, libc::WTERMSIG(status))
    } else {
        (0, 0)
    };

    let micros = |tv: libc::timeval| (tv.tv_sec as u64) * 1_000_000 + (tv.tv_usec as u64);

    Ok(ChildStatus {
        code,
        signal,
        user_time: micros(ru.ru_utime),
        sys_time: micros(ru.ru_stime),
        max_rss: ru.ru_maxrss as u64,
    })
}

pub unsafe fn clone_proc<F: FnOnce() -> libc::c_int>(
    cb: F,
    stack: &mut [u8],
    flags: CloneFlags,
    signal: libc::c_int,
) -> io::Result<Pid> {
    extern "C" fn child_fn<F>(data: *mut libc::c_void) -> libc::c_int
    where
        F: FnOnce() -> libc::c_int + Sized,
    {
        let f = unsafe { ptr::read(data.cast::<F>()) };
        panic::catch_unwind(AssertUnwindSafe(|| f())).unwrap_or(101)
    }

    let mut f = ManuallyDrop::new(cb);

    let data: *mut F = &mut *f;
    let stack_top = stack.as_mut_ptr().add(stack.len());

    let ret = libc_call(|| {
        libc::clone(
            child_fn::<F>,
            stack_top.cast(),
            flags.bits() | signal,
            data.cast(),
        )
    });

    Ok(Pid::from_raw(ret? as _))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::process::Command;

    #[test]
    fn exit_is_observed_without_reaping() {
        let child = Command::new("sh").arg("-c").arg("exit 7").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as libc::pid_t);

        wait_exit(pid).unwrap();

        // still a zombie, so the pid and its group id stay taken
        assert_eq!(unsafe { libc::kill(pid.as_raw(), 0) }, 0);

        let status = wait_child(pid).unwrap();
        assert_eq!(status.code, 7);
        assert_eq!(status.signal, 0);
    }
}
