use anyhow::Result;
use seccomp_sys::*;

pub struct Context(*mut scmp_filter_ctx);

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { seccomp_release(self.0) }
    }
}

impl Context {
    pub fn new() -> Context {
        let ctx = unsafe { seccomp_init(SCMP_ACT_ALLOW) };
        Self(ctx)
    }

    fn kill_syscalls(&mut self, nrs: &[libc::c_long]) -> Result<()> {
        for &nr in nrs {
            let ret = unsafe { seccomp_rule_add(self.0, SCMP_ACT_KILL_PROCESS, nr as _, 0) };
            if ret < 0 {
                anyhow::bail!("failed to add seccomp rule: nr = {}, ret = {}", nr, ret)
            }
        }
        Ok(())
    }

    /// Kills the process on System V or POSIX message queue, semaphore and shm creation.
    pub fn forbid_ipc(&mut self) -> Result<()> {
        self.kill_syscalls(&[
            libc::SYS_msgget,
            libc::SYS_semget,
            libc::SYS_shmget,
            libc::SYS_mq_open,
        ])
    }

    pub fn install(self) -> Result<()> {
        unsafe {
            let ret = seccomp_load(self.0);
            if ret < 0 {
                anyhow::bail!("failed to load seccomp: ret = {}", ret)
            }
        }
        Ok(())
    }
}
