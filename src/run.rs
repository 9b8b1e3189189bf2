use crate::cgroup_v1::Cgroup;
use crate::child::{prepare_execve_args, run_child};
use crate::pipe::{self, PipeRx};
use crate::proc::{clone_proc, wait_child, wait_exit};
use crate::signal;
use crate::{SandboxConfig, SandboxOutput};

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use aligned_utils::bytes::AlignedBytes;
use anyhow::{Context, Result};
use nix::sched::CloneFlags;
use nix::unistd::{self, Pid};
use scopeguard::guard;
use tracing::{trace, warn};

// set once cloning into a new user namespace has failed, so later runs skip the attempt
static USERNS_DENIED: AtomicBool = AtomicBool::new(false);

/// Runs one program inside the sandbox described by `config` and waits for it.
///
/// The kill timer is a tokio task, so this must be called from within a tokio runtime
/// context (a runtime worker, `spawn_blocking`, or after `Runtime::enter`).
#[tracing::instrument(level = "trace", err, skip(config), fields(nonce))]
pub fn run(config: &SandboxConfig) -> Result<SandboxOutput> {
    let nonce: u32 = rand::random();
    tracing::Span::current().record("nonce", &nonce);

    trace!(?config);

    validate(config)?;

    let exec = prepare_execve_args(config).context("failed to prepare execve arguments")?;

    let cgroup = if config.uses_cgroup() {
        Some(Cgroup::create(&format!("arbiter_{}", nonce))?)
    } else {
        None
    };

    let (pipe_tx, pipe_rx) = pipe::create().context("failed to create pipe")?;

    let (t0, child_pid, contained) = {
        let clone_cb = || unsafe {
            let pipe_tx = ptr::read(&pipe_tx);
            let pipe_rx = ptr::read(&pipe_rx);
            drop(pipe_rx);

            let result = run_child(config, &exec, cgroup.as_ref());

            let _ = pipe_tx.write_error(result.unwrap_err());
            101
        };

        let mut stack = AlignedBytes::new_zeroed(128 * 1024, 16);

        // NOTE:
        // CLONE_NEWIPC is left out: tearing down the last process of an IPC namespace
        // adds about 30ms to `real_time`. IPC is filtered by seccomp instead.
        //
        // REF: https://man7.org/linux/man-pages/man7/ipc_namespaces.7.html

        let flags = if config.unshare {
            CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNET
        } else if config.isolate_pids && !USERNS_DENIED.load(Ordering::Relaxed) {
            CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWPID
        } else {
            CloneFlags::empty()
        };

        let mut t0 = Instant::now();
        let mut cloned = unsafe { clone_proc(&clone_cb, &mut *stack, flags, libc::SIGCHLD) };
        let mut contained = flags.contains(CloneFlags::CLONE_NEWPID);

        if let Err(ref err) = cloned {
            if flags.contains(CloneFlags::CLONE_NEWUSER) {
                // REF: https://man7.org/linux/man-pages/man7/user_namespaces.7.html
                warn!(?err, "user namespaces are unavailable, descendants are only confined to the process group");
                USERNS_DENIED.store(true, Ordering::Relaxed);

                t0 = Instant::now();
                cloned = unsafe {
                    clone_proc(&clone_cb, &mut *stack, CloneFlags::empty(), libc::SIGCHLD)
                };
                contained = false;
            }
        }

        let child_pid = cloned.context("failed to fork")?;
        (t0, child_pid, contained)
    };

    // the child does the same; whichever runs first wins the race
    let _ = unistd::setpgid(child_pid, child_pid);

    drop(pipe_tx);
    run_parent(config, child_pid, t0, pipe_rx, cgroup, contained)
}

fn validate(config: &SandboxConfig) -> Result<()> {
    if let Some(prio) = config.priority {
        if !(-20..20).contains(&prio) {
            anyhow::bail!("priority must be in the range -20 to 19: prio = {}", prio);
        }
    }

    if !config.bin.is_absolute() {
        anyhow::bail!("bin path must be absolute: bin = {}", config.bin.display());
    }

    let needs_namespace = config.chroot.is_some()
        || !config.bindmount_rw.is_empty()
        || !config.bindmount_ro.is_empty()
        || config.mount_proc.is_some()
        || config.mount_tmpfs.is_some();

    if needs_namespace && !config.unshare {
        anyhow::bail!("mounts and chroot require a mount namespace (--unshare)");
    }

    let switches_ids = config.uid.is_some() || config.gid.is_some();
    if config.isolate_pids && !config.unshare && switches_ids {
        anyhow::bail!("uid and gid cannot be mapped into an unprivileged user namespace");
    }

    for mnt in config.bindmount_rw.iter().chain(config.bindmount_ro.iter()) {
        if !mnt.src.is_absolute() || !mnt.dst.is_absolute() {
            anyhow::bail!(
                "bind mount path must be absolute: src = {}, dst = {}",
                mnt.src.display(),
                mnt.dst.display()
            )
        }
    }

    for mnt in config.mount_proc.iter().chain(&config.mount_tmpfs) {
        if !mnt.is_absolute() {
            anyhow::bail!(
                "special mount path must be absolute: path = {}",
                mnt.display()
            )
        }
    }

    Ok(())
}

fn run_parent(
    config: &SandboxConfig,
    child_pid: Pid,
    t0: Instant,
    pipe_rx: PipeRx,
    cgroup: Option<Cgroup>,
    contained: bool,
) -> Result<SandboxOutput> {
    trace!(?child_pid);

    let timed_out = Arc::new(AtomicBool::new(false));

    let killer: Option<_> = if let Some(real_time_limit) = config.real_time_limit {
        let handle = signal::async_kill(child_pid, real_time_limit, Arc::clone(&timed_out));
        Some(guard(handle, |h| h.abort()))
    } else {
        None
    };

    trace!("start to receive child result");

    let child_result = pipe_rx.read_result();

    let child_result_duration = t0.elapsed();
    trace!(?child_result_duration);

    // the child is reaped on every path, even when its setup failed
    let wait_t0 = Instant::now();
    let exited = wait_exit(child_pid);
    let real_duration = t0.elapsed();
    drop(killer);

    // descendants may outlive the group leader; the leader is still a zombie here,
    // so its pid cannot have been handed to another group yet
    let _ = signal::send_group_signal(child_pid, nix::sys::signal::Signal::SIGKILL);

    let status = wait_child(child_pid);
    let status = exited.and(status);
    let wait_duration = wait_t0.elapsed();

    let metrics = cgroup.map(|cg| {
        let ret1 = cg.collect().context("failed to collect metrics from cgroup");
        let ret2 = cg.cleanup().context("failed to cleanup cgroup");
        ret2.and(ret1)
    });

    child_result
        .context("failed to read child result")?
        .context("child process failed")?;

    let status = status.context("failed to wait4")?;

    trace!(?status, ?real_duration, ?wait_duration);

    let timed_out = timed_out.load(Ordering::SeqCst);

    let (sys_time, user_time, memory) = match metrics {
        Some(Ok(m)) => (
            m.sys_time / 1_000_000,  // ns => ms
            m.user_time / 1_000_000, // ns => ms
            m.memory / 1024,         // bytes => KiB
        ),
        Some(Err(err)) => {
            warn!(?err, "falling back to rusage");
            (status.sys_time / 1000, status.user_time / 1000, status.max_rss)
        }
        None => (status.sys_time / 1000, status.user_time / 1000, status.max_rss),
    };

    Ok(SandboxOutput {
        code: status.code,
        signal: status.signal,
        timed_out,
        contained,
        real_time: real_duration.as_millis() as u64,
        sys_time,
        user_time,
        memory,
    })
}
