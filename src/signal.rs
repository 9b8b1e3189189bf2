use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::task::{self, JoinHandle};
use tokio::time;
use tracing::trace;

/// Kills the process group led by `child_pid` once `timeout_ms` elapses.
/// `fired` is raised before the signal is sent.
pub fn async_kill(child_pid: Pid, timeout_ms: u64, fired: Arc<AtomicBool>) -> JoinHandle<()> {
    task::spawn(async move {
        time::sleep(Duration::from_millis(timeout_ms)).await;
        fired.store(true, Ordering::SeqCst);
        kill_tree(child_pid);
    })
}

/// SIGKILLs the whole process group, falling back to the leader alone
/// when the group is already gone.
pub fn kill_tree(leader: Pid) {
    if send_group_signal(leader, Signal::SIGKILL).is_err() {
        let _ = send_signal(leader, Signal::SIGKILL);
    }
}

pub fn send_signal(pid: Pid, signal: Signal) -> nix::Result<()> {
    let result = signal::kill(pid, signal);
    trace!(
        "kill pid = {}, signal = {}, result = {:?}",
        pid,
        signal,
        result
    );
    result
}

pub fn send_group_signal(pgid: Pid, signal: Signal) -> nix::Result<()> {
    let result = signal::killpg(pgid, signal);
    trace!(
        "killpg pgid = {}, signal = {}, result = {:?}",
        pgid,
        signal,
        result
    );
    result
}

pub fn killall(pids: &[Pid]) {
    for &pid in pids {
        let _ = send_signal(pid, Signal::SIGSTOP);
    }

    for &pid in pids {
        let _ = send_signal(pid, Signal::SIGKILL);
    }
}
