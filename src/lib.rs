#![deny(clippy::all)]

mod cgroup_v1;
mod child;
mod mount;
mod pipe;
mod proc;
mod run;
#[cfg(feature = "seccomp")]
mod seccomp;
mod signal;
mod utils;

pub mod catalog;
pub mod cmd;
pub mod compile;
pub mod config;
pub mod error;
pub mod harness;
pub mod input;
pub mod judge;
pub mod lang;
pub mod model;
pub mod parse;
pub mod runner;
pub mod signature;
pub mod workspace;

pub use crate::catalog::{submit_code, JsonCatalog, QuestionCatalog, SubmitError};
pub use crate::config::{Isolation, JudgeConfig};
pub use crate::error::{ErrorKind, JudgeError};
pub use crate::judge::Judge;
pub use crate::lang::Language;
pub use crate::model::{
    ExecutionResult, JudgeResult, Question, Submission, SubmissionReport, TestCase, Verdict,
};
pub use crate::run::run;
pub use crate::signature::{EntryPoint, ParamKind, Signature};

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use memchr::memchr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Serialize, Deserialize, Args)]
pub struct SandboxConfig {
    pub bin: PathBuf,

    pub args: Vec<OsString>,

    #[clap(short = 'e', long)]
    pub env: Vec<OsString>,

    #[clap(long, value_name = "path")]
    pub chroot: Option<PathBuf>,

    #[clap(long, value_name = "path")]
    pub cwd: Option<PathBuf>,

    #[clap(long)]
    pub uid: Option<u32>,

    #[clap(long)]
    pub gid: Option<u32>,

    #[clap(long, value_name = "path")]
    pub stdin: Option<PathBuf>,

    #[clap(long, value_name = "path")]
    pub stdout: Option<PathBuf>,

    #[clap(long, value_name = "path")]
    pub stderr: Option<PathBuf>,

    #[clap(short = 't', long, value_name = "milliseconds")]
    pub real_time_limit: Option<u64>,

    #[clap(long, value_name = "seconds")]
    pub rlimit_cpu: Option<u32>,

    #[clap(long, value_name = "bytes")]
    pub rlimit_as: Option<u64>,

    #[clap(long, value_name = "bytes")]
    pub rlimit_data: Option<u64>,

    #[clap(long, value_name = "bytes")]
    pub rlimit_fsize: Option<u64>,

    #[clap(long, value_name = "bytes")]
    pub cg_limit_memory: Option<u64>,

    #[clap(long, value_name = "count")]
    pub cg_limit_max_pids: Option<u32>,

    #[clap(long, value_name = "bind mount")]
    pub bindmount_rw: Vec<BindMount>,

    #[clap(long, value_name = "bind mount")]
    pub bindmount_ro: Vec<BindMount>,

    #[clap(long, value_name = "path")]
    pub mount_proc: Option<PathBuf>,

    #[clap(long, value_name = "path")]
    pub mount_tmpfs: Option<PathBuf>,

    #[clap(long)]
    pub priority: Option<i8>,

    /// Run the child in fresh mount, UTS, PID and network namespaces (requires root)
    #[clap(long)]
    pub unshare: bool,

    /// Run the child as PID 1 of fresh user and PID namespaces, so no descendant
    /// outlives it (unprivileged)
    #[clap(long)]
    pub isolate_pids: bool,

    #[clap(long)]
    pub seccomp_forbid_ipc: bool,
}

impl SandboxConfig {
    /// Whether the child needs its own cgroup
    pub fn uses_cgroup(&self) -> bool {
        self.cg_limit_memory.is_some() || self.cg_limit_max_pids.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl BindMount {
    pub fn new_same(path: PathBuf) -> Self {
        Self {
            src: path.clone(),
            dst: path,
        }
    }
}

impl FromStr for BindMount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (src, dst) = match memchr(b':', s.as_bytes()) {
            Some(idx) => {
                let src = &s[..idx];
                let dst = &s[idx + 1..];
                if src.is_empty() || dst.is_empty() {
                    return Err("invalid bind mount format".into());
                }
                (src, dst)
            }
            None => (s, s),
        };
        Ok(BindMount {
            src: src.into(),
            dst: dst.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutput {
    pub code: i32,
    pub signal: i32,

    /// The kill timer fired before the child exited
    pub timed_out: bool,

    /// Descendants lived in the child's PID namespace and died with it
    pub contained: bool,

    pub real_time: u64, // milliseconds
    pub sys_time: u64,  // milliseconds
    pub user_time: u64, // milliseconds

    pub memory: u64, // KiB
}

impl SandboxOutput {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.code == 0 && self.signal == 0
    }

    /// Whether the child ran out of wall-clock time or of its `RLIMIT_CPU` budget.
    ///
    /// A namespace init ignores `SIGXCPU`, so it is killed at the hard limit
    /// instead; that `SIGKILL` is told apart by the CPU time spent.
    pub fn exceeded_time(&self, rlimit_cpu: Option<u32>) -> bool {
        if self.timed_out || self.signal == libc::SIGXCPU {
            return true;
        }
        match rlimit_cpu {
            Some(seconds) => {
                self.signal == libc::SIGKILL
                    && self.user_time + self.sys_time >= u64::from(seconds) * 1000
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_same_path() {
        let mnt: BindMount = "/usr".parse().unwrap();
        assert_eq!(mnt.src, PathBuf::from("/usr"));
        assert_eq!(mnt.dst, PathBuf::from("/usr"));
    }

    fn finished(signal: i32, cpu_ms: u64) -> SandboxOutput {
        SandboxOutput {
            code: 0,
            signal,
            timed_out: false,
            contained: true,
            real_time: cpu_ms,
            sys_time: 0,
            user_time: cpu_ms,
            memory: 0,
        }
    }

    #[test]
    fn cpu_budget_kills_are_timeouts() {
        assert!(finished(libc::SIGXCPU, 1000).exceeded_time(Some(1)));
        assert!(finished(libc::SIGKILL, 2010).exceeded_time(Some(1)));
        assert!(!finished(libc::SIGKILL, 30).exceeded_time(Some(1)));
        assert!(!finished(libc::SIGKILL, 5000).exceeded_time(None));
        assert!(!finished(libc::SIGSEGV, 5000).exceeded_time(Some(1)));

        let mut killed = finished(libc::SIGKILL, 10);
        killed.timed_out = true;
        assert!(killed.exceeded_time(None));
    }

    #[test]
    fn bind_mount_pair() {
        let mnt: BindMount = "/opt/python:/usr/local".parse().unwrap();
        assert_eq!(mnt.src, PathBuf::from("/opt/python"));
        assert_eq!(mnt.dst, PathBuf::from("/usr/local"));

        assert!(":/usr".parse::<BindMount>().is_err());
        assert!("/usr:".parse::<BindMount>().is_err());
    }
}
