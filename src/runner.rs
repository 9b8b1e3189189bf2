use crate::cmd::Command;
use crate::config::{Isolation, JudgeConfig};
use crate::workspace::Workspace;
use crate::SandboxOutput;

use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::path::Path;

use nix::sys::signal::Signal;
use nix::unistd::{self, Gid, Uid};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Run => "run",
        }
    }

    pub fn timeout_ms(self, config: &JudgeConfig) -> u64 {
        match self {
            Stage::Compile => config.compile_timeout_ms,
            Stage::Run => config.run_timeout_ms,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a process that did not succeed ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub code: i32,
    pub signal: i32,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signal != 0 {
            match Signal::try_from(self.signal) {
                Ok(sig) => write!(f, "was killed by signal {} ({})", self.signal, sig.as_str()),
                Err(_) => write!(f, "was killed by signal {}", self.signal),
            }
        } else {
            write!(f, "exited with code {}", self.code)
        }
    }
}

#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("failed to launch `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("time limit of {limit_ms} ms exceeded")]
    Timeout { limit_ms: u64 },

    #[error("process {termination}")]
    NonZero {
        termination: Termination,
        stdout: String,
        stderr: String,
    },

    #[error("failed to prepare or collect process files: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub output: SandboxOutput,
}

/// Runs toolchain commands for one workspace under the configured isolation.
pub struct ProcessRunner<'a> {
    config: &'a JudgeConfig,
    workspace: &'a Workspace,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(config: &'a JudgeConfig, workspace: &'a Workspace) -> Self {
        Self { config, workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }

    #[tracing::instrument(level = "debug", skip(self, cmd), fields(program = cmd.program()))]
    pub fn execute(&self, mut cmd: Command, stage: Stage) -> Result<Captured, RunFailure> {
        let program = cmd.program().to_owned();
        if cmd.resolve().is_none() {
            return Err(RunFailure::Spawn {
                program,
                reason: "not found on PATH or not executable".into(),
            });
        }

        let limit_ms = stage.timeout_ms(self.config);
        let stdout_name = format!("{}.stdout", stage);
        let stderr_name = format!("{}.stderr", stage);

        cmd.cwd(self.workspace.path())
            .output(
                self.workspace.file(&stdout_name),
                self.workspace.file(&stderr_name),
            )
            .real_time_limit(limit_ms);
        let rlimit_cpu = Some(JudgeConfig::cpu_seconds(limit_ms));
        cmd.config.rlimit_cpu = rlimit_cpu;
        cmd.config.rlimit_fsize = Some(self.config.output_limit);

        match self.config.isolation {
            Isolation::Rlimit => {
                cmd.config.rlimit_as = self.config.memory_limit;
                cmd.config.isolate_pids = true;
            }
            Isolation::Namespace => self.confine(&mut cmd)?,
        }

        let output = cmd.run().map_err(|err| RunFailure::Spawn {
            program: program.clone(),
            reason: format!("{:#}", err),
        })?;

        debug!(
            code = output.code,
            signal = output.signal,
            real_time = output.real_time,
            memory = output.memory,
            contained = output.contained,
            "process finished"
        );

        if output.exceeded_time(rlimit_cpu) {
            return Err(RunFailure::Timeout { limit_ms });
        }

        let stdout = self.workspace.read_lossy(&stdout_name)?;
        let stderr = self.workspace.read_lossy(&stderr_name)?;

        if !output.is_success() {
            return Err(RunFailure::NonZero {
                termination: Termination {
                    code: output.code,
                    signal: output.signal,
                },
                stdout,
                stderr,
            });
        }

        Ok(Captured {
            stdout,
            stderr,
            output,
        })
    }

    fn confine(&self, cmd: &mut Command) -> Result<(), RunFailure> {
        let ws = self.workspace.path();

        cmd.config.unshare = true;
        cmd.config.cg_limit_memory = self.config.memory_limit;
        cmd.config.cg_limit_max_pids = self.config.max_pids;
        cmd.config.uid = self.config.uid;
        cmd.config.gid = self.config.gid;
        cmd.config.seccomp_forbid_ipc = cfg!(feature = "seccomp");

        if let Some(ref root) = self.config.chroot {
            cmd.chroot(root);
            for dir in self.config.bind_ro.iter().filter(|d| d.is_dir()) {
                cmd.bindmount_ro(dir, dir);
            }
            cmd.bindmount_rw(ws, ws);
            cmd.mount_proc("/proc");

            // a tmpfs over /tmp would hide a workspace living there
            if !ws.starts_with("/tmp") {
                cmd.mount_tmpfs("/tmp");
            }
        }

        if self.config.uid.is_some() || self.config.gid.is_some() {
            hand_over(ws, self.config.uid, self.config.gid)?;
        }

        Ok(())
    }
}

/// Gives the workspace to the unprivileged ids, so that compilers can write into it.
fn hand_over(ws: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    unistd::chown(ws, uid.map(Uid::from_raw), gid.map(Gid::from_raw))
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
}
