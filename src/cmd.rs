use crate::utils;
use crate::{BindMount, SandboxConfig, SandboxOutput};

use std::env;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use path_absolutize::Absolutize;

/// A sandboxed invocation under construction.
///
/// The program is kept by name until [`Command::resolve`] looks it up on `PATH`.
#[derive(Debug, Clone)]
pub struct Command {
    program: String,
    pub config: SandboxConfig,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            config: SandboxConfig {
                bin: PathBuf::from(&program),
                ..Default::default()
            },
            program,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Turns the program name into an absolute executable path.
    ///
    /// Relative hits are joined onto the current directory as it is now. The
    /// cached directory of `path_absolutize` is only filled in sandbox children.
    pub fn resolve(&mut self) -> Option<&Path> {
        let found = utils::resolve_bin(&self.program)?;
        let cwd = env::current_dir().ok()?;
        let absolute = found.absolutize_from(&cwd).ok()?.into_owned();
        self.config.bin = absolute;
        Some(&self.config.bin)
    }

    pub fn run(&self) -> Result<SandboxOutput> {
        crate::run(&self.config)
    }

    pub fn arg(&mut self, a: impl Into<OsString>) -> &mut Self {
        self.config.args.push(a.into());
        self
    }

    pub fn args<I>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        self.config.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn inherit_env(&mut self, k: impl Into<OsString>) -> &mut Self {
        self.config.env.push(k.into());
        self
    }

    pub fn add_env(&mut self, k: impl Into<OsString>, v: impl AsRef<OsStr>) -> &mut Self {
        let mut e: OsString = k.into();
        e.push(OsStr::from_bytes(b"="));
        e.push(v.as_ref());
        self.config.env.push(e);
        self
    }

    pub fn bindmount_ro(&mut self, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> &mut Self {
        self.config.bindmount_ro.push(BindMount {
            src: src.into(),
            dst: dst.into(),
        });
        self
    }

    pub fn bindmount_rw(&mut self, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> &mut Self {
        self.config.bindmount_rw.push(BindMount {
            src: src.into(),
            dst: dst.into(),
        });
        self
    }

    pub fn chroot(&mut self, chroot: impl Into<PathBuf>) -> &mut Self {
        self.config.chroot = Some(chroot.into());
        self
    }

    pub fn cwd(&mut self, cwd: impl Into<PathBuf>) -> &mut Self {
        self.config.cwd = Some(cwd.into());
        self
    }

    /// stdin stays on `/dev/null`
    pub fn output(&mut self, stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> &mut Self {
        self.config.stdout = Some(stdout.into());
        self.config.stderr = Some(stderr.into());
        self
    }

    pub fn mount_proc(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.config.mount_proc = Some(path.into());
        self
    }

    pub fn mount_tmpfs(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.config.mount_tmpfs = Some(path.into());
        self
    }

    pub fn real_time_limit(&mut self, ms: u64) -> &mut Self {
        self.config.real_time_limit = Some(ms);
        self
    }
}
