use crate::signal;

use std::fs::File;
use std::io::Write as _;
use std::str::FromStr;
use std::{fmt, fs, io};

use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use nix::unistd::{self, AccessFlags, Pid};
use tracing::{trace, warn};

const CGROUP_ROOT: &str = "/sys/fs/cgroup";

pub struct Cgroup {
    cpu: String,
    memory: String,
    pids: String,
}

#[derive(Debug)]
pub struct Metrics {
    pub sys_time: u64,  // ns
    pub user_time: u64, // ns
    pub memory: u64,    // bytes
}

impl Cgroup {
    pub fn create(name: &str) -> Result<Self> {
        trace!(?name, "create cgroup");
        let cpu = format!("{}/cpu/{}", CGROUP_ROOT, name);
        let memory = format!("{}/memory/{}", CGROUP_ROOT, name);
        let pids = format!("{}/pids/{}", CGROUP_ROOT, name);
        Self::ensure_dir(&cpu)?;
        Self::ensure_dir(&memory)?;
        Self::ensure_dir(&pids)?;
        Ok(Self { cpu, memory, pids })
    }

    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    pub fn memory(&self) -> &str {
        &self.memory
    }

    pub fn pids(&self) -> &str {
        &self.pids
    }

    fn ensure_dir(cg_dir: &str) -> Result<()> {
        if unistd::access(cg_dir, AccessFlags::F_OK).is_ok() {
            return Ok(());
        }

        unistd::mkdir(cg_dir, Mode::from_bits_truncate(0o755))
            .with_context(|| format!("fail to create cgroup directory: {}", cg_dir))?;

        Ok(())
    }

    pub fn add_self_proc(cg_dir: &str) -> io::Result<()> {
        let path = format!("{}/cgroup.procs", cg_dir);
        let mut file = fs::OpenOptions::new().append(true).open(path)?;
        write!(file, "0")?;
        Ok(())
    }

    pub fn write_type(cg_dir: &str, file: &str, content: impl fmt::Display) -> io::Result<()> {
        let path = format!("{}/{}", cg_dir, file);
        let mut file = File::create(&path)?;
        write!(file, "{}", content)?;
        Ok(())
    }

    pub fn read_type<T>(cg_dir: &str, file: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let path = format!("{}/{}", cg_dir, file);
        let content = fs::read_to_string(path)?;
        Ok(content.trim_end().parse::<T>()?)
    }

    pub fn collect(&self) -> Result<Metrics> {
        let sys_time = Self::read_type::<u64>(self.cpu(), "cpuacct.usage_sys")?;
        let user_time = Self::read_type::<u64>(self.cpu(), "cpuacct.usage_user")?;
        let memory = Self::read_type::<u64>(self.memory(), "memory.max_usage_in_bytes")?;

        let metrics = Metrics {
            sys_time,
            user_time,
            memory,
        };

        trace!(?metrics);

        Ok(metrics)
    }

    /// Kills whatever is still attached to the cgroup, then removes its directories.
    pub fn cleanup(self) -> Result<()> {
        let path = format!("{}/cgroup.procs", self.cpu);
        let content = fs::read_to_string(&path).context("failed to read cgroup procs")?;

        let pids: Vec<Pid> = content
            .split('\n')
            .filter_map(|t| t.trim().parse::<i32>().ok())
            .map(Pid::from_raw)
            .collect();

        if !pids.is_empty() {
            trace!(?pids);
            signal::killall(&pids);
        }

        for dir in [&self.cpu, &self.memory, &self.pids].iter() {
            if let Err(err) = fs::remove_dir(dir) {
                warn!(path = ?dir, %err, "failed to remove cgroup dir")
            }
        }

        Ok(())
    }
}
