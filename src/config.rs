use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fmt};

use clap::Args;
use serde::{Deserialize, Serialize};

/// How much of the sandbox a submission runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Resource limits and a fresh process group; works unprivileged.
    Rlimit,
    /// Namespaces, cgroup limits, optional chroot and id drop; requires root.
    Namespace,
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rlimit" => Ok(Isolation::Rlimit),
            "namespace" => Ok(Isolation::Namespace),
            _ => Err(format!(
                "unknown isolation level `{}` (expected `rlimit` or `namespace`)",
                s
            )),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Isolation::Rlimit => "rlimit",
            Isolation::Namespace => "namespace",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct JudgeConfig {
    /// Parent directory of the per-submission workspaces [default: $TMPDIR/arbiter]
    #[clap(long, env = "ARBITER_TEMP_DIR", value_name = "path")]
    pub temp_dir: Option<PathBuf>,

    #[clap(
        long,
        env = "ARBITER_RUN_TIMEOUT_MS",
        default_value = "10000",
        value_name = "milliseconds"
    )]
    pub run_timeout_ms: u64,

    #[clap(
        long,
        env = "ARBITER_COMPILE_TIMEOUT_MS",
        default_value = "15000",
        value_name = "milliseconds"
    )]
    pub compile_timeout_ms: u64,

    #[clap(long, env = "ARBITER_PYTHON", default_value = "python3", value_name = "program")]
    pub python: String,

    #[clap(long, env = "ARBITER_NODE", default_value = "node", value_name = "program")]
    pub node: String,

    #[clap(long, env = "ARBITER_CXX", default_value = "g++", value_name = "program")]
    pub cxx: String,

    /// `rlimit` or `namespace`
    #[clap(long, env = "ARBITER_ISOLATION", default_value = "rlimit")]
    pub isolation: Isolation,

    #[clap(long, env = "ARBITER_MEMORY_LIMIT", value_name = "bytes")]
    pub memory_limit: Option<u64>,

    #[clap(long, env = "ARBITER_MAX_PIDS", value_name = "count")]
    pub max_pids: Option<u32>,

    /// Largest file a submission may write, stdout and stderr included
    #[clap(
        long,
        env = "ARBITER_OUTPUT_LIMIT",
        default_value = "67108864",
        value_name = "bytes"
    )]
    pub output_limit: u64,

    #[clap(long, env = "ARBITER_UID")]
    pub uid: Option<u32>,

    #[clap(long, env = "ARBITER_GID")]
    pub gid: Option<u32>,

    /// Root filesystem for `namespace` isolation
    #[clap(long, env = "ARBITER_CHROOT", value_name = "path")]
    pub chroot: Option<PathBuf>,

    /// Host directories made visible read-only inside the chroot
    #[clap(
        long,
        env = "ARBITER_BIND_RO",
        value_name = "path",
        value_delimiter = ',',
        default_values = &["/bin", "/lib", "/lib64", "/usr", "/etc"]
    )]
    pub bind_ro: Vec<PathBuf>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            run_timeout_ms: 10_000,
            compile_timeout_ms: 15_000,
            python: "python3".into(),
            node: "node".into(),
            cxx: "g++".into(),
            isolation: Isolation::Rlimit,
            memory_limit: None,
            max_pids: None,
            output_limit: 64 * 1024 * 1024,
            uid: None,
            gid: None,
            chroot: None,
            bind_ro: ["/bin", "/lib", "/lib64", "/usr", "/etc"]
                .iter()
                .map(PathBuf::from)
                .collect(),
        }
    }
}

impl JudgeConfig {
    pub fn temp_root(&self) -> PathBuf {
        match self.temp_dir {
            Some(ref dir) => dir.clone(),
            None => env::temp_dir().join("arbiter"),
        }
    }

    /// `RLIMIT_CPU` for a stage: the wall-clock limit rounded up, plus one second.
    pub fn cpu_seconds(timeout_ms: u64) -> u32 {
        let secs = (timeout_ms + 999) / 1000;
        secs.min(u64::from(u32::MAX - 1)) as u32 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_names() {
        assert_eq!("rlimit".parse::<Isolation>(), Ok(Isolation::Rlimit));
        assert_eq!("namespace".parse::<Isolation>(), Ok(Isolation::Namespace));
        assert!("docker".parse::<Isolation>().is_err());
        assert_eq!(Isolation::Namespace.to_string(), "namespace");
    }

    #[test]
    fn defaults() {
        let config = JudgeConfig::default();
        assert_eq!(config.run_timeout_ms, 10_000);
        assert_eq!(config.compile_timeout_ms, 15_000);
        assert_eq!(config.isolation, Isolation::Rlimit);
        assert!(config.temp_root().ends_with("arbiter"));
    }

    #[test]
    fn cpu_budget() {
        assert_eq!(JudgeConfig::cpu_seconds(10_000), 11);
        assert_eq!(JudgeConfig::cpu_seconds(1), 2);
        assert_eq!(JudgeConfig::cpu_seconds(1_500), 3);
    }
}
