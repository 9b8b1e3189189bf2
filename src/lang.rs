use crate::cmd::Command;
use crate::config::JudgeConfig;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Cpp,
    Java,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported language `{0}`")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            _ => Err(UnknownLanguage(s.to_owned())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Language {
    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    /// Java is accepted at the door but has no harness yet.
    pub fn is_implemented(self) -> bool {
        !matches!(self, Language::Java)
    }

    pub fn is_compiled(self) -> bool {
        matches!(self, Language::Cpp | Language::Java)
    }

    pub fn source_name(self) -> &'static str {
        match self {
            Language::Python => "solution.py",
            Language::JavaScript => "solution.js",
            Language::Cpp => "solution.cpp",
            Language::Java => "Solution.java",
        }
    }

    /// `None` for interpreted languages.
    pub fn compile_command(self, config: &JudgeConfig, source: &Path) -> Option<(Command, String)> {
        match self {
            Language::Cpp => {
                let output = "solution".to_owned();
                let mut cmd = Command::new(&config.cxx);
                cmd.args(["-std=c++17", "-O2", "-pipe", "-o"].iter().copied())
                    .arg(source.with_file_name(&output))
                    .arg(source)
                    .inherit_env("PATH");
                Some((cmd, output))
            }
            Language::Python | Language::JavaScript | Language::Java => None,
        }
    }

    /// `target` is the source file, or the compiled executable for compiled languages.
    pub fn run_command(self, config: &JudgeConfig, target: &Path) -> Command {
        match self {
            Language::Python => {
                let mut cmd = Command::new(&config.python);
                cmd.arg("-B")
                    .arg(target)
                    .inherit_env("PATH")
                    .add_env("PYTHONIOENCODING", "utf-8")
                    .add_env("PYTHONDONTWRITEBYTECODE", "1");
                cmd
            }
            Language::JavaScript => {
                let mut cmd = Command::new(&config.node);
                cmd.arg(target).inherit_env("PATH");
                cmd
            }
            Language::Cpp | Language::Java => {
                let mut cmd = Command::new(target.to_string_lossy().into_owned());
                cmd.inherit_env("PATH");
                cmd
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::OsString;

    #[test]
    fn aliases() {
        assert_eq!("py".parse::<Language>(), Ok(Language::Python));
        assert_eq!("Node".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("C++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("java".parse::<Language>(), Ok(Language::Java));
        assert_eq!(
            "brainfuck".parse::<Language>(),
            Err(UnknownLanguage("brainfuck".into()))
        );
    }

    #[test]
    fn cpp_compile_line() {
        let config = JudgeConfig::default();
        let (cmd, output) = Language::Cpp
            .compile_command(&config, Path::new("/tmp/ws/solution.cpp"))
            .unwrap();
        assert_eq!(output, "solution");
        assert_eq!(cmd.program(), "g++");
        let args: Vec<OsString> = [
            "-std=c++17",
            "-O2",
            "-pipe",
            "-o",
            "/tmp/ws/solution",
            "/tmp/ws/solution.cpp",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(cmd.config.args, args);
    }

    #[test]
    fn interpreted_have_no_compile_step() {
        let config = JudgeConfig::default();
        let src = Path::new("/tmp/ws/solution.py");
        assert!(Language::Python.compile_command(&config, src).is_none());
        assert!(!Language::Python.is_compiled());
        assert!(!Language::Java.is_implemented());

        let cmd = Language::Python.run_command(&config, src);
        assert_eq!(cmd.program(), "python3");
        assert_eq!(cmd.config.args[0], OsString::from("-B"));
    }
}
