use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::lang::Language;
use crate::runner::{ProcessRunner, Stage};

use std::path::{Path, PathBuf};

use tracing::debug;

/// Compiles `source` inside the runner's workspace and returns the executable.
///
/// Interpreted languages pass through unchanged.
pub fn compile(
    runner: &ProcessRunner<'_>,
    config: &JudgeConfig,
    language: Language,
    source: &Path,
) -> Result<PathBuf, JudgeError> {
    let (cmd, output) = match language.compile_command(config, source) {
        Some(pair) => pair,
        None => return Ok(source.to_path_buf()),
    };

    debug!(%language, compiler = cmd.program(), "compiling");

    let captured = runner
        .execute(cmd, Stage::Compile)
        .map_err(|failure| JudgeError::from_failure(Stage::Compile, failure))?;

    let executable = runner.workspace().file(&output);
    if !executable.is_file() {
        let diagnostic = if captured.stderr.trim().is_empty() {
            "compiler exited successfully but produced no executable".to_owned()
        } else {
            captured.stderr
        };
        return Err(JudgeError::Compilation { diagnostic });
    }

    debug!(
        real_time = captured.output.real_time,
        path = %executable.display(),
        "compiled"
    );
    Ok(executable)
}
