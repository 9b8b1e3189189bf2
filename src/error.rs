use crate::lang::Language;
use crate::runner::{RunFailure, Stage, Termination};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure that stops a whole submission.
///
/// Per-test problems (a missing entry point, an unparsable input) are not errors:
/// they surface as failed [`ExecutionResult`](crate::ExecutionResult)s instead.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("compilation failed:\n{diagnostic}")]
    Compilation { diagnostic: String },

    #[error("failed to launch `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{stage} stage exceeded the time limit of {limit_ms} ms")]
    Timeout { stage: Stage, limit_ms: u64 },

    #[error("program {termination}{}", diagnostic_suffix(.stderr))]
    RuntimeCrash {
        termination: Termination,
        stderr: String,
    },

    #[error("could not read the judge result: {reason}")]
    Parse { reason: String },

    #[error("{0} is not implemented yet")]
    NotImplemented(Language),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    CompilationError,
    SpawnError,
    TimeoutError,
    RuntimeCrash,
    ParseError,
    NotImplemented,
    InternalError,
}

fn diagnostic_suffix(stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

impl JudgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JudgeError::Compilation { .. } => ErrorKind::CompilationError,
            JudgeError::Spawn { .. } => ErrorKind::SpawnError,
            JudgeError::Timeout { .. } => ErrorKind::TimeoutError,
            JudgeError::RuntimeCrash { .. } => ErrorKind::RuntimeCrash,
            JudgeError::Parse { .. } => ErrorKind::ParseError,
            JudgeError::NotImplemented(_) => ErrorKind::NotImplemented,
            JudgeError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Maps a runner failure to the error class of the stage it happened in.
    pub fn from_failure(stage: Stage, failure: RunFailure) -> Self {
        match failure {
            RunFailure::Spawn { program, reason } => JudgeError::Spawn { program, reason },
            RunFailure::Timeout { limit_ms } => JudgeError::Timeout { stage, limit_ms },
            RunFailure::NonZero {
                termination,
                stdout,
                stderr,
            } => match stage {
                Stage::Compile => {
                    let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
                    let diagnostic = if diagnostic.trim().is_empty() {
                        format!("compiler {}", termination)
                    } else {
                        diagnostic
                    };
                    JudgeError::Compilation { diagnostic }
                }
                Stage::Run => JudgeError::RuntimeCrash {
                    termination,
                    stderr,
                },
            },
            RunFailure::Io(err) => JudgeError::Internal(format!("{} stage: {}", stage, err)),
        }
    }
}

impl ErrorKind {
    /// Infrastructure failures say nothing about the submitted code.
    pub fn is_infrastructure(self) -> bool {
        matches!(self, ErrorKind::SpawnError | ErrorKind::InternalError)
    }
}
