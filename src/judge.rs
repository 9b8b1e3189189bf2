use crate::compile;
use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::harness;
use crate::lang::Language;
use crate::model::{ExecutionResult, JudgeResult, Question};
use crate::parse;
use crate::runner::{ProcessRunner, Stage};
use crate::signature::Signature;
use crate::workspace::Workspace;

use std::fs;
use std::io;
use std::sync::Arc;

use tokio::task;
use tracing::{debug, warn};

/// The judging pipeline.
///
/// Build one per process and share it behind an `Arc`. Pipelines must run inside a
/// tokio runtime context, since every sandboxed process has a timer task.
#[derive(Debug)]
pub struct Judge {
    config: JudgeConfig,
}

impl Judge {
    pub fn new(config: JudgeConfig) -> io::Result<Self> {
        fs::create_dir_all(config.temp_root())?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Runs the whole pipeline on the calling thread. Every failure ends up in the
    /// returned result.
    #[tracing::instrument(
        level = "debug",
        skip(self, question, code, language),
        fields(question = %question.id, %language, workspace)
    )]
    pub fn judge(&self, question: &Question, code: &str, language: Language) -> JudgeResult {
        let total = question.test_cases.len();
        match self.pipeline(question, code, language) {
            Ok(results) => {
                let result = JudgeResult::from_results(total, results);
                debug!(passed = result.passed_tests, total, "judged");
                result
            }
            Err(err) => {
                if err.kind().is_infrastructure() {
                    warn!(%err, "judge failed");
                } else {
                    debug!(%err, kind = ?err.kind(), "submission failed");
                }
                JudgeResult::failure(total, &err)
            }
        }
    }

    fn pipeline(
        &self,
        question: &Question,
        code: &str,
        language: Language,
    ) -> Result<Vec<ExecutionResult>, JudgeError> {
        if !language.is_implemented() {
            return Err(JudgeError::NotImplemented(language));
        }

        let signature = Signature::for_question(question);
        let source = harness::generate(language, &signature, &question.test_cases, code)?;

        let workspace = Workspace::create(&self.config.temp_root())
            .map_err(|err| JudgeError::Internal(format!("failed to create workspace: {}", err)))?;
        tracing::Span::current().record("workspace", &workspace.token());

        let source_path = workspace
            .write(language.source_name(), &source)
            .map_err(|err| JudgeError::Internal(format!("failed to write source: {}", err)))?;

        let runner = ProcessRunner::new(&self.config, &workspace);

        let target = compile::compile(&runner, &self.config, language, &source_path)?;

        debug!("running");
        let cmd = language.run_command(&self.config, &target);
        let captured = runner
            .execute(cmd, Stage::Run)
            .map_err(|failure| JudgeError::from_failure(Stage::Run, failure))?;

        parse::parse_results(&captured.stdout, &question.test_cases)
    }

    /// Runs [`Judge::judge`] on the blocking pool.
    pub async fn submit(
        self: &Arc<Self>,
        question: Arc<Question>,
        code: String,
        language: Language,
    ) -> JudgeResult {
        let judge = Arc::clone(self);
        let total = question.test_cases.len();
        let handle = task::spawn_blocking(move || judge.judge(&question, &code, language));
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                let err = JudgeError::Internal(format!("judge task failed: {}", err));
                warn!(%err);
                JudgeResult::failure(total, &err)
            }
        }
    }
}
