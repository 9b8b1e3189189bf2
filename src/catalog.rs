use crate::judge::Judge;
use crate::lang::{Language, UnknownLanguage};
use crate::model::{Question, Submission, SubmissionReport};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

/// Where questions and their test cases come from.
pub trait QuestionCatalog: Send + Sync {
    fn question(&self, id: &str) -> Option<Arc<Question>>;
}

/// Questions loaded from a JSON array.
#[derive(Debug, Default)]
pub struct JsonCatalog {
    questions: HashMap<String, Arc<Question>>,
}

impl JsonCatalog {
    pub fn from_questions(questions: impl IntoIterator<Item = Question>) -> Self {
        let questions = questions
            .into_iter()
            .map(|q| (q.id.clone(), Arc::new(q)))
            .collect();
        Self { questions }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let questions: Vec<Question> =
            serde_json::from_str(text).context("invalid question catalog")?;
        Ok(Self::from_questions(questions))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: path = {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionCatalog for JsonCatalog {
    fn question(&self, id: &str) -> Option<Arc<Question>> {
        self.questions.get(id).cloned()
    }
}

/// A submission refused before any code runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("unknown question `{0}`")]
    UnknownQuestion(String),

    #[error("question `{0}` has no test cases")]
    NoTestCases(String),

    #[error(transparent)]
    UnsupportedLanguage(#[from] UnknownLanguage),
}

/// Checks a submission against the catalog.
pub fn resolve(
    catalog: &dyn QuestionCatalog,
    submission: &Submission,
) -> Result<(Arc<Question>, Language), SubmitError> {
    let question = catalog
        .question(&submission.question_id)
        .ok_or_else(|| SubmitError::UnknownQuestion(submission.question_id.clone()))?;

    if question.test_cases.is_empty() {
        return Err(SubmitError::NoTestCases(question.id.clone()));
    }

    let language: Language = submission.language.parse()?;
    Ok((question, language))
}

/// Judges a submission against its catalog question.
pub async fn submit_code(
    judge: &Arc<Judge>,
    catalog: &dyn QuestionCatalog,
    submission: &Submission,
) -> Result<SubmissionReport, SubmitError> {
    let (question, language) = resolve(catalog, submission)?;
    let question_id = question.id.clone();
    let result = judge.submit(question, submission.code.clone(), language).await;
    Ok(SubmissionReport::new(question_id, language, result))
}
