use crate::error::{ErrorKind, JudgeError};
use crate::lang::Language;
use crate::signature::EntryPoint;

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            explanation: String::new(),
        }
    }
}

/// The outcome of one test case, as reported by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub test_case_index: usize,
    pub passed: bool,
    pub actual_output: String,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub success: bool,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl JudgeResult {
    pub fn from_results(total_tests: usize, results: Vec<ExecutionResult>) -> Self {
        let passed_tests = results.iter().filter(|r| r.passed).count();
        Self {
            success: true,
            total_tests,
            passed_tests,
            results,
            overall_error: None,
            error_kind: None,
        }
    }

    pub fn failure(total_tests: usize, err: &JudgeError) -> Self {
        Self {
            success: false,
            total_tests,
            passed_tests: 0,
            results: Vec::new(),
            overall_error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn verdict(&self) -> Verdict {
        if let Some(kind) = self.error_kind {
            return match kind {
                ErrorKind::CompilationError => Verdict::CompilationError,
                ErrorKind::TimeoutError => Verdict::TimeLimitExceeded,
                ErrorKind::RuntimeCrash => Verdict::RuntimeError,
                ErrorKind::ParseError => Verdict::OutputError,
                ErrorKind::NotImplemented => Verdict::NotImplemented,
                ErrorKind::SpawnError | ErrorKind::InternalError => Verdict::SystemError,
            };
        }
        if self.success && self.passed_tests == self.total_tests {
            Verdict::Accepted
        } else if self.success {
            Verdict::WrongAnswer
        } else {
            Verdict::SystemError
        }
    }

    /// Percentage of passed tests, rounded to the nearest integer.
    pub fn accuracy(&self) -> u32 {
        if self.total_tests == 0 {
            return 0;
        }
        ((self.passed_tests * 100 + self.total_tests / 2) / self.total_tests) as u32
    }
}

/// Outcome of one submission as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Output Error")]
    OutputError,
    #[serde(rename = "System Error")]
    SystemError,
    #[serde(rename = "Not Implemented")]
    NotImplemented,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::CompilationError => "Compilation Error",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::OutputError => "Output Error",
            Verdict::SystemError => "System Error",
            Verdict::NotImplemented => "Not Implemented",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<EntryPoint>,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub question_id: String,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub question_id: String,
    pub language: Language,
    pub verdict: Verdict,
    pub accuracy: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub result: JudgeResult,
}

impl SubmissionReport {
    pub fn new(question_id: impl Into<String>, language: Language, result: JudgeResult) -> Self {
        let verdict = result.verdict();
        let message = result
            .overall_error
            .as_ref()
            .map(|err| format!("{}: {}", verdict, err));
        Self {
            question_id: question_id.into(),
            language,
            verdict,
            accuracy: result.accuracy(),
            message,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(index: usize, passed: bool, error: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            test_case_index: index,
            passed,
            actual_output: String::new(),
            expected_output: String::new(),
            error: error.map(Into::into),
            execution_time_ms: 0.0,
        }
    }

    #[test]
    fn counts_and_success() {
        let all = JudgeResult::from_results(2, vec![case(0, true, None), case(1, true, None)]);
        assert!(all.success);
        assert_eq!(all.verdict(), Verdict::Accepted);
        assert_eq!(all.accuracy(), 100);

        let some = JudgeResult::from_results(3, vec![
            case(0, true, None),
            case(1, false, None),
            case(2, false, None),
        ]);
        assert!(some.success);
        assert_eq!(some.passed_tests, 1);
        assert_eq!(some.accuracy(), 33);
        assert_eq!(some.verdict(), Verdict::WrongAnswer);

        let two_of_three = JudgeResult::from_results(3, vec![
            case(0, true, None),
            case(1, true, None),
            case(2, false, None),
        ]);
        assert_eq!(two_of_three.accuracy(), 67);

        let empty = JudgeResult::from_results(0, Vec::new());
        assert_eq!(empty.accuracy(), 0);
    }

    #[test]
    fn failed_case_with_error_is_wrong_answer() {
        let result = JudgeResult::from_results(1, vec![case(0, false, Some("ZeroDivisionError"))]);
        assert!(result.success);
        assert_eq!(result.verdict(), Verdict::WrongAnswer);
    }

    #[test]
    fn failure_shape() {
        let err = JudgeError::NotImplemented(Language::Java);
        let result = JudgeResult::failure(4, &err);
        assert!(!result.success);
        assert_eq!(result.total_tests, 4);
        assert!(result.results.is_empty());
        assert_eq!(result.verdict(), Verdict::NotImplemented);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errorKind"], "NotImplemented");
        assert_eq!(json["overallError"], "java is not implemented yet");
        assert_eq!(json["passedTests"], 0);
    }

    #[test]
    fn report_message() {
        let err = JudgeError::Timeout {
            stage: crate::runner::Stage::Run,
            limit_ms: 10_000,
        };
        let result = JudgeResult::failure(2, &err);
        let report = SubmissionReport::new("two-sum", Language::Python, result);
        assert_eq!(report.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(report.accuracy, 0);
        assert_eq!(
            report.message.as_deref(),
            Some("Time Limit Exceeded: run stage exceeded the time limit of 10000 ms")
        );
    }

    #[test]
    fn verdict_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"Time Limit Exceeded\""
        );
    }

    #[test]
    fn question_from_json() {
        let q: Question = serde_json::from_str(
            r#"{
                "id": "two-sum",
                "entryPoint": {"name": "twoSum", "params": ["int_array", "int"]},
                "testCases": [{"input": "[2,7,11,15], 9", "expectedOutput": "[0,1]"}]
            }"#,
        )
        .unwrap();
        assert_eq!(q.entry_point.unwrap().arity(), 2);
        assert_eq!(q.test_cases[0].expected_output, "[0,1]");
    }
}
