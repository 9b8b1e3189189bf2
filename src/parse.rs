use crate::error::JudgeError;
use crate::harness::RESULT_PREFIX;
use crate::model::{ExecutionResult, TestCase};

use serde_json::{Number, Value};

// 2^53: above it not every integer is exactly representable as f64
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

fn collapse_floats(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(x) if n.is_f64() && x.fract() == 0.0 && x.abs() <= EXACT_F64_INT => {
                Value::Number(Number::from(x as i64))
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(collapse_floats).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, collapse_floats(v)))
                .collect(),
        ),
        other => other,
    }
}

/// The normal form outputs are compared in.
///
/// JSON text is re-serialized compactly with integral floats written as integers;
/// anything else becomes a JSON string, so `abc` and `"abc"` meet.
pub fn canonical(text: &str) -> String {
    let text = text.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(value) => collapse_floats(value).to_string(),
        Err(_) => Value::from(text).to_string(),
    }
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    canonical(actual) == canonical(expected)
}

fn parse_error(reason: impl Into<String>) -> JudgeError {
    JudgeError::Parse {
        reason: reason.into(),
    }
}

/// Decodes the driver's result line from `stdout`.
///
/// `expectedOutput` and `passed` are recomputed from `test_cases`.
pub fn parse_results(
    stdout: &str,
    test_cases: &[TestCase],
) -> Result<Vec<ExecutionResult>, JudgeError> {
    let mut lines = stdout.lines().filter_map(|line| line.strip_prefix(RESULT_PREFIX));

    let payload = lines
        .next()
        .ok_or_else(|| parse_error("no JUDGE_RESULT line in program output"))?;
    if lines.next().is_some() {
        return Err(parse_error("more than one JUDGE_RESULT line in program output"));
    }

    let mut results: Vec<ExecutionResult> = serde_json::from_str(payload.trim_end())
        .map_err(|err| parse_error(format!("malformed result payload: {}", err)))?;

    if results.len() != test_cases.len() {
        return Err(parse_error(format!(
            "expected {} results, found {}",
            test_cases.len(),
            results.len()
        )));
    }

    for (i, (result, case)) in results.iter_mut().zip(test_cases).enumerate() {
        if result.test_case_index != i {
            return Err(parse_error(format!(
                "result {} reports test case index {}",
                i, result.test_case_index
            )));
        }
        result.expected_output = case.expected_output.clone();
        result.passed = result.error.is_none()
            && outputs_match(&result.actual_output, &case.expected_output);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical("[0, 1]"), "[0,1]");
        assert_eq!(canonical(" true \n"), "true");
        assert_eq!(canonical("abc"), "\"abc\"");
        assert_eq!(canonical("\"abc\""), "\"abc\"");
        assert_eq!(canonical("6.0"), "6");
        assert_eq!(canonical("[1.0, 2.5]"), "[1,2.5]");
        assert_eq!(canonical("{\"b\": 1, \"a\": 2}"), "{\"a\":2,\"b\":1}");
    }

    #[test]
    fn outputs_compare_on_normal_form() {
        assert!(outputs_match("[0,1]", "[0, 1]"));
        assert!(outputs_match("abc", "\"abc\""));
        assert!(!outputs_match("[1,0]", "[0,1]"));
        assert!(!outputs_match("1", "\"1\""));
    }

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n).map(|i| TestCase::new(i.to_string(), "[0, 1]")).collect()
    }

    #[test]
    fn recomputes_passed_and_expected() {
        let stdout = concat!(
            "user noise without newline\n",
            r#"JUDGE_RESULT:[{"testCaseIndex":0,"passed":false,"actualOutput":"[0,1]","expectedOutput":"x","executionTimeMs":0.1},"#,
            r#"{"testCaseIndex":1,"passed":true,"actualOutput":"[1,0]","expectedOutput":"x","executionTimeMs":0.2}]"#,
            "\n"
        );
        let results = parse_results(stdout, &cases(2)).unwrap();
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].expected_output, "[0, 1]");
    }

    #[test]
    fn error_entries_never_pass() {
        let stdout = r#"JUDGE_RESULT:[{"testCaseIndex":0,"passed":true,"actualOutput":"[0,1]","expectedOutput":"","error":"boom","executionTimeMs":0}]"#;
        let results = parse_results(stdout, &cases(1)).unwrap();
        assert!(!results[0].passed);
        assert_eq!(results[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn rejects_bad_output() {
        let kind = |stdout: &str, n: usize| parse_results(stdout, &cases(n)).map_err(|e| e.kind());

        assert_eq!(kind("hello\n", 1), Err(ErrorKind::ParseError));
        assert_eq!(kind("JUDGE_RESULT:[]\nJUDGE_RESULT:[]\n", 0), Err(ErrorKind::ParseError));
        assert_eq!(kind("JUDGE_RESULT:[{", 1), Err(ErrorKind::ParseError));
        assert_eq!(kind("JUDGE_RESULT:[]", 1), Err(ErrorKind::ParseError));

        let shuffled = r#"JUDGE_RESULT:[{"testCaseIndex":1,"passed":true,"actualOutput":"1","expectedOutput":"1"}]"#;
        assert_eq!(kind(shuffled, 1), Err(ErrorKind::ParseError));

        assert!(kind("JUDGE_RESULT:[]", 0).is_ok());
    }
}
