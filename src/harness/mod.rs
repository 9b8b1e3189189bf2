//! Generated driver programs.
//!
//! A harness is the user's code followed by a driver that calls the entry point once
//! per test case and prints a single `JUDGE_RESULT:` line. Inputs are parsed here,
//! so every driver receives plain JSON arguments.

mod cpp;
mod javascript;
mod python;

use crate::error::JudgeError;
use crate::input::InputError;
use crate::lang::Language;
use crate::model::TestCase;
use crate::parse::canonical;
use crate::signature::{EntryPoint, ParamKind, Signature};

use serde::Serialize;
use serde_json::Value;

pub const RESULT_PREFIX: &str = "JUDGE_RESULT:";

pub const ENTRY_POINT_NOT_FOUND: &str = "ENTRY_POINT_NOT_FOUND";

pub fn input_error_text(err: &InputError) -> String {
    format!("Error: could not parse input: {}", err)
}

/// One test case as the driver sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCase {
    pub index: usize,
    pub args: Option<Vec<Value>>,
    #[serde(skip)]
    pub kinds: Vec<ParamKind>,
    pub input_error: Option<String>,
    pub expected: String,
    pub expected_normalized: String,
}

impl PreparedCase {
    fn new(index: usize, signature: &Signature, case: &TestCase) -> Self {
        let parsed = signature.parse_input(&case.input).and_then(|args| {
            let kinds = signature.kinds_for(&args)?;
            Ok((args, kinds))
        });

        let (args, kinds, input_error) = match parsed {
            Ok((args, kinds)) => (Some(args), kinds, None),
            Err(err) => (None, Vec::new(), Some(input_error_text(&err))),
        };

        Self {
            index,
            args,
            kinds,
            input_error,
            expected: case.expected_output.clone(),
            expected_normalized: canonical(&case.expected_output),
        }
    }

    pub(crate) fn reject(&mut self, err: &InputError) {
        self.args = None;
        self.kinds.clear();
        self.input_error = Some(input_error_text(err));
    }
}

pub fn prepare_cases(signature: &Signature, test_cases: &[TestCase]) -> Vec<PreparedCase> {
    test_cases
        .iter()
        .enumerate()
        .map(|(index, case)| PreparedCase::new(index, signature, case))
        .collect()
}

fn candidates_json(candidates: &[EntryPoint]) -> String {
    let pairs: Vec<(&str, usize)> = candidates
        .iter()
        .map(|ep| (ep.name.as_str(), ep.arity()))
        .collect();
    serde_json::json!(pairs).to_string()
}

pub fn encode_cases(cases: &[PreparedCase]) -> Result<String, JudgeError> {
    serde_json::to_string(cases)
        .map_err(|err| JudgeError::Internal(format!("failed to encode test cases: {}", err)))
}

/// Builds the complete source for `language`.
pub fn generate(
    language: Language,
    signature: &Signature,
    test_cases: &[TestCase],
    code: &str,
) -> Result<String, JudgeError> {
    for ep in &signature.candidates {
        ep.validate().map_err(JudgeError::Internal)?;
    }

    let mut cases = prepare_cases(signature, test_cases);

    match language {
        Language::Python => {
            let payload = encode_cases(&cases)?;
            Ok(python::render(code, &signature.candidates, &payload))
        }
        Language::JavaScript => {
            let payload = encode_cases(&cases)?;
            Ok(javascript::render(code, &signature.candidates, &payload))
        }
        Language::Cpp => Ok(cpp::render(code, &signature.candidates, &mut cases)),
        Language::Java => Err(JudgeError::NotImplemented(language)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn two_sum_cases() -> Vec<TestCase> {
        vec![
            TestCase::new("[2,7,11,15], 9", "[0, 1]"),
            TestCase::new("[1,,2], 3", "[]"),
        ]
    }

    #[test]
    fn prepared_payload() {
        let cases = prepare_cases(&Signature::legacy(), &two_sum_cases());

        assert_eq!(cases[0].args, Some(vec![json!([2, 7, 11, 15]), json!(9)]));
        assert_eq!(cases[0].kinds, vec![ParamKind::IntArray, ParamKind::Int]);
        assert_eq!(cases[0].expected, "[0, 1]");
        assert_eq!(cases[0].expected_normalized, "[0,1]");

        assert!(cases[1].args.is_none());
        let err = cases[1].input_error.as_deref().unwrap();
        assert!(err.starts_with("Error: could not parse input: invalid array literal"));

        let json = serde_json::to_value(&cases[1]).unwrap();
        assert_eq!(json["args"], Value::Null);
        assert!(json.get("kinds").is_none());
        assert_eq!(json["expectedNormalized"], "[]");
    }

    #[test]
    fn candidates_literal() {
        let sig = Signature::legacy();
        assert_eq!(
            candidates_json(&sig.candidates),
            r#"[["twoSum",2],["maxSubArray",1],["isValid",1],["climbStairs",1]]"#
        );
    }

    #[test]
    fn java_is_not_generated() {
        let err = generate(Language::Java, &Signature::legacy(), &two_sum_cases(), "")
            .unwrap_err();
        assert!(matches!(err, JudgeError::NotImplemented(Language::Java)));
    }

    #[test]
    fn invalid_declared_name() {
        let sig = Signature::declared(EntryPoint::new("drop table", &[ParamKind::Int]));
        let err = generate(Language::Python, &sig, &[TestCase::new("1", "1")], "").unwrap_err();
        assert!(matches!(err, JudgeError::Internal(_)));
    }

    #[test]
    fn every_harness_prints_the_sentinel() {
        let cases = two_sum_cases();
        for &lang in &[Language::Python, Language::JavaScript, Language::Cpp] {
            let src = generate(lang, &Signature::legacy(), &cases, "// user code\n").unwrap();
            assert!(src.contains(RESULT_PREFIX), "{}", lang);
            assert!(src.contains(ENTRY_POINT_NOT_FOUND), "{}", lang);
        }
    }
}
