use crate::input::{self, InputError};
use crate::model::Question;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The shape of one entry point parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    String,
    IntArray,
    StringArray,
    IntMatrix,
}

// serde_json keeps non-negative integers as u64; `is_i64` still holds when they fit
fn is_int(value: &Value) -> bool {
    value.is_i64()
}

fn all(value: &Value, f: impl Fn(&Value) -> bool) -> bool {
    value.as_array().map_or(false, |items| items.iter().all(f))
}

impl ParamKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::Int => is_int(value),
            ParamKind::Float => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::String => value.is_string(),
            ParamKind::IntArray => all(value, is_int),
            ParamKind::StringArray => all(value, Value::is_string),
            ParamKind::IntMatrix => all(value, |row| all(row, is_int)),
        }
    }

    /// The narrowest kind that accepts `value`.
    ///
    /// An empty array is taken as an integer array.
    pub fn infer(value: &Value) -> Option<Self> {
        [
            ParamKind::Int,
            ParamKind::Float,
            ParamKind::Bool,
            ParamKind::String,
            ParamKind::IntArray,
            ParamKind::StringArray,
            ParamKind::IntMatrix,
        ]
        .iter()
        .copied()
        .find(|kind| kind.accepts(value))
    }
}

/// A named function the harness may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub params: Vec<ParamKind>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, params: &[ParamKind]) -> Self {
        Self {
            name: name.into(),
            params: params.to_vec(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Names are spliced into generated source, so only plain identifiers pass.
    pub fn validate(&self) -> Result<(), String> {
        let mut chars = self.name.chars();
        let head_ok = chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid entry point name `{}`", self.name));
        }
        if self.name.starts_with("__judge") || self.name.starts_with("judge_harness") {
            return Err(format!("reserved entry point name `{}`", self.name));
        }
        Ok(())
    }
}

/// How raw test input strings become argument lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Guess the shape from the text, for questions without a declared signature.
    Heuristic,
    /// Split into one value per declared parameter.
    Schema,
}

/// The candidate entry points of a question, in resolution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub candidates: Vec<EntryPoint>,
    pub mode: InputMode,
}

static LEGACY_CANDIDATES: Lazy<Vec<EntryPoint>> = Lazy::new(|| {
    use ParamKind::*;
    vec![
        EntryPoint::new("twoSum", &[IntArray, Int]),
        EntryPoint::new("maxSubArray", &[IntArray]),
        EntryPoint::new("isValid", &[String]),
        EntryPoint::new("climbStairs", &[Int]),
    ]
});

impl Signature {
    /// The fixed candidate list used when a question declares nothing.
    pub fn legacy() -> Self {
        Self {
            candidates: LEGACY_CANDIDATES.clone(),
            mode: InputMode::Heuristic,
        }
    }

    pub fn declared(entry_point: EntryPoint) -> Self {
        Self {
            candidates: vec![entry_point],
            mode: InputMode::Schema,
        }
    }

    pub fn for_question(question: &Question) -> Self {
        match question.entry_point {
            Some(ref ep) => Self::declared(ep.clone()),
            None => Self::legacy(),
        }
    }

    pub fn parse_input(&self, raw: &str) -> Result<Vec<Value>, InputError> {
        match self.mode {
            InputMode::Heuristic => input::sniff(raw),
            InputMode::Schema => {
                let params = self.candidates.first().map_or(&[][..], |ep| &ep.params[..]);
                input::parse_with_schema(raw, params)
            }
        }
    }

    /// Kinds for each argument, used by harnesses that need static types.
    pub fn kinds_for(&self, args: &[Value]) -> Result<Vec<ParamKind>, InputError> {
        match self.mode {
            InputMode::Schema => Ok(self
                .candidates
                .first()
                .map(|ep| ep.params.clone())
                .unwrap_or_default()),
            InputMode::Heuristic => args
                .iter()
                .enumerate()
                .map(|(index, arg)| {
                    ParamKind::infer(arg).ok_or_else(|| InputError::Unsupported {
                        index,
                        text: arg.to_string(),
                    })
                })
                .collect(),
        }
    }
}
