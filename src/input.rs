//! Turning raw test input text into argument values.
//!
//! Two grammars exist. [`sniff`] guesses the shape of inputs written for the fixed
//! legacy entry points. [`parse_with_schema`] reads one comma separated value per
//! declared parameter, each optionally prefixed with `name =`.

use crate::signature::ParamKind;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unbalanced brackets or quotes")]
    Unbalanced,

    #[error("unterminated string literal")]
    Unterminated,

    #[error("`{0}` is not an integer")]
    NotInteger(String),

    #[error("invalid array literal `{text}`: {reason}")]
    BadArray { text: String, reason: String },

    #[error("expected {expected} arguments, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("argument {index} is not a valid {kind:?}: `{text}`")]
    Kind {
        index: usize,
        kind: ParamKind,
        text: String,
    },

    #[error("argument {index} has an unsupported shape: `{text}`")]
    Unsupported { index: usize, text: String },
}

/// Strips a leading `name =` from one argument.
fn strip_name(piece: &str) -> &str {
    let piece = piece.trim();
    let bytes = piece.as_bytes();

    let mut end = 0;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if end == 0 || bytes[0].is_ascii_digit() {
        return piece;
    }

    match piece[end..].trim_start().strip_prefix('=') {
        Some(value) if !value.starts_with('=') => value.trim(),
        _ => piece,
    }
}

/// Byte offset of the `]` closing the `[` at `open`.
fn matching_bracket(s: &str, open: usize) -> Result<usize, InputError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + i);
                }
            }
            _ => {}
        }
    }
    Err(InputError::Unbalanced)
}

/// Splits on commas that are outside brackets, braces and string literals.
fn split_top_level(s: &str) -> Result<Vec<&str>, InputError> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.checked_sub(1).ok_or(InputError::Unbalanced)?,
            ',' if depth == 0 => {
                pieces.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_string {
        return Err(InputError::Unterminated);
    }
    if depth != 0 {
        return Err(InputError::Unbalanced);
    }
    pieces.push(&s[start..]);
    Ok(pieces)
}

fn parse_int(text: &str) -> Result<Value, InputError> {
    text.parse::<i64>()
        .map(Value::from)
        .map_err(|_| InputError::NotInteger(text.to_owned()))
}

/// Guesses the arguments of a legacy input.
///
/// * an array literal, optionally followed by a scalar target: `[2,7,11,15], 9`
/// * a quoted string: `"()[]{}"`
/// * a bare integer: `n = 5`
///
/// Any `name =` prefixes are ignored.
pub fn sniff(raw: &str) -> Result<Vec<Value>, InputError> {
    let s = raw.trim();

    if let (Some(open), true) = (s.find('['), s.contains(',')) {
        let close = matching_bracket(s, open)?;
        let text = &s[open..=close];
        let array: Value = serde_json::from_str(text).map_err(|err| InputError::BadArray {
            text: text.to_owned(),
            reason: err.to_string(),
        })?;

        let mut args = vec![array];

        let rest = s[close + 1..].trim();
        if let Some(target) = rest.rsplit(',').next() {
            let target = strip_name(target);
            if !target.is_empty() {
                let value = match parse_int(target) {
                    Ok(n) => n,
                    Err(err) => serde_json::from_str::<Value>(target)
                        .ok()
                        .filter(|v| !v.is_array() && !v.is_object())
                        .ok_or(err)?,
                };
                args.push(value);
            }
        }
        return Ok(args);
    }

    if let Some(first) = s.find('"') {
        let last = s.rfind('"').unwrap_or(first);
        if last == first {
            return Err(InputError::Unterminated);
        }
        let literal = &s[first..=last];
        let value = serde_json::from_str::<Value>(literal)
            .ok()
            .filter(Value::is_string)
            .unwrap_or_else(|| Value::String(s[first + 1..last].to_owned()));
        return Ok(vec![value]);
    }

    Ok(vec![parse_int(strip_name(s))?])
}

/// Reads exactly one value per parameter.
///
/// String parameters also take unquoted text.
pub fn parse_with_schema(raw: &str, params: &[ParamKind]) -> Result<Vec<Value>, InputError> {
    let s = raw.trim();

    let pieces = if s.is_empty() {
        Vec::new()
    } else {
        split_top_level(s)?
    };

    if pieces.len() != params.len() {
        return Err(InputError::Arity {
            expected: params.len(),
            found: pieces.len(),
        });
    }

    pieces
        .into_iter()
        .zip(params)
        .enumerate()
        .map(|(index, (piece, &kind))| {
            let text = strip_name(piece);
            let parsed = serde_json::from_str::<Value>(text).ok();
            let value = match (kind, parsed) {
                (_, Some(v)) if kind.accepts(&v) => v,
                (ParamKind::String, _) if !text.starts_with('"') => Value::String(text.to_owned()),
                _ => {
                    return Err(InputError::Kind {
                        index,
                        kind,
                        text: text.to_owned(),
                    })
                }
            };
            Ok(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn sniff_array_and_target() {
        assert_eq!(
            sniff("[2,7,11,15], 9").unwrap(),
            vec![json!([2, 7, 11, 15]), json!(9)]
        );
        assert_eq!(
            sniff("nums = [3,2,4], target = 6").unwrap(),
            vec![json!([3, 2, 4]), json!(6)]
        );
    }

    #[test]
    fn sniff_array_alone() {
        assert_eq!(
            sniff("[-2,1,-3,4,-1,2,1,-5,4]").unwrap(),
            vec![json!([-2, 1, -3, 4, -1, 2, 1, -5, 4])]
        );
    }

    #[test]
    fn sniff_string() {
        assert_eq!(sniff("\"()[]{}\"").unwrap(), vec![json!("()[]{}")]);
        assert_eq!(sniff("s = \"(]\"").unwrap(), vec![json!("(]")]);
        assert_eq!(sniff("\"([)]").unwrap_err(), InputError::Unterminated);
    }

    #[test]
    fn sniff_integer() {
        assert_eq!(sniff("5").unwrap(), vec![json!(5)]);
        assert_eq!(sniff("n = 3").unwrap(), vec![json!(3)]);
        assert_eq!(sniff("three").unwrap_err(), InputError::NotInteger("three".into()));
    }

    #[test]
    fn sniff_broken_array() {
        assert_eq!(sniff("[1,2, 3").unwrap_err(), InputError::Unbalanced);
        assert!(matches!(
            sniff("[1,,2], 3").unwrap_err(),
            InputError::BadArray { .. }
        ));
    }

    #[test]
    fn schema_values() {
        use ParamKind::*;

        let args = parse_with_schema(
            "grid = [[1,0],[0,1]], words = [\"a,b\", \"c\"], k = 2, ratio = 0.5, strict = true",
            &[IntMatrix, StringArray, Int, Float, Bool],
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                json!([[1, 0], [0, 1]]),
                json!(["a,b", "c"]),
                json!(2),
                json!(0.5),
                json!(true)
            ]
        );
    }

    #[test]
    fn schema_bare_string() {
        assert_eq!(
            parse_with_schema("s = hello world", &[ParamKind::String]).unwrap(),
            vec![json!("hello world")]
        );
        assert_eq!(
            parse_with_schema("\"quoted\"", &[ParamKind::String]).unwrap(),
            vec![json!("quoted")]
        );
    }

    #[test]
    fn schema_mismatches() {
        assert_eq!(
            parse_with_schema("1, 2", &[ParamKind::Int]).unwrap_err(),
            InputError::Arity {
                expected: 1,
                found: 2
            }
        );
        assert_eq!(
            parse_with_schema("", &[ParamKind::Int]).unwrap_err(),
            InputError::Arity {
                expected: 1,
                found: 0
            }
        );
        assert!(matches!(
            parse_with_schema("[1, \"x\"]", &[ParamKind::IntArray]).unwrap_err(),
            InputError::Kind { index: 0, .. }
        ));
        assert_eq!(parse_with_schema("", &[]).unwrap(), Vec::<Value>::new());
    }
}
