use super::{candidates_json, ENTRY_POINT_NOT_FOUND, RESULT_PREFIX};
use crate::signature::EntryPoint;

use serde_json::Value;

const DRIVER: &str = r#"

def __judge_main():
    import contextlib
    import io
    import json
    import sys
    import time

    cases = json.loads(@CASES@)
    candidates = json.loads(@CANDIDATES@)
    scope = globals()

    def resolve(name):
        fn = scope.get(name)
        if callable(fn) and not isinstance(fn, type):
            return fn
        cls = scope.get("Solution")
        if isinstance(cls, type) and callable(getattr(cls, name, None)):
            return getattr(cls(), name)
        return None

    def dump(value):
        return json.dumps(value, separators=(",", ":"), ensure_ascii=False)

    results = []
    for case in cases:
        entry = {
            "testCaseIndex": case["index"],
            "passed": False,
            "actualOutput": "",
            "expectedOutput": case["expected"],
            "executionTimeMs": 0.0,
        }
        results.append(entry)

        if case["inputError"] is not None:
            entry["actualOutput"] = case["inputError"]
            entry["error"] = case["inputError"]
            continue

        args = case["args"]
        fn = None
        for name, arity in candidates:
            if arity == len(args):
                fn = resolve(name)
                if fn is not None:
                    break
        if fn is None:
            entry["actualOutput"] = @NOT_FOUND@
            continue

        sink = io.StringIO()
        start = time.perf_counter()
        try:
            with contextlib.redirect_stdout(sink):
                value = fn(*args)
            entry["actualOutput"] = dump(value)
        except Exception as exc:
            message = "Error: %s: %s" % (type(exc).__name__, exc)
            entry["actualOutput"] = message
            entry["error"] = message
        entry["executionTimeMs"] = (time.perf_counter() - start) * 1000.0
        entry["passed"] = "error" not in entry and entry["actualOutput"] == case["expectedNormalized"]

    sys.stdout.write("\n" + @PREFIX@ + json.dumps(results, separators=(",", ":")) + "\n")
    sys.stdout.flush()


__judge_main()
"#;

/// A JSON string literal is also a valid Python string literal.
fn py_str(s: &str) -> String {
    Value::from(s).to_string()
}

/// `cases_json` is the serialized list of prepared cases.
pub fn render(code: &str, candidates: &[EntryPoint], cases_json: &str) -> String {
    let driver = DRIVER
        .replace("@NOT_FOUND@", &py_str(ENTRY_POINT_NOT_FOUND))
        .replace("@PREFIX@", &py_str(RESULT_PREFIX))
        .replace("@CANDIDATES@", &py_str(&candidates_json(candidates)))
        .replace("@CASES@", &py_str(cases_json));

    let mut src = String::with_capacity(code.len() + driver.len() + 1);
    src.push_str(code);
    if !code.ends_with('\n') {
        src.push('\n');
    }
    src.push_str(&driver);
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::harness::{encode_cases, prepare_cases};
    use crate::model::TestCase;
    use crate::signature::Signature;

    #[test]
    fn user_code_comes_first() {
        let sig = Signature::legacy();
        let cases = prepare_cases(&sig, &[TestCase::new("5", "8")]);
        let code = "from __future__ import annotations\ndef climbStairs(n): return n";
        let src = render(code, &sig.candidates, &encode_cases(&cases).unwrap());

        assert!(src.starts_with("from __future__ import annotations\n"));
        assert!(src.trim_end().ends_with("__judge_main()"));
        assert!(!src.contains('@'));
    }

    #[test]
    fn embedded_payload_is_a_string_literal() {
        let sig = Signature::legacy();
        let cases = prepare_cases(&sig, &[TestCase::new("\"a\\\"b\"", "true")]);
        let src = render("", &sig.candidates, &encode_cases(&cases).unwrap());

        let line = src
            .lines()
            .find(|l| l.trim_start().starts_with("cases = json.loads("))
            .unwrap();
        let literal = line
            .trim()
            .trim_start_matches("cases = json.loads(")
            .trim_end_matches(')');
        let payload: String = serde_json::from_str(literal).unwrap();
        let decoded: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded[0]["args"][0], "a\"b");
        assert_eq!(decoded[0]["expectedNormalized"], "true");
    }
}
