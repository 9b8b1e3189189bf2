use super::{candidates_json, ENTRY_POINT_NOT_FOUND, RESULT_PREFIX};
use crate::signature::EntryPoint;

use serde_json::Value;

const DRIVER: &str = r#"

;(function __judgeMain() {
  const cases = @CASES@;
  const candidates = @CANDIDATES@;
  const lookup = {
@LOOKUP@
  };

  function resolve(name) {
    const fn = lookup[name]();
    if (typeof fn === "function") {
      return fn;
    }
    if (typeof Solution === "function" && typeof Solution.prototype[name] === "function") {
      const instance = new Solution();
      return instance[name].bind(instance);
    }
    return undefined;
  }

  function describe(err) {
    if (err instanceof Error) {
      return "Error: " + err.name + ": " + err.message;
    }
    return "Error: " + typeof err + ": " + String(err);
  }

  const stdoutWrite = process.stdout.write.bind(process.stdout);
  const consoleLog = console.log;
  const consoleInfo = console.info;
  function silence() {
    process.stdout.write = () => true;
    console.log = () => {};
    console.info = () => {};
  }
  function restore() {
    process.stdout.write = stdoutWrite;
    console.log = consoleLog;
    console.info = consoleInfo;
  }

  const results = [];
  for (const c of cases) {
    const entry = {
      testCaseIndex: c.index,
      passed: false,
      actualOutput: "",
      expectedOutput: c.expected,
      executionTimeMs: 0,
    };
    results.push(entry);

    if (c.inputError !== null) {
      entry.actualOutput = c.inputError;
      entry.error = c.inputError;
      continue;
    }

    let fn;
    for (const [name, arity] of candidates) {
      if (arity === c.args.length) {
        fn = resolve(name);
        if (fn !== undefined) {
          break;
        }
      }
    }
    if (fn === undefined) {
      entry.actualOutput = @NOT_FOUND@;
      continue;
    }

    const start = process.hrtime.bigint();
    silence();
    try {
      const value = fn(...c.args);
      const text = JSON.stringify(value);
      entry.actualOutput = text === undefined ? "null" : text;
    } catch (err) {
      entry.actualOutput = describe(err);
      entry.error = entry.actualOutput;
    } finally {
      restore();
    }
    entry.executionTimeMs = Number(process.hrtime.bigint() - start) / 1e6;
    entry.passed = entry.error === undefined && entry.actualOutput === c.expectedNormalized;
  }

  stdoutWrite("\n" + @PREFIX@ + JSON.stringify(results) + "\n");
  // pending timers or sockets opened by the submission must not keep node alive
  process.exit(0);
})();
"#;

fn js_str(s: &str) -> String {
    Value::from(s).to_string()
}

/// One `typeof`-guarded getter per candidate; undeclared names read as `undefined`.
fn lookup_table(candidates: &[EntryPoint]) -> String {
    let mut out = String::new();
    for ep in candidates {
        out.push_str(&format!(
            "    {name}: () => (typeof {name} === \"function\" ? {name} : undefined),\n",
            name = ep.name
        ));
    }
    out.trim_end_matches('\n').to_owned()
}

/// `cases_json` is the serialized list of prepared cases.
pub fn render(code: &str, candidates: &[EntryPoint], cases_json: &str) -> String {
    let driver = DRIVER
        .replace("@NOT_FOUND@", &js_str(ENTRY_POINT_NOT_FOUND))
        .replace("@PREFIX@", &js_str(RESULT_PREFIX))
        .replace("@LOOKUP@", &lookup_table(candidates))
        .replace("@CANDIDATES@", &candidates_json(candidates))
        .replace("@CASES@", cases_json);

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
    use crate::signature::{ParamKind, Signature};

    #[test]
    fn lookup_per_candidate() {
        let sig = Signature::declared(EntryPoint::new("rotate", &[ParamKind::IntMatrix]));
        let table = lookup_table(&sig.candidates);
        assert_eq!(
            table,
            "    rotate: () => (typeof rotate === \"function\" ? rotate : undefined),"
        );
    }

    #[test]
    fn cases_embedded_as_literal() {
        let sig = Signature::legacy();
        let cases = prepare_cases(&sig, &[TestCase::new("[2,7,11,15], 9", "[0,1]")]);
        let src = render(
            "var twoSum = (a, t) => [0, 1];",
            &sig.candidates,
            &encode_cases(&cases).unwrap(),
        );

        assert!(src.starts_with("var twoSum"));
        assert!(src.contains(r#"const cases = [{"index":0,"args":[[2,7,11,15],9],"#));
        assert!(src.contains(r#"const candidates = [["twoSum",2],"#));
        assert!(src.contains(r#"entry.actualOutput = "ENTRY_POINT_NOT_FOUND";"#));
    }

    #[test]
    fn exits_after_reporting() {
        let sig = Signature::legacy();
        let src = render("", &sig.candidates, "[]");

        let report = src.find("JSON.stringify(results)").unwrap();
        let exit = src.find("process.exit(0);").unwrap();
        assert!(report < exit);
        assert!(src.trim_end().ends_with("})();"));
    }
}
