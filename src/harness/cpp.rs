use super::{PreparedCase, ENTRY_POINT_NOT_FOUND, RESULT_PREFIX};
use crate::input::InputError;
use crate::signature::{EntryPoint, ParamKind};

use std::convert::TryFrom;
use std::fmt::Write as _;

use serde_json::Value;

const PRELUDE: &str = r#"#include <algorithm>
#include <array>
#include <bitset>
#include <chrono>
#include <climits>
#include <cmath>
#include <cstdint>
#include <cstdio>
#include <cstdlib>
#include <cstring>
#include <cxxabi.h>
#include <deque>
#include <exception>
#include <functional>
#include <iomanip>
#include <iostream>
#include <iterator>
#include <limits>
#include <list>
#include <map>
#include <numeric>
#include <optional>
#include <queue>
#include <set>
#include <sstream>
#include <stack>
#include <string>
#include <string_view>
#include <tuple>
#include <type_traits>
#include <typeinfo>
#include <unordered_map>
#include <unordered_set>
#include <utility>
#include <vector>

using namespace std;

struct Solution;

"#;

const SUPPORT: &str = r#"

namespace judge_harness {

struct Missing {};

template <class T, class = void>
struct Complete : std::false_type {};
template <class T>
struct Complete<T, std::void_t<decltype(sizeof(T))>> : std::true_type {};

inline std::string quote(const std::string& s) {
    std::string out = "\"";
    for (unsigned char c : s) {
        switch (c) {
        case '"': out += "\\\""; break;
        case '\\': out += "\\\\"; break;
        case '\n': out += "\\n"; break;
        case '\r': out += "\\r"; break;
        case '\t': out += "\\t"; break;
        default:
            if (c < 0x20) {
                char buf[8];
                std::snprintf(buf, sizeof buf, "\\u%04x", static_cast<unsigned>(c));
                out += buf;
            } else {
                out += static_cast<char>(c);
            }
        }
    }
    out += "\"";
    return out;
}

inline std::string to_json(bool v) { return v ? "true" : "false"; }
inline std::string to_json(char c) { return quote(std::string(1, c)); }
inline std::string to_json(const std::string& s) { return quote(s); }
inline std::string to_json(std::string_view s) { return quote(std::string(s)); }
inline std::string to_json(const char* s) { return quote(s ? std::string(s) : std::string()); }

inline std::string to_json(double v) {
    if (!std::isfinite(v)) return "null";
    std::ostringstream os;
    os << std::setprecision(15) << v;
    return os.str();
}

template <class T, typename std::enable_if<std::is_integral<T>::value, int>::type = 0>
std::string to_json(T v) {
    return std::to_string(v);
}

template <class T>
std::string to_json(const std::vector<T>& v);
template <class A, class B>
std::string to_json(const std::pair<A, B>& p);

template <class T>
std::string to_json(const std::vector<T>& v) {
    std::string out = "[";
    for (std::size_t i = 0; i < v.size(); ++i) {
        if (i) out += ",";
        out += to_json(v[i]);
    }
    return out + "]";
}

template <class A, class B>
std::string to_json(const std::pair<A, B>& p) {
    return "[" + to_json(p.first) + "," + to_json(p.second) + "]";
}

inline std::string type_name(const std::type_info& t) {
    int status = 0;
    char* name = abi::__cxa_demangle(t.name(), nullptr, nullptr, &status);
    std::string out = (status == 0 && name) ? name : t.name();
    std::free(name);
    return out;
}

struct Outcome {
    std::size_t index = 0;
    bool passed = false;
    std::string actual;
    std::string expected;
    bool failed = false;
    std::string error;
    double ms = 0.0;

    void fail(const std::string& text) {
        failed = true;
        actual = text;
        error = text;
    }
};

struct Silence {
    std::ostringstream sink;
    std::streambuf* saved;
    Silence() : saved(std::cout.rdbuf(sink.rdbuf())) {}
    ~Silence() { std::cout.rdbuf(saved); }
};

inline std::string encode(const std::vector<Outcome>& outcomes) {
    std::string out = "[";
    for (std::size_t i = 0; i < outcomes.size(); ++i) {
        const Outcome& o = outcomes[i];
        if (i) out += ",";
        out += "{\"testCaseIndex\":" + std::to_string(o.index);
        out += ",\"passed\":" + to_json(o.passed);
        out += ",\"actualOutput\":" + quote(o.actual);
        out += ",\"expectedOutput\":" + quote(o.expected);
        if (o.failed) out += ",\"error\":" + quote(o.error);
        out += ",\"executionTimeMs\":" + to_json(o.ms);
        out += "}";
    }
    return out + "]";
}

}  // namespace judge_harness
"#;

/// A probe per candidate: the variadic fallback loses overload resolution to any
/// user function callable with the arguments, and its return type marks a miss.
/// Without a free function the same name is looked up as a method of a
/// default-constructible `Solution`, when the submission defines one.
fn probe(ep: &EntryPoint) -> String {
    format!(
        r#"
judge_harness::Missing {name}(...);

template <class S, class... A>
auto judge_method_{name}(int, S& s, A&... a) -> decltype(s.{name}(a...)) {{
    return s.{name}(a...);
}}

template <class S, class... A>
judge_harness::Missing judge_method_{name}(long, S&, A&...) {{
    return {{}};
}}

template <class S, class... A>
std::optional<std::string> judge_try_method_{name}(A&... a) {{
    if constexpr (!judge_harness::Complete<S>::value) {{
        return std::nullopt;
    }} else if constexpr (!std::is_default_constructible<S>::value) {{
        return std::nullopt;
    }} else {{
        S s;
        using R = decltype(judge_method_{name}(0, s, a...));
        if constexpr (std::is_same<R, judge_harness::Missing>::value) {{
            return std::nullopt;
        }} else if constexpr (std::is_void<R>::value) {{
            judge_method_{name}(0, s, a...);
            return std::string("null");
        }} else {{
            return judge_harness::to_json(judge_method_{name}(0, s, a...));
        }}
    }}
}}

template <class... A>
std::optional<std::string> judge_try_{name}(A&... a) {{
    using R = decltype({name}(a...));
    if constexpr (std::is_same<R, judge_harness::Missing>::value) {{
        return judge_try_method_{name}<Solution>(a...);
    }} else if constexpr (std::is_void<R>::value) {{
        {name}(a...);
        return std::string("null");
    }} else {{
        return judge_harness::to_json({name}(a...));
    }}
}}
"#,
        name = ep.name
    )
}

/// A `std::string` expression holding exactly the bytes of `s`, NULs included.
fn string_literal(s: &str) -> String {
    let mut out = String::from("std::string(\"");
    for &b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    let _ = write!(out, "\", {})", s.len());
    out
}

fn int_literal(n: i64, wide: bool) -> String {
    if !wide {
        n.to_string()
    } else if n == i64::MIN {
        "(-9223372036854775807LL - 1)".to_owned()
    } else {
        format!("{}LL", n)
    }
}

fn fits_int(n: i64) -> bool {
    i32::try_from(n).is_ok()
}

fn ints(value: &Value) -> Option<Vec<i64>> {
    value.as_array()?.iter().map(Value::as_i64).collect()
}

fn float_literal(x: f64) -> String {
    // Debug keeps a decimal point or exponent, so the literal stays a double
    format!("{:?}", x)
}

/// `<type> <name> = <initializer>;` for one argument.
fn declare(name: &str, kind: ParamKind, value: &Value) -> Option<String> {
    let (ty, init) = match kind {
        ParamKind::Int => {
            let n = value.as_i64()?;
            let wide = !fits_int(n);
            let ty = if wide { "long long" } else { "int" };
            (ty.to_owned(), int_literal(n, wide))
        }
        ParamKind::Float => ("double".to_owned(), float_literal(value.as_f64()?)),
        ParamKind::Bool => ("bool".to_owned(), value.as_bool()?.to_string()),
        ParamKind::String => ("std::string".to_owned(), string_literal(value.as_str()?)),
        ParamKind::IntArray => {
            let items = ints(value)?;
            let wide = !items.iter().all(|&n| fits_int(n));
            let elem = if wide { "long long" } else { "int" };
            let body: Vec<String> = items.iter().map(|&n| int_literal(n, wide)).collect();
            (format!("std::vector<{}>", elem), format!("{{{}}}", body.join(", ")))
        }
        ParamKind::StringArray => {
            let items: Option<Vec<String>> = value
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(string_literal))
                .collect();
            (
                "std::vector<std::string>".to_owned(),
                format!("{{{}}}", items?.join(", ")),
            )
        }
        ParamKind::IntMatrix => {
            let rows: Option<Vec<Vec<i64>>> = value.as_array()?.iter().map(ints).collect();
            let rows = rows?;
            let wide = !rows.iter().flatten().all(|&n| fits_int(n));
            let elem = if wide { "long long" } else { "int" };
            let body: Vec<String> = rows
                .iter()
                .map(|row| {
                    let cells: Vec<String> = row.iter().map(|&n| int_literal(n, wide)).collect();
                    format!("{{{}}}", cells.join(", "))
                })
                .collect();
            (
                format!("std::vector<std::vector<{}>>", elem),
                format!("{{{}}}", body.join(", ")),
            )
        }
    };
    Some(format!("{} {} = {};", ty, name, init))
}

fn declarations(case: &PreparedCase) -> Result<Vec<String>, InputError> {
    let args = match case.args {
        Some(ref args) => args,
        None => return Ok(Vec::new()),
    };
    args.iter()
        .zip(&case.kinds)
        .enumerate()
        .map(|(index, (value, &kind))| {
            declare(&format!("a{}", index), kind, value).ok_or_else(|| InputError::Unsupported {
                index,
                text: value.to_string(),
            })
        })
        .collect()
}

fn render_case(out: &mut String, case: &PreparedCase, decls: &[String], candidates: &[EntryPoint]) {
    let _ = writeln!(out, "    {{");
    let _ = writeln!(out, "        judge_harness::Outcome o;");
    let _ = writeln!(out, "        o.index = {};", case.index);
    let _ = writeln!(out, "        o.expected = {};", string_literal(&case.expected));

    if let Some(ref err) = case.input_error {
        let _ = writeln!(out, "        o.fail({});", string_literal(err));
        let _ = writeln!(out, "        outcomes.push_back(o);");
        let _ = writeln!(out, "    }}");
        return;
    }

    let _ = writeln!(
        out,
        "        const std::string normalized = {};",
        string_literal(&case.expected_normalized)
    );
    let _ = writeln!(out, "        auto start = std::chrono::steady_clock::now();");
    let _ = writeln!(out, "        try {{");
    for decl in decls {
        let _ = writeln!(out, "            {}", decl);
    }
    let _ = writeln!(out, "            std::optional<std::string> found;");
    let _ = writeln!(out, "            {{");
    let _ = writeln!(out, "                judge_harness::Silence silence;");

    let call_args: Vec<String> = (0..decls.len()).map(|i| format!("a{}", i)).collect();
    for ep in candidates.iter().filter(|ep| ep.arity() == decls.len()) {
        let _ = writeln!(
            out,
            "                if (!found) found = judge_try_{}({});",
            ep.name,
            call_args.join(", ")
        );
    }

    let _ = writeln!(out, "            }}");
    let _ = writeln!(
        out,
        "            o.actual = found ? *found : std::string({});",
        string_literal(ENTRY_POINT_NOT_FOUND)
    );
    let _ = writeln!(out, "        }} catch (const std::exception& e) {{");
    let _ = writeln!(
        out,
        "            o.fail(\"Error: \" + judge_harness::type_name(typeid(e)) + \": \" + e.what());"
    );
    let _ = writeln!(out, "        }} catch (...) {{");
    let _ = writeln!(out, "            o.fail(\"Error: unknown: non-standard exception\");");
    let _ = writeln!(out, "        }}");
    let _ = writeln!(
        out,
        "        o.ms = std::chrono::duration<double, std::milli>(std::chrono::steady_clock::now() - start).count();"
    );
    let _ = writeln!(out, "        o.passed = !o.failed && o.actual == normalized;");
    let _ = writeln!(out, "        outcomes.push_back(o);");
    let _ = writeln!(out, "    }}");
}

/// Arguments the driver cannot type statically turn into per-case input errors.
pub fn render(code: &str, candidates: &[EntryPoint], cases: &mut [PreparedCase]) -> String {
    let mut src = String::from(PRELUDE);
    src.push_str(code);
    if !code.ends_with('\n') {
        src.push('\n');
    }
    src.push_str(SUPPORT);

    for ep in candidates {
        src.push_str(&probe(ep));
    }

    src.push_str("\nint main() {\n");
    src.push_str("    std::vector<judge_harness::Outcome> outcomes;\n");

    for case in cases.iter_mut() {
        let decls = match declarations(case) {
            Ok(decls) => decls,
            Err(err) => {
                case.reject(&err);
                Vec::new()
            }
        };
        render_case(&mut src, case, &decls, candidates);
    }

    let _ = writeln!(src, "    std::cout << std::flush;");
    let _ = writeln!(src, "    std::fflush(stdout);");
    let _ = writeln!(
        src,
        "    std::cout << \"\\n\" << {} << judge_harness::encode(outcomes) << std::endl;",
        string_literal(RESULT_PREFIX)
    );
    src.push_str("    return 0;\n}\n");
    src
}
