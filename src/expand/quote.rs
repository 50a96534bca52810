//! Shell quoting and escape rendering for the `${x@Q}`-style transforms and
//! `declare -p` output.

use crate::interp::state::Value;

/// Quote a value so the shell would read it back verbatim (`${x@Q}`).
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if !value.chars().any(needs_quoting) {
        return value.to_string();
    }
    if value.chars().any(|c| (c as u32) < 0x20 || c == '\x7f') {
        // Control characters use $'...' form.
        let mut out = String::from("$'");
        for c in value.chars() {
            match c {
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\x07' => out.push_str("\\a"),
                '\x08' => out.push_str("\\b"),
                '\x0c' => out.push_str("\\f"),
                '\x0b' => out.push_str("\\v"),
                '\x1b' => out.push_str("\\E"),
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                c if (c as u32) < 0x20 || c == '\x7f' => {
                    out.push_str(&format!("\\{:03o}", c as u32))
                }
                c => out.push(c),
            }
        }
        out.push('\'');
        return out;
    }
    // Single quotes, with embedded quotes spliced out.
    let mut out = String::from("'");
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

fn needs_quoting(c: char) -> bool {
    !(c.is_ascii_alphanumeric()
        || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | '%' | '@' | ',' | '^'))
}

/// Expand backslash escapes (`${x@E}`), following `$'...'` rules.
pub fn expand_escapes(value: &str) -> String {
    crate::parser::word::decode_ansi_c(value)
}

/// Render an array value the way `declare -p` spells it.
pub fn render_array(value: &Value) -> String {
    match value {
        Value::Scalar(s) => shell_quote(s),
        Value::Indexed(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(i, v)| format!("[{}]={}", i, quote_for_assignment(v)))
                .collect();
            format!("({})", items.join(" "))
        }
        Value::Assoc(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]={}", shell_quote(k), quote_for_assignment(v)))
                .collect();
            format!("({})", items.join(" "))
        }
    }
}

/// `declare -p` quotes values with double quotes.
pub fn quote_for_assignment(value: &str) -> String {
    let mut out = String::from("\"");
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(shell_quote("abc"), "abc");
        assert_eq!(shell_quote("a/b.c"), "a/b.c");
    }

    #[test]
    fn spaces_get_single_quotes() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn embedded_single_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn control_chars_use_dollar_quoting() {
        assert_eq!(shell_quote("a\nb"), "$'a\\nb'");
    }

    #[test]
    fn assignment_quoting() {
        assert_eq!(quote_for_assignment("a\"b$c"), "\"a\\\"b\\$c\"");
    }

    #[test]
    fn array_rendering() {
        let v = Value::indexed_from(vec!["x".into(), "y z".into()]);
        assert_eq!(render_array(&v), "([0]=\"x\" [1]=\"y z\")");
    }
}
