//! Parameter expansion operators.
//!
//! Implements the `${...}` operator table: defaults, assignment defaults,
//! error-if-unset, alternatives, length, substrings, pattern removal and
//! replacement, case modification, transforms, indirection, array keys, and
//! name prefixes. Array-valued parameters (`$@`, `${a[@]}`) flow through as
//! field lists; string operators apply element-wise to them the way bash
//! does.

use crate::ast::{ArithExpr, ParamOp, ParameterPart, TransformKind, WordNode};
use crate::expand::pattern::{self, PatternOpts};
use crate::expand::quote;
use crate::expand::split;
use crate::expand::ParamValue;
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, Output};
use crate::interp::state::{ShellState, Value};
use crate::interp::vars;

/// The parameter's resolved value before an operator applies.
#[derive(Debug, Clone)]
enum Base {
    Unset,
    Str(String),
    Fields(Vec<String>),
}

impl Base {
    fn is_unset(&self) -> bool {
        matches!(self, Base::Unset)
    }

    fn is_empty(&self) -> bool {
        match self {
            Base::Unset => true,
            Base::Str(s) => s.is_empty(),
            Base::Fields(f) => f.is_empty() || (f.len() == 1 && f[0].is_empty()),
        }
    }
}

/// Which list-shaped parameter was referenced, for quoting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    None,
    At,
    Star,
}

impl Executor<'_> {
    pub(crate) fn expand_parameter(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        part: &ParameterPart,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        match &part.op {
            Some(ParamOp::BadSubstitution { text }) => {
                return Err(ControlFlow::bad_substitution(text.clone()))
            }
            Some(ParamOp::LengthSlice) => {
                return Err(ControlFlow::bad_substitution(format!(
                    "${{#{}...}}",
                    part.parameter
                )))
            }
            Some(ParamOp::ArrayKeys { star }) => {
                return self.array_keys(st, &part.parameter, *star, in_dquotes)
            }
            Some(ParamOp::NamePrefix { star }) => {
                let mut names: Vec<String> = st
                    .vars
                    .keys()
                    .filter(|n| n.starts_with(&part.parameter))
                    .cloned()
                    .collect();
                names.sort();
                if *star && in_dquotes {
                    return Ok(ParamValue::Str(names.join(&join_char(st))));
                }
                return Ok(ParamValue::Fields(names));
            }
            Some(ParamOp::Indirection { inner }) => {
                return self.indirect(st, out, &part.parameter, inner.as_deref(), in_dquotes)
            }
            _ => {}
        }

        let (base, list) = self.fetch(st, out, &part.parameter, in_dquotes)?;
        self.apply_op(st, out, part, base, list, in_dquotes)
    }

    fn apply_op(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        part: &ParameterPart,
        base: Base,
        list: ListKind,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        let param = part.parameter.as_str();

        match &part.op {
            None => {
                self.check_nounset(st, param, &base, list)?;
                Ok(finish(st, base, list, in_dquotes))
            }
            Some(ParamOp::Default { word, check_empty }) => {
                if base.is_unset() || (*check_empty && base.is_empty()) {
                    let nested = self.expand_parts(st, out, &word.parts, in_dquotes)?;
                    Ok(ParamValue::Nested(nested))
                } else {
                    Ok(finish(st, base, list, in_dquotes))
                }
            }
            Some(ParamOp::AssignDefault { word, check_empty }) => {
                if base.is_unset() || (*check_empty && base.is_empty()) {
                    let value = self.expand_word_str(st, out, word)?;
                    if let Err(name) = vars::set_scalar(st, param, &value, false) {
                        out.stderr
                            .push_str(&format!("bash: {}: readonly variable\n", name));
                    }
                    Ok(ParamValue::Str(value))
                } else {
                    Ok(finish(st, base, list, in_dquotes))
                }
            }
            Some(ParamOp::ErrorIfUnset { word, check_empty }) => {
                if base.is_unset() || (*check_empty && base.is_empty()) {
                    let message = match word {
                        Some(w) => self.expand_word_str(st, out, w)?,
                        None => "parameter null or not set".to_string(),
                    };
                    return Err(ControlFlow::Exit {
                        code: 1,
                        out: Output::new("", format!("bash: {}: {}\n", param, message)),
                    });
                }
                Ok(finish(st, base, list, in_dquotes))
            }
            Some(ParamOp::Alternative { word, check_empty }) => {
                if base.is_unset() || (*check_empty && base.is_empty()) {
                    Ok(ParamValue::Str(String::new()))
                } else {
                    let nested = self.expand_parts(st, out, &word.parts, in_dquotes)?;
                    Ok(ParamValue::Nested(nested))
                }
            }
            Some(ParamOp::Length) => {
                self.check_nounset(st, param, &base, list)?;
                let n = match &base {
                    Base::Unset => 0,
                    Base::Str(s) => s.chars().count(),
                    Base::Fields(f) => f.len(),
                };
                Ok(ParamValue::Str(n.to_string()))
            }
            Some(ParamOp::Substring { offset, length }) => {
                self.check_nounset(st, param, &base, list)?;
                self.substring(st, out, base, list, offset, length.as_ref(), in_dquotes)
            }
            Some(ParamOp::RemovePattern {
                pattern: pat,
                suffix,
                greedy,
            }) => {
                self.check_nounset(st, param, &base, list)?;
                let pattern_text = self.expand_word_pattern(st, out, pat)?;
                let opts = self.pattern_opts(st);
                let apply = |s: &str| {
                    pattern::remove_pattern(s, &pattern_text, *suffix, *greedy, opts)
                };
                Ok(map_base(st, base, list, in_dquotes, apply))
            }
            Some(ParamOp::ReplacePattern {
                pattern: pat,
                replacement,
                all,
                anchor,
            }) => {
                self.check_nounset(st, param, &base, list)?;
                let pattern_text = self.expand_word_pattern(st, out, pat)?;
                let replacement_text = match replacement {
                    Some(w) => self.expand_word_str(st, out, w)?,
                    None => String::new(),
                };
                let opts = self.pattern_opts(st);
                let apply = |s: &str| {
                    pattern::replace_pattern(s, &pattern_text, &replacement_text, *all, *anchor, opts)
                };
                Ok(map_base(st, base, list, in_dquotes, apply))
            }
            Some(ParamOp::CaseMod {
                upper,
                all,
                pattern: pat,
            }) => {
                self.check_nounset(st, param, &base, list)?;
                let pattern_text = match pat {
                    Some(w) => Some(self.expand_word_pattern(st, out, w)?),
                    None => None,
                };
                let opts = self.pattern_opts(st);
                let apply =
                    |s: &str| case_modify(s, *upper, *all, pattern_text.as_deref(), opts);
                Ok(map_base(st, base, list, in_dquotes, apply))
            }
            Some(ParamOp::Transform(kind)) => {
                self.transform(st, param, base, list, *kind, in_dquotes)
            }
            // Handled before fetch.
            Some(
                ParamOp::BadSubstitution { .. }
                | ParamOp::LengthSlice
                | ParamOp::ArrayKeys { .. }
                | ParamOp::NamePrefix { .. }
                | ParamOp::Indirection { .. },
            ) => unreachable!("dispatched before fetch"),
        }
    }

    fn pattern_opts(&self, st: &ShellState) -> PatternOpts {
        PatternOpts {
            extglob: st.shopts.extglob,
            case_insensitive: st.shopts.nocasematch,
        }
    }

    fn check_nounset(
        &self,
        st: &ShellState,
        param: &str,
        base: &Base,
        list: ListKind,
    ) -> Result<(), ControlFlow> {
        if st.options.nounset && base.is_unset() && list == ListKind::None {
            return Err(ControlFlow::nounset(param));
        }
        Ok(())
    }

    /// Resolve a parameter (possibly subscripted) to its base value.
    fn fetch(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        param: &str,
        _in_dquotes: bool,
    ) -> Result<(Base, ListKind), ControlFlow> {
        match param {
            "@" => return Ok((Base::Fields(st.positional.clone()), ListKind::At)),
            "*" => return Ok((Base::Fields(st.positional.clone()), ListKind::Star)),
            _ => {}
        }

        let (name, sub) = vars::split_subscript(param);
        if let Some(sub) = sub {
            match sub.as_str() {
                "@" | "*" => {
                    let list = if sub == "@" { ListKind::At } else { ListKind::Star };
                    let values = match vars::read_var(st, &name) {
                        Some(Value::Indexed(map)) => map.values().cloned().collect(),
                        Some(Value::Assoc(map)) => map.values().cloned().collect(),
                        Some(Value::Scalar(s)) => vec![s],
                        None => Vec::new(),
                    };
                    return Ok((Base::Fields(values), list));
                }
                _ => {
                    let value = self.fetch_element(st, out, &name, &sub)?;
                    return Ok((
                        match value {
                            Some(v) => Base::Str(v),
                            None => Base::Unset,
                        },
                        ListKind::None,
                    ));
                }
            }
        }

        match vars::get_string(st, param) {
            Some(s) => Ok((Base::Str(s), ListKind::None)),
            None => Ok((Base::Unset, ListKind::None)),
        }
    }

    /// One array element; the subscript is arithmetic for indexed arrays
    /// and an expanded string key for associative ones.
    fn fetch_element(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        name: &str,
        sub: &str,
    ) -> Result<Option<String>, ControlFlow> {
        if vars::is_assoc(st, name) {
            let key = self.expand_subscript_key(st, out, sub)?;
            return Ok(match vars::read_var(st, name) {
                Some(Value::Assoc(map)) => map.get(&key).cloned(),
                _ => None,
            });
        }
        let index = self.eval_subscript(st, out, sub)?;
        Ok(match vars::read_var(st, name) {
            Some(Value::Indexed(map)) => {
                let index = if index < 0 {
                    map.keys().next_back().copied().unwrap_or(-1) + 1 + index
                } else {
                    index
                };
                map.get(&index).cloned()
            }
            Some(Value::Scalar(s)) => {
                if index == 0 {
                    Some(s)
                } else {
                    None
                }
            }
            Some(Value::Assoc(map)) => map.get(sub).cloned(),
            None => None,
        })
    }

    pub(crate) fn eval_subscript(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        sub: &str,
    ) -> Result<i64, ControlFlow> {
        let expr = crate::parser::arith::parse_arith(sub);
        crate::interp::arith::eval_arith(self, st, out, &expr)
    }

    pub(crate) fn expand_subscript_key(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        sub: &str,
    ) -> Result<String, ControlFlow> {
        let word = crate::parser::word::parse_word_text(sub, false)
            .unwrap_or_else(|_| WordNode::literal(sub));
        self.expand_word_str(st, out, &word)
    }

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------

    fn substring(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        base: Base,
        list: ListKind,
        offset: &ArithExpr,
        length: Option<&ArithExpr>,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        let offset = crate::interp::arith::eval_arith(self, st, out, offset)?;
        let length = match length {
            Some(expr) => Some(crate::interp::arith::eval_arith(self, st, out, expr)?),
            None => None,
        };

        match base {
            Base::Unset => Ok(ParamValue::Str(String::new())),
            Base::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let start = if offset < 0 { len + offset } else { offset };
                if start < 0 || start > len {
                    return Ok(ParamValue::Str(String::new()));
                }
                let end = match length {
                    None => len,
                    Some(l) if l >= 0 => (start + l).min(len),
                    Some(l) => {
                        let end = len + l;
                        if end < start {
                            return Err(ControlFlow::arithmetic(format!(
                                "{}: substring expression < 0",
                                l
                            )));
                        }
                        end
                    }
                };
                Ok(ParamValue::Str(
                    chars[start as usize..end.max(start) as usize].iter().collect(),
                ))
            }
            Base::Fields(fields) => {
                // `${@:0}` starts at the script name.
                let with_zero: Vec<String> = if list != ListKind::None {
                    std::iter::once(st.script_name.clone())
                        .chain(fields.iter().cloned())
                        .collect()
                } else {
                    fields.clone()
                };
                let len = with_zero.len() as i64;
                let start = if offset < 0 { (len - 1 + offset).max(0) + 1 } else { offset };
                let start = start.clamp(0, len);
                let end = match length {
                    None => len,
                    Some(l) if l >= 0 => (start + l).min(len),
                    Some(l) => {
                        let end = len + l;
                        if end < start {
                            return Err(ControlFlow::arithmetic(format!(
                                "{}: substring expression < 0",
                                l
                            )));
                        }
                        end
                    }
                };
                let slice: Vec<String> =
                    with_zero[start as usize..end.max(start) as usize].to_vec();
                Ok(finish(st, Base::Fields(slice), list, in_dquotes))
            }
        }
    }

    fn transform(
        &self,
        st: &mut ShellState,
        param: &str,
        base: Base,
        list: ListKind,
        kind: TransformKind,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        let (name, _) = vars::split_subscript(param);
        match kind {
            TransformKind::Quote => {
                let apply = |s: &str| quote::shell_quote(s);
                Ok(map_base(st, base, list, in_dquotes, apply))
            }
            TransformKind::Escape => {
                let apply = quote::expand_escapes;
                Ok(map_base(st, base, list, in_dquotes, apply))
            }
            TransformKind::Upper => Ok(map_base(st, base, list, in_dquotes, |s| {
                s.to_uppercase()
            })),
            TransformKind::Lower => Ok(map_base(st, base, list, in_dquotes, |s| {
                s.to_lowercase()
            })),
            TransformKind::UpperFirst => Ok(map_base(st, base, list, in_dquotes, |s| {
                let mut chars = s.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })),
            TransformKind::Prompt => {
                let apply = |s: &str| prompt_expand(st, s);
                let value = match base {
                    Base::Unset => String::new(),
                    Base::Str(s) => apply(&s),
                    Base::Fields(f) => f.iter().map(|s| apply(s)).collect::<Vec<_>>().join(" "),
                };
                Ok(ParamValue::Str(value))
            }
            TransformKind::Assignment => {
                let rendered = match vars::read_var(st, &name) {
                    None => String::new(),
                    Some(Value::Scalar(s)) => {
                        format!("{}={}", name, quote::shell_quote(&s))
                    }
                    Some(array @ Value::Indexed(_)) => {
                        format!("declare -a {}={}", name, quote::render_array(&array))
                    }
                    Some(array @ Value::Assoc(_)) => {
                        format!("declare -A {}={}", name, quote::render_array(&array))
                    }
                };
                Ok(ParamValue::Str(rendered))
            }
            TransformKind::Attributes => {
                let mut flags = String::new();
                if let Some(var) = st.vars.get(&name) {
                    match &var.value {
                        Some(Value::Indexed(_)) => flags.push('a'),
                        Some(Value::Assoc(_)) => flags.push('A'),
                        _ => {}
                    }
                    if var.attrs.integer {
                        flags.push('i');
                    }
                    if var.attrs.lowercase {
                        flags.push('l');
                    }
                    if var.attrs.nameref {
                        flags.push('n');
                    }
                    if var.attrs.readonly {
                        flags.push('r');
                    }
                    if var.attrs.uppercase {
                        flags.push('u');
                    }
                    if var.attrs.exported {
                        flags.push('x');
                    }
                }
                Ok(ParamValue::Str(flags))
            }
            TransformKind::Keys => {
                let rendered = match vars::read_var(st, &name) {
                    None => String::new(),
                    Some(Value::Scalar(s)) => quote::shell_quote(&s),
                    Some(Value::Indexed(map)) => map
                        .iter()
                        .map(|(i, v)| format!("{} {}", i, quote::quote_for_assignment(v)))
                        .collect::<Vec<_>>()
                        .join(" "),
                    Some(Value::Assoc(map)) => map
                        .iter()
                        .map(|(k, v)| format!("{} {}", k, quote::quote_for_assignment(v)))
                        .collect::<Vec<_>>()
                        .join(" "),
                };
                Ok(ParamValue::Str(rendered))
            }
        }
    }

    fn array_keys(
        &self,
        st: &mut ShellState,
        name: &str,
        star: bool,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        let keys: Vec<String> = match vars::read_var(st, name) {
            Some(Value::Indexed(map)) => map.keys().map(|k| k.to_string()).collect(),
            Some(Value::Assoc(map)) => map.keys().cloned().collect(),
            Some(Value::Scalar(_)) => vec!["0".to_string()],
            None => Vec::new(),
        };
        let list = if star { ListKind::Star } else { ListKind::At };
        Ok(finish(st, Base::Fields(keys), list, in_dquotes))
    }

    fn indirect(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        param: &str,
        inner: Option<&ParamOp>,
        in_dquotes: bool,
    ) -> Result<ParamValue, ControlFlow> {
        let (name, _) = vars::split_subscript(param);

        // A nameref expands to the name it references.
        if st.vars.get(&name).map_or(false, |v| v.attrs.nameref) {
            let target = vars::get_string(st, &name).unwrap_or_default();
            return Ok(ParamValue::Str(target));
        }

        let target = match vars::get_string(st, param) {
            Some(t) if !t.is_empty() => t,
            _ => {
                if st.options.nounset {
                    return Err(ControlFlow::nounset(param));
                }
                return Ok(ParamValue::Str(String::new()));
            }
        };
        if !valid_indirect_target(&target) {
            return Err(ControlFlow::bad_substitution(target));
        }

        let (base, list) = self.fetch(st, out, &target, in_dquotes)?;
        let part = ParameterPart {
            parameter: target,
            op: inner.cloned(),
        };
        self.apply_op(st, out, &part, base, list, in_dquotes)
    }
}

fn valid_indirect_target(target: &str) -> bool {
    let (name, _) = vars::split_subscript(target);
    crate::parser::lexer::is_name(&name)
        || matches!(name.as_str(), "@" | "*" | "#" | "?" | "$" | "!" | "-")
        || name.chars().all(|c| c.is_ascii_digit())
}

/// Join character for `"$*"`: the first IFS character.
fn join_char(st: &mut ShellState) -> String {
    let ifs = split::ifs_of(st);
    ifs.chars().next().map(|c| c.to_string()).unwrap_or_default()
}

/// Convert a base into the final `ParamValue`, honoring `@`/`*` joining.
fn finish(st: &mut ShellState, base: Base, list: ListKind, in_dquotes: bool) -> ParamValue {
    match base {
        Base::Unset => ParamValue::Str(String::new()),
        Base::Str(s) => ParamValue::Str(s),
        Base::Fields(fields) => match list {
            ListKind::Star if in_dquotes => ParamValue::Str(fields.join(&join_char(st))),
            _ => ParamValue::Fields(fields),
        },
    }
}

fn map_base<F: Fn(&str) -> String>(
    st: &mut ShellState,
    base: Base,
    list: ListKind,
    in_dquotes: bool,
    f: F,
) -> ParamValue {
    let mapped = match base {
        Base::Unset => Base::Str(String::new()),
        Base::Str(s) => Base::Str(f(&s)),
        Base::Fields(fields) => Base::Fields(fields.iter().map(|s| f(s)).collect()),
    };
    finish(st, mapped, list, in_dquotes)
}

fn case_modify(s: &str, upper: bool, all: bool, pattern: Option<&str>, opts: PatternOpts) -> String {
    let matches = |c: char| match pattern {
        None => true,
        Some(p) => pattern::matches_pattern(&c.to_string(), p, opts),
    };
    let convert = |c: char| -> String {
        if upper {
            c.to_uppercase().collect()
        } else {
            c.to_lowercase().collect()
        }
    };
    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        if (all || i == 0) && matches(c) {
            out.push_str(&convert(c));
        } else {
            out.push(c);
        }
    }
    out
}

/// Minimal `@P` prompt rendering.
fn prompt_expand(st: &ShellState, s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                'u' => out.push_str("user"),
                'h' | 'H' => out.push_str("localhost"),
                'w' => out.push_str(&st.cwd),
                'W' => {
                    let base = st.cwd.rsplit('/').next().unwrap_or("/");
                    out.push_str(if base.is_empty() { "/" } else { base });
                }
                '$' => out.push('$'),
                'n' => out.push('\n'),
                '\\' => out.push('\\'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_modification() {
        let opts = PatternOpts::default();
        assert_eq!(case_modify("hello", true, false, None, opts), "Hello");
        assert_eq!(case_modify("hello", true, true, None, opts), "HELLO");
        assert_eq!(case_modify("HELLO", false, true, None, opts), "hello");
        assert_eq!(
            case_modify("hello", true, true, Some("[aeiou]"), opts),
            "hEllO"
        );
    }

    #[test]
    fn indirect_target_validation() {
        assert!(valid_indirect_target("abc"));
        assert!(valid_indirect_target("a[1]"));
        assert!(valid_indirect_target("1"));
        assert!(!valid_indirect_target("a b"));
    }
}
