//! Conditional command evaluation (`[[ ... ]]`).
//!
//! Operands expand without word splitting or pathname expansion. `==`/`!=`
//! match the right side as a pattern (quoted parts literal), `=~` matches a
//! regex and fills `BASH_REMATCH`, and the `-eq` family evaluates both
//! sides arithmetically. Returns the command's exit code: 0 true, 1 false,
//! 2 for malformed expressions such as an invalid regex.

use regex_lite::Regex;

use crate::ast::{CondBinOp, CondExpr, CondUnaryOp, WordNode};
use crate::expand::pattern::{self, PatternOpts};
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, Output};
use crate::interp::state::{ShellState, Value};
use crate::interp::vars;

impl Executor<'_> {
    pub fn eval_conditional(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        expr: &CondExpr,
    ) -> Result<i32, ControlFlow> {
        match expr {
            CondExpr::And(lhs, rhs) => {
                let l = self.eval_conditional(st, out, lhs)?;
                if l != 0 {
                    return Ok(l.max(1));
                }
                self.eval_conditional(st, out, rhs)
            }
            CondExpr::Or(lhs, rhs) => {
                let l = self.eval_conditional(st, out, lhs)?;
                if l == 0 {
                    return Ok(0);
                }
                self.eval_conditional(st, out, rhs)
            }
            CondExpr::Not(inner) => {
                let code = self.eval_conditional(st, out, inner)?;
                Ok(match code {
                    0 => 1,
                    2 => 2,
                    _ => 0,
                })
            }
            CondExpr::Group(inner) => self.eval_conditional(st, out, inner),
            CondExpr::Word(word) => {
                let value = self.expand_word_str(st, out, word)?;
                Ok(if value.is_empty() { 1 } else { 0 })
            }
            CondExpr::Unary { op, operand } => self.eval_unary(st, out, *op, operand),
            CondExpr::Binary { op, lhs, rhs } => self.eval_binary(st, out, *op, lhs, rhs),
        }
    }

    fn eval_unary(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        op: CondUnaryOp,
        operand: &WordNode,
    ) -> Result<i32, ControlFlow> {
        let value = self.expand_word_str(st, out, operand)?;
        let truth = match op {
            CondUnaryOp::ZeroLength => value.is_empty(),
            CondUnaryOp::NonZeroLength => !value.is_empty(),
            CondUnaryOp::VarSet => {
                let (name, sub) = vars::split_subscript(&value);
                match sub {
                    None => vars::read_var(st, &name).is_some(),
                    Some(sub) => match sub.as_str() {
                        "@" | "*" => vars::read_var(st, &name)
                            .map_or(false, |v| v.element_count() > 0),
                        _ => self
                            .eval_subscript(st, out, &sub)
                            .ok()
                            .and_then(|idx| match vars::read_var(st, &name) {
                                Some(Value::Indexed(map)) => {
                                    Some(map.contains_key(&idx))
                                }
                                Some(Value::Assoc(map)) => Some(map.contains_key(&sub)),
                                Some(Value::Scalar(_)) => Some(idx == 0),
                                None => Some(false),
                            })
                            .unwrap_or(false),
                    },
                }
            }
            CondUnaryOp::OptionSet => st.options.get(&value) == Some(true),
            CondUnaryOp::Terminal => false,
            _ => self.file_test(st, op, &value),
        };
        Ok(if truth { 0 } else { 1 })
    }

    fn file_test(&self, st: &ShellState, op: CondUnaryOp, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let abs = self.host.resolve_path(&st.cwd, path);
        match op {
            CondUnaryOp::Exists => self.host.exists(&abs),
            CondUnaryOp::RegularFile => self.host.is_file(&abs),
            CondUnaryOp::Directory => self.host.is_dir(&abs),
            CondUnaryOp::Symlink => self
                .host
                .lstat(&abs)
                .map(|s| s.is_symlink)
                .unwrap_or(false),
            CondUnaryOp::NonEmptyFile => {
                self.host.stat(&abs).map(|s| s.size > 0).unwrap_or(false)
            }
            CondUnaryOp::Readable => self
                .host
                .stat(&abs)
                .map(|s| s.mode & 0o444 != 0)
                .unwrap_or(false),
            CondUnaryOp::Writable => self
                .host
                .stat(&abs)
                .map(|s| s.mode & 0o222 != 0)
                .unwrap_or(false),
            CondUnaryOp::Executable => self
                .host
                .stat(&abs)
                .map(|s| s.is_directory || s.mode & 0o111 != 0)
                .unwrap_or(false),
            CondUnaryOp::SetUid => self
                .host
                .stat(&abs)
                .map(|s| s.mode & 0o4000 != 0)
                .unwrap_or(false),
            CondUnaryOp::SetGid => self
                .host
                .stat(&abs)
                .map(|s| s.mode & 0o2000 != 0)
                .unwrap_or(false),
            CondUnaryOp::Sticky => self
                .host
                .stat(&abs)
                .map(|s| s.mode & 0o1000 != 0)
                .unwrap_or(false),
            // Always true for anything the sandbox owns.
            CondUnaryOp::OwnedByEuid | CondUnaryOp::OwnedByEgid => self.host.exists(&abs),
            // No devices, fifos, or sockets in the virtual filesystem.
            CondUnaryOp::BlockSpecial
            | CondUnaryOp::CharSpecial
            | CondUnaryOp::Fifo
            | CondUnaryOp::Socket
            | CondUnaryOp::ModifiedSince => false,
            _ => false,
        }
    }

    fn eval_binary(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        op: CondBinOp,
        lhs: &WordNode,
        rhs: &WordNode,
    ) -> Result<i32, ControlFlow> {
        match op {
            CondBinOp::StrEq | CondBinOp::StrNe => {
                let left = self.expand_word_str(st, out, lhs)?;
                // The right side is a pattern; quoted parts match literally.
                let pattern_text = self.expand_word_pattern(st, out, rhs)?;
                let opts = PatternOpts {
                    extglob: true,
                    case_insensitive: st.shopts.nocasematch,
                };
                let matched = pattern::matches_pattern(&left, &pattern_text, opts);
                Ok(if matched == (op == CondBinOp::StrEq) { 0 } else { 1 })
            }
            CondBinOp::Regex => self.eval_regex(st, out, lhs, rhs),
            CondBinOp::StrLt | CondBinOp::StrGt => {
                let left = self.expand_word_str(st, out, lhs)?;
                let right = self.expand_word_str(st, out, rhs)?;
                let truth = if op == CondBinOp::StrLt {
                    left < right
                } else {
                    left > right
                };
                Ok(if truth { 0 } else { 1 })
            }
            CondBinOp::NumEq
            | CondBinOp::NumNe
            | CondBinOp::NumLt
            | CondBinOp::NumLe
            | CondBinOp::NumGt
            | CondBinOp::NumGe => {
                let left = self.numeric_operand(st, out, lhs)?;
                let right = self.numeric_operand(st, out, rhs)?;
                let truth = match op {
                    CondBinOp::NumEq => left == right,
                    CondBinOp::NumNe => left != right,
                    CondBinOp::NumLt => left < right,
                    CondBinOp::NumLe => left <= right,
                    CondBinOp::NumGt => left > right,
                    CondBinOp::NumGe => left >= right,
                    _ => unreachable!(),
                };
                Ok(if truth { 0 } else { 1 })
            }
            CondBinOp::NewerThan | CondBinOp::OlderThan | CondBinOp::SameFile => {
                let left = self.expand_word_str(st, out, lhs)?;
                let right = self.expand_word_str(st, out, rhs)?;
                let la = self.host.resolve_path(&st.cwd, &left);
                let ra = self.host.resolve_path(&st.cwd, &right);
                let truth = match op {
                    CondBinOp::SameFile => {
                        self.host.exists(&la) && la == ra
                    }
                    _ => {
                        let lm = self.host.stat(&la).map(|s| s.mtime);
                        let rm = self.host.stat(&ra).map(|s| s.mtime);
                        match (lm, rm, op) {
                            (Ok(l), Ok(r), CondBinOp::NewerThan) => l > r,
                            (Ok(_), Err(_), CondBinOp::NewerThan) => true,
                            (Ok(l), Ok(r), CondBinOp::OlderThan) => l < r,
                            (Err(_), Ok(_), CondBinOp::OlderThan) => true,
                            _ => false,
                        }
                    }
                };
                Ok(if truth { 0 } else { 1 })
            }
        }
    }

    /// Arithmetic evaluation of a `-eq`-family operand.
    fn numeric_operand(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        word: &WordNode,
    ) -> Result<i64, ControlFlow> {
        let text = self.expand_word_str(st, out, word)?;
        let expr = crate::parser::arith::parse_arith(&text);
        crate::interp::arith::eval_arith(self, st, out, &expr)
    }

    fn eval_regex(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        lhs: &WordNode,
        rhs: &WordNode,
    ) -> Result<i32, ControlFlow> {
        let left = self.expand_word_str(st, out, lhs)?;
        let regex_text = self.regex_text(st, out, rhs)?;
        let regex_text = if st.shopts.nocasematch {
            format!("(?i){}", regex_text)
        } else {
            regex_text
        };
        let re = match Regex::new(&regex_text) {
            Ok(re) => re,
            Err(_) => {
                out.stderr.push_str(&format!(
                    "bash: syntax error in regular expression: `{}'\n",
                    regex_text
                ));
                return Ok(2);
            }
        };
        match re.captures(&left) {
            Some(caps) => {
                let groups: Vec<String> = (0..caps.len())
                    .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                let _ = vars::set_array(st, "BASH_REMATCH", Value::indexed_from(groups));
                Ok(0)
            }
            None => Ok(1),
        }
    }

    /// Assemble the regex text: unquoted parts stay regex-active, quoted
    /// parts are escaped to match literally.
    fn regex_text(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        word: &WordNode,
    ) -> Result<String, ControlFlow> {
        let fields = self.expand_parts(st, out, &word.parts, false)?;
        let mut text = String::new();
        for field in &fields {
            for seg in field {
                if seg.quoted {
                    text.push_str(&regex_escape(&seg.text));
                } else {
                    text.push_str(&seg.text);
                }
            }
        }
        Ok(text)
    }
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
