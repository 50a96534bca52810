//! Word expansion.
//!
//! Phases run in bash order: brace expansion fans a word out, then each
//! resulting word expands part by part (tilde, parameter, command
//! substitution, arithmetic) into quoted/unquoted segments, then unquoted
//! expansion segments split on IFS, then fields with active glob characters
//! expand against the filesystem, and quote removal falls out of the
//! segment model. Command substitution re-enters the executor, so the
//! drivers are methods on it.

pub mod brace;
pub mod glob;
pub mod param;
pub mod pattern;
pub mod quote;
pub mod split;
pub mod tilde;

use crate::ast::{BraceItem, WordNode, WordPart};
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, Output};
use crate::interp::state::ShellState;

/// One expansion segment: a run of text with its quoting provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Seg {
    pub text: String,
    /// Quoted text neither splits nor globs.
    pub quoted: bool,
    /// Unquoted expansion results split on IFS; literal text does not.
    pub splittable: bool,
}

impl Seg {
    pub fn literal(text: impl Into<String>) -> Self {
        Seg {
            text: text.into(),
            quoted: false,
            splittable: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Seg {
            text: text.into(),
            quoted: true,
            splittable: false,
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Seg {
            text: text.into(),
            quoted: false,
            splittable: false,
        }
    }

    pub fn expanded(text: impl Into<String>, in_dquotes: bool) -> Self {
        Seg {
            text: text.into(),
            quoted: in_dquotes,
            splittable: !in_dquotes,
        }
    }
}

/// A field under construction: an ordered run of segments.
pub type Field = Vec<Seg>;

pub fn field_text(field: &Field) -> String {
    field.iter().map(|s| s.text.as_str()).collect()
}

/// Assemble a glob pattern: quoted segments contribute escaped (literal)
/// text, unquoted segments stay pattern-active.
pub fn field_pattern(field: &Field) -> String {
    let mut out = String::new();
    for seg in field {
        if seg.quoted {
            out.push_str(&pattern::escape_glob(&seg.text));
        } else {
            out.push_str(&seg.text);
        }
    }
    out
}

pub fn field_has_glob(field: &Field, extglob: bool) -> bool {
    field
        .iter()
        .any(|seg| !seg.quoted && pattern::has_glob_chars(&seg.text, extglob))
}

/// Result of a parameter expansion: a plain string, multiple fields
/// (`"$@"`, `"${a[@]}"`), or pre-expanded segments whose internal quoting
/// must survive (`${x:-'a b'}`).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Fields(Vec<String>),
    Nested(Vec<Field>),
}

impl Executor<'_> {
    /// Full expansion of command words: brace fan-out, part expansion, IFS
    /// splitting, pathname expansion, quote removal.
    pub fn expand_words(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        words: &[WordNode],
    ) -> Result<Vec<String>, ControlFlow> {
        let mut result = Vec::new();
        for word in words {
            for fanned in brace::expand_braces(word, self.limits) {
                let fields = self.expand_parts(st, out, &fanned.parts, false)?;
                let ifs = split::ifs_of(st);
                let fields = split::split_fields(fields, &ifs);
                for field in fields {
                    self.glob_field(st, &field, &mut result)?;
                }
            }
        }
        Ok(result)
    }

    /// Expand one word to exactly one string: no brace fan-out, splitting,
    /// or globbing. Assignments, heredocs, case subjects, `[[ ]]` operands.
    pub fn expand_word_str(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        word: &WordNode,
    ) -> Result<String, ControlFlow> {
        let fields = self.expand_parts(st, out, &word.parts, false)?;
        Ok(fields
            .iter()
            .map(field_text)
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Expand a word into glob-pattern text: quoted parts escaped, unquoted
    /// parts pattern-active. Case patterns, `[[ == ]]`, `${x#pat}`.
    pub fn expand_word_pattern(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        word: &WordNode,
    ) -> Result<String, ControlFlow> {
        let fields = self.expand_parts(st, out, &word.parts, false)?;
        Ok(fields
            .iter()
            .map(field_pattern)
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Expand words the way declaration builtins see their arguments:
    /// `name=value` shapes keep assignment semantics, so no word splitting
    /// and no pathname expansion.
    pub fn expand_words_no_split(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        words: &[WordNode],
    ) -> Result<Vec<String>, ControlFlow> {
        let mut result = Vec::new();
        for word in words {
            for fanned in brace::expand_braces(word, self.limits) {
                let fields = self.expand_parts(st, out, &fanned.parts, false)?;
                for field in fields {
                    result.push(field_text(&field));
                }
            }
        }
        Ok(result)
    }

    /// Apply pathname expansion to a finished field and push the outcome.
    fn glob_field(
        &self,
        st: &mut ShellState,
        field: &Field,
        result: &mut Vec<String>,
    ) -> Result<(), ControlFlow> {
        if !st.options.noglob && field_has_glob(field, st.shopts.extglob) {
            let pattern_text = field_pattern(field);
            let matches = glob::expand_glob(self.host, &st.cwd, &pattern_text, &st.shopts);
            if !matches.is_empty() {
                result.extend(matches);
                return Ok(());
            }
            if st.shopts.failglob {
                return Err(ControlFlow::glob(field_text(field)));
            }
            if st.shopts.nullglob {
                return Ok(());
            }
        }
        result.push(field_text(field));
        Ok(())
    }

    /// Expand word parts into fields. `in_dquotes` marks double-quote
    /// context (quoted segments, no tilde, `"$@"` field semantics).
    pub(crate) fn expand_parts(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        parts: &[WordPart],
        in_dquotes: bool,
    ) -> Result<Vec<Field>, ControlFlow> {
        let mut fields: Vec<Field> = vec![Vec::new()];

        for part in parts {
            match part {
                WordPart::Literal(text) => {
                    push_seg(&mut fields, Seg {
                        text: text.clone(),
                        quoted: in_dquotes,
                        splittable: false,
                    });
                }
                WordPart::SingleQuoted(text) => {
                    push_seg(&mut fields, Seg::quoted(text.clone()));
                }
                WordPart::Escaped(text) => {
                    push_seg(&mut fields, Seg::quoted(text.clone()));
                }
                WordPart::DoubleQuoted(inner) => {
                    if inner.is_empty() {
                        // `""` contributes one empty quoted segment; an
                        // empty `"$@"` below contributes nothing.
                        push_seg(&mut fields, Seg::quoted(""));
                    } else {
                        let inner_fields = self.expand_parts(st, out, inner, true)?;
                        splice_fields(&mut fields, inner_fields);
                    }
                }
                WordPart::Parameter(part) => {
                    match self.expand_parameter(st, out, part, in_dquotes)? {
                        ParamValue::Str(s) => {
                            push_seg(&mut fields, Seg::expanded(s, in_dquotes));
                        }
                        ParamValue::Fields(items) => {
                            let item_fields: Vec<Field> = items
                                .into_iter()
                                .map(|s| vec![Seg::expanded(s, in_dquotes)])
                                .collect();
                            splice_fields(&mut fields, item_fields);
                        }
                        ParamValue::Nested(nested) => {
                            splice_fields(&mut fields, nested);
                        }
                    }
                }
                WordPart::CommandSubst(cs) => {
                    let result = self.run_command_substitution(st, &cs.body)?;
                    out.stderr.push_str(&result.stderr);
                    let trimmed = result.stdout.trim_end_matches('\n').to_string();
                    push_seg(&mut fields, Seg::expanded(trimmed, in_dquotes));
                }
                WordPart::Arithmetic(expr) => {
                    let value = crate::interp::arith::eval_arith(self, st, out, expr)?;
                    push_seg(&mut fields, Seg::expanded(value.to_string(), in_dquotes));
                }
                WordPart::Tilde(user) => {
                    if in_dquotes {
                        let text = match user {
                            Some(u) => format!("~{}", u),
                            None => "~".to_string(),
                        };
                        push_seg(&mut fields, Seg::quoted(text));
                    } else {
                        let expanded = tilde::expand_tilde(st, user.as_deref());
                        push_seg(&mut fields, Seg::unquoted(expanded));
                    }
                }
                WordPart::Brace(items) => {
                    // Reached only in contexts with no brace phase
                    // (assignments, parameter words): braces are literal.
                    let text = self.render_brace_literal(st, out, items, in_dquotes)?;
                    push_seg(&mut fields, Seg {
                        text,
                        quoted: in_dquotes,
                        splittable: false,
                    });
                }
                WordPart::Glob(pattern) => {
                    push_seg(&mut fields, Seg {
                        text: pattern.clone(),
                        quoted: in_dquotes,
                        splittable: false,
                    });
                }
            }
        }
        Ok(fields)
    }

    fn render_brace_literal(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        items: &[BraceItem],
        in_dquotes: bool,
    ) -> Result<String, ControlFlow> {
        let mut rendered = Vec::new();
        for item in items {
            match item {
                BraceItem::Word(word) => {
                    let fields = self.expand_parts(st, out, &word.parts, in_dquotes)?;
                    rendered.push(
                        fields.iter().map(field_text).collect::<Vec<_>>().join(" "),
                    );
                }
                BraceItem::Range {
                    start_text,
                    end_text,
                    step,
                    ..
                } => match step {
                    Some(s) => rendered.push(format!("{}..{}..{}", start_text, end_text, s)),
                    None => rendered.push(format!("{}..{}", start_text, end_text)),
                },
            }
        }
        Ok(format!("{{{}}}", rendered.join(",")))
    }
}

fn push_seg(fields: &mut Vec<Field>, seg: Seg) {
    fields.last_mut().expect("fields never empty").push(seg);
}

/// Splice multi-field content into the field list: the first item joins the
/// current field, middles stand alone, the last opens the next field. An
/// empty list (empty `"$@"`) contributes nothing.
fn splice_fields(fields: &mut Vec<Field>, items: Vec<Field>) {
    let mut iter = items.into_iter();
    let Some(first) = iter.next() else {
        return;
    };
    fields.last_mut().unwrap().extend(first);
    for item in iter {
        fields.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_pattern_escapes_quoted() {
        let field = vec![
            Seg::quoted("_tmp/[bc]"),
            Seg {
                text: "*".into(),
                quoted: false,
                splittable: false,
            },
            Seg::quoted(".mm"),
        ];
        assert_eq!(field_pattern(&field), "_tmp/\\[bc\\]*.mm");
    }

    #[test]
    fn splice_joins_edges() {
        let mut fields: Vec<Field> = vec![vec![Seg::literal("pre")]];
        splice_fields(
            &mut fields,
            vec![
                vec![Seg::quoted("a")],
                vec![Seg::quoted("b")],
                vec![Seg::quoted("c")],
            ],
        );
        fields.last_mut().unwrap().push(Seg::literal("post"));
        let texts: Vec<String> = fields.iter().map(field_text).collect();
        assert_eq!(texts, vec!["prea", "b", "cpost"]);
    }
}
