//! IFS word splitting.
//!
//! Operates on expansion segments: only unquoted expansion results split;
//! literal and quoted text attaches to whichever field it borders. IFS
//! whitespace runs collapse into one delimiter; each non-whitespace IFS
//! character is its own delimiter and can produce empty fields.

use super::{Field, Seg};
use crate::interp::state::ShellState;
use crate::interp::vars;

pub const DEFAULT_IFS: &str = " \t\n";

/// The active IFS: unset means the default, empty disables splitting.
pub fn ifs_of(st: &mut ShellState) -> String {
    match vars::get_string(st, "IFS") {
        Some(ifs) => ifs,
        None => DEFAULT_IFS.to_string(),
    }
}

/// Split one field's splittable segments on IFS.
pub fn split_field(field: Field, ifs: &str) -> Vec<Field> {
    if ifs.is_empty() {
        return vec![field];
    }
    let is_ifs = |c: char| ifs.contains(c);
    let is_ifs_ws = |c: char| is_ifs(c) && matches!(c, ' ' | '\t' | '\n');

    let mut out: Vec<Field> = Vec::new();
    let mut current: Field = Vec::new();

    let finalize = |out: &mut Vec<Field>, current: &mut Field, keep_empty: bool| {
        let has_content = current
            .iter()
            .any(|seg| seg.quoted || !seg.text.is_empty());
        if has_content || keep_empty {
            out.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for seg in field {
        if !seg.splittable || seg.quoted {
            current.push(seg);
            continue;
        }
        let chars: Vec<char> = seg.text.chars().collect();
        let mut i = 0;
        let mut piece = String::new();
        while i < chars.len() {
            let c = chars[i];
            if !is_ifs(c) {
                piece.push(c);
                i += 1;
                continue;
            }
            // Delimiter: ws*, at most one non-ws IFS char, ws*.
            let mut has_nonws = false;
            while i < chars.len() && is_ifs(chars[i]) {
                if is_ifs_ws(chars[i]) {
                    i += 1;
                } else if !has_nonws {
                    has_nonws = true;
                    i += 1;
                } else {
                    break;
                }
            }
            if !piece.is_empty() {
                current.push(Seg::unquoted(std::mem::take(&mut piece)));
            }
            finalize(&mut out, &mut current, has_nonws);
        }
        if !piece.is_empty() {
            current.push(Seg::unquoted(piece));
        }
    }
    finalize(&mut out, &mut current, false);
    out
}

/// Split a whole word's fields.
pub fn split_fields(fields: Vec<Field>, ifs: &str) -> Vec<Field> {
    fields
        .into_iter()
        .flat_map(|f| split_field(f, ifs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(segs: Vec<Seg>) -> Field {
        segs
    }

    fn texts(fields: &[Field]) -> Vec<String> {
        fields.iter().map(super::super::field_text).collect()
    }

    fn expanded(text: &str) -> Seg {
        Seg {
            text: text.to_string(),
            quoted: false,
            splittable: true,
        }
    }

    #[test]
    fn whitespace_runs_collapse() {
        let out = split_field(f(vec![expanded("  a  b c ")]), DEFAULT_IFS);
        assert_eq!(texts(&out), vec!["a", "b", "c"]);
    }

    #[test]
    fn nonws_separator_produces_empty_fields() {
        let out = split_field(f(vec![expanded("a::b")]), ":");
        assert_eq!(texts(&out), vec!["a", "", "b"]);
        let out = split_field(f(vec![expanded(":a")]), ":");
        assert_eq!(texts(&out), vec!["", "a"]);
        let out = split_field(f(vec![expanded("a:")]), ":");
        assert_eq!(texts(&out), vec!["a"]);
    }

    #[test]
    fn literal_text_attaches_to_adjacent_fields() {
        // pre$x with x = "1 2" -> "pre1", "2"
        let out = split_field(
            f(vec![Seg::literal("pre"), expanded("1 2")]),
            DEFAULT_IFS,
        );
        assert_eq!(texts(&out), vec!["pre1", "2"]);
    }

    #[test]
    fn quoted_segments_never_split() {
        let out = split_field(
            f(vec![Seg {
                text: "a b".into(),
                quoted: true,
                splittable: false,
            }]),
            DEFAULT_IFS,
        );
        assert_eq!(texts(&out), vec!["a b"]);
    }

    #[test]
    fn empty_unquoted_expansion_vanishes() {
        let out = split_field(f(vec![expanded("")]), DEFAULT_IFS);
        assert!(out.is_empty());
    }

    #[test]
    fn empty_ifs_disables_splitting() {
        let out = split_field(f(vec![expanded("a b")]), "");
        assert_eq!(texts(&out), vec!["a b"]);
    }

    #[test]
    fn mixed_ws_and_nonws() {
        let out = split_field(f(vec![expanded("a : b")]), ": ");
        assert_eq!(texts(&out), vec!["a", "b"]);
    }
}
