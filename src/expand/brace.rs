//! Brace expansion.
//!
//! Runs before every other expansion phase: each word containing brace
//! parts fans out into the cartesian product of its items. Numeric ranges
//! zero-pad when either endpoint is written with leading zeros; character
//! ranges stay within one case class. Result and operation counts are
//! capped; on overflow the prefix computed so far is returned.

use crate::ast::{BraceItem, RangeEndpoint, WordNode, WordPart};
use crate::interp::state::ExecutionLimits;

/// Expand every brace part in `word`, producing the fanned-out word list.
/// Words without brace parts come back unchanged as a single entry.
pub fn expand_braces(word: &WordNode, limits: &ExecutionLimits) -> Vec<WordNode> {
    let mut ops = 0usize;
    let mut results = vec![WordNode::default()];

    for part in &word.parts {
        match part {
            WordPart::Brace(items) => {
                let expansions = expand_items(items, limits, &mut ops);
                let mut next = Vec::new();
                'outer: for base in &results {
                    for expansion in &expansions {
                        ops += 1;
                        if next.len() >= limits.max_brace_results
                            || ops >= limits.max_brace_operations
                        {
                            break 'outer;
                        }
                        let mut combined = base.clone();
                        combined.parts.extend(expansion.parts.clone());
                        next.push(combined);
                    }
                }
                if next.is_empty() {
                    next.push(WordNode::default());
                }
                results = next;
            }
            other => {
                for word in &mut results {
                    word.parts.push(other.clone());
                }
            }
        }
    }
    results
}

/// Expand one brace group's items into word fragments.
fn expand_items(
    items: &[BraceItem],
    limits: &ExecutionLimits,
    ops: &mut usize,
) -> Vec<WordNode> {
    let mut out = Vec::new();
    for item in items {
        match item {
            BraceItem::Word(word) => {
                // Items can themselves contain brace parts.
                for expanded in expand_braces(word, limits) {
                    *ops += 1;
                    if out.len() >= limits.max_brace_results || *ops >= limits.max_brace_operations
                    {
                        return out;
                    }
                    out.push(expanded);
                }
            }
            BraceItem::Range {
                start,
                end,
                step,
                start_text,
                end_text,
            } => {
                for text in expand_range(*start, *end, *step, start_text, end_text, limits, ops) {
                    out.push(WordNode::literal(text));
                }
            }
        }
    }
    out
}

fn expand_range(
    start: RangeEndpoint,
    end: RangeEndpoint,
    step: Option<i64>,
    start_text: &str,
    end_text: &str,
    limits: &ExecutionLimits,
    ops: &mut usize,
) -> Vec<String> {
    let mut out = Vec::new();
    match (start, end) {
        (RangeEndpoint::Int(a), RangeEndpoint::Int(b)) => {
            let step = step.map(|s| s.abs()).filter(|s| *s != 0).unwrap_or(1);
            let width = zero_pad_width(start_text, end_text);
            let ascending = a <= b;
            let mut n = a;
            loop {
                *ops += 1;
                if out.len() >= limits.max_brace_results || *ops >= limits.max_brace_operations {
                    break;
                }
                out.push(format_padded(n, width));
                if ascending {
                    n += step;
                    if n > b {
                        break;
                    }
                } else {
                    n -= step;
                    if n < b {
                        break;
                    }
                }
            }
        }
        (RangeEndpoint::Char(a), RangeEndpoint::Char(b)) => {
            let step = step.map(|s| s.abs()).filter(|s| *s != 0).unwrap_or(1) as u32;
            let (a, b) = (a as u32, b as u32);
            let ascending = a <= b;
            let mut n = a;
            loop {
                *ops += 1;
                if out.len() >= limits.max_brace_results || *ops >= limits.max_brace_operations {
                    break;
                }
                if let Some(c) = char::from_u32(n) {
                    out.push(c.to_string());
                }
                if ascending {
                    n += step;
                    if n > b {
                        break;
                    }
                } else {
                    if n < b + step {
                        break;
                    }
                    n -= step;
                }
            }
        }
        _ => {}
    }
    out
}

/// Zero padding applies when any endpoint has a leading zero (or `-0`).
fn zero_pad_width(start_text: &str, end_text: &str) -> usize {
    let padded = |s: &str| {
        let digits = s.strip_prefix('-').unwrap_or(s);
        digits.len() > 1 && digits.starts_with('0')
    };
    if padded(start_text) || padded(end_text) {
        start_text
            .trim_start_matches('-')
            .len()
            .max(end_text.trim_start_matches('-').len())
    } else {
        0
    }
}

fn format_padded(n: i64, width: usize) -> String {
    if width == 0 {
        n.to_string()
    } else if n < 0 {
        format!("-{:0>width$}", -n, width = width)
    } else {
        format!("{:0>width$}", n, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word::parse_word_text;

    fn expand_text(text: &str) -> Vec<String> {
        let word = parse_word_text(text, false).unwrap();
        expand_braces(&word, &ExecutionLimits::default())
            .iter()
            .map(|w| {
                w.parts
                    .iter()
                    .map(|p| match p {
                        WordPart::Literal(t) => t.clone(),
                        other => panic!("non-literal part {:?}", other),
                    })
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn comma_list_with_affixes() {
        assert_eq!(expand_text("a{b,c}d"), vec!["abd", "acd"]);
    }

    #[test]
    fn cartesian_product() {
        assert_eq!(
            expand_text("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }

    #[test]
    fn nested_braces() {
        assert_eq!(expand_text("{a,{b,c}}"), vec!["a", "b", "c"]);
    }

    #[test]
    fn numeric_ranges() {
        assert_eq!(expand_text("{1..4}"), vec!["1", "2", "3", "4"]);
        assert_eq!(expand_text("{4..1}"), vec!["4", "3", "2", "1"]);
        assert_eq!(expand_text("{1..7..2}"), vec!["1", "3", "5", "7"]);
    }

    #[test]
    fn zero_padded_range() {
        assert_eq!(expand_text("{01..05..2}"), vec!["01", "03", "05"]);
        assert_eq!(expand_text("{08..10}"), vec!["08", "09", "10"]);
    }

    #[test]
    fn char_range() {
        assert_eq!(expand_text("{a..e..2}"), vec!["a", "c", "e"]);
        assert_eq!(expand_text("{c..a}"), vec!["c", "b", "a"]);
    }

    #[test]
    fn overflow_returns_prefix() {
        let limits = ExecutionLimits {
            max_brace_results: 5,
            ..Default::default()
        };
        let word = parse_word_text("{1..100}", false).unwrap();
        let out = expand_braces(&word, &limits);
        assert_eq!(out.len(), 5);
    }
}
