//! Glob pattern matching behind a small regex-backed matcher.
//!
//! Shell patterns (`*`, `?`, `[...]`, extglob groups) are translated to
//! anchored regexes. The matcher wraps the regex engine so anchoring and
//! empty-match semantics live in one place: pattern removal scans candidate
//! split points with full matches, and global replacement skips the
//! zero-length match at end of input the way bash does.

use regex_lite::Regex;

use crate::ast::PatternAnchor;

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternOpts {
    pub extglob: bool,
    pub case_insensitive: bool,
}

/// Unescaped glob metacharacters present?
pub fn has_glob_chars(s: &str, extglob: bool) -> bool {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '*' | '?' | '[' => return true,
            '@' | '+' | '!' if extglob && chars.get(i + 1) == Some(&'(') => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Backslash-escape glob metacharacters so literal text survives pattern
/// assembly.
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '(' | ')' | '|' | '@' | '+' | '!' | '{' | '}')
        {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Strip glob escapes, yielding the literal spelling.
pub fn unescape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n) => out.push(n),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn regex_escape_char(c: char, out: &mut String) {
    if matches!(
        c,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    ) {
        out.push('\\');
    }
    out.push(c);
}

/// Translate a shell pattern to a regex body (no anchors). `None` means the
/// pattern cannot be translated and should be compared literally.
pub fn translate(pattern: &str, opts: PatternOpts) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    translate_chars(&chars, opts)
}

fn translate_chars(chars: &[char], opts: PatternOpts) -> Option<String> {
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        // Extglob groups take priority over the single-char wildcards.
        if opts.extglob
            && matches!(c, '@' | '*' | '+' | '?' | '!')
            && chars.get(i + 1) == Some(&'(')
        {
            let close = find_group_end(chars, i + 1)?;
            let inner = &chars[i + 2..close];
            let alternatives = split_alternatives(inner);
            let mut bodies = Vec::new();
            for alternative in &alternatives {
                bodies.push(translate_chars(alternative, opts)?);
            }
            let group = format!("(?:{})", bodies.join("|"));
            match c {
                '@' => out.push_str(&group),
                '*' => out.push_str(&format!("{}*", group)),
                '+' => out.push_str(&format!("{}+", group)),
                '?' => out.push_str(&format!("{}?", group)),
                // Negated groups have no regex counterpart without
                // look-around; `matches_pattern` special-cases a whole
                // `!(...)` pattern, and embedded ones degrade to `*`.
                '!' => out.push_str(".*"),
                _ => unreachable!(),
            }
            i = close + 1;
            continue;
        }

        match c {
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    regex_escape_char(next, &mut out);
                    i += 2;
                    continue;
                }
                out.push_str("\\\\");
            }
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                if let Some(close) = crate::parser::word::scan_glob_class(chars, i) {
                    out.push_str(&translate_class(&chars[i..=close])?);
                    i = close + 1;
                    continue;
                }
                out.push_str("\\[");
            }
            _ => regex_escape_char(c, &mut out),
        }
        i += 1;
    }
    Some(out)
}

fn find_group_end(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = open + 1;
    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => i += 1,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_alternatives(chars: &[char]) -> Vec<Vec<char>> {
    let mut parts = vec![Vec::new()];
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                parts.last_mut().unwrap().push(c);
                if let Some(&n) = chars.get(i + 1) {
                    parts.last_mut().unwrap().push(n);
                    i += 2;
                    continue;
                }
            }
            '(' => {
                depth += 1;
                parts.last_mut().unwrap().push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                parts.last_mut().unwrap().push(c);
            }
            '|' if depth == 0 => parts.push(Vec::new()),
            _ => parts.last_mut().unwrap().push(c),
        }
        i += 1;
    }
    parts
}

/// Translate `[...]` (the slice includes both brackets).
fn translate_class(chars: &[char]) -> Option<String> {
    let mut out = String::from("[");
    let mut i = 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        out.push('^');
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        out.push_str("\\]");
        i += 1;
    }
    while i < chars.len() - 1 {
        let c = chars[i];
        match c {
            '[' if chars.get(i + 1) == Some(&':') => {
                // POSIX class: copy through verbatim.
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == ':' && chars[j + 1] == ']') {
                    j += 1;
                }
                let name: String = chars[i..=j + 1].iter().collect();
                out.push_str(&name);
                i = j + 2;
                continue;
            }
            '\\' => {
                out.push_str("\\\\");
            }
            '^' | ']' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out.push(']');
    Some(out)
}

fn compile_full(pattern: &str, opts: PatternOpts) -> Option<Regex> {
    let body = translate(pattern, opts)?;
    let flags = if opts.case_insensitive { "(?is)" } else { "(?s)" };
    Regex::new(&format!("{}^(?:{})$", flags, body)).ok()
}

fn compile_search(pattern: &str, opts: PatternOpts) -> Option<Regex> {
    let body = translate(pattern, opts)?;
    let flags = if opts.case_insensitive { "(?is)" } else { "(?s)" };
    Regex::new(&format!("{}(?:{})", flags, body)).ok()
}

/// Full-string shell pattern match.
pub fn matches_pattern(text: &str, pattern: &str, opts: PatternOpts) -> bool {
    // A whole `!(...)` pattern inverts its body.
    if opts.extglob && pattern.starts_with("!(") && pattern.ends_with(')') {
        let chars: Vec<char> = pattern.chars().collect();
        if find_group_end(&chars, 1) == Some(chars.len() - 1) {
            let inner: String = chars[2..chars.len() - 1].iter().collect();
            let any = split_alternatives(&inner.chars().collect::<Vec<_>>())
                .iter()
                .any(|alt| {
                    let alt: String = alt.iter().collect();
                    matches_pattern(text, &alt, opts)
                });
            return !any;
        }
    }
    match compile_full(pattern, opts) {
        Some(re) => re.is_match(text),
        None => unescape_glob(pattern) == text,
    }
}

/// `${x#p}` / `${x##p}` / `${x%p}` / `${x%%p}` support.
pub fn remove_pattern(
    value: &str,
    pattern: &str,
    suffix: bool,
    greedy: bool,
    opts: PatternOpts,
) -> String {
    let Some(re) = compile_full(pattern, opts) else {
        return value.to_string();
    };
    let indices: Vec<usize> = {
        let mut ix: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
        ix.push(value.len());
        ix
    };
    if suffix {
        // Shortest suffix = rightmost start; longest = leftmost start.
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(indices.iter())
        } else {
            Box::new(indices.iter().rev())
        };
        for &i in order {
            if re.is_match(&value[i..]) {
                return value[..i].to_string();
            }
        }
    } else {
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(indices.iter().rev())
        } else {
            Box::new(indices.iter())
        };
        for &i in order {
            if re.is_match(&value[..i]) {
                return value[i..].to_string();
            }
        }
    }
    value.to_string()
}

/// `${x/p/r}` family.
pub fn replace_pattern(
    value: &str,
    pattern: &str,
    replacement: &str,
    all: bool,
    anchor: PatternAnchor,
    opts: PatternOpts,
) -> String {
    // Empty patterns never match; guards the infinite zero-length replace.
    if pattern.is_empty() {
        return value.to_string();
    }
    match anchor {
        PatternAnchor::Start => {
            let Some(re) = compile_full(pattern, opts) else {
                return value.to_string();
            };
            let indices: Vec<usize> = {
                let mut ix: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
                ix.push(value.len());
                ix
            };
            for &i in indices.iter().rev() {
                if re.is_match(&value[..i]) {
                    return format!("{}{}", replacement, &value[i..]);
                }
            }
            value.to_string()
        }
        PatternAnchor::End => {
            let Some(re) = compile_full(pattern, opts) else {
                return value.to_string();
            };
            let indices: Vec<usize> = {
                let mut ix: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
                ix.push(value.len());
                ix
            };
            for &i in indices.iter() {
                if re.is_match(&value[i..]) {
                    return format!("{}{}", &value[..i], replacement);
                }
            }
            value.to_string()
        }
        PatternAnchor::None => {
            let Some(re) = compile_search(pattern, opts) else {
                return value.to_string();
            };
            let mut out = String::new();
            let mut pos = 0usize;
            let mut replaced = false;
            while pos <= value.len() {
                let Some(m) = re.find(&value[pos..]) else { break };
                let (start, end) = (pos + m.start(), pos + m.end());
                if start == end {
                    // Zero-length match: skip it at end of input, otherwise
                    // step over one character.
                    if end >= value.len() {
                        break;
                    }
                    let step = value[end..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                    out.push_str(&value[pos..end + step]);
                    pos = end + step;
                    continue;
                }
                out.push_str(&value[pos..start]);
                out.push_str(replacement);
                replaced = true;
                pos = end;
                if !all {
                    break;
                }
            }
            if !replaced {
                return value.to_string();
            }
            out.push_str(&value[pos..]);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> PatternOpts {
        PatternOpts::default()
    }

    fn ext() -> PatternOpts {
        PatternOpts {
            extglob: true,
            ..Default::default()
        }
    }

    #[test]
    fn basic_globs() {
        assert!(matches_pattern("file.txt", "*.txt", opts()));
        assert!(matches_pattern("a", "?", opts()));
        assert!(!matches_pattern("ab", "?", opts()));
        assert!(matches_pattern("b", "[abc]", opts()));
        assert!(!matches_pattern("d", "[abc]", opts()));
        assert!(matches_pattern("d", "[!abc]", opts()));
        assert!(matches_pattern("5", "[0-9]", opts()));
    }

    #[test]
    fn posix_classes() {
        assert!(matches_pattern("x", "[[:alpha:]]", opts()));
        assert!(!matches_pattern("1", "[[:alpha:]]", opts()));
        assert!(matches_pattern("1", "[[:digit:]]", opts()));
    }

    #[test]
    fn escaped_metachars_are_literal() {
        assert!(matches_pattern("*", "\\*", opts()));
        assert!(!matches_pattern("x", "\\*", opts()));
    }

    #[test]
    fn extglob_groups() {
        assert!(matches_pattern("foo", "@(foo|bar)", ext()));
        assert!(matches_pattern("foofoo", "+(foo)", ext()));
        assert!(matches_pattern("", "*(foo)", ext()));
        assert!(matches_pattern("x", "?(x)", ext()));
        assert!(matches_pattern("baz", "!(foo|bar)", ext()));
        assert!(!matches_pattern("foo", "!(foo|bar)", ext()));
    }

    #[test]
    fn invalid_class_falls_back_to_literal() {
        // [z-a] does not compile; the original value survives removal.
        assert_eq!(remove_pattern("abc", "[z-a]", false, false, opts()), "abc");
    }

    #[test]
    fn prefix_suffix_removal() {
        let v = "/path/to/file.tar.gz";
        assert_eq!(remove_pattern(v, "*/", false, true, opts()), "file.tar.gz");
        assert_eq!(remove_pattern(v, "*/", false, false, opts()), "path/to/file.tar.gz");
        assert_eq!(remove_pattern(v, ".*", true, false, opts()), "/path/to/file.tar");
        assert_eq!(remove_pattern(v, ".*", true, true, opts()), "/path/to/file");
    }

    #[test]
    fn replacement_forms() {
        assert_eq!(
            replace_pattern("/a/b/c", "/", "_", true, PatternAnchor::None, opts()),
            "_a_b_c"
        );
        assert_eq!(
            replace_pattern("aaa", "a", "b", false, PatternAnchor::None, opts()),
            "baa"
        );
        assert_eq!(
            replace_pattern("abcabc", "abc", "X", false, PatternAnchor::Start, opts()),
            "Xabc"
        );
        assert_eq!(
            replace_pattern("abcabc", "abc", "X", false, PatternAnchor::End, opts()),
            "abcX"
        );
        // Empty pattern is a no-op.
        assert_eq!(
            replace_pattern("abc", "", "X", true, PatternAnchor::None, opts()),
            "abc"
        );
    }

    #[test]
    fn case_insensitive_match() {
        let ci = PatternOpts {
            case_insensitive: true,
            ..Default::default()
        };
        assert!(matches_pattern("FOO", "foo", ci));
        assert!(!matches_pattern("FOO", "foo", opts()));
    }

    #[test]
    fn glob_escape_roundtrip() {
        let raw = "a*b?c[d]";
        let escaped = escape_glob(raw);
        assert!(!has_glob_chars(&escaped, true));
        assert_eq!(unescape_glob(&escaped), raw);
        assert!(matches_pattern(raw, &escaped, opts()));
    }
}
