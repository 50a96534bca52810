//! Word-part parsing.
//!
//! The lexer hands over word tokens with quoting preserved verbatim; this
//! module re-reads that text into typed word parts: quoted runs, escapes,
//! `$`-expansions (including the full `${...}` operator table), tilde
//! prefixes, brace-expansion items, and glob runs. Heredoc bodies and
//! double-quote interiors share the same machinery under a quote mode.

use crate::ast::{
    BraceItem, CommandSubstPart, ParamOp, ParameterPart, PatternAnchor, RangeEndpoint,
    TransformKind, WordNode, WordPart,
};
use crate::parser::arith::parse_arith;
use crate::parser::lexer::{dollar_dparen_is_subshell, is_name, scan_command_subst, scan_param_brace};
use crate::parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteMode {
    /// Top-level word text: quotes, tilde, braces, and globs are active.
    Unquoted,
    /// Inside double quotes: only `$`, backquotes, and a few escapes.
    Double,
    /// Heredoc body: like `Double` but quote characters are plain text.
    Heredoc,
}

/// Parse the text of a word token into a word node.
pub fn parse_word_text(text: &str, in_assignment: bool) -> Result<WordNode, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut p = WordReader {
        chars,
        pos: 0,
        in_assignment,
    };
    let parts = p.read_parts(QuoteMode::Unquoted, None)?;
    Ok(WordNode { parts })
}

/// Parse heredoc content: parameter/command/arithmetic expansion only.
pub fn parse_heredoc_text(text: &str) -> Result<WordNode, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut p = WordReader {
        chars,
        pos: 0,
        in_assignment: false,
    };
    let parts = p.read_parts(QuoteMode::Heredoc, None)?;
    Ok(WordNode { parts })
}

struct WordReader {
    chars: Vec<char>,
    pos: usize,
    in_assignment: bool,
}

impl WordReader {
    fn at(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    fn cur(&self) -> Option<char> {
        self.at(self.pos)
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.at(self.pos + n)
    }

    /// Read parts until end of input or the `until` character (used for the
    /// closing double quote).
    fn read_parts(
        &mut self,
        mode: QuoteMode,
        until: Option<char>,
    ) -> Result<Vec<WordPart>, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();

        macro_rules! flush {
            () => {
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
            };
        }

        while let Some(c) = self.cur() {
            if Some(c) == until {
                break;
            }

            if c == '$' {
                if let Some(part) = self.read_dollar(mode)? {
                    flush!();
                    parts.push(part);
                    continue;
                }
                literal.push('$');
                self.pos += 1;
                continue;
            }

            if c == '`' {
                flush!();
                parts.push(self.read_backquote()?);
                continue;
            }

            if c == '\\' {
                match self.peek(1) {
                    Some('\n') => {
                        self.pos += 2;
                        continue;
                    }
                    Some(next) => match mode {
                        QuoteMode::Unquoted => {
                            flush!();
                            parts.push(WordPart::Escaped(next.to_string()));
                            self.pos += 2;
                            continue;
                        }
                        QuoteMode::Double => {
                            if matches!(next, '"' | '\\' | '$' | '`') {
                                flush!();
                                parts.push(WordPart::Escaped(next.to_string()));
                            } else {
                                literal.push('\\');
                                literal.push(next);
                            }
                            self.pos += 2;
                            continue;
                        }
                        QuoteMode::Heredoc => {
                            if matches!(next, '\\' | '$' | '`') {
                                flush!();
                                parts.push(WordPart::Escaped(next.to_string()));
                            } else {
                                literal.push('\\');
                                literal.push(next);
                            }
                            self.pos += 2;
                            continue;
                        }
                    },
                    None => {
                        literal.push('\\');
                        self.pos += 1;
                        continue;
                    }
                }
            }

            if mode == QuoteMode::Unquoted {
                if c == '\'' {
                    flush!();
                    self.pos += 1;
                    let start = self.pos;
                    while self.cur().map_or(false, |c| c != '\'') {
                        self.pos += 1;
                    }
                    let content: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1; // closing quote; the lexer guaranteed it
                    parts.push(WordPart::SingleQuoted(content));
                    continue;
                }

                if c == '"' {
                    flush!();
                    self.pos += 1;
                    let inner = self.read_parts(QuoteMode::Double, Some('"'))?;
                    self.pos += 1;
                    parts.push(WordPart::DoubleQuoted(inner));
                    continue;
                }

                if c == '~' && self.tilde_position(parts.is_empty() && literal.is_empty()) {
                    if let Some((user, end)) = self.scan_tilde() {
                        flush!();
                        parts.push(WordPart::Tilde(user));
                        self.pos = end;
                        continue;
                    }
                }

                if c == '{' {
                    if let Some(part) = self.read_brace()? {
                        flush!();
                        parts.push(part);
                        continue;
                    }
                    literal.push('{');
                    self.pos += 1;
                    continue;
                }

                // Extglob group: operator char directly before `(`.
                if "@*+?!".contains(c) && self.peek(1) == Some('(') {
                    if let Some(close) = self.scan_extglob(self.pos + 1) {
                        flush!();
                        let pattern: String =
                            self.chars[self.pos..=close].iter().collect();
                        parts.push(WordPart::Glob(pattern));
                        self.pos = close + 1;
                        continue;
                    }
                }

                if c == '*' || c == '?' {
                    flush!();
                    parts.push(WordPart::Glob(c.to_string()));
                    self.pos += 1;
                    continue;
                }

                if c == '[' {
                    if let Some(close) = scan_glob_class(&self.chars, self.pos) {
                        flush!();
                        let pattern: String =
                            self.chars[self.pos..=close].iter().collect();
                        parts.push(WordPart::Glob(pattern));
                        self.pos = close + 1;
                        continue;
                    }
                }
            }

            literal.push(c);
            self.pos += 1;
        }

        if !literal.is_empty() {
            parts.push(WordPart::Literal(literal));
        }
        Ok(parts)
    }

    /// A tilde expands at the start of a word, and after `:` or the first
    /// `=` in assignment-like contexts (`PATH=~/bin:~/sbin`).
    fn tilde_position(&self, at_word_start: bool) -> bool {
        if at_word_start {
            return true;
        }
        if !self.in_assignment || self.pos == 0 {
            return false;
        }
        matches!(self.at(self.pos - 1), Some(':') | Some('='))
    }

    fn scan_tilde(&self) -> Option<(Option<String>, usize)> {
        let mut i = self.pos + 1;
        while self
            .at(i)
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            i += 1;
        }
        // The tilde prefix must be delimited by `/`, `:` (assignments), or
        // the end of the word; anything else keeps the `~` literal.
        match self.at(i) {
            None | Some('/') => {}
            Some(':') if self.in_assignment => {}
            _ => return None,
        }
        let user: String = self.chars[self.pos + 1..i].iter().collect();
        let user = if user.is_empty() { None } else { Some(user) };
        Some((user, i))
    }

    fn read_dollar(&mut self, mode: QuoteMode) -> Result<Option<WordPart>, ParseError> {
        let c1 = self.peek(1);

        match c1 {
            Some('\'') if mode == QuoteMode::Unquoted => {
                // $'...' ANSI-C quoting.
                let start = self.pos + 2;
                let mut i = start;
                while let Some(c) = self.at(i) {
                    if c == '\'' {
                        break;
                    }
                    if c == '\\' && self.at(i + 1).is_some() {
                        i += 1;
                    }
                    i += 1;
                }
                let body: String = self.chars[start..i].iter().collect();
                self.pos = i + 1;
                Ok(Some(WordPart::SingleQuoted(decode_ansi_c(&body))))
            }
            Some('"') if mode == QuoteMode::Unquoted => {
                // $"..." locale quoting behaves as plain double quotes.
                self.pos += 2;
                let inner = self.read_parts(QuoteMode::Double, Some('"'))?;
                self.pos += 1;
                Ok(Some(WordPart::DoubleQuoted(inner)))
            }
            Some('(') => {
                if self.peek(2) == Some('(')
                    && !dollar_dparen_is_subshell(&self.chars, self.pos + 2)
                {
                    // $(( ... )) arithmetic expansion.
                    if let Some((body, end)) = self.scan_dollar_arith() {
                        self.pos = end;
                        return Ok(Some(WordPart::Arithmetic(parse_arith(&body))));
                    }
                }
                let close = scan_command_subst(&self.chars, self.pos + 1).ok_or_else(|| {
                    ParseError::new("unexpected EOF while looking for matching `)'", 0, 0)
                })?;
                let body: String = self.chars[self.pos + 2..close].iter().collect();
                self.pos = close + 1;
                let script = crate::parser::parse(&body)?;
                Ok(Some(WordPart::CommandSubst(CommandSubstPart {
                    body: script,
                    backquoted: false,
                })))
            }
            Some('{') => {
                let close = scan_param_brace(&self.chars, self.pos + 1).map_err(|_| {
                    ParseError::new("unexpected EOF while looking for matching `}'", 0, 0)
                })?;
                let body: String = self.chars[self.pos + 2..close].iter().collect();
                self.pos = close + 1;
                Ok(Some(self.parse_param_body(&body)?))
            }
            Some('[') => {
                // $[...] old-style arithmetic.
                let mut depth = 0usize;
                let mut i = self.pos + 1;
                while let Some(c) = self.at(i) {
                    match c {
                        '[' => depth += 1,
                        ']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                let body: String = self.chars[self.pos + 2..i].iter().collect();
                self.pos = i + 1;
                Ok(Some(WordPart::Arithmetic(parse_arith(&body))))
            }
            Some(c) if c.is_ascii_digit() => {
                self.pos += 2;
                Ok(Some(WordPart::Parameter(ParameterPart {
                    parameter: c.to_string(),
                    op: None,
                })))
            }
            Some(c) if matches!(c, '?' | '#' | '$' | '!' | '@' | '*' | '-') => {
                self.pos += 2;
                Ok(Some(WordPart::Parameter(ParameterPart {
                    parameter: c.to_string(),
                    op: None,
                })))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos + 1;
                let mut i = start;
                while self
                    .at(i)
                    .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
                {
                    i += 1;
                }
                let name: String = self.chars[start..i].iter().collect();
                self.pos = i;
                Ok(Some(WordPart::Parameter(ParameterPart {
                    parameter: name,
                    op: None,
                })))
            }
            _ => Ok(None),
        }
    }

    /// Scan `$(( body ))`; returns (body, index after the closing parens).
    fn scan_dollar_arith(&self) -> Option<(String, usize)> {
        let mut depth = 2usize;
        let mut i = self.pos + 3;
        let body_start = i;
        let mut in_sq = false;
        let mut in_dq = false;
        while let Some(c) = self.at(i) {
            if in_sq {
                in_sq = c != '\'';
                i += 1;
                continue;
            }
            if in_dq {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                in_dq = c != '"';
                i += 1;
                continue;
            }
            match c {
                '\'' => in_sq = true,
                '"' => in_dq = true,
                '\\' => {
                    i += 2;
                    continue;
                }
                '(' => depth += 1,
                ')' => {
                    if depth == 2 && self.at(i + 1) == Some(')') {
                        let body: String = self.chars[body_start..i].iter().collect();
                        return Some((body, i + 2));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn read_backquote(&mut self) -> Result<WordPart, ParseError> {
        self.pos += 1;
        let mut body = String::new();
        while let Some(c) = self.cur() {
            if c == '`' {
                self.pos += 1;
                break;
            }
            if c == '\\' {
                match self.peek(1) {
                    // Inside backquotes, backslash quotes `$`, backquote,
                    // and backslash itself; everything else is literal.
                    Some(n @ ('$' | '`' | '\\')) => {
                        body.push(n);
                        self.pos += 2;
                        continue;
                    }
                    _ => {}
                }
            }
            body.push(c);
            self.pos += 1;
        }
        let script = crate::parser::parse(&body)?;
        Ok(WordPart::CommandSubst(CommandSubstPart {
            body: script,
            backquoted: true,
        }))
    }

    fn scan_extglob(&self, open: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut i = open + 1;
        while let Some(c) = self.at(i) {
            match c {
                '\\' if self.at(i + 1).is_some() => {
                    i += 2;
                    continue;
                }
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

    // -----------------------------------------------------------------
    // Brace expansion
    // -----------------------------------------------------------------

    fn read_brace(&mut self) -> Result<Option<WordPart>, ParseError> {
        let close = match self.scan_brace(self.pos) {
            Some(c) => c,
            None => return Ok(None),
        };
        let content: String = self.chars[self.pos + 1..close].iter().collect();

        if let Some(range) = parse_brace_range(&content) {
            self.pos = close + 1;
            return Ok(Some(WordPart::Brace(vec![range])));
        }

        let pieces = split_brace_items(&content);
        if pieces.len() < 2 {
            return Ok(None);
        }
        let mut items = Vec::with_capacity(pieces.len());
        for piece in pieces {
            items.push(BraceItem::Word(parse_word_text(&piece, false)?));
        }
        self.pos = close + 1;
        Ok(Some(WordPart::Brace(items)))
    }

    /// Find the matching `}` for a brace at `open`, or None when the brace
    /// is not a well-formed expansion candidate.
    fn scan_brace(&self, open: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut i = open + 1;
        let mut in_sq = false;
        let mut in_dq = false;
        while let Some(c) = self.at(i) {
            if in_sq {
                in_sq = c != '\'';
                i += 1;
                continue;
            }
            if in_dq {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                in_dq = c != '"';
                i += 1;
                continue;
            }
            match c {
                '\'' => in_sq = true,
                '"' => in_dq = true,
                '\\' if self.at(i + 1).is_some() => {
                    i += 2;
                    continue;
                }
                '$' if self.at(i + 1) == Some('{') => {
                    // Skip ${...} bodies entirely.
                    match scan_param_brace(&self.chars, i + 1) {
                        Ok(end) => {
                            i = end + 1;
                            continue;
                        }
                        Err(_) => return None,
                    }
                }
                '{' => depth += 1,
                '}' => {
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

    // -----------------------------------------------------------------
    // ${...} operator parsing
    // -----------------------------------------------------------------

    fn parse_param_body(&self, body: &str) -> Result<WordPart, ParseError> {
        let bad = |text: &str| {
            WordPart::Parameter(ParameterPart {
                parameter: String::new(),
                op: Some(ParamOp::BadSubstitution {
                    text: format!("${{{}}}", text),
                }),
            })
        };

        if body.is_empty() {
            return Ok(bad(body));
        }
        let chars: Vec<char> = body.chars().collect();

        // ${!...}: indirection, array keys, or name prefixes.
        if chars[0] == '!' && chars.len() > 1 {
            let rest: String = chars[1..].iter().collect();
            let rchars: Vec<char> = rest.chars().collect();
            if let Some((param, after)) = scan_parameter(&rchars) {
                let tail: String = rchars[after..].iter().collect();
                if tail.is_empty() {
                    if let Some(base) = param.strip_suffix("[@]") {
                        return Ok(WordPart::Parameter(ParameterPart {
                            parameter: base.to_string(),
                            op: Some(ParamOp::ArrayKeys { star: false }),
                        }));
                    }
                    if let Some(base) = param.strip_suffix("[*]") {
                        return Ok(WordPart::Parameter(ParameterPart {
                            parameter: base.to_string(),
                            op: Some(ParamOp::ArrayKeys { star: true }),
                        }));
                    }
                    return Ok(WordPart::Parameter(ParameterPart {
                        parameter: param,
                        op: Some(ParamOp::Indirection { inner: None }),
                    }));
                }
                if tail == "*" || tail == "@" {
                    if is_name(&param) {
                        return Ok(WordPart::Parameter(ParameterPart {
                            parameter: param,
                            op: Some(ParamOp::NamePrefix { star: tail == "*" }),
                        }));
                    }
                }
                // ${!x<op>}: apply <op> through the indirection.
                match self.parse_operator(&tail)? {
                    Some(op) => {
                        return Ok(WordPart::Parameter(ParameterPart {
                            parameter: param,
                            op: Some(ParamOp::Indirection {
                                inner: Some(Box::new(op)),
                            }),
                        }))
                    }
                    None => return Ok(bad(body)),
                }
            }
            return Ok(bad(body));
        }

        // ${#...}: length forms.
        if chars[0] == '#' {
            if chars.len() == 1 {
                return Ok(WordPart::Parameter(ParameterPart {
                    parameter: "#".to_string(),
                    op: None,
                }));
            }
            let rest: Vec<char> = chars[1..].to_vec();
            if let Some((param, after)) = scan_parameter(&rest) {
                if after == rest.len() {
                    return Ok(WordPart::Parameter(ParameterPart {
                        parameter: param,
                        op: Some(ParamOp::Length),
                    }));
                }
                return Ok(WordPart::Parameter(ParameterPart {
                    parameter: param,
                    op: Some(ParamOp::LengthSlice),
                }));
            }
            return Ok(bad(body));
        }

        let (parameter, after) = match scan_parameter(&chars) {
            Some(p) => p,
            None => return Ok(bad(body)),
        };
        let rest: String = chars[after..].iter().collect();
        if rest.is_empty() {
            return Ok(WordPart::Parameter(ParameterPart {
                parameter,
                op: None,
            }));
        }
        match self.parse_operator(&rest)? {
            Some(op) => Ok(WordPart::Parameter(ParameterPart {
                parameter,
                op: Some(op),
            })),
            None => Ok(bad(body)),
        }
    }

    fn parse_operator(&self, rest: &str) -> Result<Option<ParamOp>, ParseError> {
        let chars: Vec<char> = rest.chars().collect();
        let arg = |s: &str| parse_word_text(s, false);

        match chars[0] {
            ':' => match chars.get(1) {
                Some('-') => Ok(Some(ParamOp::Default {
                    word: arg(&rest[2..])?,
                    check_empty: true,
                })),
                Some('=') => Ok(Some(ParamOp::AssignDefault {
                    word: arg(&rest[2..])?,
                    check_empty: true,
                })),
                Some('?') => Ok(Some(ParamOp::ErrorIfUnset {
                    word: if rest.len() > 2 {
                        Some(arg(&rest[2..])?)
                    } else {
                        None
                    },
                    check_empty: true,
                })),
                Some('+') => Ok(Some(ParamOp::Alternative {
                    word: arg(&rest[2..])?,
                    check_empty: true,
                })),
                _ => {
                    // Substring: ${x:offset} or ${x:offset:length}.
                    let body: String = chars[1..].iter().collect();
                    let (offset_text, length_text) = split_substring_args(&body);
                    let offset = parse_arith(&offset_text);
                    let length = length_text.map(|t| parse_arith(&t));
                    Ok(Some(ParamOp::Substring { offset, length }))
                }
            },
            '-' => Ok(Some(ParamOp::Default {
                word: arg(&rest[1..])?,
                check_empty: false,
            })),
            '=' => Ok(Some(ParamOp::AssignDefault {
                word: arg(&rest[1..])?,
                check_empty: false,
            })),
            '?' => Ok(Some(ParamOp::ErrorIfUnset {
                word: if rest.len() > 1 {
                    Some(arg(&rest[1..])?)
                } else {
                    None
                },
                check_empty: false,
            })),
            '+' => Ok(Some(ParamOp::Alternative {
                word: arg(&rest[1..])?,
                check_empty: false,
            })),
            '#' => {
                let greedy = chars.get(1) == Some(&'#');
                let skip = if greedy { 2 } else { 1 };
                let pattern_text: String = chars[skip..].iter().collect();
                Ok(Some(ParamOp::RemovePattern {
                    pattern: arg(&pattern_text)?,
                    suffix: false,
                    greedy,
                }))
            }
            '%' => {
                let greedy = chars.get(1) == Some(&'%');
                let skip = if greedy { 2 } else { 1 };
                let pattern_text: String = chars[skip..].iter().collect();
                Ok(Some(ParamOp::RemovePattern {
                    pattern: arg(&pattern_text)?,
                    suffix: true,
                    greedy,
                }))
            }
            '/' => {
                let mut i = 1;
                let all = chars.get(1) == Some(&'/');
                if all {
                    i += 1;
                }
                let anchor = match chars.get(i) {
                    Some('#') => {
                        i += 1;
                        PatternAnchor::Start
                    }
                    Some('%') => {
                        i += 1;
                        PatternAnchor::End
                    }
                    _ => PatternAnchor::None,
                };
                let (pattern_text, replacement_text) = split_replacement(&chars[i..]);
                let replacement = match replacement_text {
                    Some(t) => Some(arg(&t)?),
                    None => None,
                };
                Ok(Some(ParamOp::ReplacePattern {
                    pattern: arg(&pattern_text)?,
                    replacement,
                    all,
                    anchor,
                }))
            }
            '^' => {
                let all = chars.get(1) == Some(&'^');
                let skip = if all { 2 } else { 1 };
                let pattern_text: String = chars[skip..].iter().collect();
                let pattern = if pattern_text.is_empty() {
                    None
                } else {
                    Some(arg(&pattern_text)?)
                };
                Ok(Some(ParamOp::CaseMod {
                    upper: true,
                    all,
                    pattern,
                }))
            }
            ',' => {
                let all = chars.get(1) == Some(&',');
                let skip = if all { 2 } else { 1 };
                let pattern_text: String = chars[skip..].iter().collect();
                let pattern = if pattern_text.is_empty() {
                    None
                } else {
                    Some(arg(&pattern_text)?)
                };
                Ok(Some(ParamOp::CaseMod {
                    upper: false,
                    all,
                    pattern,
                }))
            }
            '@' => {
                if chars.len() != 2 {
                    return Ok(None);
                }
                let kind = match chars[1] {
                    'Q' => TransformKind::Quote,
                    'E' => TransformKind::Escape,
                    'P' => TransformKind::Prompt,
                    'A' => TransformKind::Assignment,
                    'a' => TransformKind::Attributes,
                    'K' | 'k' => TransformKind::Keys,
                    'U' => TransformKind::Upper,
                    'L' => TransformKind::Lower,
                    'u' => TransformKind::UpperFirst,
                    _ => return Ok(None),
                };
                Ok(Some(ParamOp::Transform(kind)))
            }
            _ => Ok(None),
        }
    }
}

/// Scan a parameter name at the start of `chars`: a NAME (optionally with a
/// balanced `[subscript]`), a positional digit run, or a special character.
/// Returns the parameter text (subscript included) and the end index.
fn scan_parameter(chars: &[char]) -> Option<(String, usize)> {
    let c0 = *chars.first()?;
    if c0.is_ascii_digit() {
        let mut i = 0;
        while chars.get(i).map_or(false, |c| c.is_ascii_digit()) {
            i += 1;
        }
        return Some((chars[..i].iter().collect(), i));
    }
    if matches!(c0, '?' | '#' | '$' | '!' | '@' | '*' | '-') {
        return Some((c0.to_string(), 1));
    }
    if !(c0.is_ascii_alphabetic() || c0 == '_') {
        return None;
    }
    let mut i = 1;
    while chars.get(i).map_or(false, |c| c.is_ascii_alphanumeric() || *c == '_') {
        i += 1;
    }
    if chars.get(i) == Some(&'[') {
        let mut depth = 0usize;
        let mut j = i;
        while let Some(&c) = chars.get(j) {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((chars[..=j].iter().collect(), j + 1));
                    }
                }
                _ => {}
            }
            j += 1;
        }
        return None;
    }
    Some((chars[..i].iter().collect(), i))
}

/// Split `offset[:length]` at the top-level colon, ignoring colons that
/// belong to a `?:` ternary or sit inside parens/brackets.
fn split_substring_args(body: &str) -> (String, Option<String>) {
    let chars: Vec<char> = body.chars().collect();
    let mut depth = 0usize;
    let mut ternary = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '?' if depth == 0 => ternary += 1,
            ':' if depth == 0 => {
                if ternary > 0 {
                    ternary -= 1;
                } else {
                    return (
                        chars[..i].iter().collect(),
                        Some(chars[i + 1..].iter().collect()),
                    );
                }
            }
            _ => {}
        }
    }
    (body.to_string(), None)
}

/// Split `pattern[/replacement]` at the first unquoted `/` that is not part
/// of an extglob group. A leading `/` belongs to the pattern.
fn split_replacement(chars: &[char]) -> (String, Option<String>) {
    let mut i = 0;
    let mut consumed_any = false;
    let mut depth = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if i + 1 < chars.len() => {
                i += 2;
                consumed_any = true;
                continue;
            }
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
                consumed_any = true;
                continue;
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                consumed_any = true;
                continue;
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '/' if depth == 0 && consumed_any => {
                return (
                    chars[..i].iter().collect(),
                    Some(chars[i + 1..].iter().collect()),
                );
            }
            _ => {}
        }
        consumed_any = true;
        i += 1;
    }
    (chars.iter().collect(), None)
}

/// Split brace content on top-level commas (quote- and brace-aware).
fn split_brace_items(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_sq = false;
    let mut in_dq = false;
    let mut i = 0;
    let mut had_comma = false;
    while i < chars.len() {
        let c = chars[i];
        if in_sq {
            current.push(c);
            in_sq = c != '\'';
            i += 1;
            continue;
        }
        if in_dq {
            current.push(c);
            if c == '\\' && i + 1 < chars.len() {
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            in_dq = c != '"';
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_sq = true;
                current.push(c);
            }
            '"' => {
                in_dq = true;
                current.push(c);
            }
            '\\' if i + 1 < chars.len() => {
                current.push(c);
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                had_comma = true;
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
        i += 1;
    }
    items.push(current);
    if !had_comma {
        return vec![];
    }
    items
}

/// Recognize `{start..end[..step]}` content as a range item.
fn parse_brace_range(content: &str) -> Option<BraceItem> {
    let pieces: Vec<&str> = content.split("..").collect();
    if pieces.len() != 2 && pieces.len() != 3 {
        return None;
    }
    let step = if pieces.len() == 3 {
        Some(pieces[2].parse::<i64>().ok()?)
    } else {
        None
    };
    let (start_text, end_text) = (pieces[0], pieces[1]);

    let as_int = |s: &str| -> Option<i64> {
        if s.is_empty() {
            return None;
        }
        s.parse::<i64>().ok()
    };
    let as_char = |s: &str| -> Option<char> {
        let mut it = s.chars();
        let c = it.next()?;
        if it.next().is_some() || c.is_ascii_digit() {
            return None;
        }
        Some(c)
    };

    if let (Some(a), Some(b)) = (as_int(start_text), as_int(end_text)) {
        return Some(BraceItem::Range {
            start: RangeEndpoint::Int(a),
            end: RangeEndpoint::Int(b),
            step,
            start_text: start_text.to_string(),
            end_text: end_text.to_string(),
        });
    }
    if let (Some(a), Some(b)) = (as_char(start_text), as_char(end_text)) {
        if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() {
            // Mixed-case ranges are invalid; the brace stays literal.
            if a.is_ascii_lowercase() != b.is_ascii_lowercase() {
                return None;
            }
            return Some(BraceItem::Range {
                start: RangeEndpoint::Char(a),
                end: RangeEndpoint::Char(b),
                step,
                start_text: start_text.to_string(),
                end_text: end_text.to_string(),
            });
        }
    }
    None
}

/// Find the closing `]` of a glob character class; `]` directly after the
/// opening (or after `^`/`!`) is literal, and POSIX `[:class:]` atoms are
/// skipped whole.
pub fn scan_glob_class(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if matches!(chars.get(i), Some('^') | Some('!')) {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while let Some(&c) = chars.get(i) {
        match c {
            '[' if chars.get(i + 1) == Some(&':') => {
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == ':' && chars[j + 1] == ']') {
                    j += 1;
                }
                if j + 1 >= chars.len() {
                    return None;
                }
                i = j + 2;
            }
            ']' => return Some(i),
            '\n' => return None,
            _ => i += 1,
        }
    }
    None
}

/// Decode `$'...'` escape sequences.
pub fn decode_ansi_c(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' || i + 1 >= chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let e = chars[i + 1];
        i += 2;
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' | 'E' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '?' => out.push('?'),
            'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    out.push_str("\\x");
                } else if let Some(ch) = char::from_u32(value) {
                    out.push(ch);
                }
            }
            'u' | 'U' => {
                let max = if e == 'u' { 4 } else { 8 };
                let mut value = 0u32;
                let mut digits = 0;
                while digits < max {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    out.push('\\');
                    out.push(e);
                } else if let Some(ch) = char::from_u32(value) {
                    out.push(ch);
                }
            }
            '0'..='7' => {
                let mut value = e.to_digit(8).unwrap();
                let mut digits = 1;
                while digits < 3 {
                    match chars.get(i).and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if let Some(ch) = char::from_u32(value) {
                    out.push(ch);
                }
            }
            'c' => {
                if let Some(&ctl) = chars.get(i) {
                    i += 1;
                    let code = (ctl.to_ascii_uppercase() as u32) ^ 0x40;
                    if let Some(ch) = char::from_u32(code) {
                        out.push(ch);
                    }
                } else {
                    out.push_str("\\c");
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<WordPart> {
        parse_word_text(text, false).unwrap().parts
    }

    #[test]
    fn plain_literal() {
        assert_eq!(parse("hello"), vec![WordPart::Literal("hello".into())]);
    }

    #[test]
    fn quoting_forms() {
        assert_eq!(parse("'a b'"), vec![WordPart::SingleQuoted("a b".into())]);
        let parts = parse("\"x $y\"");
        match &parts[0] {
            WordPart::DoubleQuoted(inner) => {
                assert_eq!(inner[0], WordPart::Literal("x ".into()));
                assert!(matches!(inner[1], WordPart::Parameter(_)));
            }
            other => panic!("expected double-quoted part, got {:?}", other),
        }
    }

    #[test]
    fn escape_in_double_quotes() {
        let parts = parse("\"a\\$b\\nc\"");
        match &parts[0] {
            WordPart::DoubleQuoted(inner) => {
                assert_eq!(
                    inner,
                    &vec![
                        WordPart::Literal("a".into()),
                        WordPart::Escaped("$".into()),
                        WordPart::Literal("b\\nc".into()),
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn simple_parameter() {
        assert_eq!(
            parse("$HOME"),
            vec![WordPart::Parameter(ParameterPart {
                parameter: "HOME".into(),
                op: None
            })]
        );
        // $10 is ${1}0
        let parts = parse("$10");
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], WordPart::Parameter(p) if p.parameter == "1"));
        assert_eq!(parts[1], WordPart::Literal("0".into()));
    }

    #[test]
    fn param_default_op() {
        let parts = parse("${x:-fallback}");
        match &parts[0] {
            WordPart::Parameter(p) => {
                assert_eq!(p.parameter, "x");
                match &p.op {
                    Some(ParamOp::Default { word, check_empty }) => {
                        assert!(*check_empty);
                        assert_eq!(word.as_literal().as_deref(), Some("fallback"));
                    }
                    other => panic!("unexpected op {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn param_pattern_ops() {
        match &parse("${v##*/}")[0] {
            WordPart::Parameter(p) => match &p.op {
                Some(ParamOp::RemovePattern { suffix, greedy, .. }) => {
                    assert!(!suffix);
                    assert!(greedy);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        match &parse("${v//\\//_}")[0] {
            WordPart::Parameter(p) => match &p.op {
                Some(ParamOp::ReplacePattern { all, .. }) => assert!(*all),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn param_length_and_slice_error() {
        match &parse("${#name}")[0] {
            WordPart::Parameter(p) => {
                assert_eq!(p.parameter, "name");
                assert_eq!(p.op, Some(ParamOp::Length));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &parse("${#name:1}")[0] {
            WordPart::Parameter(p) => assert_eq!(p.op, Some(ParamOp::LengthSlice)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn param_indirection_and_prefix() {
        match &parse("${!ref}")[0] {
            WordPart::Parameter(p) => {
                assert_eq!(p.parameter, "ref");
                assert_eq!(p.op, Some(ParamOp::Indirection { inner: None }));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &parse("${!BASH*}")[0] {
            WordPart::Parameter(p) => {
                assert_eq!(p.op, Some(ParamOp::NamePrefix { star: true }));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &parse("${!arr[@]}")[0] {
            WordPart::Parameter(p) => {
                assert_eq!(p.parameter, "arr");
                assert_eq!(p.op, Some(ParamOp::ArrayKeys { star: false }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn substring_with_ternary_colon() {
        match &parse("${x:1:2}")[0] {
            WordPart::Parameter(p) => match &p.op {
                Some(ParamOp::Substring { length, .. }) => assert!(length.is_some()),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn command_substitution() {
        let parts = parse("$(echo hi)");
        match &parts[0] {
            WordPart::CommandSubst(cs) => {
                assert!(!cs.backquoted);
                assert_eq!(cs.body.statements.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn backquote_substitution() {
        let parts = parse("`echo hi`");
        assert!(matches!(&parts[0], WordPart::CommandSubst(cs) if cs.backquoted));
    }

    #[test]
    fn arithmetic_expansion() {
        let parts = parse("$((1+2))");
        assert!(matches!(&parts[0], WordPart::Arithmetic(_)));
    }

    #[test]
    fn tilde_forms() {
        assert_eq!(parse("~"), vec![WordPart::Tilde(None)]);
        let parts = parse("~root/x");
        assert_eq!(parts[0], WordPart::Tilde(Some("root".into())));
        assert_eq!(parts[1], WordPart::Literal("/x".into()));
        // Mid-word tilde stays literal.
        assert_eq!(parse("a~b"), vec![WordPart::Literal("a~b".into())]);
    }

    #[test]
    fn brace_items() {
        let parts = parse("{a,b}");
        match &parts[0] {
            WordPart::Brace(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        // Range with padding text preserved.
        match &parse("{01..05..2}")[0] {
            WordPart::Brace(items) => match &items[0] {
                BraceItem::Range {
                    start_text, step, ..
                } => {
                    assert_eq!(start_text, "01");
                    assert_eq!(*step, Some(2));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_brace_is_literal() {
        assert_eq!(parse("{abc}"), vec![WordPart::Literal("{abc}".into())]);
        // Mixed-case range stays literal.
        assert_eq!(parse("{a..Z}"), vec![WordPart::Literal("{a..Z}".into())]);
    }

    #[test]
    fn glob_parts() {
        let parts = parse("*.txt");
        assert_eq!(parts[0], WordPart::Glob("*".into()));
        assert_eq!(parts[1], WordPart::Literal(".txt".into()));
        let parts = parse("[a-z]x");
        assert_eq!(parts[0], WordPart::Glob("[a-z]".into()));
        let parts = parse("@(a|b)");
        assert_eq!(parts[0], WordPart::Glob("@(a|b)".into()));
    }

    #[test]
    fn ansi_c_quoting() {
        assert_eq!(parse("$'a\\tb'"), vec![WordPart::SingleQuoted("a\tb".into())]);
        assert_eq!(decode_ansi_c("\\x41\\n"), "A\n");
        assert_eq!(decode_ansi_c("\\101"), "A");
    }

    #[test]
    fn heredoc_text_keeps_quotes() {
        let word = parse_heredoc_text("say \"$x\" 'y'").unwrap();
        assert!(word
            .parts
            .iter()
            .any(|p| matches!(p, WordPart::Parameter(_))));
        assert!(word
            .parts
            .iter()
            .any(|p| matches!(p, WordPart::Literal(t) if t.contains('\''))));
    }

    #[test]
    fn bad_substitution_is_deferred() {
        match &parse("${x@Z}")[0] {
            WordPart::Parameter(p) => {
                assert!(matches!(p.op, Some(ParamOp::BadSubstitution { .. })))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
