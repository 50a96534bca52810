//! Context-sensitive lexer.
//!
//! Tokenizes bash source into operators, reserved words, and word tokens.
//! Quoting is preserved verbatim in word values; the word parser strips
//! quotes while building word parts. The lexer tracks the context that
//! changes a character's meaning: pending heredocs (consumed after the next
//! newline), arithmetic `(( ))` bodies (captured raw, so `#`, `<<` and `;;`
//! lose their usual roles), `$(...)` nesting with `case` patterns, and the
//! lookahead that distinguishes `((` arithmetic from nested subshells.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,

    Newline,
    Semi,     // ;
    Amp,      // &

    Pipe,     // |
    PipeAmp,  // |&
    AndAnd,   // &&
    OrOr,     // ||
    Bang,     // !

    Less,      // <
    Great,     // >
    DGreat,    // >>
    DLess,     // <<
    DLessDash, // <<-
    TLess,     // <<<
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>

    LParen,
    RParen,
    LBrace,
    RBrace,

    DSemi,    // ;;
    SemiAnd,  // ;&
    DSemiAnd, // ;;&

    CondStart,  // [[
    CondEnd,    // ]]
    ArithStart, // ((
    ArithEnd,   // ))

    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    While,
    Until,
    Do,
    Done,
    Case,
    Esac,
    In,
    Function,
    Select,
    Time,
    Coproc,

    Word,
    Name,
    Number,
    Assignment,
    FdVar,

    Comment,
    HeredocBody,
}

impl TokenKind {
    pub fn is_redirection(self) -> bool {
        matches!(
            self,
            TokenKind::Less
                | TokenKind::Great
                | TokenKind::DGreat
                | TokenKind::DLess
                | TokenKind::DLessDash
                | TokenKind::TLess
                | TokenKind::LessAnd
                | TokenKind::GreatAnd
                | TokenKind::LessGreat
                | TokenKind::Clobber
                | TokenKind::AndGreat
                | TokenKind::AndDGreat
        )
    }

    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::Elif
                | TokenKind::Fi
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Until
                | TokenKind::Do
                | TokenKind::Done
                | TokenKind::Case
                | TokenKind::Esac
                | TokenKind::In
                | TokenKind::Function
                | TokenKind::Select
                | TokenKind::Time
                | TokenKind::Coproc
        )
    }

    /// Token kinds that can serve as a plain word position in a command.
    pub fn is_wordlike(self) -> bool {
        matches!(
            self,
            TokenKind::Word | TokenKind::Name | TokenKind::Number | TokenKind::Assignment
        ) || self.is_reserved()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// Whole token originated inside quotes.
    pub quoted: bool,
    /// Whole token is a single single-quoted string (disables expansion).
    pub single_quoted: bool,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, span: (usize, usize, usize, usize)) -> Self {
        let (start, end, line, column) = span;
        Self {
            kind,
            text: text.into(),
            start,
            end,
            line,
            column,
            quoted: false,
            single_quoted: false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

lazy_static::lazy_static! {
    static ref RESERVED: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("if", TokenKind::If);
        m.insert("then", TokenKind::Then);
        m.insert("else", TokenKind::Else);
        m.insert("elif", TokenKind::Elif);
        m.insert("fi", TokenKind::Fi);
        m.insert("for", TokenKind::For);
        m.insert("while", TokenKind::While);
        m.insert("until", TokenKind::Until);
        m.insert("do", TokenKind::Do);
        m.insert("done", TokenKind::Done);
        m.insert("case", TokenKind::Case);
        m.insert("esac", TokenKind::Esac);
        m.insert("in", TokenKind::In);
        m.insert("function", TokenKind::Function);
        m.insert("select", TokenKind::Select);
        m.insert("time", TokenKind::Time);
        m.insert("coproc", TokenKind::Coproc);
        m
    };
}

const THREE_CHAR_OPS: &[(&str, TokenKind)] = &[
    (";;&", TokenKind::DSemiAnd),
    ("<<<", TokenKind::TLess),
    ("&>>", TokenKind::AndDGreat),
];

const TWO_CHAR_OPS: &[(&str, TokenKind)] = &[
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    (";;", TokenKind::DSemi),
    (";&", TokenKind::SemiAnd),
    ("|&", TokenKind::PipeAmp),
    (">>", TokenKind::DGreat),
    ("<&", TokenKind::LessAnd),
    (">&", TokenKind::GreatAnd),
    ("<>", TokenKind::LessGreat),
    (">|", TokenKind::Clobber),
    ("&>", TokenKind::AndGreat),
];

pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn is_word_end(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

/// Locate an unquoted `=` (or the `=` of `+=`) outside any brackets.
fn assignment_eq_index(chars: &[char]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' if depth == 0 => return None,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// `name`, `name[subscript]` (brackets balanced), each optionally `+`-suffixed.
fn is_assignment_lhs(chars: &[char]) -> bool {
    if chars.is_empty() {
        return false;
    }
    if !(chars[0].is_ascii_alphabetic() || chars[0] == '_') {
        return false;
    }
    let mut i = 1;
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if i == chars.len() {
        return true;
    }
    if chars[i] == '+' && i + 1 == chars.len() {
        return true;
    }
    if chars[i] != '[' {
        return false;
    }
    let mut depth = 0usize;
    while i < chars.len() {
        match chars[i] {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let rest = &chars[i + 1..];
                    return rest.is_empty() || rest == ['+'];
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Scan the body of a `$(...)` command substitution starting just after the
/// opening paren. Tracks quotes, nested substitutions, comments, and
/// `case ... esac` nesting (whose `)` pattern terminators do not close the
/// substitution). Returns the index of the closing paren.
pub fn scan_command_subst(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = open + 1;
    let mut in_sq = false;
    let mut in_dq = false;
    let mut case_depth = 0usize;
    let mut in_case_pattern = false;
    let mut word = String::new();

    while i < chars.len() {
        let c = chars[i];
        if in_sq {
            if c == '\'' {
                in_sq = false;
            }
            i += 1;
            continue;
        }
        if in_dq {
            if c == '\\' && i + 1 < chars.len() {
                i += 2;
                continue;
            }
            if c == '"' {
                in_dq = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_sq = true;
                word.clear();
            }
            '"' => {
                in_dq = true;
                word.clear();
            }
            '\\' if i + 1 < chars.len() => {
                word.clear();
                i += 2;
                continue;
            }
            '`' => {
                // Backquoted substitution: skip to the closing backquote.
                i += 1;
                while i < chars.len() && chars[i] != '`' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    i += 1;
                }
                word.clear();
            }
            '#' if word.is_empty()
                && (i == open + 1 || chars[i - 1].is_whitespace()) =>
            {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                word.push(c);
            }
            _ => {
                match word.as_str() {
                    "case" => {
                        case_depth += 1;
                        in_case_pattern = false;
                    }
                    "in" if case_depth > 0 => in_case_pattern = true,
                    "esac" if case_depth > 0 => {
                        case_depth -= 1;
                        in_case_pattern = false;
                    }
                    _ => {}
                }
                word.clear();
                match c {
                    '(' => {
                        if i > 0 && chars[i - 1] == '$' {
                            depth += 1;
                        } else if !in_case_pattern {
                            depth += 1;
                        }
                    }
                    ')' => {
                        if in_case_pattern {
                            in_case_pattern = false;
                        } else {
                            depth -= 1;
                            if depth == 0 {
                                return Some(i);
                            }
                        }
                    }
                    ';' => {
                        if case_depth > 0 && chars.get(i + 1) == Some(&';') {
                            in_case_pattern = true;
                        }
                    }
                    _ => {}
                }
            }
        }
        i += 1;
    }
    None
}

/// Scan a `${...}` body starting just after the brace. Single and double
/// quotes must balance; an unterminated quote is a lex error. Returns the
/// index of the closing brace.
pub fn scan_param_brace(chars: &[char], open: usize) -> Result<usize, char> {
    let mut depth = 1usize;
    let mut i = open + 1;
    let mut in_sq = false;
    let mut in_dq = false;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() && !in_sq {
            i += 2;
            continue;
        }
        if in_sq {
            if c == '\'' {
                in_sq = false;
            }
        } else if in_dq {
            if c == '"' {
                in_dq = false;
            }
        } else {
            match c {
                '\'' => in_sq = true,
                '"' => in_dq = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    if in_sq {
        Err('\'')
    } else if in_dq {
        Err('"')
    } else {
        Err('{')
    }
}

/// Decide whether `$((` opens arithmetic or a `$( (subshell) )`. `open` is
/// the index of the second paren. Arithmetic iff the construct closes with
/// adjacent `))`.
pub fn dollar_dparen_is_subshell(chars: &[char], open: usize) -> bool {
    let mut i = open + 1;
    let mut depth = 2usize;
    let mut in_sq = false;
    let mut in_dq = false;
    let mut saw_newline = false;

    while i < chars.len() && depth > 0 {
        let c = chars[i];
        if in_sq {
            if c == '\'' {
                in_sq = false;
            }
            saw_newline |= c == '\n';
            i += 1;
            continue;
        }
        if in_dq {
            if c == '\\' && i + 1 < chars.len() {
                i += 2;
                continue;
            }
            if c == '"' {
                in_dq = false;
            }
            saw_newline |= c == '\n';
            i += 1;
            continue;
        }
        match c {
            '\'' => in_sq = true,
            '"' => in_dq = true,
            '\\' if i + 1 < chars.len() => {
                i += 2;
                continue;
            }
            '\n' => saw_newline = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 1 {
                    if chars.get(i + 1) == Some(&')') {
                        return false;
                    }
                    let mut j = i + 1;
                    let mut gap = false;
                    while matches!(chars.get(j), Some(' ' | '\t' | '\n')) {
                        gap = true;
                        j += 1;
                    }
                    if gap && chars.get(j) == Some(&')') {
                        return true;
                    }
                    if saw_newline {
                        return true;
                    }
                }
                if depth == 0 {
                    return false;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    pending_heredocs: VecDeque<PendingHeredoc>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            pending_heredocs: VecDeque::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.input.len() {
            if !self.pending_heredocs.is_empty()
                && self.tokens.last().map(|t| t.kind) == Some(TokenKind::Newline)
            {
                self.read_heredoc_bodies();
                continue;
            }

            self.skip_blanks();
            if self.pos >= self.input.len() {
                break;
            }
            let token = self.next_token()?;
            self.tokens.push(token);
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            (self.pos, self.pos, self.line, self.column),
        ));
        Ok(self.tokens)
    }

    fn at(&self, i: usize) -> Option<char> {
        self.input.get(i).copied()
    }

    fn cur(&self) -> Option<char> {
        self.at(self.pos)
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.at(self.pos + n)
    }

    fn bump(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(c) = self.cur() {
                self.pos += 1;
                if c == '\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            }
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.cur() {
                Some(' ' | '\t') => self.bump(1),
                Some('\\') if self.peek(1) == Some('\n') => self.bump(2),
                _ => break,
            }
        }
    }

    fn span_from(&self, start: usize, line: usize, column: usize) -> (usize, usize, usize, usize) {
        (start, self.pos, line, column)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let (start, line, column) = (self.pos, self.line, self.column);
        let c0 = self.cur().expect("next_token called at EOF");
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        if c0 == '#' {
            while !matches!(self.cur(), None | Some('\n')) {
                self.bump(1);
            }
            let text: String = self.input[start..self.pos].iter().collect();
            return Ok(Token::new(
                TokenKind::Comment,
                text,
                self.span_from(start, line, column),
            ));
        }

        if c0 == '\n' {
            self.bump(1);
            return Ok(Token::new(
                TokenKind::Newline,
                "\n",
                self.span_from(start, line, column),
            ));
        }

        // Heredoc operators register a pending body via lookahead.
        if c0 == '<' && c1 == Some('<') && c2 == Some('-') {
            self.bump(3);
            self.register_heredoc(true);
            return Ok(Token::new(
                TokenKind::DLessDash,
                "<<-",
                self.span_from(start, line, column),
            ));
        }
        if c0 == '<' && c1 == Some('<') && c2 != Some('<') {
            self.bump(2);
            self.register_heredoc(false);
            return Ok(Token::new(
                TokenKind::DLess,
                "<<",
                self.span_from(start, line, column),
            ));
        }

        for (op, kind) in THREE_CHAR_OPS {
            let oc: Vec<char> = op.chars().collect();
            if c0 == oc[0] && c1 == Some(oc[1]) && c2 == Some(oc[2]) {
                self.bump(3);
                return Ok(Token::new(*kind, *op, self.span_from(start, line, column)));
            }
        }

        // `((`: arithmetic start unless lookahead says nested subshells.
        if c0 == '(' && c1 == Some('(') {
            let after_for = matches!(
                self.tokens.last().map(|t| t.kind),
                Some(TokenKind::For)
            );
            if after_for || !self.dparen_is_subshell(self.pos + 2) {
                self.bump(2);
                return self.read_arith_body(start, line, column);
            }
            self.bump(1);
            return Ok(Token::new(
                TokenKind::LParen,
                "(",
                self.span_from(start, line, column),
            ));
        }

        // `[[` / `]]` at a word boundary.
        if c0 == '[' && c1 == Some('[') {
            if self.peek(2).map_or(true, is_word_end) {
                self.bump(2);
                return Ok(Token::new(
                    TokenKind::CondStart,
                    "[[",
                    self.span_from(start, line, column),
                ));
            }
        }
        if c0 == ']' && c1 == Some(']') {
            if self.peek(2).map_or(true, is_word_end) {
                self.bump(2);
                return Ok(Token::new(
                    TokenKind::CondEnd,
                    "]]",
                    self.span_from(start, line, column),
                ));
            }
        }

        for (op, kind) in TWO_CHAR_OPS {
            let oc: Vec<char> = op.chars().collect();
            if c0 == oc[0] && c1 == Some(oc[1]) {
                self.bump(2);
                return Ok(Token::new(*kind, *op, self.span_from(start, line, column)));
            }
        }

        match c0 {
            '|' | '&' | ';' | '(' | ')' | '<' | '>' => {
                let kind = match c0 {
                    '|' => TokenKind::Pipe,
                    '&' => TokenKind::Amp,
                    ';' => TokenKind::Semi,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '<' => TokenKind::Less,
                    _ => TokenKind::Great,
                };
                self.bump(1);
                return Ok(Token::new(
                    kind,
                    c0.to_string(),
                    self.span_from(start, line, column),
                ));
            }
            _ => {}
        }

        if c0 == '{' {
            if let Some((name, after_brace)) = self.scan_fd_variable(start) {
                let consumed = after_brace - start;
                self.bump(consumed);
                return Ok(Token::new(
                    TokenKind::FdVar,
                    name,
                    self.span_from(start, line, column),
                ));
            }
            // A lone `{` followed by whitespace opens a group; anything else
            // (brace expansion, `{}`, literal brace words) lexes as a word.
            if matches!(c1, Some(' ' | '\t' | '\n')) || c1.is_none() {
                self.bump(1);
                return Ok(Token::new(
                    TokenKind::LBrace,
                    "{",
                    self.span_from(start, line, column),
                ));
            }
            return self.read_word(start, line, column);
        }

        if c0 == '}' {
            let followed_by_word = self.peek(1).map_or(false, |c| !is_word_end(c));
            if !followed_by_word {
                self.bump(1);
                return Ok(Token::new(
                    TokenKind::RBrace,
                    "}",
                    self.span_from(start, line, column),
                ));
            }
            return self.read_word(start, line, column);
        }

        if c0 == '!' {
            if c1 == Some('=') {
                self.bump(2);
                return Ok(Token::new(
                    TokenKind::Word,
                    "!=",
                    self.span_from(start, line, column),
                ));
            }
            if c1.map_or(true, |c| is_word_end(c) || c == '!') {
                self.bump(1);
                return Ok(Token::new(
                    TokenKind::Bang,
                    "!",
                    self.span_from(start, line, column),
                ));
            }
            // `!(...)` extglob or history-ish words lex as words.
            if c1 != Some('(') {
                self.bump(1);
                return Ok(Token::new(
                    TokenKind::Bang,
                    "!",
                    self.span_from(start, line, column),
                ));
            }
            return self.read_word(start, line, column);
        }

        self.read_word(start, line, column)
    }

    /// Capture a raw `(( ... ))` body as [ArithStart, Word(body), ArithEnd].
    /// Inside the body `#`, `<<`, and `;;` have no lexical role, so the scan
    /// only balances parens and honors quoting.
    fn read_arith_body(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<Token, LexError> {
        let open_span = (start, self.pos, line, column);
        let body_start = self.pos;
        let (body_line, body_column) = (self.line, self.column);
        let mut depth = 2usize;
        let mut in_sq = false;
        let mut in_dq = false;

        while self.pos < self.input.len() {
            let c = self.cur().unwrap();
            if in_sq {
                if c == '\'' {
                    in_sq = false;
                }
                self.bump(1);
                continue;
            }
            if in_dq {
                if c == '\\' && self.peek(1).is_some() {
                    self.bump(2);
                    continue;
                }
                if c == '"' {
                    in_dq = false;
                }
                self.bump(1);
                continue;
            }
            match c {
                '\'' => in_sq = true,
                '"' => in_dq = true,
                '\\' if self.peek(1).is_some() => {
                    self.bump(2);
                    continue;
                }
                '(' => depth += 1,
                ')' => {
                    if depth == 2 && self.peek(1) == Some(')') {
                        let body: String = self.input[body_start..self.pos].iter().collect();
                        self.tokens.push(Token::new(TokenKind::ArithStart, "((", open_span));
                        self.tokens.push(Token::new(
                            TokenKind::Word,
                            body,
                            (body_start, self.pos, body_line, body_column),
                        ));
                        let close_start = self.pos;
                        let (cl, cc) = (self.line, self.column);
                        self.bump(2);
                        return Ok(Token::new(
                            TokenKind::ArithEnd,
                            "))",
                            (close_start, self.pos, cl, cc),
                        ));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.bump(1);
        }

        Err(LexError::new(
            "unexpected EOF while looking for matching `))'",
            line,
            column,
        ))
    }

    /// Decide whether `((` at `self.pos` (open is two chars before `open`)
    /// introduces nested subshells rather than arithmetic. `open` indexes
    /// the character just after the two parens.
    fn dparen_is_subshell(&self, open: usize) -> bool {
        if self.looks_like_subshell_command(open) {
            return true;
        }
        self.closes_with_spaced_parens(open)
    }

    fn looks_like_subshell_command(&self, start: usize) -> bool {
        let mut i = start;
        while matches!(self.at(i), Some(' ' | '\t')) {
            i += 1;
        }
        let c = match self.at(i) {
            Some(c) => c,
            None => return false,
        };
        if c == '(' {
            return self.looks_like_subshell_command(i + 1);
        }
        let command_start = c.is_ascii_alphabetic() || c == '_' || c == '!' || c == '[';
        if !command_start {
            return false;
        }
        let word_start = i;
        while self
            .at(i)
            .map_or(false, |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            i += 1;
        }
        if i == word_start {
            return matches!(c, '!' | '[');
        }
        let word_end = i;
        while matches!(self.at(i), Some(' ' | '\t')) {
            i += 1;
        }
        let next = match self.at(i) {
            Some(c) => c,
            None => return false,
        };
        // `x=`, `x+`, `x*`... straight after the word reads as arithmetic.
        if next == '=' && self.at(i + 1) != Some('=') {
            return false;
        }
        if next == '\n' {
            return false;
        }
        if i == word_end
            && matches!(next, '+' | '*' | '/' | '%' | '<' | '>' | '&' | '|' | '^' | '~' | '?' | ':')
        {
            return false;
        }
        if next == ')' && self.at(i + 1) == Some(')') {
            return false;
        }
        if i > word_end
            && (next == '-'
                || next == '"'
                || next == '\''
                || next == '$'
                || next == '/'
                || next == '.'
                || next == '_'
                || next.is_ascii_alphabetic())
        {
            // A command with arguments: require a `)` before end of line.
            let mut j = i;
            while let Some(c) = self.at(j) {
                if c == '\n' {
                    return false;
                }
                if c == ')' {
                    return true;
                }
                j += 1;
            }
            return false;
        }
        if next == ')' {
            let mut j = i + 1;
            while matches!(self.at(j), Some(' ' | '\t')) {
                j += 1;
            }
            return matches!(self.at(j), Some('|' | '&' | ';'));
        }
        false
    }

    fn closes_with_spaced_parens(&self, start: usize) -> bool {
        let mut i = start;
        let mut depth = 2usize;
        let mut in_sq = false;
        let mut in_dq = false;

        while let Some(c) = self.at(i) {
            if in_sq {
                in_sq = c != '\'';
                i += 1;
                continue;
            }
            if in_dq {
                if c == '\\' && self.at(i + 1).is_some() {
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
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 1 {
                        if self.at(i + 1) == Some(')') {
                            return false;
                        }
                        let mut j = i + 1;
                        let mut gap = false;
                        while matches!(self.at(j), Some(' ' | '\t' | '\n')) {
                            gap = true;
                            j += 1;
                        }
                        if gap && self.at(j) == Some(')') {
                            return true;
                        }
                    }
                    if depth == 0 {
                        return false;
                    }
                }
                '|' if depth == 1 => return true,
                '&' if depth == 1 && self.at(i + 1) == Some('&') => return true,
                ';' if depth == 1 => return true,
                _ => {}
            }
            i += 1;
        }
        false
    }

    /// `{name}` immediately before a redirection operator.
    fn scan_fd_variable(&self, start: usize) -> Option<(String, usize)> {
        let mut i = start + 1;
        let name_start = i;
        while let Some(c) = self.at(i) {
            if i == name_start {
                if !(c.is_ascii_alphabetic() || c == '_') {
                    return None;
                }
            } else if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            i += 1;
        }
        if i == name_start || self.at(i) != Some('}') {
            return None;
        }
        i += 1;
        let c = self.at(i)?;
        let c2 = self.at(i + 1);
        let is_redir = c == '>' || c == '<' || (c == '&' && matches!(c2, Some('>' | '<')));
        if !is_redir {
            return None;
        }
        let name: String = self.input[name_start..i - 1].iter().collect();
        Some((name, i))
    }

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> Result<Token, LexError> {
        let mut in_sq = false;
        let mut in_dq = false;
        let mut sq_open = (line, column);
        let mut dq_open = (line, column);
        let mut bracket_depth = 0usize;

        while let Some(c) = self.cur() {
            if in_sq {
                if c == '\'' {
                    in_sq = false;
                }
                self.bump(1);
                continue;
            }
            if in_dq {
                if c == '\\' && self.peek(1).is_some() {
                    self.bump(2);
                    continue;
                }
                if c == '"' {
                    in_dq = false;
                }
                self.bump(1);
                continue;
            }

            // `$'...'` ANSI-C quoting: the body obeys backslash escapes.
            if c == '$' && self.peek(1) == Some('\'') {
                self.bump(2);
                while let Some(ch) = self.cur() {
                    if ch == '\'' {
                        self.bump(1);
                        break;
                    }
                    if ch == '\\' && self.peek(1).is_some() {
                        self.bump(2);
                    } else {
                        self.bump(1);
                    }
                }
                continue;
            }

            // `$(...)` / `$((...))`: consume balanced, case-aware.
            if c == '$' && self.peek(1) == Some('(') {
                match scan_command_subst(&self.input, self.pos + 1) {
                    Some(close) => {
                        let n = close + 1 - self.pos;
                        self.bump(n);
                        continue;
                    }
                    None => {
                        return Err(LexError::new(
                            "unexpected EOF while looking for matching `)'",
                            self.line,
                            self.column,
                        ))
                    }
                }
            }

            // `${...}`
            if c == '$' && self.peek(1) == Some('{') {
                match scan_param_brace(&self.input, self.pos + 1) {
                    Ok(close) => {
                        let n = close + 1 - self.pos;
                        self.bump(n);
                        continue;
                    }
                    Err(which) => {
                        let msg = match which {
                            '\'' => "unexpected EOF while looking for matching `''",
                            '"' => "unexpected EOF while looking for matching `\"'",
                            _ => "unexpected EOF while looking for matching `}'",
                        };
                        return Err(LexError::new(msg, self.line, self.column));
                    }
                }
            }

            // `$[...]` old-style arithmetic.
            if c == '$' && self.peek(1) == Some('[') {
                let mut depth = 0usize;
                self.bump(1);
                while let Some(ch) = self.cur() {
                    match ch {
                        '[' => depth += 1,
                        ']' => {
                            depth -= 1;
                            if depth == 0 {
                                self.bump(1);
                                break;
                            }
                        }
                        _ => {}
                    }
                    self.bump(1);
                }
                continue;
            }

            // Backquoted substitution.
            if c == '`' {
                self.bump(1);
                while let Some(ch) = self.cur() {
                    if ch == '`' {
                        self.bump(1);
                        break;
                    }
                    if ch == '\\' && self.peek(1).is_some() {
                        self.bump(2);
                    } else {
                        self.bump(1);
                    }
                }
                continue;
            }

            if c == '\'' {
                in_sq = true;
                sq_open = (self.line, self.column);
                self.bump(1);
                continue;
            }
            if c == '"' {
                in_dq = true;
                dq_open = (self.line, self.column);
                self.bump(1);
                continue;
            }
            if c == '\\' {
                match self.peek(1) {
                    Some('\n') => {
                        self.bump(2);
                        continue;
                    }
                    Some(_) => {
                        self.bump(2);
                        continue;
                    }
                    None => {
                        self.bump(1);
                        continue;
                    }
                }
            }

            // Extglob: an operator char directly before `(` pulls the whole
            // group into the word.
            if c == '(' && self.pos > start {
                let prev = self.at(self.pos - 1).unwrap_or(' ');
                if "@*+?!".contains(prev) {
                    if let Some(close) = self.scan_extglob(self.pos) {
                        let n = close + 1 - self.pos;
                        self.bump(n);
                        continue;
                    }
                }
            }

            // Array subscripts may contain unescaped word-boundary chars.
            if c == '[' && bracket_depth == 0 {
                let so_far: String = self.input[start..self.pos].iter().collect();
                if is_name(&so_far) && !matches!(self.peek(1), Some('^' | '!')) {
                    bracket_depth = 1;
                    self.bump(1);
                    continue;
                }
            } else if c == '[' && bracket_depth > 0 {
                bracket_depth += 1;
                self.bump(1);
                continue;
            } else if c == ']' && bracket_depth > 0 {
                bracket_depth -= 1;
                self.bump(1);
                continue;
            }
            if bracket_depth > 0 {
                if c == '\n' {
                    break;
                }
                self.bump(1);
                continue;
            }

            if is_word_end(c) {
                break;
            }
            self.bump(1);
        }

        if in_sq {
            return Err(LexError::new(
                "unexpected EOF while looking for matching `''",
                sq_open.0,
                sq_open.1,
            ));
        }
        if in_dq {
            return Err(LexError::new(
                "unexpected EOF while looking for matching `\"'",
                dq_open.0,
                dq_open.1,
            ));
        }

        let text: String = self.input[start..self.pos].iter().collect();
        let span = self.span_from(start, line, column);
        let chars: Vec<char> = text.chars().collect();

        // Whole-token quote classification (value keeps the quotes).
        let (quoted, single_quoted) = classify_quoting(&chars);

        if !quoted {
            if let Some(&kind) = RESERVED.get(text.as_str()) {
                return Ok(Token::new(kind, text, span));
            }
        }

        if !chars.first().map_or(false, |&c| c == '\'' || c == '"') {
            if let Some(eq) = assignment_eq_index(&chars) {
                if eq > 0 && is_assignment_lhs(&chars[..eq]) {
                    let mut t = Token::new(TokenKind::Assignment, text, span);
                    t.quoted = quoted;
                    t.single_quoted = single_quoted;
                    return Ok(t);
                }
            }
        }

        if !text.is_empty() && chars.iter().all(|c| c.is_ascii_digit()) {
            return Ok(Token::new(TokenKind::Number, text, span));
        }

        let kind = if is_name(&text) {
            TokenKind::Name
        } else {
            TokenKind::Word
        };
        let mut t = Token::new(kind, text, span);
        t.quoted = quoted;
        t.single_quoted = single_quoted;
        Ok(t)
    }

    fn scan_extglob(&self, open: usize) -> Option<usize> {
        let mut i = open + 1;
        let mut depth = 1usize;
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
                '\n' => return None,
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Read the delimiter word for a heredoc without consuming input.
    fn register_heredoc(&mut self, strip_tabs: bool) {
        let mut i = self.pos;
        while matches!(self.at(i), Some(' ' | '\t')) {
            i += 1;
        }
        let mut delimiter = String::new();
        let mut quoted = false;
        while let Some(c) = self.at(i) {
            if c.is_whitespace() || matches!(c, ';' | '<' | '>' | '&' | '|' | '(' | ')') {
                break;
            }
            match c {
                '\'' | '"' => {
                    quoted = true;
                    let q = c;
                    i += 1;
                    while let Some(ch) = self.at(i) {
                        if ch == q {
                            i += 1;
                            break;
                        }
                        delimiter.push(ch);
                        i += 1;
                    }
                }
                '\\' => {
                    quoted = true;
                    i += 1;
                    if let Some(ch) = self.at(i) {
                        delimiter.push(ch);
                        i += 1;
                    }
                }
                _ => {
                    delimiter.push(c);
                    i += 1;
                }
            }
        }
        if !delimiter.is_empty() {
            self.pending_heredocs.push_back(PendingHeredoc {
                delimiter,
                strip_tabs,
                quoted,
            });
        }
    }

    /// Consume pending heredoc bodies, oldest first, after a newline.
    fn read_heredoc_bodies(&mut self) {
        while let Some(pending) = self.pending_heredocs.pop_front() {
            let start = self.pos;
            let (line, column) = (self.line, self.column);
            let mut content = String::new();

            while self.pos < self.input.len() {
                let line_start = self.pos;
                while !matches!(self.cur(), None | Some('\n')) {
                    self.bump(1);
                }
                let raw: String = self.input[line_start..self.pos].iter().collect();
                let stripped = if pending.strip_tabs {
                    raw.trim_start_matches('\t').to_string()
                } else {
                    raw.clone()
                };
                let had_newline = self.cur() == Some('\n');
                if had_newline {
                    self.bump(1);
                }
                if stripped == pending.delimiter {
                    break;
                }
                if pending.strip_tabs {
                    content.push_str(&stripped);
                } else {
                    content.push_str(&raw);
                }
                if had_newline {
                    content.push('\n');
                }
            }

            let mut token = Token::new(
                TokenKind::HeredocBody,
                content,
                (start, self.pos, line, column),
            );
            token.quoted = pending.quoted;
            self.tokens.push(token);
        }
    }
}

/// Whole-token quoting flags: `quoted` when the entire value is one quoted
/// string, `single_quoted` when that string is single-quoted.
fn classify_quoting(chars: &[char]) -> (bool, bool) {
    if chars.len() < 2 {
        return (false, false);
    }
    let first = chars[0];
    let last = chars[chars.len() - 1];
    if first == '\'' && last == '\'' {
        let inner = &chars[1..chars.len() - 1];
        if !inner.contains(&'\'') {
            return (true, true);
        }
    }
    if first == '"' && last == '"' {
        let inner = &chars[1..chars.len() - 1];
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == '\\' {
                i += 2;
                continue;
            }
            if inner[i] == '"' {
                return (false, false);
            }
            i += 1;
        }
        return (true, false);
    }
    (false, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_command() {
        let tokens = Lexer::new("echo hello").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Name);
        assert_eq!(tokens[0].text, "echo");
        assert_eq!(tokens[1].text, "hello");
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a && b || c | d |& e"),
            vec![
                TokenKind::Name,
                TokenKind::AndAnd,
                TokenKind::Name,
                TokenKind::OrOr,
                TokenKind::Name,
                TokenKind::Pipe,
                TokenKind::Name,
                TokenKind::PipeAmp,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn word_keeps_quotes_verbatim() {
        let tokens = Lexer::new("echo \"hello world\" 'a b'").tokenize().unwrap();
        assert_eq!(tokens[1].text, "\"hello world\"");
        assert!(tokens[1].quoted);
        assert!(!tokens[1].single_quoted);
        assert_eq!(tokens[2].text, "'a b'");
        assert!(tokens[2].single_quoted);
    }

    #[test]
    fn quoted_reserved_word_is_not_reserved() {
        let tokens = Lexer::new("'if'").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn assignment_detection() {
        let tokens = Lexer::new("X=1 a[i+1]=2 b+=3 =x").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[1].kind, TokenKind::Assignment);
        assert_eq!(tokens[1].text, "a[i+1]=2");
        assert_eq!(tokens[2].kind, TokenKind::Assignment);
        assert_eq!(tokens[3].kind, TokenKind::Word);
    }

    #[test]
    fn arithmetic_body_is_raw() {
        let tokens = Lexer::new("(( x << 2 # ok ))").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ArithStart);
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, " x << 2 # ok ");
        assert_eq!(tokens[2].kind, TokenKind::ArithEnd);
    }

    #[test]
    fn nested_subshell_not_arithmetic() {
        let tokens = Lexer::new("((echo a) && (echo b))").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::LParen);
        assert_eq!(tokens[1].kind, TokenKind::LParen);
    }

    #[test]
    fn heredoc_content_and_order() {
        let tokens = Lexer::new("cat <<EOF\nline1\nline2\nEOF\n").tokenize().unwrap();
        let body = tokens
            .iter()
            .find(|t| t.kind == TokenKind::HeredocBody)
            .unwrap();
        assert_eq!(body.text, "line1\nline2\n");
    }

    #[test]
    fn heredoc_tab_stripping() {
        let tokens = Lexer::new("cat <<-EOF\n\tindented\n\tEOF\n").tokenize().unwrap();
        let body = tokens
            .iter()
            .find(|t| t.kind == TokenKind::HeredocBody)
            .unwrap();
        assert_eq!(body.text, "indented\n");
    }

    #[test]
    fn heredoc_quoted_delimiter() {
        let tokens = Lexer::new("cat <<'EOF'\n$x\nEOF\n").tokenize().unwrap();
        let body = tokens
            .iter()
            .find(|t| t.kind == TokenKind::HeredocBody)
            .unwrap();
        assert!(body.quoted);
        assert_eq!(body.text, "$x\n");
    }

    #[test]
    fn two_heredocs_fifo() {
        let tokens = Lexer::new("cat <<A <<B\none\nA\ntwo\nB\n").tokenize().unwrap();
        let bodies: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::HeredocBody)
            .collect();
        assert_eq!(bodies[0].text, "one\n");
        assert_eq!(bodies[1].text, "two\n");
    }

    #[test]
    fn fd_variable() {
        let tokens = Lexer::new("{fd}>out.txt").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FdVar);
        assert_eq!(tokens[0].text, "fd");
        assert_eq!(tokens[1].kind, TokenKind::Great);
    }

    #[test]
    fn brace_word_stays_whole() {
        let tokens = Lexer::new("echo {a,b}c").tokenize().unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "{a,b}c");
    }

    #[test]
    fn group_braces() {
        assert_eq!(
            kinds("{ echo; }"),
            vec![
                TokenKind::LBrace,
                TokenKind::Name,
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn command_subst_with_case_consumed() {
        let tokens = Lexer::new("x=$(case $y in a) echo 1;; esac)").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "x=$(case $y in a) echo 1;; esac)");
    }

    #[test]
    fn unterminated_quote_errors() {
        assert!(Lexer::new("echo 'abc").tokenize().is_err());
        assert!(Lexer::new("echo \"abc").tokenize().is_err());
    }

    #[test]
    fn escaped_space_joins_word() {
        let tokens = Lexer::new("echo a\\ b").tokenize().unwrap();
        assert_eq!(tokens[1].text, "a\\ b");
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn comment_token() {
        let tokens = Lexer::new("echo hi # trailing").tokenize().unwrap();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Comment));
    }

    #[test]
    fn cond_brackets() {
        assert_eq!(
            kinds("[[ -f x ]]"),
            vec![
                TokenKind::CondStart,
                TokenKind::Word,
                TokenKind::Name,
                TokenKind::CondEnd,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn extglob_group_in_word() {
        let tokens = Lexer::new("ls @(a|b).txt").tokenize().unwrap();
        assert_eq!(tokens[1].text, "@(a|b).txt");
    }

    #[test]
    fn subscript_with_spaces() {
        let tokens = Lexer::new("a[i + 1]=5").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "a[i + 1]=5");
    }
}
