//! Recursive-descent parser: token stream → AST.
//!
//! Statements are pipelines joined by `&&`/`||`/`;`/`&`; pipelines are
//! commands joined by `|`/`|&` with optional `!` negation and a `time`
//! prefix. Compound commands, function definitions, and redirections follow
//! the bash grammar. A small class of errors (stray `}` at command position)
//! is deferred onto the statement and raised at execution time.

use std::collections::VecDeque;

use crate::ast::*;
use crate::parser::arith::parse_arith;
use crate::parser::cond::parse_cond_expr;
use crate::parser::lexer::{is_name, Token, TokenKind};
use crate::parser::word::{parse_heredoc_text, parse_word_text};
use crate::parser::ParseError;

const MAX_PARSER_DEPTH: usize = 200;

pub struct Parser {
    pub(crate) source: Vec<char>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    heredoc_bodies: VecDeque<(String, bool)>,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str, raw_tokens: Vec<Token>) -> Self {
        let mut tokens = Vec::with_capacity(raw_tokens.len());
        let mut heredoc_bodies = VecDeque::new();
        for token in raw_tokens {
            match token.kind {
                TokenKind::Comment => {}
                TokenKind::HeredocBody => {
                    heredoc_bodies.push_back((token.text, token.quoted));
                }
                _ => tokens.push(token),
            }
        }
        Self {
            source: source.chars().collect(),
            tokens,
            pos: 0,
            heredoc_bodies,
            depth: 0,
        }
    }

    pub fn parse_script(mut self) -> Result<ScriptNode, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.cur().kind == TokenKind::Eof {
                break;
            }
            statements.push(self.parse_statement(&[])?);
        }
        Ok(ScriptNode { statements })
    }

    // -----------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------

    pub(crate) fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.cur().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(crate) fn unexpected(&self, what: &str) -> ParseError {
        let t = self.cur();
        let shown = if t.kind == TokenKind::Eof {
            "end of file".to_string()
        } else if t.kind == TokenKind::Newline {
            "newline".to_string()
        } else {
            format!("`{}'", t.text)
        };
        ParseError::new(
            format!("unexpected token {} while looking for {}", shown, what),
            t.line,
            t.column,
        )
    }

    fn skip_newlines(&mut self) {
        while self.cur().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.cur().kind, TokenKind::Newline | TokenKind::Semi) {
            self.advance();
        }
    }

    fn enter(&mut self) -> Result<DepthGuard, ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            let t = self.cur();
            return Err(ParseError::new(
                "maximum parser nesting depth exceeded",
                t.line,
                t.column,
            ));
        }
        Ok(DepthGuard)
    }

    fn leave(&mut self, _guard: DepthGuard) {
        self.depth -= 1;
    }

    /// Can the current token begin a command? Body terminators (`then`,
    /// `done`, ...) end the statement so the enclosing compound sees them.
    fn starts_command(&self) -> bool {
        let t = self.cur();
        match t.kind {
            TokenKind::Eof
            | TokenKind::Newline
            | TokenKind::Semi
            | TokenKind::Amp
            | TokenKind::Pipe
            | TokenKind::PipeAmp
            | TokenKind::AndAnd
            | TokenKind::OrOr
            | TokenKind::RParen
            | TokenKind::DSemi
            | TokenKind::SemiAnd
            | TokenKind::DSemiAnd
            | TokenKind::Then
            | TokenKind::Else
            | TokenKind::Elif
            | TokenKind::Fi
            | TokenKind::Do
            | TokenKind::Done
            | TokenKind::Esac => false,
            _ => true,
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    pub(crate) fn parse_statement(
        &mut self,
        stops: &[TokenKind],
    ) -> Result<StatementNode, ParseError> {
        let start_offset = self.cur().start;

        // A stray `}` at command position parses but fails at run time.
        if self.cur().kind == TokenKind::RBrace && !stops.contains(&TokenKind::RBrace) {
            let t = self.advance();
            return Ok(StatementNode {
                pipelines: vec![],
                connectives: vec![],
                background: false,
                deferred_error: Some(DeferredError {
                    message: "syntax error near unexpected token".to_string(),
                    token: t.text,
                }),
                source_text: None,
            });
        }

        let mut pipelines = vec![self.parse_pipeline(stops)?];
        let mut connectives = Vec::new();
        let mut background = false;

        loop {
            match self.cur().kind {
                TokenKind::AndAnd => {
                    self.advance();
                    self.skip_newlines();
                    connectives.push(Connective::AndIf);
                    pipelines.push(self.parse_pipeline(stops)?);
                }
                TokenKind::OrOr => {
                    self.advance();
                    self.skip_newlines();
                    connectives.push(Connective::OrIf);
                    pipelines.push(self.parse_pipeline(stops)?);
                }
                TokenKind::Semi => {
                    self.advance();
                    if !self.starts_command() || stops.contains(&self.cur().kind) {
                        break;
                    }
                    connectives.push(Connective::Seq);
                    pipelines.push(self.parse_pipeline(stops)?);
                }
                TokenKind::Amp => {
                    self.advance();
                    background = true;
                    if !self.starts_command() || stops.contains(&self.cur().kind) {
                        break;
                    }
                    connectives.push(Connective::Seq);
                    pipelines.push(self.parse_pipeline(stops)?);
                }
                _ => break,
            }
        }

        let end_offset = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.end)
            .unwrap_or(start_offset);
        let source_text: String = self.source
            [start_offset.min(self.source.len())..end_offset.min(self.source.len())]
            .iter()
            .collect();

        Ok(StatementNode {
            pipelines,
            connectives,
            background,
            deferred_error: None,
            source_text: Some(source_text.trim_end().to_string()),
        })
    }

    fn parse_pipeline(&mut self, stops: &[TokenKind]) -> Result<PipelineNode, ParseError> {
        let guard = self.enter()?;
        let mut timed = false;
        let mut time_posix = false;
        let mut negated = false;

        if self.cur().kind == TokenKind::Time {
            timed = true;
            self.advance();
            if self.cur().kind.is_wordlike() && self.cur().text == "-p" {
                time_posix = true;
                self.advance();
            }
        }
        while self.cur().kind == TokenKind::Bang {
            negated = !negated;
            self.advance();
        }

        let mut commands = vec![self.parse_command(stops)?];
        let mut pipe_stderr = Vec::new();

        loop {
            match self.cur().kind {
                TokenKind::Pipe => {
                    self.advance();
                    pipe_stderr.push(false);
                }
                TokenKind::PipeAmp => {
                    self.advance();
                    pipe_stderr.push(true);
                }
                _ => break,
            }
            self.skip_newlines();
            commands.push(self.parse_command(stops)?);
        }

        self.leave(guard);
        Ok(PipelineNode {
            commands,
            negated,
            timed,
            time_posix,
            pipe_stderr,
        })
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    fn parse_command(&mut self, stops: &[TokenKind]) -> Result<CommandNode, ParseError> {
        let guard = self.enter()?;
        let result = self.parse_command_inner(stops);
        self.leave(guard);
        result
    }

    fn parse_command_inner(&mut self, stops: &[TokenKind]) -> Result<CommandNode, ParseError> {
        match self.cur().kind {
            TokenKind::If => self.parse_if().map(CommandNode::Compound),
            TokenKind::While => self.parse_while().map(CommandNode::Compound),
            TokenKind::Until => self.parse_until().map(CommandNode::Compound),
            TokenKind::For => self.parse_for().map(CommandNode::Compound),
            TokenKind::Case => self.parse_case().map(CommandNode::Compound),
            TokenKind::LParen => self.parse_subshell().map(CommandNode::Compound),
            TokenKind::LBrace => self.parse_group().map(CommandNode::Compound),
            TokenKind::ArithStart => self.parse_arith_command().map(CommandNode::Compound),
            TokenKind::CondStart => self.parse_cond_command().map(CommandNode::Compound),
            TokenKind::Function => self.parse_function_keyword().map(CommandNode::FunctionDef),
            TokenKind::Then
            | TokenKind::Else
            | TokenKind::Elif
            | TokenKind::Fi
            | TokenKind::Do
            | TokenKind::Done
            | TokenKind::Esac => Err(self.syntax_near(),),
            _ => {
                // `name ()` function definition.
                if matches!(self.cur().kind, TokenKind::Name | TokenKind::Word)
                    && self.peek_kind(1) == TokenKind::LParen
                    && self.peek_kind(2) == TokenKind::RParen
                {
                    return self.parse_function_compact().map(CommandNode::FunctionDef);
                }
                self.parse_simple(stops).map(CommandNode::Simple)
            }
        }
    }

    fn syntax_near(&self) -> ParseError {
        let t = self.cur();
        ParseError::new(
            format!("syntax error near unexpected token `{}'", t.text),
            t.line,
            t.column,
        )
    }

    fn parse_simple(&mut self, _stops: &[TokenKind]) -> Result<SimpleCommandNode, ParseError> {
        let mut cmd = SimpleCommandNode {
            line: Some(self.cur().line),
            ..Default::default()
        };
        let mut seen_name = false;

        loop {
            let t = self.cur().clone();
            match t.kind {
                TokenKind::Assignment if !seen_name => {
                    self.advance();
                    cmd.assignments.push(self.build_assignment(&t)?);
                }
                TokenKind::Number
                    if self.peek_kind(1).is_redirection()
                        && self.adjacent(self.pos, self.pos + 1) =>
                {
                    let redir = self.parse_redirection()?;
                    cmd.redirections.push(redir);
                }
                TokenKind::FdVar => {
                    let redir = self.parse_redirection()?;
                    cmd.redirections.push(redir);
                }
                kind if kind.is_redirection() => {
                    let redir = self.parse_redirection()?;
                    cmd.redirections.push(redir);
                }
                TokenKind::Assignment
                    if seen_name
                        && t.text.ends_with('=')
                        && self.peek_kind(1) == TokenKind::LParen
                        && self.adjacent(self.pos, self.pos + 1) =>
                {
                    // `declare -a x=(...)`: keep the whole initializer as
                    // one raw word; the declaration builtin re-parses it.
                    self.advance();
                    let open = self.advance();
                    let mut depth = 1usize;
                    let mut end = open.end;
                    while depth > 0 {
                        let tok = self.advance();
                        match tok.kind {
                            TokenKind::LParen => depth += 1,
                            TokenKind::RParen => {
                                depth -= 1;
                                end = tok.end;
                            }
                            TokenKind::Eof => return Err(self.unexpected("`)'")),
                            _ => end = tok.end,
                        }
                    }
                    let text: String = self.source[t.start..end.min(self.source.len())]
                        .iter()
                        .collect();
                    cmd.args.push(WordNode::literal(text));
                }
                TokenKind::LBrace | TokenKind::RBrace if seen_name => {
                    // Braces lose their grouping role in argument position.
                    self.advance();
                    cmd.args.push(WordNode::literal(t.text));
                }
                TokenKind::Bang if seen_name => {
                    self.advance();
                    cmd.args.push(WordNode::literal("!"));
                }
                kind if kind.is_wordlike() => {
                    self.advance();
                    let word = self.build_word(&t)?;
                    if seen_name {
                        cmd.args.push(word);
                    } else {
                        cmd.name = Some(word);
                        seen_name = true;
                    }
                }
                _ => break,
            }
        }

        if cmd.name.is_none() && cmd.assignments.is_empty() && cmd.redirections.is_empty() {
            return Err(self.syntax_near());
        }
        Ok(cmd)
    }

    fn adjacent(&self, a: usize, b: usize) -> bool {
        match (self.tokens.get(a), self.tokens.get(b)) {
            (Some(x), Some(y)) => x.end == y.start,
            _ => false,
        }
    }

    pub(crate) fn build_word(&self, token: &Token) -> Result<WordNode, ParseError> {
        parse_word_text(&token.text, token.kind == TokenKind::Assignment)
            .map_err(|e| ParseError::new(e.message, token.line, token.column))
    }

    fn build_assignment(&mut self, token: &Token) -> Result<AssignmentNode, ParseError> {
        let chars: Vec<char> = token.text.chars().collect();
        let mut depth = 0usize;
        let mut eq = None;
        for (i, &c) in chars.iter().enumerate() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '=' if depth == 0 => {
                    eq = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let eq = eq.expect("assignment token must contain =");
        let append = eq > 0 && chars[eq - 1] == '+';
        let name: String = chars[..if append { eq - 1 } else { eq }].iter().collect();
        let value_text: String = chars[eq + 1..].iter().collect();

        // `name=( ... )` array literal: the lexer stops the assignment word
        // at the paren, so the elements follow as separate tokens.
        if value_text.is_empty()
            && self.cur().kind == TokenKind::LParen
            && self.adjacent(self.pos.saturating_sub(1), self.pos)
        {
            self.advance();
            let mut elements = Vec::new();
            loop {
                self.skip_newlines();
                let t = self.cur().clone();
                match t.kind {
                    TokenKind::RParen => {
                        self.advance();
                        break;
                    }
                    TokenKind::Eof => return Err(self.unexpected("`)'")),
                    kind if kind.is_wordlike() => {
                        self.advance();
                        elements.push(self.build_word(&t)?);
                    }
                    _ => return Err(self.syntax_near()),
                }
            }
            return Ok(AssignmentNode {
                name,
                append,
                value: None,
                array: Some(elements),
            });
        }

        let value = parse_word_text(&value_text, true)
            .map_err(|e| ParseError::new(e.message, token.line, token.column))?;
        Ok(AssignmentNode {
            name,
            append,
            value: Some(value),
            array: None,
        })
    }

    // -----------------------------------------------------------------
    // Redirections
    // -----------------------------------------------------------------

    fn parse_redirection(&mut self) -> Result<RedirectionNode, ParseError> {
        let mut fd = None;
        let mut fd_variable = None;

        match self.cur().kind {
            TokenKind::Number => {
                fd = self.cur().text.parse::<i32>().ok();
                self.advance();
            }
            TokenKind::FdVar => {
                fd_variable = Some(self.cur().text.clone());
                self.advance();
            }
            _ => {}
        }

        let op_token = self.advance();
        let operator = match op_token.kind {
            TokenKind::Less => RedirOp::In,
            TokenKind::Great => RedirOp::Out,
            TokenKind::DGreat => RedirOp::Append,
            TokenKind::Clobber => RedirOp::Clobber,
            TokenKind::LessGreat => RedirOp::ReadWrite,
            TokenKind::LessAnd => RedirOp::DupIn,
            TokenKind::GreatAnd => RedirOp::DupOut,
            TokenKind::AndGreat => RedirOp::OutErr,
            TokenKind::AndDGreat => RedirOp::AppendErr,
            TokenKind::TLess => RedirOp::HereString,
            TokenKind::DLess => RedirOp::HereDoc,
            TokenKind::DLessDash => RedirOp::HereDocTabs,
            _ => {
                return Err(ParseError::new(
                    format!("expected redirection operator, found `{}'", op_token.text),
                    op_token.line,
                    op_token.column,
                ))
            }
        };

        if matches!(operator, RedirOp::HereDoc | RedirOp::HereDocTabs) {
            let delim_token = self.advance();
            if !delim_token.kind.is_wordlike() {
                return Err(ParseError::new(
                    "syntax error near unexpected token `newline'",
                    delim_token.line,
                    delim_token.column,
                ));
            }
            let delim_word = self.build_word(&delim_token)?;
            let delimiter = flatten_word(&delim_word);
            let (content_text, quoted) = self
                .heredoc_bodies
                .pop_front()
                .unwrap_or((String::new(), false));
            let content = if quoted {
                WordNode {
                    parts: if content_text.is_empty() {
                        vec![]
                    } else {
                        vec![WordPart::Literal(content_text)]
                    },
                }
            } else {
                parse_heredoc_text(&content_text)
                    .map_err(|e| ParseError::new(e.message, delim_token.line, delim_token.column))?
            };
            return Ok(RedirectionNode {
                fd,
                fd_variable,
                operator,
                target: RedirTarget::HereDoc(HereDocBody {
                    delimiter,
                    content,
                    strip_tabs: operator == RedirOp::HereDocTabs,
                    quoted,
                }),
            });
        }

        // `>&-` / `<&-` / `>&N-` close forms arrive as word-ish tokens.
        let target_token = self.advance();
        if !target_token.kind.is_wordlike() && target_token.kind != TokenKind::Bang {
            return Err(ParseError::new(
                format!("syntax error near unexpected token `{}'", target_token.text),
                target_token.line,
                target_token.column,
            ));
        }
        let word = self.build_word(&target_token)?;
        Ok(RedirectionNode {
            fd,
            fd_variable,
            operator,
            target: RedirTarget::Word(word),
        })
    }

    fn parse_trailing_redirections(&mut self) -> Result<Vec<RedirectionNode>, ParseError> {
        let mut redirs = Vec::new();
        loop {
            match self.cur().kind {
                TokenKind::Number
                    if self.peek_kind(1).is_redirection()
                        && self.adjacent(self.pos, self.pos + 1) =>
                {
                    redirs.push(self.parse_redirection()?);
                }
                TokenKind::FdVar => redirs.push(self.parse_redirection()?),
                kind if kind.is_redirection() => redirs.push(self.parse_redirection()?),
                _ => break,
            }
        }
        Ok(redirs)
    }

    // -----------------------------------------------------------------
    // Compound commands
    // -----------------------------------------------------------------

    fn parse_statements_until(
        &mut self,
        stops: &[TokenKind],
    ) -> Result<Vec<StatementNode>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if stops.contains(&self.cur().kind) || self.cur().kind == TokenKind::Eof {
                break;
            }
            statements.push(self.parse_statement(stops)?);
        }
        Ok(statements)
    }

    fn parse_if(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::If, "`if'")?;
        let mut arms = Vec::new();
        let mut else_body = None;

        loop {
            let condition = self.parse_statements_until(&[TokenKind::Then])?;
            self.expect(TokenKind::Then, "`then'")?;
            let body =
                self.parse_statements_until(&[TokenKind::Elif, TokenKind::Else, TokenKind::Fi])?;
            if body.is_empty() {
                return Err(self.syntax_near());
            }
            arms.push(IfArm { condition, body });
            match self.cur().kind {
                TokenKind::Elif => {
                    self.advance();
                }
                TokenKind::Else => {
                    self.advance();
                    let body = self.parse_statements_until(&[TokenKind::Fi])?;
                    if body.is_empty() {
                        return Err(self.syntax_near());
                    }
                    else_body = Some(body);
                    self.expect(TokenKind::Fi, "`fi'")?;
                    break;
                }
                TokenKind::Fi => {
                    self.advance();
                    break;
                }
                _ => return Err(self.unexpected("`fi'")),
            }
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::If(IfNode {
            arms,
            else_body,
            redirections,
        }))
    }

    fn parse_while(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::While, "`while'")?;
        let condition = self.parse_statements_until(&[TokenKind::Do])?;
        self.expect(TokenKind::Do, "`do'")?;
        let body = self.parse_statements_until(&[TokenKind::Done])?;
        self.expect(TokenKind::Done, "`done'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::While(WhileNode {
            condition,
            body,
            redirections,
        }))
    }

    fn parse_until(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::Until, "`until'")?;
        let condition = self.parse_statements_until(&[TokenKind::Do])?;
        self.expect(TokenKind::Do, "`do'")?;
        let body = self.parse_statements_until(&[TokenKind::Done])?;
        self.expect(TokenKind::Done, "`done'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Until(UntilNode {
            condition,
            body,
            redirections,
        }))
    }

    fn parse_for(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::For, "`for'")?;

        // C-style: for (( init; cond; update ))
        if self.cur().kind == TokenKind::ArithStart {
            self.advance();
            let body_token = self.expect(TokenKind::Word, "arithmetic expression")?;
            self.expect(TokenKind::ArithEnd, "`))'")?;
            let slots: Vec<&str> = body_token.text.splitn(3, ';').collect();
            if slots.len() != 3 {
                return Err(ParseError::new(
                    "syntax error: expected `;'",
                    body_token.line,
                    body_token.column,
                ));
            }
            let parse_slot = |s: &str| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(parse_arith(trimmed))
                }
            };
            let init = parse_slot(slots[0]);
            let condition = parse_slot(slots[1]);
            let update = parse_slot(slots[2]);

            self.skip_separators();
            self.expect(TokenKind::Do, "`do'")?;
            let body = self.parse_statements_until(&[TokenKind::Done])?;
            self.expect(TokenKind::Done, "`done'")?;
            let redirections = self.parse_trailing_redirections()?;
            return Ok(CompoundCommandNode::CStyleFor(CStyleForNode {
                init,
                condition,
                update,
                body,
                redirections,
            }));
        }

        let var_token = self.advance();
        if !var_token.kind.is_wordlike() || !is_name(&var_token.text) {
            return Err(ParseError::new(
                format!("`{}': not a valid identifier", var_token.text),
                var_token.line,
                var_token.column,
            ));
        }
        let variable = var_token.text;

        self.skip_newlines();
        let mut words = None;
        if self.cur().kind == TokenKind::In {
            self.advance();
            let mut list = Vec::new();
            loop {
                let t = self.cur().clone();
                if t.kind.is_wordlike() {
                    self.advance();
                    list.push(self.build_word(&t)?);
                } else {
                    break;
                }
            }
            words = Some(list);
        }
        self.skip_separators();
        self.expect(TokenKind::Do, "`do'")?;
        let body = self.parse_statements_until(&[TokenKind::Done])?;
        self.expect(TokenKind::Done, "`done'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::For(ForNode {
            variable,
            words,
            body,
            redirections,
        }))
    }

    fn parse_case(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::Case, "`case'")?;
        let word_token = self.advance();
        if !word_token.kind.is_wordlike() {
            return Err(self.syntax_near());
        }
        let word = self.build_word(&word_token)?;
        self.skip_newlines();
        self.expect(TokenKind::In, "`in'")?;
        self.skip_newlines();

        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.cur().kind == TokenKind::Esac {
                self.advance();
                break;
            }
            if self.cur().kind == TokenKind::LParen {
                self.advance();
            }

            let mut patterns = Vec::new();
            loop {
                let t = self.cur().clone();
                if !t.kind.is_wordlike() {
                    return Err(self.syntax_near());
                }
                self.advance();
                patterns.push(self.build_word(&t)?);
                if self.cur().kind == TokenKind::Pipe {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)'")?;

            let body = self.parse_statements_until(&[
                TokenKind::DSemi,
                TokenKind::SemiAnd,
                TokenKind::DSemiAnd,
                TokenKind::Esac,
            ])?;
            let terminator = match self.cur().kind {
                TokenKind::DSemi => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenKind::SemiAnd => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenKind::DSemiAnd => {
                    self.advance();
                    CaseTerminator::Continue
                }
                TokenKind::Esac => CaseTerminator::Break,
                _ => return Err(self.unexpected("`;;'")),
            };
            items.push(CaseItemNode {
                patterns,
                body,
                terminator,
            });
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Case(CaseNode {
            word,
            items,
            redirections,
        }))
    }

    fn parse_subshell(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::LParen, "`('")?;
        let body = self.parse_statements_until(&[TokenKind::RParen])?;
        self.expect(TokenKind::RParen, "`)'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Subshell(SubshellNode {
            body,
            redirections,
        }))
    }

    fn parse_group(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::LBrace, "`{'")?;
        let body = self.parse_statements_until(&[TokenKind::RBrace])?;
        self.expect(TokenKind::RBrace, "`}'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Group(GroupNode {
            body,
            redirections,
        }))
    }

    fn parse_arith_command(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::ArithStart, "`(('")?;
        let body_token = self.expect(TokenKind::Word, "arithmetic expression")?;
        self.expect(TokenKind::ArithEnd, "`))'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Arithmetic(ArithmeticCommandNode {
            expression: parse_arith(&body_token.text),
            redirections,
        }))
    }

    fn parse_cond_command(&mut self) -> Result<CompoundCommandNode, ParseError> {
        self.expect(TokenKind::CondStart, "`[['")?;
        let expression = parse_cond_expr(self)?;
        self.expect(TokenKind::CondEnd, "`]]'")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommandNode::Conditional(ConditionalCommandNode {
            expression,
            redirections,
        }))
    }

    // -----------------------------------------------------------------
    // Function definitions
    // -----------------------------------------------------------------

    fn parse_function_keyword(&mut self) -> Result<FunctionDefNode, ParseError> {
        self.expect(TokenKind::Function, "`function'")?;
        let name_token = self.advance();
        if !name_token.kind.is_wordlike() {
            return Err(self.syntax_near());
        }
        let name = name_token.text;
        if self.cur().kind == TokenKind::LParen && self.peek_kind(1) == TokenKind::RParen {
            self.advance();
            self.advance();
        }
        self.finish_function(name)
    }

    fn parse_function_compact(&mut self) -> Result<FunctionDefNode, ParseError> {
        let name_token = self.advance();
        let name = name_token.text;
        self.expect(TokenKind::LParen, "`('")?;
        self.expect(TokenKind::RParen, "`)'")?;
        self.finish_function(name)
    }

    fn finish_function(&mut self, name: String) -> Result<FunctionDefNode, ParseError> {
        self.skip_newlines();
        let body = match self.parse_command(&[])? {
            CommandNode::Compound(c) => c,
            CommandNode::Simple(_) | CommandNode::FunctionDef(_) => {
                return Err(self.syntax_near())
            }
        };
        let redirections = self.parse_trailing_redirections()?;
        Ok(FunctionDefNode {
            name,
            body: Box::new(body),
            redirections,
            source_file: None,
        })
    }
}

struct DepthGuard;

/// Flatten a word to plain text, removing quoting. Used for heredoc
/// delimiters and other places that need the literal spelling.
pub fn flatten_word(word: &WordNode) -> String {
    fn collect(parts: &[WordPart], out: &mut String) {
        for part in parts {
            match part {
                WordPart::Literal(t) | WordPart::SingleQuoted(t) | WordPart::Escaped(t) => {
                    out.push_str(t)
                }
                WordPart::DoubleQuoted(inner) => collect(inner, out),
                WordPart::Glob(t) => out.push_str(t),
                WordPart::Tilde(user) => {
                    out.push('~');
                    if let Some(u) = user {
                        out.push_str(u);
                    }
                }
                _ => {}
            }
        }
    }
    let mut out = String::new();
    collect(&word.parts, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn first_simple(script: &ScriptNode) -> &SimpleCommandNode {
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Simple(s) => s,
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn simple_command_with_args() {
        let ast = parse("echo a b").unwrap();
        let cmd = first_simple(&ast);
        assert_eq!(flatten_word(cmd.name.as_ref().unwrap()), "echo");
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn connectives_and_background() {
        let ast = parse("a && b || c; d &").unwrap();
        let stmt = &ast.statements[0];
        assert_eq!(stmt.pipelines.len(), 4);
        assert_eq!(
            stmt.connectives,
            vec![Connective::AndIf, Connective::OrIf, Connective::Seq]
        );
        assert!(stmt.background);
    }

    #[test]
    fn pipeline_with_stderr_pipe() {
        let ast = parse("a | b |& c").unwrap();
        let p = &ast.statements[0].pipelines[0];
        assert_eq!(p.commands.len(), 3);
        assert_eq!(p.pipe_stderr, vec![false, true]);
    }

    #[test]
    fn negated_and_timed() {
        let ast = parse("time -p ! true").unwrap();
        let p = &ast.statements[0].pipelines[0];
        assert!(p.timed);
        assert!(p.time_posix);
        assert!(p.negated);
    }

    #[test]
    fn if_statement() {
        let ast = parse("if true; then echo y; elif false; then echo n; else echo e; fi").unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::If(node)) => {
                assert_eq!(node.arms.len(), 2);
                assert!(node.else_body.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_then_body_is_error() {
        assert!(parse("if true; then fi").is_err());
    }

    #[test]
    fn for_loop_default_words() {
        let ast = parse("for x; do echo $x; done").unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::For(node)) => {
                assert_eq!(node.variable, "x");
                assert!(node.words.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn c_style_for() {
        let ast = parse("for ((i=0; i<3; i++)); do echo $i; done").unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::CStyleFor(node)) => {
                assert!(node.init.is_some());
                assert!(node.condition.is_some());
                assert!(node.update.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_terminators() {
        let ast = parse("case $x in a) echo 1;; b) echo 2;& c) echo 3;;& d) echo 4;; esac")
            .unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::Case(node)) => {
                assert_eq!(node.items.len(), 4);
                assert_eq!(node.items[0].terminator, CaseTerminator::Break);
                assert_eq!(node.items[1].terminator, CaseTerminator::FallThrough);
                assert_eq!(node.items[2].terminator, CaseTerminator::Continue);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn function_forms() {
        let ast = parse("f() { echo hi; }").unwrap();
        assert!(matches!(
            &ast.statements[0].pipelines[0].commands[0],
            CommandNode::FunctionDef(f) if f.name == "f"
        ));
        let ast = parse("function g { echo hi; }").unwrap();
        assert!(matches!(
            &ast.statements[0].pipelines[0].commands[0],
            CommandNode::FunctionDef(f) if f.name == "g"
        ));
    }

    #[test]
    fn assignments_before_command() {
        let ast = parse("A=1 B=2 env").unwrap();
        let cmd = first_simple(&ast);
        assert_eq!(cmd.assignments.len(), 2);
        assert_eq!(cmd.assignments[0].name, "A");
    }

    #[test]
    fn array_assignment() {
        let ast = parse("a=(1 2 3)").unwrap();
        let cmd = first_simple(&ast);
        assert_eq!(cmd.assignments[0].array.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn append_assignment() {
        let ast = parse("a+=x").unwrap();
        let cmd = first_simple(&ast);
        assert!(cmd.assignments[0].append);
    }

    #[test]
    fn redirections_with_fd() {
        let ast = parse("cmd 2>err.log <in.txt").unwrap();
        let cmd = first_simple(&ast);
        assert_eq!(cmd.redirections.len(), 2);
        assert_eq!(cmd.redirections[0].fd, Some(2));
        assert_eq!(cmd.redirections[0].operator, RedirOp::Out);
        assert_eq!(cmd.redirections[1].operator, RedirOp::In);
    }

    #[test]
    fn number_with_space_is_argument() {
        let ast = parse("echo 2 > f").unwrap();
        let cmd = first_simple(&ast);
        assert_eq!(cmd.args.len(), 1);
        assert_eq!(cmd.redirections.len(), 1);
        assert_eq!(cmd.redirections[0].fd, None);
    }

    #[test]
    fn heredoc_redirection() {
        let ast = parse("cat <<EOF\nhello $x\nEOF\n").unwrap();
        let cmd = first_simple(&ast);
        match &cmd.redirections[0].target {
            RedirTarget::HereDoc(h) => {
                assert_eq!(h.delimiter, "EOF");
                assert!(!h.quoted);
                assert!(h
                    .content
                    .parts
                    .iter()
                    .any(|p| matches!(p, WordPart::Parameter(_))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn quoted_heredoc_is_literal() {
        let ast = parse("cat <<'EOF'\nhello $x\nEOF\n").unwrap();
        let cmd = first_simple(&ast);
        match &cmd.redirections[0].target {
            RedirTarget::HereDoc(h) => {
                assert!(h.quoted);
                assert_eq!(h.content.parts, vec![WordPart::Literal("hello $x\n".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subshell_and_group() {
        let ast = parse("(echo a; echo b)").unwrap();
        assert!(matches!(
            &ast.statements[0].pipelines[0].commands[0],
            CommandNode::Compound(CompoundCommandNode::Subshell(_))
        ));
        let ast = parse("{ echo a; } > out").unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::Group(g)) => {
                assert_eq!(g.redirections.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arithmetic_command() {
        let ast = parse("(( x += 1 ))").unwrap();
        assert!(matches!(
            &ast.statements[0].pipelines[0].commands[0],
            CommandNode::Compound(CompoundCommandNode::Arithmetic(_))
        ));
    }

    #[test]
    fn deferred_error_for_stray_rbrace() {
        let ast = parse("}").unwrap();
        assert!(ast.statements[0].deferred_error.is_some());
    }

    #[test]
    fn parse_error_has_position() {
        let err = parse("if then").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn source_text_recorded() {
        let ast = parse("echo hi").unwrap();
        assert_eq!(ast.statements[0].source_text.as_deref(), Some("echo hi"));
    }
}
