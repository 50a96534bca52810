//! Conditional expression parser for `[[ ... ]]`.
//!
//! Precedence: `||` < `&&` < `!` < primary. Primaries are parenthesized
//! groups, unary file/string tests, binary comparisons, and bare words.
//! The right-hand side of `=~` is collected from the raw source: it extends
//! across operator tokens as long as they touch (no whitespace) or sit
//! inside an open paren group, and ends before `]]`, `&&`, `||`, or a
//! newline.

use crate::ast::{CondBinOp, CondExpr, CondUnaryOp, WordNode};
use crate::parser::lexer::TokenKind;
use crate::parser::word::parse_word_text;
use crate::parser::{ParseError, Parser};

pub fn parse_cond_expr(p: &mut Parser) -> Result<CondExpr, ParseError> {
    parse_or(p)
}

fn skip_newlines(p: &mut Parser) {
    while p.cur().kind == TokenKind::Newline {
        p.advance();
    }
}

fn parse_or(p: &mut Parser) -> Result<CondExpr, ParseError> {
    let mut lhs = parse_and(p)?;
    loop {
        skip_newlines(p);
        if p.cur().kind == TokenKind::OrOr {
            p.advance();
            skip_newlines(p);
            let rhs = parse_and(p)?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_and(p: &mut Parser) -> Result<CondExpr, ParseError> {
    let mut lhs = parse_not(p)?;
    loop {
        skip_newlines(p);
        if p.cur().kind == TokenKind::AndAnd {
            p.advance();
            skip_newlines(p);
            let rhs = parse_not(p)?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_not(p: &mut Parser) -> Result<CondExpr, ParseError> {
    skip_newlines(p);
    if p.cur().kind == TokenKind::Bang {
        p.advance();
        let operand = parse_not(p)?;
        return Ok(CondExpr::Not(Box::new(operand)));
    }
    parse_primary(p)
}

fn parse_primary(p: &mut Parser) -> Result<CondExpr, ParseError> {
    skip_newlines(p);

    if p.cur().kind == TokenKind::LParen {
        p.advance();
        let inner = parse_or(p)?;
        skip_newlines(p);
        if p.cur().kind != TokenKind::RParen {
            return Err(p.unexpected("`)'"));
        }
        p.advance();
        return Ok(CondExpr::Group(Box::new(inner)));
    }

    // Unary operator with an operand word.
    if let Some(op) = unary_op(&p.cur().text) {
        if p.cur().kind.is_wordlike() && operand_follows(p) {
            p.advance();
            let operand = parse_operand(p)?;
            return Ok(CondExpr::Unary { op, operand });
        }
    }

    let lhs = parse_operand(p)?;

    if let Some(op) = binary_op(p) {
        p.advance();
        if op == CondBinOp::Regex {
            let rhs = collect_regex_rhs(p)?;
            return Ok(CondExpr::Binary { op, lhs, rhs });
        }
        let rhs = parse_operand(p)?;
        return Ok(CondExpr::Binary { op, lhs, rhs });
    }

    Ok(CondExpr::Word(lhs))
}

/// True when the token after the current one can be a test operand.
fn operand_follows(p: &Parser) -> bool {
    matches!(
        p.peek_kind(1),
        k if k.is_wordlike()
    )
}

fn parse_operand(p: &mut Parser) -> Result<WordNode, ParseError> {
    let t = p.cur().clone();
    if !t.kind.is_wordlike() {
        return Err(p.unexpected("conditional operand"));
    }
    p.advance();
    p.build_word(&t)
}

fn unary_op(text: &str) -> Option<CondUnaryOp> {
    Some(match text {
        "-b" => CondUnaryOp::BlockSpecial,
        "-c" => CondUnaryOp::CharSpecial,
        "-d" => CondUnaryOp::Directory,
        "-e" => CondUnaryOp::Exists,
        "-f" => CondUnaryOp::RegularFile,
        "-g" => CondUnaryOp::SetGid,
        "-h" | "-L" => CondUnaryOp::Symlink,
        "-k" => CondUnaryOp::Sticky,
        "-p" => CondUnaryOp::Fifo,
        "-r" => CondUnaryOp::Readable,
        "-s" => CondUnaryOp::NonEmptyFile,
        "-t" => CondUnaryOp::Terminal,
        "-u" => CondUnaryOp::SetUid,
        "-w" => CondUnaryOp::Writable,
        "-x" => CondUnaryOp::Executable,
        "-O" => CondUnaryOp::OwnedByEuid,
        "-G" => CondUnaryOp::OwnedByEgid,
        "-S" => CondUnaryOp::Socket,
        "-N" => CondUnaryOp::ModifiedSince,
        "-z" => CondUnaryOp::ZeroLength,
        "-n" => CondUnaryOp::NonZeroLength,
        "-v" => CondUnaryOp::VarSet,
        "-o" => CondUnaryOp::OptionSet,
        _ => return None,
    })
}

fn binary_op(p: &Parser) -> Option<CondBinOp> {
    match p.cur().kind {
        TokenKind::Less => return Some(CondBinOp::StrLt),
        TokenKind::Great => return Some(CondBinOp::StrGt),
        _ => {}
    }
    if !p.cur().kind.is_wordlike() {
        return None;
    }
    Some(match p.cur().text.as_str() {
        "=" | "==" => CondBinOp::StrEq,
        "!=" => CondBinOp::StrNe,
        "=~" => CondBinOp::Regex,
        "-eq" => CondBinOp::NumEq,
        "-ne" => CondBinOp::NumNe,
        "-lt" => CondBinOp::NumLt,
        "-le" => CondBinOp::NumLe,
        "-gt" => CondBinOp::NumGt,
        "-ge" => CondBinOp::NumGe,
        "-nt" => CondBinOp::NewerThan,
        "-ot" => CondBinOp::OlderThan,
        "-ef" => CondBinOp::SameFile,
        _ => return None,
    })
}

/// Collect the raw regex text after `=~`.
fn collect_regex_rhs(p: &mut Parser) -> Result<WordNode, ParseError> {
    skip_newlines(p);
    let first = p.cur().clone();
    if matches!(
        first.kind,
        TokenKind::CondEnd | TokenKind::AndAnd | TokenKind::OrOr | TokenKind::Newline | TokenKind::Eof
    ) {
        return Err(p.unexpected("regular expression"));
    }

    let start = first.start;
    let mut end = first.end;
    let mut depth: usize = match first.kind {
        TokenKind::LParen => 1,
        _ => 0,
    };
    let mut prev_end = first.end;
    p.advance();

    loop {
        let t = p.cur().clone();
        let stop = matches!(
            t.kind,
            TokenKind::CondEnd
                | TokenKind::AndAnd
                | TokenKind::OrOr
                | TokenKind::Newline
                | TokenKind::Eof
        );
        if stop && depth == 0 {
            break;
        }
        let touching = t.start == prev_end;
        if depth == 0 && !touching {
            break;
        }
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        end = t.end;
        prev_end = t.end;
        p.advance();
    }

    let text: String = p.source[start.min(p.source.len())..end.min(p.source.len())]
        .iter()
        .collect();
    parse_word_text(&text, false).map_err(|e| ParseError::new(e.message, first.line, first.column))
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse;

    fn cond_of(src: &str) -> CondExpr {
        let ast = parse(src).unwrap();
        match &ast.statements[0].pipelines[0].commands[0] {
            CommandNode::Compound(CompoundCommandNode::Conditional(c)) => c.expression.clone(),
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn unary_file_test() {
        match cond_of("[[ -f /etc/passwd ]]") {
            CondExpr::Unary { op, .. } => assert_eq!(op, CondUnaryOp::RegularFile),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binary_string_compare() {
        match cond_of("[[ $a == b* ]]") {
            CondExpr::Binary { op, rhs, .. } => {
                assert_eq!(op, CondBinOp::StrEq);
                assert!(rhs.parts.iter().any(|p| matches!(p, WordPart::Glob(_))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn and_or_not_precedence() {
        // ! binds tighter than &&, which binds tighter than ||.
        match cond_of("[[ ! -z $a && -n $b || -d /tmp ]]") {
            CondExpr::Or(lhs, _) => match *lhs {
                CondExpr::And(l2, _) => assert!(matches!(*l2, CondExpr::Not(_))),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn grouping() {
        assert!(matches!(
            cond_of("[[ ( -n $a || -n $b ) && -n $c ]]"),
            CondExpr::And(..)
        ));
    }

    #[test]
    fn regex_rhs_collected() {
        match cond_of("[[ $x =~ ^a|b$ ]]") {
            CondExpr::Binary { op, rhs, .. } => {
                assert_eq!(op, CondBinOp::Regex);
                let text: String = crate::parser::parser::flatten_word(&rhs);
                assert_eq!(text, "^a|b$");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn regex_with_paren_group_and_spaces() {
        match cond_of("[[ $x =~ ^(a | b)$ ]]") {
            CondExpr::Binary { rhs, .. } => {
                let text: String = crate::parser::parser::flatten_word(&rhs);
                assert_eq!(text, "^(a | b)$");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn numeric_compare() {
        match cond_of("[[ 3 -lt 5 ]]") {
            CondExpr::Binary { op, .. } => assert_eq!(op, CondBinOp::NumLt),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bare_word_test() {
        assert!(matches!(cond_of("[[ $x ]]"), CondExpr::Word(_)));
    }
}
