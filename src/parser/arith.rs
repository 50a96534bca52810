//! Arithmetic expression parser.
//!
//! Parses the raw text of `$(( ... ))`, `(( ... ))`, `$[ ... ]`, C-style
//! for-loop slots, and arithmetic contexts in parameter expansion. Follows C
//! precedence with right-associative `**` and the comma operator at the
//! bottom. Parse failures become `ArithExpr::Error` nodes so they surface at
//! evaluation time, matching bash's lazy reporting.

use crate::ast::{ArithAssignOp, ArithBinOp, ArithExpr, ArithUnaryOp};

/// Parse an arithmetic expression from raw text.
pub fn parse_arith(text: &str) -> ArithExpr {
    let tokens = match scan(text) {
        Ok(t) => t,
        Err(message) => return ArithExpr::Error { message },
    };
    if tokens.is_empty() {
        return ArithExpr::Empty;
    }
    let mut p = ArithParser { tokens, pos: 0 };
    match p.parse_comma() {
        Ok(expr) => {
            if p.pos < p.tokens.len() {
                ArithExpr::Error {
                    message: format!(
                        "syntax error in expression (error token is \"{}\")",
                        p.tokens[p.pos].text()
                    ),
                }
            } else {
                expr
            }
        }
        Err(message) => ArithExpr::Error { message },
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ATok {
    Num(i64),
    /// Number with an invalid digit for its base; reported at evaluation.
    BadNum(String),
    Ident(String),
    /// `$name` / `${name}` / `$N` / `$#` etc.
    Dollar(String),
    /// `$(cmd)` body text.
    Subst(String),
    /// `'c'`
    Char(i64),
    Op(&'static str),
}

impl ATok {
    fn text(&self) -> String {
        match self {
            ATok::Num(n) => n.to_string(),
            ATok::BadNum(s) => s.clone(),
            ATok::Ident(s) => s.clone(),
            ATok::Dollar(s) => format!("${}", s),
            ATok::Subst(s) => format!("$({})", s),
            ATok::Char(c) => format!("'{}'", c),
            ATok::Op(s) => s.to_string(),
        }
    }
}

const OPS: &[&str] = &[
    "<<=", ">>=", "**", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "&=", "^=", "|=", "?", ":", ",", "(", ")", "[", "]", "=", "<", ">", "+",
    "-", "*", "/", "%", "&", "|", "^", "!", "~",
];

fn scan(text: &str) -> Result<Vec<ATok>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    'outer: while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '\\' {
            i += 1;
            continue;
        }

        if c == '\'' {
            // Character literal: evaluates to the character code.
            if let Some(&ch) = chars.get(i + 1) {
                if chars.get(i + 2) == Some(&'\'') {
                    out.push(ATok::Char(ch as i64));
                    i += 3;
                    continue;
                }
            }
            return Err("unterminated character constant".to_string());
        }

        if c == '"' {
            // Double quotes around arithmetic text are transparent.
            i += 1;
            continue;
        }

        if c == '$' {
            match chars.get(i + 1) {
                Some('(') => {
                    let mut depth = 1usize;
                    let mut j = i + 2;
                    while j < chars.len() && depth > 0 {
                        match chars[j] {
                            '(' => depth += 1,
                            ')' => depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    if depth != 0 {
                        return Err("unterminated command substitution".to_string());
                    }
                    let body: String = chars[i + 2..j - 1].iter().collect();
                    out.push(ATok::Subst(body));
                    i = j;
                    continue;
                }
                Some('{') => {
                    let mut j = i + 2;
                    while j < chars.len() && chars[j] != '}' {
                        j += 1;
                    }
                    if j >= chars.len() {
                        return Err("bad substitution".to_string());
                    }
                    let name: String = chars[i + 2..j].iter().collect();
                    out.push(ATok::Dollar(name));
                    i = j + 1;
                    continue;
                }
                Some(&n) if n.is_ascii_alphabetic() || n == '_' => {
                    let mut j = i + 1;
                    while j < chars.len()
                        && (chars[j].is_ascii_alphanumeric() || chars[j] == '_')
                    {
                        j += 1;
                    }
                    let name: String = chars[i + 1..j].iter().collect();
                    out.push(ATok::Dollar(name));
                    i = j;
                    continue;
                }
                Some(&n) if n.is_ascii_digit() || matches!(n, '?' | '#' | '$' | '!' | '*' | '@') => {
                    out.push(ATok::Dollar(n.to_string()));
                    i += 2;
                    continue;
                }
                _ => return Err("syntax error: operand expected (error token is \"$\")".into()),
            }
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '#' || chars[i] == '@'
                    || chars[i] == '_')
            {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            out.push(parse_number(&text));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            out.push(ATok::Ident(name));
            continue;
        }

        for op in OPS {
            let oc: Vec<char> = op.chars().collect();
            if chars.len() - i >= oc.len() && chars[i..i + oc.len()] == oc[..] {
                out.push(ATok::Op(op));
                i += oc.len();
                continue 'outer;
            }
        }

        return Err(format!(
            "syntax error: operand expected (error token is \"{}\")",
            c
        ));
    }
    Ok(out)
}

/// Parse an integer literal honoring `0x` hex, leading-zero octal, and the
/// `base#digits` notation (bases 2..=64).
fn parse_number(text: &str) -> ATok {
    if let Some((base_text, digits)) = text.split_once('#') {
        let base: i64 = match base_text.parse() {
            Ok(b) if (2..=64).contains(&b) => b,
            _ => return ATok::BadNum(text.to_string()),
        };
        let mut value: i64 = 0;
        for c in digits.chars() {
            let d = match c {
                '0'..='9' => c as i64 - '0' as i64,
                'a'..='z' => c as i64 - 'a' as i64 + 10,
                'A'..='Z' => {
                    if base <= 36 {
                        c as i64 - 'A' as i64 + 10
                    } else {
                        c as i64 - 'A' as i64 + 36
                    }
                }
                '@' => 62,
                '_' => 63,
                _ => return ATok::BadNum(text.to_string()),
            };
            if d >= base {
                return ATok::BadNum(text.to_string());
            }
            value = value.wrapping_mul(base).wrapping_add(d);
        }
        if digits.is_empty() {
            return ATok::BadNum(text.to_string());
        }
        return ATok::Num(value);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return match i64::from_str_radix(hex, 16) {
            Ok(v) => ATok::Num(v),
            Err(_) => ATok::BadNum(text.to_string()),
        };
    }
    if text.len() > 1 && text.starts_with('0') {
        return match i64::from_str_radix(&text[1..], 8) {
            Ok(v) => ATok::Num(v),
            Err(_) => ATok::BadNum(text.to_string()),
        };
    }
    match text.parse::<i64>() {
        Ok(v) => ATok::Num(v),
        Err(_) => ATok::BadNum(text.to_string()),
    }
}

struct ArithParser {
    tokens: Vec<ATok>,
    pos: usize,
}

impl ArithParser {
    fn peek(&self) -> Option<&ATok> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(ATok::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), String> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(format!("syntax error: `{}' expected", op))
        }
    }

    fn parse_comma(&mut self) -> Result<ArithExpr, String> {
        let mut lhs = self.parse_assign()?;
        while self.eat_op(",") {
            let rhs = self.parse_assign()?;
            lhs = ArithExpr::Binary {
                op: ArithBinOp::Comma,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_assign(&mut self) -> Result<ArithExpr, String> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            Some(ATok::Op("=")) => Some(ArithAssignOp::Assign),
            Some(ATok::Op("+=")) => Some(ArithAssignOp::Add),
            Some(ATok::Op("-=")) => Some(ArithAssignOp::Sub),
            Some(ATok::Op("*=")) => Some(ArithAssignOp::Mul),
            Some(ATok::Op("/=")) => Some(ArithAssignOp::Div),
            Some(ATok::Op("%=")) => Some(ArithAssignOp::Mod),
            Some(ATok::Op("<<=")) => Some(ArithAssignOp::Shl),
            Some(ATok::Op(">>=")) => Some(ArithAssignOp::Shr),
            Some(ATok::Op("&=")) => Some(ArithAssignOp::And),
            Some(ATok::Op("|=")) => Some(ArithAssignOp::Or),
            Some(ATok::Op("^=")) => Some(ArithAssignOp::Xor),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };

        let (name, index, key) = match lhs {
            ArithExpr::Variable { name, .. } => (name, None, None),
            ArithExpr::Element { array, index, key } => (array, index, key),
            _ => return Err("attempted assignment to non-variable".to_string()),
        };
        self.pos += 1;
        let value = self.parse_assign()?;
        Ok(ArithExpr::Assign {
            op,
            name,
            index,
            key,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<ArithExpr, String> {
        let cond = self.parse_binary(0)?;
        if self.eat_op("?") {
            let then = self.parse_assign()?;
            self.expect_op(":")?;
            let other = self.parse_assign()?;
            return Ok(ArithExpr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                other: Box::new(other),
            });
        }
        Ok(cond)
    }

    /// Precedence-climbing over the binary operator table.
    fn parse_binary(&mut self, min_level: usize) -> Result<ArithExpr, String> {
        const LEVELS: &[&[(&str, ArithBinOp)]] = &[
            &[("||", ArithBinOp::LogOr)],
            &[("&&", ArithBinOp::LogAnd)],
            &[("|", ArithBinOp::BitOr)],
            &[("^", ArithBinOp::BitXor)],
            &[("&", ArithBinOp::BitAnd)],
            &[("==", ArithBinOp::Eq), ("!=", ArithBinOp::Ne)],
            &[
                ("<=", ArithBinOp::Le),
                (">=", ArithBinOp::Ge),
                ("<", ArithBinOp::Lt),
                (">", ArithBinOp::Gt),
            ],
            &[("<<", ArithBinOp::Shl), (">>", ArithBinOp::Shr)],
            &[("+", ArithBinOp::Add), ("-", ArithBinOp::Sub)],
            &[
                ("*", ArithBinOp::Mul),
                ("/", ArithBinOp::Div),
                ("%", ArithBinOp::Mod),
            ],
        ];

        if min_level == LEVELS.len() {
            return self.parse_power();
        }
        let mut lhs = self.parse_binary(min_level + 1)?;
        'outer: loop {
            for (text, op) in LEVELS[min_level] {
                if matches!(self.peek(), Some(ATok::Op(o)) if o == text) {
                    self.pos += 1;
                    let rhs = self.parse_binary(min_level + 1)?;
                    lhs = ArithExpr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> Result<ArithExpr, String> {
        let base = self.parse_unary()?;
        if self.eat_op("**") {
            // Right-associative.
            let exp = self.parse_power()?;
            return Ok(ArithExpr::Binary {
                op: ArithBinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<ArithExpr, String> {
        let (op, prefix_incdec) = match self.peek() {
            Some(ATok::Op("!")) => (Some(ArithUnaryOp::Not), false),
            Some(ATok::Op("~")) => (Some(ArithUnaryOp::BitNot), false),
            Some(ATok::Op("-")) => (Some(ArithUnaryOp::Neg), false),
            Some(ATok::Op("+")) => (Some(ArithUnaryOp::Pos), false),
            Some(ATok::Op("++")) => (Some(ArithUnaryOp::Inc), true),
            Some(ATok::Op("--")) => (Some(ArithUnaryOp::Dec), true),
            _ => (None, false),
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            if prefix_incdec
                && !matches!(operand, ArithExpr::Variable { .. } | ArithExpr::Element { .. })
            {
                return Err("syntax error: operand expected".to_string());
            }
            return Ok(ArithExpr::Unary {
                op,
                operand: Box::new(operand),
                postfix: false,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ArithExpr, String> {
        let primary = self.parse_primary()?;
        if matches!(primary, ArithExpr::Variable { .. } | ArithExpr::Element { .. }) {
            if self.eat_op("++") {
                return Ok(ArithExpr::Unary {
                    op: ArithUnaryOp::Inc,
                    operand: Box::new(primary),
                    postfix: true,
                });
            }
            if self.eat_op("--") {
                return Ok(ArithExpr::Unary {
                    op: ArithUnaryOp::Dec,
                    operand: Box::new(primary),
                    postfix: true,
                });
            }
        }
        Ok(primary)
    }

    fn parse_primary(&mut self) -> Result<ArithExpr, String> {
        match self.peek().cloned() {
            Some(ATok::Num(n)) => {
                self.pos += 1;
                Ok(ArithExpr::Number(n))
            }
            Some(ATok::BadNum(text)) => {
                self.pos += 1;
                Err(format!("{}: value too great for base (error token is \"{}\")", text, text))
            }
            Some(ATok::Char(code)) => {
                self.pos += 1;
                Ok(ArithExpr::CharLiteral(code))
            }
            Some(ATok::Subst(body)) => {
                self.pos += 1;
                let script = crate::parser::parse(&body)
                    .map_err(|e| format!("command substitution: {}", e))?;
                Ok(ArithExpr::CommandSubst(script))
            }
            Some(ATok::Dollar(name)) => {
                self.pos += 1;
                Ok(ArithExpr::Variable { name, dollar: true })
            }
            Some(ATok::Ident(name)) => {
                self.pos += 1;
                if self.eat_op("[") {
                    let (index, key) = self.parse_subscript()?;
                    return Ok(ArithExpr::Element {
                        array: name,
                        index,
                        key,
                    });
                }
                Ok(ArithExpr::Variable {
                    name,
                    dollar: false,
                })
            }
            Some(ATok::Op("(")) => {
                self.pos += 1;
                let inner = self.parse_comma()?;
                self.expect_op(")")?;
                Ok(ArithExpr::Group(Box::new(inner)))
            }
            Some(other) => Err(format!(
                "syntax error: operand expected (error token is \"{}\")",
                other.text()
            )),
            None => Err("syntax error: operand expected (error token is \"\")".to_string()),
        }
    }

    /// Parse a `[...]` subscript. The parsed expression serves indexed
    /// arrays; the raw token text is retained as the key for associative
    /// arrays, which the evaluator selects by the array's attributes.
    fn parse_subscript(&mut self) -> Result<(Option<Box<ArithExpr>>, Option<String>), String> {
        let start = self.pos;
        let mut depth = 1usize;
        let mut end = self.pos;
        while let Some(tok) = self.tokens.get(end) {
            match tok {
                ATok::Op("[") => depth += 1,
                ATok::Op("]") => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end += 1;
        }
        if depth != 0 {
            return Err("syntax error: `]' expected".to_string());
        }
        let key: String = self.tokens[start..end]
            .iter()
            .map(|t| t.text())
            .collect::<Vec<_>>()
            .join("");
        let mut sub = ArithParser {
            tokens: self.tokens[start..end].to_vec(),
            pos: 0,
        };
        let index = if sub.tokens.is_empty() {
            None
        } else {
            match sub.parse_comma() {
                Ok(expr) if sub.pos == sub.tokens.len() => Some(Box::new(expr)),
                _ => None,
            }
        };
        self.pos = end + 1;
        Ok((index, Some(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        // 1 + 2 * 3
        match parse_arith("1 + 2 * 3") {
            ArithExpr::Binary { op, rhs, .. } => {
                assert_eq!(op, ArithBinOp::Add);
                assert!(matches!(
                    *rhs,
                    ArithExpr::Binary {
                        op: ArithBinOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        // 2 ** 3 ** 2 == 2 ** (3 ** 2)
        match parse_arith("2 ** 3 ** 2") {
            ArithExpr::Binary { op, rhs, .. } => {
                assert_eq!(op, ArithBinOp::Pow);
                assert!(matches!(
                    *rhs,
                    ArithExpr::Binary {
                        op: ArithBinOp::Pow,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bases() {
        assert_eq!(parse_arith("0x10"), ArithExpr::Number(16));
        assert_eq!(parse_arith("010"), ArithExpr::Number(8));
        assert_eq!(parse_arith("2#101"), ArithExpr::Number(5));
        assert_eq!(parse_arith("16#ff"), ArithExpr::Number(255));
    }

    #[test]
    fn char_literal() {
        assert_eq!(parse_arith("'a'"), ArithExpr::CharLiteral(97));
    }

    #[test]
    fn assignment_forms() {
        match parse_arith("x += 2") {
            ArithExpr::Assign { op, name, .. } => {
                assert_eq!(op, ArithAssignOp::Add);
                assert_eq!(name, "x");
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_arith("a[i+1] = 5") {
            ArithExpr::Assign { name, index, .. } => {
                assert_eq!(name, "a");
                assert!(index.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ternary_and_comma() {
        assert!(matches!(parse_arith("a ? 1 : 2"), ArithExpr::Ternary { .. }));
        assert!(matches!(
            parse_arith("a = 1, b = 2"),
            ArithExpr::Binary {
                op: ArithBinOp::Comma,
                ..
            }
        ));
    }

    #[test]
    fn incdec() {
        assert!(matches!(
            parse_arith("i++"),
            ArithExpr::Unary {
                op: ArithUnaryOp::Inc,
                postfix: true,
                ..
            }
        ));
        assert!(matches!(
            parse_arith("--i"),
            ArithExpr::Unary {
                op: ArithUnaryOp::Dec,
                postfix: false,
                ..
            }
        ));
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(parse_arith("  "), ArithExpr::Empty);
    }

    #[test]
    fn errors_are_deferred() {
        assert!(matches!(parse_arith("1 +"), ArithExpr::Error { .. }));
        assert!(matches!(parse_arith("08"), ArithExpr::Error { .. }));
    }

    #[test]
    fn dollar_variables() {
        assert_eq!(
            parse_arith("$x + ${y}"),
            ArithExpr::Binary {
                op: ArithBinOp::Add,
                lhs: Box::new(ArithExpr::Variable {
                    name: "x".into(),
                    dollar: true
                }),
                rhs: Box::new(ArithExpr::Variable {
                    name: "y".into(),
                    dollar: true
                }),
            }
        );
    }
}
