//! test / [ builtin.
//!
//! The classic POSIX test evaluator over pre-expanded arguments: unary
//! string/file tests, binary string and numeric comparisons, `!`, `-a`,
//! `-o`, and parentheses. Unlike `[[ ]]`, `=` compares literally (no
//! pattern matching) and operands here have already been split and globbed.

use crate::interp::engine::Executor;
use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::ShellState;
use crate::interp::vars;

pub fn test_cmd(
    exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    bracket: bool,
) -> ExecOutcome {
    let mut args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    if bracket {
        match args.last() {
            Some(&"]") => {
                args.pop();
            }
            _ => {
                return Ok(ExecResult::failure_with_code(
                    "bash: [: missing `]'\n",
                    2,
                ))
            }
        }
    }

    let mut p = TestParser {
        exec,
        st,
        args,
        pos: 0,
    };
    match p.parse_or() {
        Ok(value) => {
            if p.pos < p.args.len() {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: test: {}: unexpected argument\n", p.args[p.pos]),
                    2,
                ));
            }
            Ok(ExecResult::code(if value { 0 } else { 1 }))
        }
        Err(message) => Ok(ExecResult::failure_with_code(message, 2)),
    }
}

struct TestParser<'a, 'b> {
    exec: &'a Executor<'a>,
    st: &'a mut ShellState,
    args: Vec<&'b str>,
    pos: usize,
}

impl TestParser<'_, '_> {
    fn peek(&self) -> Option<&str> {
        self.args.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&str> {
        let value = self.args.get(self.pos).copied();
        if value.is_some() {
            self.pos += 1;
        }
        value
    }

    fn parse_or(&mut self) -> Result<bool, String> {
        let mut value = self.parse_and()?;
        while self.peek() == Some("-o") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<bool, String> {
        let mut value = self.parse_term()?;
        while self.peek() == Some("-a") {
            self.pos += 1;
            let rhs = self.parse_term()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<bool, String> {
        match self.peek() {
            None => Ok(false),
            Some("!") => {
                self.pos += 1;
                Ok(!self.parse_term()?)
            }
            Some("(") => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.next() != Some(")") {
                    return Err("bash: test: `)' expected\n".to_string());
                }
                Ok(inner)
            }
            Some(first) => {
                let first = first.to_string();
                // Binary when an operator follows.
                if let Some(op) = self.args.get(self.pos + 1).copied() {
                    let op = op.to_string();
                    if is_binary_op(&op) && self.args.len() > self.pos + 2 {
                        let lhs = first.to_string();
                        self.pos += 2;
                        let rhs = self.next().unwrap_or("").to_string();
                        return self.binary(&lhs, &op, &rhs);
                    }
                }
                if first.starts_with('-') && first.len() == 2 {
                    let op = first.to_string();
                    self.pos += 1;
                    match self.next() {
                        Some(operand) => {
                            let operand = operand.to_string();
                            return self.unary(&op, &operand);
                        }
                        // A lone operator word is a non-empty string.
                        None => return Ok(true),
                    }
                }
                self.pos += 1;
                Ok(!first.is_empty())
            }
        }
    }

    fn unary(&mut self, op: &str, operand: &str) -> Result<bool, String> {
        let host = self.exec.host;
        let abs = host.resolve_path(&self.st.cwd, operand);
        Ok(match op {
            "-z" => operand.is_empty(),
            "-n" => !operand.is_empty(),
            "-e" => host.exists(&abs),
            "-f" => host.is_file(&abs),
            "-d" => host.is_dir(&abs),
            "-s" => host.stat(&abs).map(|s| s.size > 0).unwrap_or(false),
            "-r" => host.stat(&abs).map(|s| s.mode & 0o444 != 0).unwrap_or(false),
            "-w" => host.stat(&abs).map(|s| s.mode & 0o222 != 0).unwrap_or(false),
            "-x" => host
                .stat(&abs)
                .map(|s| s.is_directory || s.mode & 0o111 != 0)
                .unwrap_or(false),
            "-L" | "-h" => host.lstat(&abs).map(|s| s.is_symlink).unwrap_or(false),
            "-v" => vars::read_var(self.st, operand).is_some(),
            "-o" => self.st.options.get(operand) == Some(true),
            "-t" => false,
            "-b" | "-c" | "-p" | "-S" | "-g" | "-u" | "-k" => false,
            _ => return Err(format!("bash: test: {}: unary operator expected\n", op)),
        })
    }

    fn binary(&mut self, lhs: &str, op: &str, rhs: &str) -> Result<bool, String> {
        let numeric = |s: &str| -> Result<i64, String> {
            s.trim()
                .parse::<i64>()
                .map_err(|_| format!("bash: test: {}: integer expression expected\n", s))
        };
        Ok(match op {
            "=" | "==" => lhs == rhs,
            "!=" => lhs != rhs,
            "<" => lhs < rhs,
            ">" => lhs > rhs,
            "-eq" => numeric(lhs)? == numeric(rhs)?,
            "-ne" => numeric(lhs)? != numeric(rhs)?,
            "-lt" => numeric(lhs)? < numeric(rhs)?,
            "-le" => numeric(lhs)? <= numeric(rhs)?,
            "-gt" => numeric(lhs)? > numeric(rhs)?,
            "-ge" => numeric(lhs)? >= numeric(rhs)?,
            "-nt" | "-ot" | "-ef" => {
                let host = self.exec.host;
                let la = host.resolve_path(&self.st.cwd, lhs);
                let ra = host.resolve_path(&self.st.cwd, rhs);
                match op {
                    "-ef" => host.exists(&la) && la == ra,
                    "-nt" => match (host.stat(&la), host.stat(&ra)) {
                        (Ok(l), Ok(r)) => l.mtime > r.mtime,
                        (Ok(_), Err(_)) => true,
                        _ => false,
                    },
                    _ => match (host.stat(&la), host.stat(&ra)) {
                        (Ok(l), Ok(r)) => l.mtime < r.mtime,
                        (Err(_), Ok(_)) => true,
                        _ => false,
                    },
                }
            }
            _ => return Err(format!("bash: test: {}: binary operator expected\n", op)),
        })
    }
}

fn is_binary_op(op: &str) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-nt"
            | "-ot" | "-ef"
    )
}
