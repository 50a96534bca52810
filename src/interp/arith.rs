//! Arithmetic evaluation.
//!
//! Evaluates `ArithExpr` trees against the shell state. Bare names resolve
//! through the environment recursively (`x="y+1"` evaluates `y+1`), with a
//! depth guard. Assignment operators write back through the variable layer,
//! so namerefs and case attributes apply. Division and modulo by zero are
//! recoverable and yield zero; real errors surface as arithmetic signals.

use crate::ast::{ArithAssignOp, ArithBinOp, ArithExpr, ArithUnaryOp};
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, Output};
use crate::interp::state::{ShellState, Value};
use crate::interp::vars;

const MAX_RECURSION: usize = 64;

pub fn eval_arith(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    expr: &ArithExpr,
) -> Result<i64, ControlFlow> {
    eval(exec, st, out, expr, 0)
}

fn eval(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    expr: &ArithExpr,
    depth: usize,
) -> Result<i64, ControlFlow> {
    if depth > MAX_RECURSION {
        return Err(ControlFlow::arithmetic("expression recursion level exceeded"));
    }
    match expr {
        ArithExpr::Number(n) => Ok(*n),
        ArithExpr::CharLiteral(code) => Ok(*code),
        ArithExpr::Empty => Ok(0),
        ArithExpr::Error { message } => Err(ControlFlow::arithmetic(message.clone())),
        ArithExpr::Group(inner) => eval(exec, st, out, inner, depth),
        ArithExpr::Variable { name, .. } => resolve_name(exec, st, out, name, depth),
        ArithExpr::Element { array, index, key } => {
            let value = read_element(exec, st, out, array, index.as_deref(), key.as_deref(), depth)?;
            resolve_text(exec, st, out, &value, depth + 1)
        }
        ArithExpr::Binary { op, lhs, rhs } => {
            match op {
                ArithBinOp::LogAnd => {
                    let l = eval(exec, st, out, lhs, depth)?;
                    if l == 0 {
                        return Ok(0);
                    }
                    let r = eval(exec, st, out, rhs, depth)?;
                    return Ok((r != 0) as i64);
                }
                ArithBinOp::LogOr => {
                    let l = eval(exec, st, out, lhs, depth)?;
                    if l != 0 {
                        return Ok(1);
                    }
                    let r = eval(exec, st, out, rhs, depth)?;
                    return Ok((r != 0) as i64);
                }
                ArithBinOp::Comma => {
                    eval(exec, st, out, lhs, depth)?;
                    return eval(exec, st, out, rhs, depth);
                }
                _ => {}
            }
            let l = eval(exec, st, out, lhs, depth)?;
            let r = eval(exec, st, out, rhs, depth)?;
            binary(*op, l, r)
        }
        ArithExpr::Unary {
            op,
            operand,
            postfix,
        } => match op {
            ArithUnaryOp::Neg => Ok(eval(exec, st, out, operand, depth)?.wrapping_neg()),
            ArithUnaryOp::Pos => eval(exec, st, out, operand, depth),
            ArithUnaryOp::Not => Ok((eval(exec, st, out, operand, depth)? == 0) as i64),
            ArithUnaryOp::BitNot => Ok(!eval(exec, st, out, operand, depth)?),
            ArithUnaryOp::Inc | ArithUnaryOp::Dec => {
                let delta = if *op == ArithUnaryOp::Inc { 1 } else { -1 };
                let old = eval(exec, st, out, operand, depth)?;
                let new = old.wrapping_add(delta);
                write_target(exec, st, out, operand, new, depth)?;
                Ok(if *postfix { old } else { new })
            }
        },
        ArithExpr::Ternary { cond, then, other } => {
            if eval(exec, st, out, cond, depth)? != 0 {
                eval(exec, st, out, then, depth)
            } else {
                eval(exec, st, out, other, depth)
            }
        }
        ArithExpr::Assign {
            op,
            name,
            index,
            key,
            value,
        } => {
            let rhs = eval(exec, st, out, value, depth)?;
            let new = if *op == ArithAssignOp::Assign {
                rhs
            } else {
                let target = ArithExpr::Element {
                    array: name.clone(),
                    index: index.clone(),
                    key: key.clone(),
                };
                let current = if index.is_none() && key.is_none() {
                    resolve_name(exec, st, out, name, depth)?
                } else {
                    eval(exec, st, out, &target, depth)?
                };
                apply_compound(*op, current, rhs)?
            };
            store(exec, st, out, name, index.as_deref(), key.as_deref(), new, depth)?;
            Ok(new)
        }
        ArithExpr::CommandSubst(script) => {
            let result = exec.run_command_substitution(st, script)?;
            out.stderr.push_str(&result.stderr);
            let text = result.stdout.trim().to_string();
            resolve_text(exec, st, out, &text, depth + 1)
        }
    }
}

fn binary(op: ArithBinOp, l: i64, r: i64) -> Result<i64, ControlFlow> {
    Ok(match op {
        ArithBinOp::Add => l.wrapping_add(r),
        ArithBinOp::Sub => l.wrapping_sub(r),
        ArithBinOp::Mul => l.wrapping_mul(r),
        ArithBinOp::Div => {
            if r == 0 {
                // Division by zero is recoverable: the expression yields 0.
                0
            } else {
                l.wrapping_div(r)
            }
        }
        ArithBinOp::Mod => {
            if r == 0 {
                0
            } else {
                l.wrapping_rem(r)
            }
        }
        ArithBinOp::Pow => {
            if r < 0 {
                return Err(ControlFlow::arithmetic("exponent less than 0"));
            }
            let mut acc: i64 = 1;
            for _ in 0..r.min(4096) {
                acc = acc.wrapping_mul(l);
            }
            acc
        }
        ArithBinOp::Shl => l.wrapping_shl(r as u32),
        ArithBinOp::Shr => l.wrapping_shr(r as u32),
        ArithBinOp::Lt => (l < r) as i64,
        ArithBinOp::Le => (l <= r) as i64,
        ArithBinOp::Gt => (l > r) as i64,
        ArithBinOp::Ge => (l >= r) as i64,
        ArithBinOp::Eq => (l == r) as i64,
        ArithBinOp::Ne => (l != r) as i64,
        ArithBinOp::BitAnd => l & r,
        ArithBinOp::BitOr => l | r,
        ArithBinOp::BitXor => l ^ r,
        ArithBinOp::LogAnd | ArithBinOp::LogOr | ArithBinOp::Comma => {
            unreachable!("handled before operand evaluation")
        }
    })
}

fn apply_compound(op: ArithAssignOp, current: i64, rhs: i64) -> Result<i64, ControlFlow> {
    let bin = match op {
        ArithAssignOp::Assign => unreachable!(),
        ArithAssignOp::Add => ArithBinOp::Add,
        ArithAssignOp::Sub => ArithBinOp::Sub,
        ArithAssignOp::Mul => ArithBinOp::Mul,
        ArithAssignOp::Div => ArithBinOp::Div,
        ArithAssignOp::Mod => ArithBinOp::Mod,
        ArithAssignOp::Pow => ArithBinOp::Pow,
        ArithAssignOp::Shl => ArithBinOp::Shl,
        ArithAssignOp::Shr => ArithBinOp::Shr,
        ArithAssignOp::And => ArithBinOp::BitAnd,
        ArithAssignOp::Or => ArithBinOp::BitOr,
        ArithAssignOp::Xor => ArithBinOp::BitXor,
    };
    binary(bin, current, rhs)
}

/// Resolve a bare name: `true`/`false` literals, then the variable's value
/// evaluated as an arithmetic expression.
fn resolve_name(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    name: &str,
    depth: usize,
) -> Result<i64, ControlFlow> {
    match name {
        "true" if vars::get_string(st, "true").is_none() => return Ok(1),
        "false" if vars::get_string(st, "false").is_none() => return Ok(0),
        _ => {}
    }
    match vars::get_string(st, name) {
        Some(text) => resolve_text(exec, st, out, &text, depth + 1),
        None => {
            if st.options.nounset {
                return Err(ControlFlow::nounset(name));
            }
            Ok(0)
        }
    }
}

/// Evaluate arbitrary text as an arithmetic value.
fn resolve_text(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    text: &str,
    depth: usize,
) -> Result<i64, ControlFlow> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        // Plain decimal, the common case; octal re-parsing happens below.
        if !(trimmed.len() > 1
            && (trimmed.starts_with('0') || trimmed.starts_with("-0")))
        {
            return Ok(n);
        }
    }
    let expr = crate::parser::arith::parse_arith(trimmed);
    eval(exec, st, out, &expr, depth)
}

fn read_element(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    array: &str,
    index: Option<&ArithExpr>,
    key: Option<&str>,
    depth: usize,
) -> Result<String, ControlFlow> {
    if vars::is_assoc(st, array) {
        let key = key.unwrap_or("").trim().to_string();
        return Ok(match vars::read_var(st, array) {
            Some(Value::Assoc(map)) => map.get(&key).cloned().unwrap_or_default(),
            _ => String::new(),
        });
    }
    let idx = match index {
        Some(expr) => eval(exec, st, out, expr, depth)?,
        None => 0,
    };
    Ok(match vars::read_var(st, array) {
        Some(Value::Indexed(map)) => {
            let idx = if idx < 0 {
                map.keys().next_back().copied().unwrap_or(-1) + 1 + idx
            } else {
                idx
            };
            map.get(&idx).cloned().unwrap_or_default()
        }
        Some(Value::Scalar(s)) => {
            if idx == 0 {
                s
            } else {
                String::new()
            }
        }
        _ => String::new(),
    })
}

fn store(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    name: &str,
    index: Option<&ArithExpr>,
    key: Option<&str>,
    value: i64,
    depth: usize,
) -> Result<(), ControlFlow> {
    let text = value.to_string();
    let result = if index.is_none() && key.is_none() {
        vars::set_scalar(st, name, &text, false)
    } else if vars::is_assoc(st, name) {
        vars::set_element(st, name, key.unwrap_or("").trim(), &text, false)
    } else {
        let idx = match index {
            Some(expr) => eval(exec, st, out, expr, depth)?,
            None => 0,
        };
        vars::set_element(st, name, &idx.to_string(), &text, false)
    };
    result.map_err(|name| {
        ControlFlow::arithmetic(format!("{}: readonly variable", name))
    })
}

fn write_target(
    exec: &Executor,
    st: &mut ShellState,
    out: &mut Output,
    target: &ArithExpr,
    value: i64,
    depth: usize,
) -> Result<(), ControlFlow> {
    match target {
        ArithExpr::Variable { name, .. } => {
            store(exec, st, out, name, None, None, value, depth)
        }
        ArithExpr::Element { array, index, key } => store(
            exec,
            st,
            out,
            array,
            index.as_deref(),
            key.as_deref(),
            value,
            depth,
        ),
        ArithExpr::Group(inner) => write_target(exec, st, out, inner, value, depth),
        _ => Err(ControlFlow::arithmetic("attempted assignment to non-variable")),
    }
}
