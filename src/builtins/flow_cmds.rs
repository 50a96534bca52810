//! Control-flow builtins: exit, return, break, continue, shift.

use crate::interp::flow::{ControlFlow, ExecOutcome, ExecResult, Output};
use crate::interp::state::ShellState;

fn numeric_arg(args: &[String]) -> Result<Option<i32>, String> {
    match args.first() {
        None => Ok(None),
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) => Ok(Some((n.rem_euclid(256)) as i32)),
            Err(_) => Err(arg.clone()),
        },
    }
}

pub fn exit_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    match numeric_arg(args) {
        Ok(code) => Err(ControlFlow::exit(code.unwrap_or(st.last_exit_code))),
        Err(arg) => Err(ControlFlow::Exit {
            code: 2,
            out: Output::new("", format!("bash: exit: {}: numeric argument required\n", arg)),
        }),
    }
}

pub fn return_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if st.call_depth == 0 && st.source_depth == 0 {
        return Ok(ExecResult::failure(
            "bash: return: can only `return' from a function or sourced script\n",
        ));
    }
    match numeric_arg(args) {
        Ok(code) => Err(ControlFlow::Return {
            code: code.unwrap_or(st.last_exit_code),
            out: Output::default(),
        }),
        Err(arg) => Err(ControlFlow::Return {
            code: 2,
            out: Output::new(
                "",
                format!("bash: return: {}: numeric argument required\n", arg),
            ),
        }),
    }
}

fn loop_levels(name: &str, args: &[String]) -> Result<u32, ExecResult> {
    match args.first() {
        None => Ok(1),
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) if n >= 1 => Ok(n as u32),
            Ok(n) => Err(ExecResult::failure(format!(
                "bash: {}: {}: loop count out of range\n",
                name, n
            ))),
            Err(_) => Err(ExecResult::failure(format!(
                "bash: {}: {}: numeric argument required\n",
                name, arg
            ))),
        },
    }
}

pub fn break_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let levels = match loop_levels("break", args) {
        Ok(l) => l,
        Err(fail) => return Ok(fail),
    };
    if st.loop_depth == 0 && !st.parent_has_loop_context {
        // Outside any loop this is a silent no-op.
        return Ok(ExecResult::ok());
    }
    Err(ControlFlow::Break {
        levels,
        out: Output::default(),
    })
}

pub fn continue_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let levels = match loop_levels("continue", args) {
        Ok(l) => l,
        Err(fail) => return Ok(fail),
    };
    if st.loop_depth == 0 && !st.parent_has_loop_context {
        return Ok(ExecResult::ok());
    }
    Err(ControlFlow::Continue {
        levels,
        out: Output::default(),
    })
}

pub fn shift_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let n = match args.first() {
        None => 1usize,
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) if n >= 0 => n as usize,
            _ => {
                return Ok(ExecResult::failure(format!(
                    "bash: shift: {}: numeric argument required\n",
                    arg
                )))
            }
        },
    };
    if n > st.positional.len() {
        return Ok(ExecResult::code(1));
    }
    st.positional.drain(..n);
    Ok(ExecResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_wraps_to_byte() {
        let mut st = ShellState::default();
        match exit_cmd(&mut st, &["300".to_string()]) {
            Err(ControlFlow::Exit { code, .. }) => assert_eq!(code, 44),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shift_consumes_positionals() {
        let mut st = ShellState::default();
        st.positional = vec!["a".into(), "b".into(), "c".into()];
        shift_cmd(&mut st, &["2".to_string()]).unwrap();
        assert_eq!(st.positional, vec!["c".to_string()]);
        let result = shift_cmd(&mut st, &["5".to_string()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn break_outside_loop_is_noop() {
        let mut st = ShellState::default();
        assert_eq!(break_cmd(&mut st, &[]).unwrap().exit_code, 0);
        st.loop_depth = 1;
        assert!(break_cmd(&mut st, &[]).is_err());
    }
}
