//! Working-directory builtins: cd, pwd, pushd, popd, dirs.

use crate::interp::engine::Executor;
use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::ShellState;
use crate::interp::vars;

fn change_dir(exec: &Executor, st: &mut ShellState, target: &str) -> Result<(), String> {
    let resolved = exec.host.resolve_path(&st.cwd, target);
    if !exec.host.exists(&resolved) {
        return Err(format!("bash: cd: {}: No such file or directory\n", target));
    }
    if !exec.host.is_dir(&resolved) {
        return Err(format!("bash: cd: {}: Not a directory\n", target));
    }
    st.previous_dir = st.cwd.clone();
    st.cwd = resolved;
    let oldpwd = st.previous_dir.clone();
    let pwd = st.cwd.clone();
    let _ = vars::set_scalar(st, "OLDPWD", &oldpwd, false);
    let _ = vars::set_scalar(st, "PWD", &pwd, false);
    Ok(())
}

pub fn cd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-') || *a == "-").collect();

    let target = match positional.first() {
        None => match vars::get_string(st, "HOME") {
            Some(home) => home,
            None => return Ok(ExecResult::failure("bash: cd: HOME not set\n")),
        },
        Some(arg) if arg.as_str() == "-" => {
            let target = st.previous_dir.clone();
            match change_dir(exec, st, &target) {
                Ok(()) => return Ok(ExecResult::new(format!("{}\n", st.cwd), "", 0)),
                Err(e) => return Ok(ExecResult::failure(e)),
            }
        }
        Some(arg) => arg.to_string(),
    };

    match change_dir(exec, st, &target) {
        Ok(()) => Ok(ExecResult::ok()),
        Err(e) => Ok(ExecResult::failure(e)),
    }
}

pub fn pwd(st: &mut ShellState, _args: &[String]) -> ExecOutcome {
    Ok(ExecResult::new(format!("{}\n", st.cwd), "", 0))
}

fn render_stack(st: &ShellState) -> String {
    let mut parts = vec![st.cwd.clone()];
    parts.extend(st.dir_stack.iter().rev().cloned());
    format!("{}\n", parts.join(" "))
}

pub fn pushd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    match args.first() {
        None => {
            // Swap the top two entries.
            let Some(top) = st.dir_stack.pop() else {
                return Ok(ExecResult::failure("bash: pushd: no other directory\n"));
            };
            let previous = st.cwd.clone();
            match change_dir(exec, st, &top) {
                Ok(()) => {
                    st.dir_stack.push(previous);
                    Ok(ExecResult::new(render_stack(st), "", 0))
                }
                Err(e) => {
                    st.dir_stack.push(top);
                    Ok(ExecResult::failure(e))
                }
            }
        }
        Some(target) => {
            let previous = st.cwd.clone();
            match change_dir(exec, st, target) {
                Ok(()) => {
                    st.dir_stack.push(previous);
                    Ok(ExecResult::new(render_stack(st), "", 0))
                }
                Err(e) => Ok(ExecResult::failure(
                    e.replace("bash: cd:", "bash: pushd:"),
                )),
            }
        }
    }
}

pub fn popd(exec: &Executor, st: &mut ShellState, _args: &[String]) -> ExecOutcome {
    let Some(top) = st.dir_stack.pop() else {
        return Ok(ExecResult::failure("bash: popd: directory stack empty\n"));
    };
    match change_dir(exec, st, &top) {
        Ok(()) => Ok(ExecResult::new(render_stack(st), "", 0)),
        Err(e) => {
            st.dir_stack.push(top);
            Ok(ExecResult::failure(e.replace("bash: cd:", "bash: popd:")))
        }
    }
}

pub fn dirs(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.iter().any(|a| a == "-c") {
        st.dir_stack.clear();
        return Ok(ExecResult::ok());
    }
    Ok(ExecResult::new(render_stack(st), "", 0))
}
