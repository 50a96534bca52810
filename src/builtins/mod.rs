//! Builtin commands.
//!
//! Dispatch is a straight name match; each builtin is a function over the
//! executor, the shell state, its expanded arguments, and its stdin.
//! Special builtins matter for POSIX-mode prefix-assignment persistence and
//! resolution order (they are found before functions).

mod cd_cmd;
mod decl;
mod echo_cmd;
mod flow_cmds;
mod getopts_cmd;
mod misc;
mod printf_cmd;
mod read_cmd;
mod set_cmd;
mod test_cmd;

use crate::interp::engine::Executor;
use crate::interp::flow::ExecOutcome;
use crate::interp::state::ShellState;

/// POSIX special builtins (plus `source` as the bash `.` synonym).
pub fn is_special_builtin(name: &str) -> bool {
    matches!(
        name,
        ":" | "."
            | "break"
            | "continue"
            | "eval"
            | "exec"
            | "exit"
            | "export"
            | "readonly"
            | "return"
            | "set"
            | "shift"
            | "source"
            | "trap"
            | "unset"
    )
}

pub fn is_builtin(name: &str) -> bool {
    is_special_builtin(name)
        || matches!(
            name,
            "alias"
                | "bg"
                | "builtin"
                | "cd"
                | "command"
                | "declare"
                | "dirs"
                | "echo"
                | "false"
                | "fg"
                | "getopts"
                | "hash"
                | "jobs"
                | "let"
                | "local"
                | "mapfile"
                | "popd"
                | "printf"
                | "pushd"
                | "pwd"
                | "read"
                | "readarray"
                | "shopt"
                | "test"
                | "["
                | "true"
                | "type"
                | "typeset"
                | "umask"
                | "unalias"
                | "wait"
        )
}

/// Run a builtin; `None` means the name is not a builtin.
pub fn run(
    exec: &Executor,
    st: &mut ShellState,
    name: &str,
    args: &[String],
    stdin: &str,
) -> Option<ExecOutcome> {
    Some(match name {
        ":" | "true" => Ok(crate::interp::flow::ExecResult::ok()),
        "false" => Ok(crate::interp::flow::ExecResult::code(1)),
        "exit" => flow_cmds::exit_cmd(st, args),
        "return" => flow_cmds::return_cmd(st, args),
        "break" => flow_cmds::break_cmd(st, args),
        "continue" => flow_cmds::continue_cmd(st, args),
        "shift" => flow_cmds::shift_cmd(st, args),
        "exec" => misc::exec_cmd(exec, st, args, stdin),
        "echo" => echo_cmd::echo(st, args),
        "printf" => printf_cmd::printf_cmd(st, args),
        "read" => read_cmd::read_cmd(exec, st, args, stdin),
        "mapfile" | "readarray" => read_cmd::mapfile_cmd(st, args, stdin),
        "cd" => cd_cmd::cd(exec, st, args),
        "pwd" => cd_cmd::pwd(st, args),
        "pushd" => cd_cmd::pushd(exec, st, args),
        "popd" => cd_cmd::popd(exec, st, args),
        "dirs" => cd_cmd::dirs(st, args),
        "declare" | "typeset" => decl::declare_cmd(exec, st, args, name, false),
        "local" => decl::local_cmd(exec, st, args),
        "export" => decl::export_cmd(exec, st, args),
        "readonly" => decl::readonly_cmd(exec, st, args),
        "unset" => decl::unset_cmd(st, args),
        "let" => decl::let_cmd(exec, st, args),
        "set" => set_cmd::set_builtin(st, args),
        "shopt" => set_cmd::shopt_builtin(st, args),
        "eval" => misc::eval_cmd(exec, st, args),
        "source" | "." => misc::source_cmd(exec, st, args),
        "alias" => misc::alias_cmd(st, args),
        "unalias" => misc::unalias_cmd(st, args),
        "type" => misc::type_cmd(exec, st, args),
        "command" => misc::command_cmd(exec, st, args, stdin),
        "builtin" => misc::builtin_cmd(exec, st, args, stdin),
        "hash" => misc::hash_cmd(st, args),
        "getopts" => getopts_cmd::getopts(st, args),
        "test" | "[" => test_cmd::test_cmd(exec, st, args, name == "["),
        "umask" => misc::umask_cmd(st, args),
        "trap" => misc::trap_cmd(st, args),
        // Job control is a no-op in the sandbox.
        "jobs" => Ok(crate::interp::flow::ExecResult::ok()),
        "fg" | "bg" => Ok(crate::interp::flow::ExecResult::failure_with_code(
            format!("bash: {}: no job control\n", name),
            1,
        )),
        "wait" => Ok(crate::interp::flow::ExecResult::ok()),
        _ => return None,
    })
}
