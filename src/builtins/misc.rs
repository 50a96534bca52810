//! Remaining builtins: eval, source, exec, alias/unalias, type, command,
//! builtin, hash, umask, trap.

use crate::builtins;
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, ExecOutcome, ExecResult};
use crate::interp::state::ShellState;

pub fn eval_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let text = args.join(" ");
    if text.trim().is_empty() {
        return Ok(ExecResult::ok());
    }
    exec.run_text(st, &text)
}

pub fn source_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let Some(path) = args.first() else {
        return Ok(ExecResult::failure_with_code(
            "bash: source: filename argument required\n",
            2,
        ));
    };
    let abs = exec.host.resolve_path(&st.cwd, path);
    let text = match exec.host.read_file(&abs) {
        Ok(text) => text,
        Err(_) => {
            return Ok(ExecResult::failure(format!(
                "bash: source: {}: No such file or directory\n",
                path
            )))
        }
    };

    let saved_positional = if args.len() > 1 {
        Some(std::mem::replace(&mut st.positional, args[1..].to_vec()))
    } else {
        None
    };
    let saved_source = st.current_source.clone();
    st.current_source = Some(path.clone());
    st.source_depth += 1;

    let outcome = exec.run_text(st, &text);

    st.source_depth -= 1;
    st.current_source = saved_source;
    if let Some(positional) = saved_positional {
        st.positional = positional;
    }

    match outcome {
        Err(ControlFlow::Return { code, out }) => {
            Ok(ExecResult::new(out.stdout, out.stderr, code))
        }
        other => other,
    }
}

pub fn exec_cmd(
    exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    stdin: &str,
) -> ExecOutcome {
    // With no command, exec only makes its redirections permanent; the
    // engine already applied them.
    let Some(name) = args.first() else {
        return Ok(ExecResult::ok());
    };
    // With a command, the shell is replaced: run it, then exit with its
    // status.
    let result = exec.run_external(st, name, &args[1..], stdin)?;
    Err(ControlFlow::Exit {
        code: result.exit_code,
        out: crate::interp::flow::Output::new(result.stdout, result.stderr),
    })
}

pub fn alias_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.is_empty() {
        let mut names: Vec<&String> = st.aliases.keys().collect();
        names.sort();
        let stdout: String = names
            .iter()
            .map(|n| {
                format!(
                    "alias {}={}\n",
                    n,
                    crate::expand::quote::shell_quote(&st.aliases[*n])
                )
            })
            .collect();
        return Ok(ExecResult::new(stdout, "", 0));
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut code = 0;
    for arg in args {
        if arg == "-p" {
            continue;
        }
        match arg.split_once('=') {
            Some((name, value)) => {
                st.aliases.insert(name.to_string(), value.to_string());
            }
            None => match st.aliases.get(arg) {
                Some(value) => stdout.push_str(&format!(
                    "alias {}={}\n",
                    arg,
                    crate::expand::quote::shell_quote(value)
                )),
                None => {
                    stderr.push_str(&format!("bash: alias: {}: not found\n", arg));
                    code = 1;
                }
            },
        }
    }
    Ok(ExecResult::new(stdout, stderr, code))
}

pub fn unalias_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.iter().any(|a| a == "-a") {
        st.aliases.clear();
        return Ok(ExecResult::ok());
    }
    let mut stderr = String::new();
    let mut code = 0;
    for arg in args {
        if st.aliases.remove(arg).is_none() {
            stderr.push_str(&format!("bash: unalias: {}: not found\n", arg));
            code = 1;
        }
    }
    Ok(ExecResult::new("", stderr, code))
}

pub fn type_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut type_only = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-t" => type_only = true,
            "-a" | "-p" | "-P" => {}
            _ => names.push(arg),
        }
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut code = 0;
    for name in names {
        if st.aliases.contains_key(name.as_str()) {
            if type_only {
                stdout.push_str("alias\n");
            } else {
                stdout.push_str(&format!(
                    "{} is aliased to `{}'\n",
                    name, st.aliases[name.as_str()]
                ));
            }
        } else if st.functions.contains_key(name.as_str()) {
            if type_only {
                stdout.push_str("function\n");
            } else {
                stdout.push_str(&format!("{} is a function\n", name));
            }
        } else if builtins::is_builtin(name) {
            if type_only {
                stdout.push_str("builtin\n");
            } else {
                stdout.push_str(&format!("{} is a shell builtin\n", name));
            }
        } else if exec.host.registry.contains(name) {
            if type_only {
                stdout.push_str("file\n");
            } else {
                stdout.push_str(&format!("{} is /usr/bin/{}\n", name, name));
            }
        } else {
            stderr.push_str(&format!("bash: type: {}: not found\n", name));
            code = 1;
        }
    }
    Ok(ExecResult::new(stdout, stderr, code))
}

pub fn command_cmd(
    exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    stdin: &str,
) -> ExecOutcome {
    let mut verbose = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "-V" => verbose = true,
            "-p" => {}
            _ => break,
        }
        i += 1;
    }
    let rest = &args[i..];
    let Some(name) = rest.first() else {
        return Ok(ExecResult::ok());
    };

    if verbose {
        if builtins::is_builtin(name) || st.functions.contains_key(name.as_str()) {
            return Ok(ExecResult::new(format!("{}\n", name), "", 0));
        }
        if exec.host.registry.contains(name) {
            return Ok(ExecResult::new(format!("/usr/bin/{}\n", name), "", 0));
        }
        return Ok(ExecResult::code(1));
    }

    // Run bypassing functions.
    exec.dispatch_command(st, name, &rest[1..], stdin, true)
}

pub fn builtin_cmd(
    exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    stdin: &str,
) -> ExecOutcome {
    let Some(name) = args.first() else {
        return Ok(ExecResult::ok());
    };
    match builtins::run(exec, st, name, &args[1..], stdin) {
        Some(outcome) => outcome,
        None => Ok(ExecResult::failure(format!(
            "bash: builtin: {}: not a shell builtin\n",
            name
        ))),
    }
}

pub fn hash_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.iter().any(|a| a == "-r") {
        st.hashed_commands.clear();
        return Ok(ExecResult::ok());
    }
    if args.is_empty() {
        if st.hashed_commands.is_empty() {
            return Ok(ExecResult::new("hash: hash table empty\n", "", 0));
        }
        let mut stdout = String::from("hits\tcommand\n");
        let mut names: Vec<&String> = st.hashed_commands.keys().collect();
        names.sort();
        for name in names {
            stdout.push_str(&format!("   1\t{}\n", st.hashed_commands[name]));
        }
        return Ok(ExecResult::new(stdout, "", 0));
    }
    for name in args {
        if name.starts_with('-') {
            continue;
        }
        st.hashed_commands
            .insert(name.clone(), format!("/usr/bin/{}", name));
    }
    Ok(ExecResult::ok())
}

pub fn umask_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    match args.first() {
        None => Ok(ExecResult::new(format!("{:04o}\n", st.umask), "", 0)),
        Some(arg) => match u32::from_str_radix(arg, 8) {
            Ok(mask) if mask <= 0o777 => {
                st.umask = mask;
                Ok(ExecResult::ok())
            }
            _ => Ok(ExecResult::failure(format!(
                "bash: umask: {}: octal number out of range\n",
                arg
            ))),
        },
    }
}

pub fn trap_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.is_empty() || args.first().map(|s| s.as_str()) == Some("-p") {
        let mut names: Vec<&String> = st.traps.keys().collect();
        names.sort();
        let stdout: String = names
            .iter()
            .map(|sig| {
                format!(
                    "trap -- {} {}\n",
                    crate::expand::quote::shell_quote(&st.traps[*sig]),
                    sig
                )
            })
            .collect();
        return Ok(ExecResult::new(stdout, "", 0));
    }
    // No signal delivery in the sandbox; traps are recorded only.
    let action = &args[0];
    for signal in &args[1..] {
        if action == "-" {
            st.traps.remove(signal);
        } else {
            st.traps.insert(signal.clone(), action.clone());
        }
    }
    Ok(ExecResult::ok())
}
