//! set and shopt builtins.

use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::{ShellOptions, ShellState, ShoptOptions};

pub fn set_builtin(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.is_empty() {
        // Print every variable as name=value, sorted.
        let mut names: Vec<String> = st.vars.keys().cloned().collect();
        names.sort();
        let mut stdout = String::new();
        for name in names {
            if let Some(var) = st.vars.get(&name) {
                if let Some(value) = &var.value {
                    stdout.push_str(&format!(
                        "{}={}\n",
                        name,
                        crate::expand::quote::shell_quote(value.scalar_view())
                    ));
                }
            }
        }
        return Ok(ExecResult::new(stdout, "", 0));
    }

    let mut stderr = String::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                // Remaining words replace the positional parameters.
                st.positional = args[i + 1..].to_vec();
                return Ok(ExecResult::new("", stderr, 0));
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match args.get(i + 1) {
                    None => {
                        // `set -o` lists option states.
                        let mut stdout = String::new();
                        for name in ShellOptions::NAMES {
                            let on = st.options.get(name) == Some(true);
                            stdout.push_str(&format!(
                                "{:<15} {}\n",
                                name,
                                if on { "on" } else { "off" }
                            ));
                        }
                        return Ok(ExecResult::new(stdout, stderr, 0));
                    }
                    Some(name) => {
                        if !st.options.set(name, enable) {
                            stderr.push_str(&format!(
                                "bash: set: {}: invalid option name\n",
                                name
                            ));
                            return Ok(ExecResult::new("", stderr, 2));
                        }
                        i += 2;
                        continue;
                    }
                }
            }
            _ if arg.starts_with('-') || arg.starts_with('+') => {
                let enable = arg.starts_with('-');
                for flag in arg[1..].chars() {
                    match ShellOptions::short_flag(flag) {
                        Some(name) => {
                            st.options.set(name, enable);
                        }
                        None => {
                            stderr.push_str(&format!("bash: set: -{}: invalid option\n", flag));
                            return Ok(ExecResult::new("", stderr, 2));
                        }
                    }
                }
            }
            _ => {
                // First non-option word: the rest become positionals.
                st.positional = args[i..].to_vec();
                return Ok(ExecResult::new("", stderr, 0));
            }
        }
        i += 1;
    }
    Ok(ExecResult::new("", stderr, 0))
}

pub fn shopt_builtin(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut set_mode = false;
    let mut unset_mode = false;
    let mut quiet = false;
    let mut names: Vec<&String> = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-s" => set_mode = true,
            "-u" => unset_mode = true,
            "-q" => quiet = true,
            "-p" => {}
            "-o" => {
                // set -o options through shopt are out of scope; accept.
            }
            _ => names.push(arg),
        }
    }

    if names.is_empty() {
        let mut stdout = String::new();
        for name in ShoptOptions::NAMES {
            let on = st.shopts.get(name) == Some(true);
            if set_mode && !on {
                continue;
            }
            if unset_mode && on {
                continue;
            }
            stdout.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
        }
        return Ok(ExecResult::new(stdout, "", 0));
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut code = 0;
    for name in names {
        if set_mode || unset_mode {
            if !st.shopts.set(name, set_mode) {
                stderr.push_str(&format!("bash: shopt: {}: invalid shell option name\n", name));
                code = 1;
            }
        } else {
            match st.shopts.get(name) {
                Some(on) => {
                    if !quiet {
                        stdout.push_str(&format!(
                            "{}\t{}\n",
                            name,
                            if on { "on" } else { "off" }
                        ));
                    }
                    if !on {
                        code = 1;
                    }
                }
                None => {
                    stderr.push_str(&format!("bash: shopt: {}: invalid shell option name\n", name));
                    code = 1;
                }
            }
        }
    }
    Ok(ExecResult::new(stdout, stderr, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_toggle() {
        let mut st = ShellState::default();
        set_builtin(&mut st, &["-eu".to_string()]).unwrap();
        assert!(st.options.errexit);
        assert!(st.options.nounset);
        set_builtin(&mut st, &["+e".to_string()]).unwrap();
        assert!(!st.options.errexit);
    }

    #[test]
    fn long_option_and_positional() {
        let mut st = ShellState::default();
        set_builtin(
            &mut st,
            &["-o".to_string(), "pipefail".to_string()],
        )
        .unwrap();
        assert!(st.options.pipefail);

        set_builtin(
            &mut st,
            &["--".to_string(), "a".to_string(), "b".to_string()],
        )
        .unwrap();
        assert_eq!(st.positional, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn shopt_set_query() {
        let mut st = ShellState::default();
        shopt_builtin(&mut st, &["-s".to_string(), "extglob".to_string()]).unwrap();
        assert!(st.shopts.extglob);
        let result = shopt_builtin(&mut st, &["-q".to_string(), "extglob".to_string()]).unwrap();
        assert_eq!(result.exit_code, 0);
        let result = shopt_builtin(&mut st, &["-q".to_string(), "nullglob".to_string()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
