//! getopts builtin.
//!
//! Iterates option characters out of the positional parameters (or explicit
//! arguments) using `OPTIND` plus an internal sub-position for clustered
//! options. A leading `:` in the optstring selects silent error reporting.

use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::ShellState;
use crate::interp::vars;

pub fn getopts(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let Some(optstring) = args.first() else {
        return Ok(ExecResult::failure_with_code(
            "bash: getopts: usage: getopts optstring name [arg ...]\n",
            2,
        ));
    };
    let Some(varname) = args.get(1) else {
        return Ok(ExecResult::failure_with_code(
            "bash: getopts: usage: getopts optstring name [arg ...]\n",
            2,
        ));
    };
    let words: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        st.positional.clone()
    };

    let silent = optstring.starts_with(':');
    let optstring = optstring.trim_start_matches(':');

    let mut optind: usize = vars::get_string(st, "OPTIND")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    if optind < 1 {
        optind = 1;
    }

    let finish = |st: &mut ShellState, varname: &str, optind: usize| {
        let _ = vars::set_scalar(st, varname, "?", false);
        let _ = vars::set_scalar(st, "OPTIND", &optind.to_string(), false);
        st.getopts_pos = 0;
        Ok(ExecResult::code(1))
    };

    let Some(word) = words.get(optind - 1) else {
        return finish(st, varname, optind);
    };
    if word == "--" {
        return finish(st, varname, optind + 1);
    }
    if !word.starts_with('-') || word == "-" {
        return finish(st, varname, optind);
    }

    let chars: Vec<char> = word.chars().collect();
    let mut pos = st.getopts_pos.max(1);
    if pos >= chars.len() {
        pos = 1;
    }
    let opt = chars[pos];
    let last_in_word = pos + 1 >= chars.len();

    let spec_index = optstring.chars().position(|c| c == opt);
    let takes_arg = spec_index
        .map(|i| optstring.chars().nth(i + 1) == Some(':'))
        .unwrap_or(false);

    if spec_index.is_none() || opt == ':' {
        // Unknown option.
        let _ = vars::set_scalar(st, varname, "?", false);
        let stderr = if silent {
            let _ = vars::set_scalar(st, "OPTARG", &opt.to_string(), false);
            String::new()
        } else {
            let _ = vars::unset(st, "OPTARG");
            format!("bash: getopts: illegal option -- {}\n", opt)
        };
        advance(st, optind, last_in_word, pos);
        return Ok(ExecResult::new("", stderr, 0));
    }

    if takes_arg {
        let (optarg, next_ind) = if last_in_word {
            match words.get(optind) {
                Some(arg) => (Some(arg.clone()), optind + 2),
                None => (None, optind + 1),
            }
        } else {
            // The rest of the word is the argument.
            (Some(chars[pos + 1..].iter().collect()), optind + 1)
        };
        st.getopts_pos = 0;
        match optarg {
            Some(value) => {
                let _ = vars::set_scalar(st, varname, &opt.to_string(), false);
                let _ = vars::set_scalar(st, "OPTARG", &value, false);
                let _ = vars::set_scalar(st, "OPTIND", &next_ind.to_string(), false);
                Ok(ExecResult::ok())
            }
            None => {
                let _ = vars::set_scalar(st, "OPTIND", &next_ind.to_string(), false);
                if silent {
                    let _ = vars::set_scalar(st, varname, ":", false);
                    let _ = vars::set_scalar(st, "OPTARG", &opt.to_string(), false);
                    Ok(ExecResult::ok())
                } else {
                    let _ = vars::set_scalar(st, varname, "?", false);
                    let _ = vars::unset(st, "OPTARG");
                    Ok(ExecResult::new(
                        "",
                        format!("bash: getopts: option requires an argument -- {}\n", opt),
                        0,
                    ))
                }
            }
        }
    } else {
        let _ = vars::set_scalar(st, varname, &opt.to_string(), false);
        let _ = vars::unset(st, "OPTARG");
        advance(st, optind, last_in_word, pos);
        Ok(ExecResult::ok())
    }
}

fn advance(st: &mut ShellState, optind: usize, last_in_word: bool, pos: usize) {
    if last_in_word {
        st.getopts_pos = 0;
        let _ = vars::set_scalar(st, "OPTIND", &(optind + 1).to_string(), false);
    } else {
        st.getopts_pos = pos + 1;
        let _ = vars::set_scalar(st, "OPTIND", &optind.to_string(), false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(args: &[&str]) -> ShellState {
        let mut st = ShellState::default();
        st.positional = args.iter().map(|s| s.to_string()).collect();
        let _ = vars::set_scalar(&mut st, "OPTIND", "1", false);
        st
    }

    fn run(st: &mut ShellState, optstring: &str) -> (i32, Option<String>, Option<String>) {
        let args = vec![optstring.to_string(), "opt".to_string()];
        let result = getopts(st, &args).unwrap();
        (
            result.exit_code,
            vars::get_string(st, "opt"),
            vars::get_string(st, "OPTARG"),
        )
    }

    #[test]
    fn simple_options() {
        let mut st = state_with(&["-a", "-b"]);
        assert_eq!(run(&mut st, "ab"), (0, Some("a".into()), None));
        assert_eq!(run(&mut st, "ab"), (0, Some("b".into()), None));
        let (code, opt, _) = run(&mut st, "ab");
        assert_eq!(code, 1);
        assert_eq!(opt.as_deref(), Some("?"));
    }

    #[test]
    fn option_with_argument() {
        let mut st = state_with(&["-f", "file.txt", "-v"]);
        let (code, opt, optarg) = run(&mut st, "f:v");
        assert_eq!(code, 0);
        assert_eq!(opt.as_deref(), Some("f"));
        assert_eq!(optarg.as_deref(), Some("file.txt"));
        let (code, opt, _) = run(&mut st, "f:v");
        assert_eq!(code, 0);
        assert_eq!(opt.as_deref(), Some("v"));
    }

    #[test]
    fn clustered_options() {
        let mut st = state_with(&["-ab"]);
        assert_eq!(run(&mut st, "ab").1.as_deref(), Some("a"));
        assert_eq!(run(&mut st, "ab").1.as_deref(), Some("b"));
        assert_eq!(run(&mut st, "ab").0, 1);
    }

    #[test]
    fn attached_argument() {
        let mut st = state_with(&["-fvalue"]);
        let (code, opt, optarg) = run(&mut st, "f:");
        assert_eq!(code, 0);
        assert_eq!(opt.as_deref(), Some("f"));
        assert_eq!(optarg.as_deref(), Some("value"));
    }

    #[test]
    fn silent_missing_argument() {
        let mut st = state_with(&["-f"]);
        let (code, opt, optarg) = run(&mut st, ":f:");
        assert_eq!(code, 0);
        assert_eq!(opt.as_deref(), Some(":"));
        assert_eq!(optarg.as_deref(), Some("f"));
    }
}
