//! printf builtin.
//!
//! Supports the conversions bash scripts lean on: `%s %d %i %u %x %X %o
//! %c %q %b %%` with flags, width, and precision. The format string is
//! reused until all arguments are consumed; `-v var` stores instead of
//! printing.

use crate::expand::quote::shell_quote;
use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::ShellState;
use crate::interp::vars;

pub fn printf_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut args = args;
    let mut target_var: Option<String> = None;

    if args.first().map(|s| s.as_str()) == Some("-v") {
        match args.get(1) {
            Some(name) => {
                target_var = Some(name.clone());
                args = &args[2..];
            }
            None => {
                return Ok(ExecResult::failure_with_code(
                    "bash: printf: -v: option requires an argument\n",
                    2,
                ))
            }
        }
    }

    let Some(format) = args.first() else {
        return Ok(ExecResult::failure_with_code(
            "bash: printf: usage: printf [-v var] format [arguments]\n",
            2,
        ));
    };
    let mut operands = args[1..].iter();
    let mut stderr = String::new();
    let mut exit_code = 0;
    let mut out = String::new();

    loop {
        let consumed_before = operands.len();
        match render_once(format, &mut operands, &mut stderr, &mut exit_code) {
            RenderOutcome::Text(text) => out.push_str(&text),
            RenderOutcome::Stop(text) => {
                out.push_str(&text);
                break;
            }
        }
        // Reuse the format while arguments remain, but only if it consumed
        // at least one of them.
        if operands.len() == 0 || operands.len() == consumed_before {
            break;
        }
    }

    if let Some(name) = target_var {
        if let Err(name) = vars::set_scalar(st, &name, &out, false) {
            return Ok(ExecResult::failure(format!(
                "bash: printf: {}: readonly variable\n",
                name
            )));
        }
        return Ok(ExecResult::new("", stderr, exit_code));
    }
    Ok(ExecResult::new(out, stderr, exit_code))
}

enum RenderOutcome {
    Text(String),
    Stop(String),
}

fn render_once<'a, I: Iterator<Item = &'a String>>(
    format: &str,
    operands: &mut I,
    stderr: &mut String,
    exit_code: &mut i32,
) -> RenderOutcome {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let (decoded, advance) = decode_escape(&chars[i..]);
            match decoded {
                Some(text) => out.push_str(&text),
                None => return RenderOutcome::Stop(out),
            }
            i += advance;
            continue;
        }
        if c != '%' {
            out.push(c);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'%') {
            out.push('%');
            i += 2;
            continue;
        }

        // %[flags][width][.precision]conversion
        let mut j = i + 1;
        let mut flags = String::new();
        while matches!(chars.get(j), Some('-' | '+' | ' ' | '0' | '#')) {
            flags.push(chars[j]);
            j += 1;
        }
        let mut width = String::new();
        while chars.get(j).map_or(false, |c| c.is_ascii_digit()) {
            width.push(chars[j]);
            j += 1;
        }
        let mut precision: Option<usize> = None;
        if chars.get(j) == Some(&'.') {
            j += 1;
            let mut digits = String::new();
            while chars.get(j).map_or(false, |c| c.is_ascii_digit()) {
                digits.push(chars[j]);
                j += 1;
            }
            precision = Some(digits.parse().unwrap_or(0));
        }
        let Some(&conv) = chars.get(j) else {
            out.push('%');
            i += 1;
            continue;
        };
        i = j + 1;

        let arg = operands.next().map(|s| s.as_str()).unwrap_or("");
        let width: usize = width.parse().unwrap_or(0);
        let left = flags.contains('-');
        let zero = flags.contains('0') && !left;
        let plus = flags.contains('+');

        let rendered = match conv {
            's' => {
                let mut text = arg.to_string();
                if let Some(p) = precision {
                    text = text.chars().take(p).collect();
                }
                pad(&text, width, left, false)
            }
            'b' => {
                let (text, stop) = super::echo_cmd::decode_echo_escapes(arg);
                let padded = pad(&text, width, left, false);
                if stop {
                    out.push_str(&padded);
                    return RenderOutcome::Stop(out);
                }
                padded
            }
            'q' => pad(&shell_quote(arg), width, left, false),
            'c' => {
                let text: String = arg.chars().take(1).collect();
                pad(&text, width, left, false)
            }
            'd' | 'i' => {
                let n = parse_int(arg, stderr, exit_code);
                let mut text = n.to_string();
                if plus && n >= 0 {
                    text.insert(0, '+');
                }
                pad(&text, width, left, zero)
            }
            'u' => {
                let n = parse_int(arg, stderr, exit_code);
                pad(&(n as u64).to_string(), width, left, zero)
            }
            'x' => pad(
                &format!("{:x}", parse_int(arg, stderr, exit_code)),
                width,
                left,
                zero,
            ),
            'X' => pad(
                &format!("{:X}", parse_int(arg, stderr, exit_code)),
                width,
                left,
                zero,
            ),
            'o' => pad(
                &format!("{:o}", parse_int(arg, stderr, exit_code)),
                width,
                left,
                zero,
            ),
            'e' | 'f' | 'g' => {
                let v: f64 = arg.parse().unwrap_or_else(|_| {
                    if !arg.is_empty() {
                        stderr.push_str(&format!("bash: printf: {}: invalid number\n", arg));
                        *exit_code = 1;
                    }
                    0.0
                });
                let p = precision.unwrap_or(6);
                let text = match conv {
                    'e' => format!("{:.*e}", p, v),
                    _ => format!("{:.*}", p, v),
                };
                pad(&text, width, left, zero)
            }
            other => {
                stderr.push_str(&format!("bash: printf: `%{}': invalid format character\n", other));
                *exit_code = 1;
                String::new()
            }
        };
        out.push_str(&rendered);
    }
    RenderOutcome::Text(out)
}

fn pad(text: &str, width: usize, left: bool, zero: bool) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let fill = width - len;
    if left {
        format!("{}{}", text, " ".repeat(fill))
    } else if zero {
        // Zero padding goes after the sign.
        if let Some(rest) = text.strip_prefix('-') {
            format!("-{}{}", "0".repeat(fill), rest)
        } else {
            format!("{}{}", "0".repeat(fill), text)
        }
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

fn parse_int(arg: &str, stderr: &mut String, exit_code: &mut i32) -> i64 {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return 0;
    }
    // 'c / "c yield the character code.
    if let Some(rest) = trimmed.strip_prefix('\'').or_else(|| trimmed.strip_prefix('"')) {
        return rest.chars().next().map(|c| c as i64).unwrap_or(0);
    }
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse::<i64>().ok()
    };
    match parsed {
        Some(n) => {
            if negative {
                -n
            } else {
                n
            }
        }
        None => {
            stderr.push_str(&format!("bash: printf: {}: invalid number\n", arg));
            *exit_code = 1;
            0
        }
    }
}

fn decode_escape(chars: &[char]) -> (Option<String>, usize) {
    match chars.get(1) {
        Some('n') => (Some("\n".into()), 2),
        Some('t') => (Some("\t".into()), 2),
        Some('r') => (Some("\r".into()), 2),
        Some('a') => (Some("\x07".into()), 2),
        Some('b') => (Some("\x08".into()), 2),
        Some('f') => (Some("\x0c".into()), 2),
        Some('v') => (Some("\x0b".into()), 2),
        Some('e') | Some('E') => (Some("\x1b".into()), 2),
        Some('\\') => (Some("\\".into()), 2),
        Some('"') => (Some("\"".into()), 2),
        Some('\'') => (Some("'".into()), 2),
        Some('0'..='7') => {
            let mut value = 0u32;
            let mut used = 1;
            while used < 4 {
                match chars.get(used).and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        used += 1;
                    }
                    None => break,
                }
            }
            (
                char::from_u32(value).map(|c| c.to_string()),
                used,
            )
        }
        Some('x') => {
            let mut value = 0u32;
            let mut used = 2;
            while used < 4 {
                match chars.get(used).and_then(|c| c.to_digit(16)) {
                    Some(d) => {
                        value = value * 16 + d;
                        used += 1;
                    }
                    None => break,
                }
            }
            if used == 2 {
                (Some("\\x".into()), 2)
            } else {
                (char::from_u32(value).map(|c| c.to_string()), used)
            }
        }
        Some(other) => (Some(format!("\\{}", other)), 2),
        None => (Some("\\".into()), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> ExecResult {
        let mut st = ShellState::default();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        printf_cmd(&mut st, &args).unwrap()
    }

    #[test]
    fn string_and_newline() {
        assert_eq!(run(&["%s\\n", "hi"]).stdout, "hi\n");
    }

    #[test]
    fn format_reuse() {
        assert_eq!(run(&["[%s]", "a", "b"]).stdout, "[a][b]");
        assert_eq!(run(&["%s %s\\n", "1", "2", "3"]).stdout, "1 2 3 \n");
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(run(&["%d", "42"]).stdout, "42");
        assert_eq!(run(&["%05d", "42"]).stdout, "00042");
        assert_eq!(run(&["%x", "255"]).stdout, "ff");
        assert_eq!(run(&["%o", "8"]).stdout, "10");
        assert_eq!(run(&["%d", "0x10"]).stdout, "16");
        assert_eq!(run(&["%d", "'A"]).stdout, "65");
    }

    #[test]
    fn width_and_alignment() {
        assert_eq!(run(&["[%5s]", "ab"]).stdout, "[   ab]");
        assert_eq!(run(&["[%-5s]", "ab"]).stdout, "[ab   ]");
        assert_eq!(run(&["%.2s", "abcd"]).stdout, "ab");
    }

    #[test]
    fn quoting_conversion() {
        assert_eq!(run(&["%q", "a b"]).stdout, "'a b'");
    }

    #[test]
    fn invalid_number_reports() {
        let result = run(&["%d", "abc"]);
        assert_eq!(result.stdout, "0");
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("invalid number"));
    }

    #[test]
    fn stores_into_variable() {
        let mut st = ShellState::default();
        let args: Vec<String> = vec!["-v".into(), "x".into(), "%s!".into(), "hi".into()];
        let result = printf_cmd(&mut st, &args).unwrap();
        assert_eq!(result.stdout, "");
        assert_eq!(
            crate::interp::vars::get_string(&mut st, "x").as_deref(),
            Some("hi!")
        );
    }

    use crate::interp::flow::ExecResult;
}
