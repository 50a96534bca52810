//! read and mapfile/readarray builtins.

use crate::expand::split;
use crate::interp::engine::Executor;
use crate::interp::flow::{ExecOutcome, ExecResult};
use crate::interp::state::{ShellState, Value};
use crate::interp::vars;

struct ReadOpts {
    raw: bool,
    array: Option<String>,
    delimiter: char,
    nchars: Option<usize>,
    names: Vec<String>,
}

pub fn read_cmd(
    _exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    stdin: &str,
) -> ExecOutcome {
    let mut opts = ReadOpts {
        raw: false,
        array: None,
        delimiter: '\n',
        nchars: None,
        names: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-r" => opts.raw = true,
            "-s" => {}
            "-a" => {
                i += 1;
                match args.get(i) {
                    Some(name) => opts.array = Some(name.clone()),
                    None => return option_needs_arg("read", "a"),
                }
            }
            "-d" => {
                i += 1;
                match args.get(i) {
                    Some(d) => opts.delimiter = d.chars().next().unwrap_or('\0'),
                    None => return option_needs_arg("read", "d"),
                }
            }
            "-n" | "-N" => {
                i += 1;
                match args.get(i).and_then(|n| n.parse::<usize>().ok()) {
                    Some(n) => opts.nchars = Some(n),
                    None => return option_needs_arg("read", "n"),
                }
            }
            "-p" => {
                // Prompts only appear on terminals; the sandbox has none.
                i += 1;
            }
            "-t" | "-u" => {
                i += 1;
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: read: {}: invalid option\n", arg),
                    2,
                ))
            }
            _ => {
                opts.names.push(args[i].clone());
            }
        }
        i += 1;
    }

    // Take one record from the explicit stdin, or consume it from the
    // group's pending input so `while read` loops advance.
    let (record, eof) = if !stdin.is_empty() {
        let mut source = stdin.to_string();
        let r = take_record(&mut source, opts.delimiter, opts.nchars);
        r
    } else {
        match st.group_stdin.take() {
            Some(mut source) => {
                let r = take_record(&mut source, opts.delimiter, opts.nchars);
                st.group_stdin = Some(source);
                r
            }
            None => (String::new(), true),
        }
    };

    let line = if opts.raw {
        record
    } else {
        unescape_line(&record)
    };

    let ifs = split::ifs_of(st);

    if let Some(array) = &opts.array {
        let fields = split_for_read(&line, &ifs, usize::MAX);
        if let Err(name) = vars::set_array(st, array, Value::indexed_from(fields)) {
            return readonly_fail("read", &name);
        }
        return Ok(ExecResult::code(if eof { 1 } else { 0 }));
    }

    if opts.names.is_empty() {
        if let Err(name) = vars::set_scalar(st, "REPLY", &line, false) {
            return readonly_fail("read", &name);
        }
        return Ok(ExecResult::code(if eof { 1 } else { 0 }));
    }

    let fields = split_for_read(&line, &ifs, opts.names.len());
    for (i, name) in opts.names.iter().enumerate() {
        let value = fields.get(i).map(|s| s.as_str()).unwrap_or("");
        if let Err(name) = vars::set_scalar(st, name, value, false) {
            return readonly_fail("read", &name);
        }
    }
    Ok(ExecResult::code(if eof { 1 } else { 0 }))
}

fn option_needs_arg(builtin: &str, flag: &str) -> ExecOutcome {
    Ok(ExecResult::failure_with_code(
        format!("bash: {}: -{}: option requires an argument\n", builtin, flag),
        2,
    ))
}

fn readonly_fail(builtin: &str, name: &str) -> ExecOutcome {
    Ok(ExecResult::failure(format!(
        "bash: {}: {}: readonly variable\n",
        builtin, name
    )))
}

/// Remove one record from `source`. Returns the record and whether the
/// source was exhausted without a delimiter (EOF status 1).
fn take_record(source: &mut String, delimiter: char, nchars: Option<usize>) -> (String, bool) {
    if let Some(n) = nchars {
        let taken: String = source.chars().take(n).collect();
        let rest: String = source.chars().skip(n).collect();
        let eof = source.is_empty();
        *source = rest;
        return (taken, eof);
    }
    if source.is_empty() {
        return (String::new(), true);
    }
    match source.find(delimiter) {
        Some(idx) => {
            let record = source[..idx].to_string();
            *source = source[idx + delimiter.len_utf8()..].to_string();
            (record, false)
        }
        None => {
            // Final unterminated record: populated, but status 1.
            let record = std::mem::take(source);
            (record, true)
        }
    }
}

/// Backslash processing without `-r`: line continuations are gone by the
/// time we have a record; `\X` collapses to `X`.
fn unescape_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n) => out.push(n),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split for `read`: at most `max` fields, the last taking the rest of the
/// line with outer IFS whitespace trimmed.
fn split_for_read(line: &str, ifs: &str, max: usize) -> Vec<String> {
    let ws: String = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let trimmed = line.trim_matches(|c: char| ws.contains(c));
    if trimmed.is_empty() {
        return Vec::new();
    }
    if max == 1 {
        return vec![trimmed.to_string()];
    }
    let mut fields = Vec::new();
    let mut rest = trimmed;
    while fields.len() + 1 < max {
        match rest.find(|c: char| ifs.contains(c)) {
            Some(idx) => {
                fields.push(rest[..idx].to_string());
                rest = rest[idx..].trim_start_matches(|c: char| ifs.contains(c));
                if rest.is_empty() {
                    return fields;
                }
            }
            None => {
                fields.push(rest.to_string());
                return fields;
            }
        }
    }
    fields.push(rest.to_string());
    fields
}

pub fn mapfile_cmd(st: &mut ShellState, args: &[String], stdin: &str) -> ExecOutcome {
    let mut strip = false;
    let mut delimiter = '\n';
    let mut name = "MAPFILE".to_string();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-t" => strip = true,
            "-d" => {
                i += 1;
                match args.get(i) {
                    Some(d) => delimiter = d.chars().next().unwrap_or('\0'),
                    None => return option_needs_arg("mapfile", "d"),
                }
            }
            arg if arg.starts_with('-') => {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: mapfile: {}: invalid option\n", arg),
                    2,
                ))
            }
            arg => name = arg.to_string(),
        }
        i += 1;
    }

    let content = if !stdin.is_empty() {
        stdin.to_string()
    } else {
        st.group_stdin.take().unwrap_or_default()
    };

    let mut lines = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        current.push(c);
        if c == delimiter {
            if strip {
                current.pop();
            }
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if let Err(name) = vars::set_array(st, &name, Value::indexed_from(lines)) {
        return readonly_fail("mapfile", &name);
    }
    Ok(ExecResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::vars::get_string;

    #[test]
    fn record_extraction() {
        let mut s = "a\nb\n".to_string();
        assert_eq!(take_record(&mut s, '\n', None), ("a".into(), false));
        assert_eq!(take_record(&mut s, '\n', None), ("b".into(), false));
        assert_eq!(take_record(&mut s, '\n', None), ("".into(), true));
    }

    #[test]
    fn unterminated_record_reports_eof() {
        let mut s = "partial".to_string();
        assert_eq!(take_record(&mut s, '\n', None), ("partial".into(), true));
    }

    #[test]
    fn split_respects_max() {
        assert_eq!(
            split_for_read("a b c d", " \t\n", 2),
            vec!["a".to_string(), "b c d".to_string()]
        );
        assert_eq!(
            split_for_read("  x  ", " \t\n", 3),
            vec!["x".to_string()]
        );
    }

    #[test]
    fn backslash_processing() {
        assert_eq!(unescape_line("a\\ b"), "a b");
        assert_eq!(unescape_line("a\\\\b"), "a\\b");
    }

    #[test]
    fn mapfile_splits_lines() {
        let mut st = ShellState::default();
        let args = vec!["-t".to_string(), "arr".to_string()];
        mapfile_cmd(&mut st, &args, "x\ny\n").unwrap();
        match crate::interp::vars::read_var(&mut st, "arr").unwrap() {
            Value::Indexed(map) => {
                assert_eq!(map.get(&0).unwrap(), "x");
                assert_eq!(map.get(&1).unwrap(), "y");
            }
            other => panic!("unexpected {:?}", other),
        }
        let _ = get_string;
    }
}
