//! Declaration builtins: declare/typeset, local, export, readonly, unset,
//! and let.
//!
//! Their arguments were expanded without word splitting, so `name=value`
//! shapes arrive intact; `name=(...)` initializers arrive as raw text and
//! are re-parsed and expanded here.

use indexmap::IndexMap;

use crate::interp::engine::Executor;
use crate::interp::flow::{ExecOutcome, ExecResult, Output};
use crate::interp::state::{ShellState, Value, VarAttrs, Variable};
use crate::interp::vars;
use crate::parser::lexer::is_name;

#[derive(Debug, Default, Clone, Copy)]
struct AttrChange {
    indexed: bool,
    assoc: bool,
    integer: Option<bool>,
    lowercase: Option<bool>,
    uppercase: Option<bool>,
    nameref: Option<bool>,
    readonly: Option<bool>,
    exported: Option<bool>,
    print: bool,
    functions: bool,
    function_names: bool,
    global: bool,
}

fn parse_flags(args: &[String]) -> Result<(AttrChange, usize), String> {
    let mut change = AttrChange::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let (enable, body) = if let Some(rest) = arg.strip_prefix("--") {
            if rest.is_empty() {
                i += 1;
                break;
            }
            return Err(arg.clone());
        } else if let Some(rest) = arg.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = arg.strip_prefix('+') {
            (false, rest)
        } else {
            break;
        };
        if body.is_empty() {
            return Err(arg.clone());
        }
        for c in body.chars() {
            match c {
                'a' => change.indexed = enable,
                'A' => change.assoc = enable,
                'i' => change.integer = Some(enable),
                'l' => change.lowercase = Some(enable),
                'u' => change.uppercase = Some(enable),
                'n' => change.nameref = Some(enable),
                'r' => change.readonly = Some(enable),
                'x' => change.exported = Some(enable),
                'p' => change.print = true,
                'f' => change.functions = true,
                'F' => change.function_names = true,
                'g' => change.global = true,
                't' => {}
                _ => return Err(arg.clone()),
            }
        }
        i += 1;
    }
    Ok((change, i))
}

/// Split a declaration operand into name[+]=value pieces.
struct DeclArg {
    name: String,
    append: bool,
    value: Option<String>,
    array_text: Option<String>,
}

fn parse_operand(arg: &str) -> Option<DeclArg> {
    let chars: Vec<char> = arg.chars().collect();
    let mut depth = 0usize;
    let mut eq = None;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                eq = Some(i);
                break;
            }
            _ => {}
        }
    }
    match eq {
        None => {
            let (bare, _) = vars::split_subscript(arg);
            if !is_name(&bare) {
                return None;
            }
            Some(DeclArg {
                name: arg.to_string(),
                append: false,
                value: None,
                array_text: None,
            })
        }
        Some(eq) => {
            let append = eq > 0 && chars[eq - 1] == '+';
            let name: String = chars[..if append { eq - 1 } else { eq }].iter().collect();
            let (bare, _) = vars::split_subscript(&name);
            if !is_name(&bare) {
                return None;
            }
            let value: String = chars[eq + 1..].iter().collect();
            if value.starts_with('(') && value.ends_with(')') {
                let inner = value[1..value.len() - 1].to_string();
                Some(DeclArg {
                    name,
                    append,
                    value: None,
                    array_text: Some(inner),
                })
            } else {
                Some(DeclArg {
                    name,
                    append,
                    value: Some(value),
                    array_text: None,
                })
            }
        }
    }
}

/// Parse a raw `( ... )` initializer body into element words.
fn parse_array_elements(inner: &str) -> Vec<crate::ast::WordNode> {
    let mut elements = Vec::new();
    if let Ok(tokens) = crate::parser::Lexer::new(inner).tokenize() {
        for token in tokens {
            if token.kind.is_wordlike() {
                if let Ok(word) = crate::parser::word::parse_word_text(&token.text, true) {
                    elements.push(word);
                }
            }
        }
    }
    elements
}

fn attr_letters(var: &Variable) -> String {
    let mut letters = String::new();
    match &var.value {
        Some(Value::Indexed(_)) => letters.push('a'),
        Some(Value::Assoc(_)) => letters.push('A'),
        _ => {}
    }
    if var.attrs.integer {
        letters.push('i');
    }
    if var.attrs.lowercase {
        letters.push('l');
    }
    if var.attrs.nameref {
        letters.push('n');
    }
    if var.attrs.readonly {
        letters.push('r');
    }
    if var.attrs.uppercase {
        letters.push('u');
    }
    if var.attrs.exported {
        letters.push('x');
    }
    letters
}

/// `declare -p` rendering of one variable.
fn render_declare(name: &str, var: &Variable) -> String {
    let letters = attr_letters(var);
    let flags = if letters.is_empty() {
        "--".to_string()
    } else {
        format!("-{}", letters)
    };
    match &var.value {
        None => format!("declare {} {}\n", flags, name),
        Some(Value::Scalar(s)) => format!(
            "declare {} {}={}\n",
            flags,
            name,
            crate::expand::quote::quote_for_assignment(s)
        ),
        Some(array) => format!(
            "declare {} {}={}\n",
            flags,
            name,
            crate::expand::quote::render_array(array)
        ),
    }
}

pub fn declare_cmd(
    exec: &Executor,
    st: &mut ShellState,
    args: &[String],
    invoked_as: &str,
    force_local: bool,
) -> ExecOutcome {
    let (change, consumed) = match parse_flags(args) {
        Ok(v) => v,
        Err(flag) => {
            return Ok(ExecResult::failure_with_code(
                format!("bash: {}: {}: invalid option\n", invoked_as, flag),
                2,
            ))
        }
    };
    let operands = &args[consumed..];
    // Inside a function, declare/typeset/local all scope to the call
    // unless -g asks for the global.
    let local_scope = force_local || (!change.global && st.call_depth > 0);

    // Print mode.
    if change.function_names || (change.functions && (change.print || operands.is_empty())) {
        let mut names: Vec<&String> = st.functions.keys().collect();
        names.sort();
        let stdout: String = names
            .iter()
            .map(|n| format!("declare -f {}\n", n))
            .collect();
        return Ok(ExecResult::new(stdout, "", 0));
    }
    if change.functions {
        let mut code = 0;
        for name in operands {
            if !st.functions.contains_key(name) {
                code = 1;
            }
        }
        return Ok(ExecResult::code(code));
    }
    if change.print && operands.is_empty() || (operands.is_empty() && args.is_empty()) {
        let mut stdout = String::new();
        for (name, var) in st.vars.clone() {
            stdout.push_str(&render_declare(&name, &var));
        }
        return Ok(ExecResult::new(stdout, "", 0));
    }
    if change.print {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut code = 0;
        for name in operands {
            match st.vars.get(name).cloned() {
                Some(var) => stdout.push_str(&render_declare(name, &var)),
                None => {
                    stderr.push_str(&format!("bash: {}: {}: not found\n", invoked_as, name));
                    code = 1;
                }
            }
        }
        return Ok(ExecResult::new(stdout, stderr, code));
    }

    let mut out = Output::default();
    let mut code = 0;
    for operand in operands {
        let Some(decl) = parse_operand(operand) else {
            out.stderr.push_str(&format!(
                "bash: {}: `{}': not a valid identifier\n",
                invoked_as, operand
            ));
            code = 1;
            continue;
        };
        let (bare, _) = vars::split_subscript(&decl.name);

        if local_scope {
            vars::declare_local(st, &bare);
        }

        // Attribute application before the value lands, so `-i` and case
        // transforms affect the assignment.
        {
            let entry = st.vars.entry(bare.clone()).or_insert(Variable {
                value: None,
                attrs: VarAttrs::default(),
            });
            if let Some(v) = change.integer {
                entry.attrs.integer = v;
            }
            if let Some(v) = change.lowercase {
                entry.attrs.lowercase = v;
                if v {
                    entry.attrs.uppercase = false;
                }
            }
            if let Some(v) = change.uppercase {
                entry.attrs.uppercase = v;
                if v {
                    entry.attrs.lowercase = false;
                }
            }
            if let Some(v) = change.nameref {
                entry.attrs.nameref = v;
            }
            if let Some(v) = change.exported {
                entry.attrs.exported = v;
            }
            if change.assoc && entry.value.is_none() {
                entry.value = Some(Value::Assoc(IndexMap::new()));
            } else if change.indexed && entry.value.is_none() {
                entry.value = Some(Value::Indexed(Default::default()));
            }
        }

        if let Some(inner) = decl.array_text {
            let assignment = crate::ast::AssignmentNode {
                name: decl.name.clone(),
                append: decl.append,
                value: None,
                array: Some(parse_array_elements(&inner)),
            };
            if change.assoc {
                st.assoc_pending.insert(bare.clone());
            }
            if let Err(message) = exec.perform_assignment(st, &mut out, &assignment) {
                out.stderr.push_str(&message);
                code = 1;
            }
        } else if let Some(value) = decl.value {
            let assignment = crate::ast::AssignmentNode {
                name: decl.name.clone(),
                append: decl.append,
                value: Some(crate::ast::WordNode::literal(value)),
                array: None,
            };
            if let Err(message) = exec.perform_assignment(st, &mut out, &assignment) {
                out.stderr.push_str(&message);
                code = 1;
            }
        }

        // Readonly locks in last.
        if let Some(v) = change.readonly {
            if let Some(entry) = st.vars.get_mut(&bare) {
                entry.attrs.readonly = v;
            }
        }
    }
    Ok(ExecResult::new(out.stdout, out.stderr, code))
}

pub fn local_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if st.call_depth == 0 {
        return Ok(ExecResult::failure(
            "bash: local: can only be used in a function\n",
        ));
    }
    declare_cmd(exec, st, args, "local", true)
}

pub fn export_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut unexport = false;
    let mut operands: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-n" => unexport = true,
            "-p" => {
                // render_declare already carries the `x` attribute letter
                // for exported variables.
                let mut stdout = String::new();
                for (name, var) in &st.vars {
                    if var.attrs.exported {
                        stdout.push_str(&render_declare(name, var));
                    }
                }
                return Ok(ExecResult::new(stdout, "", 0));
            }
            "-f" | "--" => {}
            _ => operands.push(arg),
        }
    }

    let mut out = Output::default();
    let mut code = 0;
    for operand in operands {
        let Some(decl) = parse_operand(operand) else {
            out.stderr.push_str(&format!(
                "bash: export: `{}': not a valid identifier\n",
                operand
            ));
            code = 1;
            continue;
        };
        if let Some(value) = decl.value {
            let assignment = crate::ast::AssignmentNode {
                name: decl.name.clone(),
                append: decl.append,
                value: Some(crate::ast::WordNode::literal(value)),
                array: None,
            };
            if let Err(message) = exec.perform_assignment(st, &mut out, &assignment) {
                out.stderr.push_str(&message);
                code = 1;
                continue;
            }
        }
        let (bare, _) = vars::split_subscript(&decl.name);
        let entry = st.vars.entry(bare).or_insert(Variable {
            value: None,
            attrs: VarAttrs::default(),
        });
        entry.attrs.exported = !unexport;
    }
    Ok(ExecResult::new(out.stdout, out.stderr, code))
}

pub fn readonly_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut operands: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-p" | "" => {
                let mut stdout = String::new();
                for (name, var) in &st.vars {
                    if var.attrs.readonly {
                        stdout.push_str(&render_declare(name, var));
                    }
                }
                return Ok(ExecResult::new(stdout, "", 0));
            }
            "-a" | "-A" | "-f" | "--" => {}
            _ => operands.push(arg),
        }
    }
    if operands.is_empty() {
        let mut stdout = String::new();
        for (name, var) in &st.vars {
            if var.attrs.readonly {
                stdout.push_str(&render_declare(name, var));
            }
        }
        return Ok(ExecResult::new(stdout, "", 0));
    }

    let mut out = Output::default();
    let mut code = 0;
    for operand in operands {
        let Some(decl) = parse_operand(operand) else {
            out.stderr.push_str(&format!(
                "bash: readonly: `{}': not a valid identifier\n",
                operand
            ));
            code = 1;
            continue;
        };
        if let Some(value) = decl.value {
            let assignment = crate::ast::AssignmentNode {
                name: decl.name.clone(),
                append: decl.append,
                value: Some(crate::ast::WordNode::literal(value)),
                array: None,
            };
            if let Err(message) = exec.perform_assignment(st, &mut out, &assignment) {
                out.stderr.push_str(&message);
                code = 1;
                continue;
            }
        }
        let (bare, _) = vars::split_subscript(&decl.name);
        let entry = st.vars.entry(bare).or_insert(Variable {
            value: None,
            attrs: VarAttrs::default(),
        });
        entry.attrs.readonly = true;
    }
    Ok(ExecResult::new(out.stdout, out.stderr, code))
}

pub fn unset_cmd(st: &mut ShellState, args: &[String]) -> ExecOutcome {
    let mut functions_only = false;
    let mut variables_only = false;
    let mut operands: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-f" => functions_only = true,
            "-v" => variables_only = true,
            "--" => {}
            _ => operands.push(arg),
        }
    }

    let mut stderr = String::new();
    let mut code = 0;
    for operand in operands {
        if functions_only {
            st.functions.remove(operand.as_str());
            continue;
        }
        match vars::unset(st, operand) {
            Ok(()) => {
                if !variables_only && !st.vars.contains_key(operand.as_str()) {
                    // Fall back to a function of the same name, as bash does.
                    st.functions.remove(operand.as_str());
                }
            }
            Err(name) => {
                stderr.push_str(&format!("bash: unset: {}: cannot unset: readonly variable\n", name));
                code = 1;
            }
        }
    }
    Ok(ExecResult::new("", stderr, code))
}

pub fn let_cmd(exec: &Executor, st: &mut ShellState, args: &[String]) -> ExecOutcome {
    if args.is_empty() {
        return Ok(ExecResult::failure_with_code(
            "bash: let: expression expected\n",
            2,
        ));
    }
    let mut out = Output::default();
    let mut last = 0;
    for arg in args {
        let expr = crate::parser::arith::parse_arith(arg);
        match crate::interp::arith::eval_arith(exec, st, &mut out, &expr) {
            Ok(value) => last = value,
            Err(sig) => {
                let failed = sig.into_result();
                return Ok(ExecResult::new(
                    out.stdout + &failed.stdout,
                    out.stderr + &failed.stderr,
                    1,
                ));
            }
        }
    }
    Ok(ExecResult::new(
        out.stdout,
        out.stderr,
        if last != 0 { 0 } else { 1 },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_parsing() {
        let d = parse_operand("x=5").unwrap();
        assert_eq!(d.name, "x");
        assert_eq!(d.value.as_deref(), Some("5"));

        let d = parse_operand("a+=(1 2)").unwrap();
        assert!(d.append);
        assert_eq!(d.array_text.as_deref(), Some("1 2"));

        let d = parse_operand("m[k]=v").unwrap();
        assert_eq!(d.name, "m[k]");

        assert!(parse_operand("1bad=x").is_none());
    }

    #[test]
    fn declare_render_shapes() {
        let var = Variable::scalar("a b");
        assert_eq!(render_declare("x", &var), "declare -- x=\"a b\"\n");

        let mut var = Variable {
            value: Some(Value::indexed_from(vec!["1".into()])),
            attrs: VarAttrs::default(),
        };
        var.attrs.readonly = true;
        assert_eq!(render_declare("a", &var), "declare -ar a=([0]=\"1\")\n");
    }
}
