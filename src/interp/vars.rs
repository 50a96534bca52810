//! Variable access: reads and writes over the structured store, nameref
//! resolution, special parameters, local declarations, and the exported
//! environment handed to external commands.

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::Rng;

use crate::interp::state::{ShellState, Value, VarAttrs, Variable};

const NAMEREF_DEPTH: usize = 10;

/// Split `name[subscript]` into the bare name and the raw subscript text.
pub fn split_subscript(param: &str) -> (String, Option<String>) {
    if let Some(open) = param.find('[') {
        if param.ends_with(']') {
            let name = param[..open].to_string();
            let sub = param[open + 1..param.len() - 1].to_string();
            return (name, Some(sub));
        }
    }
    (param.to_string(), None)
}

/// Follow the nameref chain from `name` to the final target name.
pub fn resolve_nameref(st: &ShellState, name: &str) -> String {
    let mut current = name.to_string();
    for _ in 0..NAMEREF_DEPTH {
        let (bare, sub) = split_subscript(&current);
        match st.vars.get(&bare) {
            Some(var) if var.attrs.nameref => {
                if let Some(Value::Scalar(target)) = &var.value {
                    if target.is_empty() || *target == bare {
                        return current;
                    }
                    current = match sub {
                        Some(s) => format!("{}[{}]", target, s),
                        None => target.clone(),
                    };
                } else {
                    return current;
                }
            }
            _ => return current,
        }
    }
    current
}

/// Read a variable's structured value, resolving namerefs and synthesizing
/// the dynamic variables. Returns `None` when unset.
pub fn read_var(st: &mut ShellState, name: &str) -> Option<Value> {
    match name {
        "RANDOM" => {
            if !st.vars.contains_key("RANDOM") {
                let n: u16 = st.rng.gen_range(0..32768);
                return Some(Value::Scalar(n.to_string()));
            }
        }
        "SECONDS" => {
            if !st.vars.contains_key("SECONDS") {
                return Some(Value::Scalar(
                    st.start_time.elapsed().as_secs().to_string(),
                ));
            }
        }
        "LINENO" => {
            return Some(Value::Scalar(st.current_line.to_string()));
        }
        "FUNCNAME" => {
            if st.func_name_stack.is_empty() {
                return None;
            }
            let mut names: Vec<String> = st.func_name_stack.clone();
            names.reverse();
            return Some(Value::indexed_from(names));
        }
        "BASH_SOURCE" => {
            if st.source_stack.is_empty() {
                return None;
            }
            let mut sources: Vec<String> = st.source_stack.clone();
            sources.reverse();
            return Some(Value::indexed_from(sources));
        }
        "BASHPID" => {
            return Some(Value::Scalar(st.bash_pid.to_string()));
        }
        "PIPESTATUS" => {
            if st.pipe_status.is_empty() {
                return Some(Value::indexed_from(vec![st.last_exit_code.to_string()]));
            }
            return Some(Value::indexed_from(
                st.pipe_status.iter().map(|c| c.to_string()).collect(),
            ));
        }
        "SHELLOPTS" => {
            let enabled: Vec<&str> = crate::interp::state::ShellOptions::NAMES
                .iter()
                .copied()
                .filter(|n| st.options.get(n) == Some(true))
                .collect();
            return Some(Value::Scalar(enabled.join(":")));
        }
        "BASHOPTS" => {
            let enabled: Vec<&str> = crate::interp::state::ShoptOptions::NAMES
                .iter()
                .copied()
                .filter(|n| st.shopts.get(n) == Some(true))
                .collect();
            return Some(Value::Scalar(enabled.join(":")));
        }
        _ => {}
    }

    let resolved = resolve_nameref(st, name);
    let (bare, _) = split_subscript(&resolved);
    st.vars.get(&bare).and_then(|v| v.value.clone())
}

/// Read a parameter as a plain string: specials, positionals, then the
/// scalar view of variables.
pub fn get_string(st: &mut ShellState, name: &str) -> Option<String> {
    match name {
        "?" => return Some(st.last_exit_code.to_string()),
        "$" => return Some(st.shell_pid.to_string()),
        "!" => return Some(st.last_background_pid.to_string()),
        "#" => return Some(st.positional.len().to_string()),
        "0" => return Some(st.script_name.clone()),
        "-" => return Some(st.options.flag_string()),
        "_" => return Some(st.last_arg.clone()),
        "*" | "@" => {
            if st.positional.is_empty() {
                return None;
            }
            return Some(st.positional.join(" "));
        }
        _ => {}
    }
    if let Ok(n) = name.parse::<usize>() {
        return st.positional.get(n.saturating_sub(1)).cloned();
    }
    read_var(st, name).map(|v| v.scalar_view().to_string())
}

pub fn is_readonly(st: &ShellState, name: &str) -> bool {
    let resolved = resolve_nameref(st, name);
    let (bare, _) = split_subscript(&resolved);
    st.vars.get(&bare).map_or(false, |v| v.attrs.readonly)
}

pub fn is_assoc(st: &ShellState, name: &str) -> bool {
    let resolved = resolve_nameref(st, name);
    let (bare, _) = split_subscript(&resolved);
    match st.vars.get(&bare) {
        Some(v) => matches!(v.value, Some(Value::Assoc(_))) || st.assoc_pending.contains(&bare),
        None => st.assoc_pending.contains(&bare),
    }
}

/// Apply case-transform attributes to a value being stored.
fn apply_case_attrs(attrs: VarAttrs, value: String) -> String {
    if attrs.uppercase {
        value.to_uppercase()
    } else if attrs.lowercase {
        value.to_lowercase()
    } else {
        value
    }
}

/// Assign a scalar. An existing array keeps its shape: the scalar lands in
/// element 0. Returns `Err(name)` for readonly violations.
pub fn set_scalar(st: &mut ShellState, name: &str, value: &str, append: bool) -> Result<(), String> {
    let resolved = resolve_nameref(st, name);
    let (bare, sub) = split_subscript(&resolved);
    if let Some(sub) = sub {
        return set_element(st, &bare, &sub, value, append);
    }
    if st.vars.get(&bare).map_or(false, |v| v.attrs.readonly) {
        return Err(bare);
    }
    let allexport = st.options.allexport;
    let entry = st.vars.entry(bare.clone()).or_insert(Variable {
        value: None,
        attrs: VarAttrs::default(),
    });
    if allexport {
        entry.attrs.exported = true;
    }
    let new_value = apply_case_attrs(entry.attrs, value.to_string());
    match &mut entry.value {
        Some(Value::Indexed(map)) => {
            let current = map.get(&0).cloned().unwrap_or_default();
            let stored = if append {
                format!("{}{}", current, new_value)
            } else {
                new_value
            };
            map.insert(0, stored);
        }
        Some(Value::Assoc(map)) => {
            let current = map.get("0").cloned().unwrap_or_default();
            let stored = if append {
                format!("{}{}", current, new_value)
            } else {
                new_value
            };
            map.insert("0".to_string(), stored);
        }
        Some(Value::Scalar(existing)) if append => {
            existing.push_str(&new_value);
        }
        slot => {
            *slot = Some(Value::Scalar(new_value));
        }
    }
    Ok(())
}

/// Assign one array element. `key` is the already-evaluated subscript (an
/// index for indexed arrays, a string key for associative ones).
pub fn set_element(
    st: &mut ShellState,
    name: &str,
    key: &str,
    value: &str,
    append: bool,
) -> Result<(), String> {
    let resolved = resolve_nameref(st, name);
    let (bare, _) = split_subscript(&resolved);
    if st.vars.get(&bare).map_or(false, |v| v.attrs.readonly) {
        return Err(bare);
    }
    let assoc = is_assoc(st, &bare);
    st.assoc_pending.remove(&bare);
    let allexport = st.options.allexport;
    let entry = st.vars.entry(bare.clone()).or_insert(Variable {
        value: None,
        attrs: VarAttrs::default(),
    });
    if allexport {
        entry.attrs.exported = true;
    }
    let new_value = apply_case_attrs(entry.attrs, value.to_string());

    if assoc {
        let map = match &mut entry.value {
            Some(Value::Assoc(map)) => map,
            slot => {
                *slot = Some(Value::Assoc(IndexMap::new()));
                match slot {
                    Some(Value::Assoc(map)) => map,
                    _ => unreachable!(),
                }
            }
        };
        let stored = if append {
            format!("{}{}", map.get(key).map(|s| s.as_str()).unwrap_or(""), new_value)
        } else {
            new_value
        };
        map.insert(key.to_string(), stored);
        return Ok(());
    }

    let index: i64 = key.parse().unwrap_or(0);
    // An element assignment converts a scalar into element 0 first.
    if let Some(Value::Scalar(s)) = &entry.value {
        let mut map = std::collections::BTreeMap::new();
        if !s.is_empty() || index != 0 {
            map.insert(0i64, s.clone());
        }
        entry.value = Some(Value::Indexed(map));
    }
    let map = match &mut entry.value {
        Some(Value::Indexed(map)) => map,
        slot => {
            *slot = Some(Value::Indexed(std::collections::BTreeMap::new()));
            match slot {
                Some(Value::Indexed(map)) => map,
                _ => unreachable!(),
            }
        }
    };
    let index = if index < 0 {
        // Negative subscripts count back from the greatest index + 1.
        let max = map.keys().next_back().copied().unwrap_or(-1);
        max + 1 + index
    } else {
        index
    };
    let stored = if append {
        format!("{}{}", map.get(&index).map(|s| s.as_str()).unwrap_or(""), new_value)
    } else {
        new_value
    };
    map.insert(index, stored);
    Ok(())
}

/// Replace a variable with a whole array value.
pub fn set_array(st: &mut ShellState, name: &str, value: Value) -> Result<(), String> {
    let resolved = resolve_nameref(st, name);
    let (bare, _) = split_subscript(&resolved);
    if st.vars.get(&bare).map_or(false, |v| v.attrs.readonly) {
        return Err(bare);
    }
    st.assoc_pending.remove(&bare);
    let allexport = st.options.allexport;
    let entry = st.vars.entry(bare).or_insert(Variable {
        value: None,
        attrs: VarAttrs::default(),
    });
    if allexport {
        entry.attrs.exported = true;
    }
    entry.value = Some(value);
    Ok(())
}

/// Unset a variable (or one element with a subscript).
pub fn unset(st: &mut ShellState, param: &str) -> Result<(), String> {
    let resolved = resolve_nameref(st, param);
    let (bare, sub) = split_subscript(&resolved);
    if st.vars.get(&bare).map_or(false, |v| v.attrs.readonly) {
        return Err(bare);
    }
    match sub {
        Some(key) => {
            if let Some(var) = st.vars.get_mut(&bare) {
                match &mut var.value {
                    Some(Value::Indexed(map)) => {
                        if let Ok(i) = key.parse::<i64>() {
                            map.remove(&i);
                        }
                    }
                    Some(Value::Assoc(map)) => {
                        map.shift_remove(&key);
                    }
                    _ => {
                        if key == "0" {
                            var.value = None;
                        }
                    }
                }
            }
        }
        None => {
            st.vars.shift_remove(&bare);
            st.assoc_pending.remove(&bare);
        }
    }
    Ok(())
}

/// Declare a name local to the innermost function scope, saving the prior
/// binding for restoration at return.
pub fn declare_local(st: &mut ShellState, name: &str) {
    let prior = st.vars.get(name).cloned();
    if let Some(frame) = st.local_scopes.last_mut() {
        frame.entry(name.to_string()).or_insert(prior);
    }
}

/// Pop a local frame, restoring every shadowed binding.
pub fn pop_local_frame(st: &mut ShellState) {
    if let Some(frame) = st.local_scopes.pop() {
        for (name, prior) in frame {
            match prior {
                Some(var) => {
                    st.vars.insert(name, var);
                }
                None => {
                    st.vars.shift_remove(&name);
                }
            }
        }
    }
}

/// The environment an external command sees: exported variables (scalar
/// view) plus every active prefix binding.
pub fn exported_env(st: &ShellState) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for (name, var) in &st.vars {
        if var.attrs.exported {
            if let Some(value) = &var.value {
                env.insert(name.clone(), value.scalar_view().to_string());
            }
        }
    }
    for name in &st.temp_exported {
        if let Some(var) = st.vars.get(name) {
            if let Some(value) = &var.value {
                env.insert(name.clone(), value.scalar_view().to_string());
            }
        }
    }
    // PWD/OLDPWD track the working directory.
    env.insert("PWD".to_string(), st.cwd.clone());
    env
}

/// All variables flattened to strings for the script-level env snapshot.
pub fn env_snapshot(st: &ShellState) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for (name, var) in &st.vars {
        if let Some(value) = &var.value {
            env.insert(name.clone(), value.scalar_view().to_string());
        }
    }
    env.insert("?".to_string(), st.last_exit_code.to_string());
    env.insert("PWD".to_string(), st.cwd.clone());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_set_and_append() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "x", "a", false).unwrap();
        set_scalar(&mut st, "x", "b", true).unwrap();
        assert_eq!(get_string(&mut st, "x").as_deref(), Some("ab"));
    }

    #[test]
    fn array_scalar_exclusivity() {
        let mut st = ShellState::default();
        set_array(
            &mut st,
            "a",
            Value::indexed_from(vec!["1".into(), "2".into(), "3".into()]),
        )
        .unwrap();
        // Reading $a sees element 0.
        assert_eq!(get_string(&mut st, "a").as_deref(), Some("1"));
        // A scalar assignment replaces element 0, not the array.
        set_scalar(&mut st, "a", "9", false).unwrap();
        match read_var(&mut st, "a").unwrap() {
            Value::Indexed(map) => {
                assert_eq!(map.get(&0).unwrap(), "9");
                assert_eq!(map.get(&2).unwrap(), "3");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn readonly_rejected() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "r", "v", false).unwrap();
        st.vars.get_mut("r").unwrap().attrs.readonly = true;
        assert_eq!(set_scalar(&mut st, "r", "w", false), Err("r".to_string()));
    }

    #[test]
    fn nameref_resolution() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "target", "hello", false).unwrap();
        set_scalar(&mut st, "ref", "target", false).unwrap();
        st.vars.get_mut("ref").unwrap().attrs.nameref = true;
        assert_eq!(get_string(&mut st, "ref").as_deref(), Some("hello"));
        set_scalar(&mut st, "ref", "changed", false).unwrap();
        assert_eq!(get_string(&mut st, "target").as_deref(), Some("changed"));
    }

    #[test]
    fn local_frame_restoration() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "x", "outer", false).unwrap();
        st.local_scopes.push(IndexMap::new());
        declare_local(&mut st, "x");
        declare_local(&mut st, "fresh");
        set_scalar(&mut st, "x", "inner", false).unwrap();
        set_scalar(&mut st, "fresh", "tmp", false).unwrap();
        pop_local_frame(&mut st);
        assert_eq!(get_string(&mut st, "x").as_deref(), Some("outer"));
        assert_eq!(get_string(&mut st, "fresh"), None);
    }

    #[test]
    fn positional_and_specials() {
        let mut st = ShellState::default();
        st.positional = vec!["one".into(), "two".into()];
        st.last_exit_code = 7;
        assert_eq!(get_string(&mut st, "1").as_deref(), Some("one"));
        assert_eq!(get_string(&mut st, "#").as_deref(), Some("2"));
        assert_eq!(get_string(&mut st, "?").as_deref(), Some("7"));
        assert_eq!(get_string(&mut st, "3"), None);
    }

    #[test]
    fn negative_index_assignment() {
        let mut st = ShellState::default();
        set_array(
            &mut st,
            "a",
            Value::indexed_from(vec!["x".into(), "y".into()]),
        )
        .unwrap();
        set_element(&mut st, "a", "-1", "z", false).unwrap();
        match read_var(&mut st, "a").unwrap() {
            Value::Indexed(map) => assert_eq!(map.get(&1).unwrap(), "z"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn exported_env_scalar_view() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "PATH", "/bin", false).unwrap();
        st.vars.get_mut("PATH").unwrap().attrs.exported = true;
        set_scalar(&mut st, "private", "x", false).unwrap();
        let env = exported_env(&st);
        assert_eq!(env.get("PATH").map(|s| s.as_str()), Some("/bin"));
        assert!(!env.contains_key("private"));
    }
}
