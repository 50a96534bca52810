//! Interpreter state.
//!
//! One owned `ShellState` threads through the executor. Subshells clone it
//! and drop the clone; functions push a local-scope frame of shadowed
//! values; prefix assignments push a temp-binding frame. Variables hold a
//! structured `Value` (scalar, sparse indexed array, or insertion-ordered
//! associative array) with attribute flags beside the value, and the FD
//! table is a typed map.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ast::FunctionDefNode;

/// A variable's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    /// Sparse integer-indexed array.
    Indexed(BTreeMap<i64, String>),
    /// Associative array preserving insertion order.
    Assoc(IndexMap<String, String>),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    pub fn indexed_from(values: Vec<String>) -> Self {
        Value::Indexed(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i as i64, v))
                .collect(),
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Indexed(_) | Value::Assoc(_))
    }

    /// The value a bare `$name` reference sees: the scalar itself, or the
    /// element at index 0 / key "0" for arrays.
    pub fn scalar_view(&self) -> &str {
        match self {
            Value::Scalar(s) => s,
            Value::Indexed(map) => map.get(&0).map(|s| s.as_str()).unwrap_or(""),
            Value::Assoc(map) => map.get("0").map(|s| s.as_str()).unwrap_or(""),
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }
}

/// Attribute flags stored beside a variable's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarAttrs {
    pub readonly: bool,
    pub exported: bool,
    pub integer: bool,
    pub nameref: bool,
    pub uppercase: bool,
    pub lowercase: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// `None` for declared-but-unset variables (`declare -i x`).
    pub value: Option<Value>,
    pub attrs: VarAttrs,
}

impl Variable {
    pub fn scalar(s: impl Into<String>) -> Self {
        Variable {
            value: Some(Value::Scalar(s.into())),
            attrs: VarAttrs::default(),
        }
    }

    pub fn unset_with(attrs: VarAttrs) -> Self {
        Variable { value: None, attrs }
    }
}

/// Typed file-descriptor table entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FdEntry {
    /// Buffered readable content (heredocs, here-strings, `exec <file`).
    Input(String),
    /// File-backed writer.
    OutFile { path: String, append: bool },
    /// Read/write descriptor (`<>`).
    RwFile { path: String, pos: usize },
    DupOut(i32),
    DupIn(i32),
}

/// `set` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShellOptions {
    pub errexit: bool,
    pub pipefail: bool,
    pub nounset: bool,
    pub xtrace: bool,
    pub verbose: bool,
    pub noexec: bool,
    pub noglob: bool,
    pub noclobber: bool,
    pub allexport: bool,
    pub posix: bool,
}

impl ShellOptions {
    /// (`set -o` name, accessor) pairs, in display order.
    pub const NAMES: &'static [&'static str] = &[
        "allexport",
        "errexit",
        "noclobber",
        "noexec",
        "noglob",
        "nounset",
        "pipefail",
        "posix",
        "verbose",
        "xtrace",
    ];

    pub fn get(&self, name: &str) -> Option<bool> {
        Some(match name {
            "allexport" => self.allexport,
            "errexit" => self.errexit,
            "noclobber" => self.noclobber,
            "noexec" => self.noexec,
            "noglob" => self.noglob,
            "nounset" => self.nounset,
            "pipefail" => self.pipefail,
            "posix" => self.posix,
            "verbose" => self.verbose,
            "xtrace" => self.xtrace,
            _ => return None,
        })
    }

    pub fn set(&mut self, name: &str, value: bool) -> bool {
        match name {
            "allexport" => self.allexport = value,
            "errexit" => self.errexit = value,
            "noclobber" => self.noclobber = value,
            "noexec" => self.noexec = value,
            "noglob" => self.noglob = value,
            "nounset" => self.nounset = value,
            "pipefail" => self.pipefail = value,
            "posix" => self.posix = value,
            "verbose" => self.verbose = value,
            "xtrace" => self.xtrace = value,
            _ => return false,
        }
        true
    }

    pub fn short_flag(flag: char) -> Option<&'static str> {
        Some(match flag {
            'a' => "allexport",
            'e' => "errexit",
            'C' => "noclobber",
            'n' => "noexec",
            'f' => "noglob",
            'u' => "nounset",
            'v' => "verbose",
            'x' => "xtrace",
            _ => return None,
        })
    }

    /// The `$-` string.
    pub fn flag_string(&self) -> String {
        let mut s = String::from("h");
        if self.allexport {
            s.push('a');
        }
        if self.errexit {
            s.push('e');
        }
        if self.noglob {
            s.push('f');
        }
        if self.noexec {
            s.push('n');
        }
        if self.nounset {
            s.push('u');
        }
        if self.verbose {
            s.push('v');
        }
        if self.xtrace {
            s.push('x');
        }
        s.push('B');
        if self.noclobber {
            s.push('C');
        }
        s
    }
}

/// `shopt` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShoptOptions {
    pub extglob: bool,
    pub globstar: bool,
    pub nullglob: bool,
    pub failglob: bool,
    pub dotglob: bool,
    pub globskipdots: bool,
    pub nocaseglob: bool,
    pub nocasematch: bool,
    pub expand_aliases: bool,
    pub lastpipe: bool,
    pub xpg_echo: bool,
}

impl Default for ShoptOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            globstar: false,
            nullglob: false,
            failglob: false,
            dotglob: false,
            // bash >= 5.2 default
            globskipdots: true,
            nocaseglob: false,
            nocasematch: false,
            expand_aliases: false,
            lastpipe: false,
            xpg_echo: false,
        }
    }
}

impl ShoptOptions {
    pub const NAMES: &'static [&'static str] = &[
        "dotglob",
        "expand_aliases",
        "extglob",
        "failglob",
        "globskipdots",
        "globstar",
        "lastpipe",
        "nocaseglob",
        "nocasematch",
        "nullglob",
        "xpg_echo",
    ];

    pub fn get(&self, name: &str) -> Option<bool> {
        Some(match name {
            "dotglob" => self.dotglob,
            "expand_aliases" => self.expand_aliases,
            "extglob" => self.extglob,
            "failglob" => self.failglob,
            "globskipdots" => self.globskipdots,
            "globstar" => self.globstar,
            "lastpipe" => self.lastpipe,
            "nocaseglob" => self.nocaseglob,
            "nocasematch" => self.nocasematch,
            "nullglob" => self.nullglob,
            "xpg_echo" => self.xpg_echo,
            _ => return None,
        })
    }

    pub fn set(&mut self, name: &str, value: bool) -> bool {
        match name {
            "dotglob" => self.dotglob = value,
            "expand_aliases" => self.expand_aliases = value,
            "extglob" => self.extglob = value,
            "failglob" => self.failglob = value,
            "globskipdots" => self.globskipdots = value,
            "globstar" => self.globstar = value,
            "lastpipe" => self.lastpipe = value,
            "nocaseglob" => self.nocaseglob = value,
            "nocasematch" => self.nocasematch = value,
            "nullglob" => self.nullglob = value,
            "xpg_echo" => self.xpg_echo = value,
            _ => return false,
        }
        true
    }
}

/// Ceilings that abort runaway scripts.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_command_count: u64,
    pub max_recursion_depth: u32,
    pub max_iterations: u64,
    pub max_brace_results: usize,
    pub max_brace_operations: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_command_count: 100_000,
            max_recursion_depth: 1000,
            max_iterations: 1_000_000,
            max_brace_results: 10_000,
            max_brace_operations: 100_000,
        }
    }
}

/// One saved-value frame per function call.
pub type LocalFrame = IndexMap<String, Option<Variable>>;

#[derive(Debug, Clone)]
pub struct ShellState {
    /// Variables in insertion order (bash-observable via `declare -p`).
    pub vars: IndexMap<String, Variable>,
    /// `$1..$N`.
    pub positional: Vec<String>,
    /// `$0`.
    pub script_name: String,
    pub functions: HashMap<String, FunctionDefNode>,
    pub aliases: HashMap<String, String>,
    /// Names of associative arrays declared but not yet assigned are
    /// tracked through `Variable::value = None` + this marker set.
    pub assoc_pending: std::collections::HashSet<String>,

    pub local_scopes: Vec<LocalFrame>,
    /// Shadow stack for prefix assignments (`FOO=x cmd`).
    pub temp_bindings: Vec<Vec<(String, Option<Variable>)>>,
    /// Names bound by the innermost prefix-assignment frame, for the
    /// child-environment view.
    pub temp_exported: Vec<String>,

    pub options: ShellOptions,
    pub shopts: ShoptOptions,

    pub fds: HashMap<i32, FdEntry>,
    pub next_fd: i32,

    pub cwd: String,
    pub previous_dir: String,
    pub dir_stack: Vec<String>,

    pub last_exit_code: i32,
    pub last_arg: String,
    pub current_line: usize,
    pub pipe_status: Vec<i32>,
    /// Exit code of the most recent command substitution in the current
    /// statement; assignment-only statements surface it as `$?`.
    pub last_subst_exit: Option<i32>,

    pub loop_depth: u32,
    pub call_depth: u32,
    pub source_depth: u32,
    pub func_name_stack: Vec<String>,
    pub source_stack: Vec<String>,
    pub current_source: Option<String>,

    pub parent_has_loop_context: bool,
    pub errexit_safe: bool,
    pub in_condition: bool,

    pub group_stdin: Option<String>,

    pub command_count: u64,
    pub start_time: std::time::Instant,

    pub shell_pid: u32,
    pub bash_pid: u32,
    pub next_virtual_pid: u32,
    pub last_background_pid: u32,

    pub traps: HashMap<String, String>,
    pub hashed_commands: HashMap<String, String>,
    pub umask: u32,
    /// Intra-argument position for `getopts` option clustering.
    pub getopts_pos: usize,

    pub rng: StdRng,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            vars: IndexMap::new(),
            positional: Vec::new(),
            script_name: "bash".to_string(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            assoc_pending: std::collections::HashSet::new(),
            local_scopes: Vec::new(),
            temp_bindings: Vec::new(),
            temp_exported: Vec::new(),
            options: ShellOptions::default(),
            shopts: ShoptOptions::default(),
            fds: HashMap::new(),
            next_fd: 10,
            cwd: "/".to_string(),
            previous_dir: "/".to_string(),
            dir_stack: Vec::new(),
            last_exit_code: 0,
            last_arg: String::new(),
            current_line: 1,
            pipe_status: Vec::new(),
            last_subst_exit: None,
            loop_depth: 0,
            call_depth: 0,
            source_depth: 0,
            func_name_stack: Vec::new(),
            source_stack: Vec::new(),
            current_source: None,
            parent_has_loop_context: false,
            errexit_safe: false,
            in_condition: false,
            group_stdin: None,
            command_count: 0,
            start_time: std::time::Instant::now(),
            shell_pid: 4242,
            bash_pid: 4242,
            next_virtual_pid: 5000,
            last_background_pid: 0,
            traps: HashMap::new(),
            hashed_commands: HashMap::new(),
            umask: 0o022,
            getopts_pos: 0,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }
}

impl ShellState {
    /// Allocate a virtual pid for a subshell's `BASHPID`.
    pub fn alloc_virtual_pid(&mut self) -> u32 {
        self.next_virtual_pid += 1;
        self.next_virtual_pid
    }

    /// Allocate the next free descriptor >= 10 for `{var}>file` syntax.
    pub fn alloc_fd(&mut self) -> i32 {
        while self.fds.contains_key(&self.next_fd) {
            self.next_fd += 1;
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }

    pub fn update_exit_code(&mut self, code: i32) {
        self.last_exit_code = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_view_of_arrays() {
        let v = Value::indexed_from(vec!["a".into(), "b".into()]);
        assert_eq!(v.scalar_view(), "a");
        let mut m = BTreeMap::new();
        m.insert(3i64, "x".to_string());
        assert_eq!(Value::Indexed(m).scalar_view(), "");
    }

    #[test]
    fn option_flag_string() {
        let mut opts = ShellOptions::default();
        opts.errexit = true;
        opts.nounset = true;
        assert_eq!(opts.flag_string(), "heuB");
    }

    #[test]
    fn fd_allocation_skips_used() {
        let mut st = ShellState::default();
        st.fds.insert(10, FdEntry::Input(String::new()));
        assert_eq!(st.alloc_fd(), 11);
        assert_eq!(st.alloc_fd(), 12);
    }

    #[test]
    fn shopt_roundtrip() {
        let mut s = ShoptOptions::default();
        assert_eq!(s.get("extglob"), Some(false));
        assert!(s.set("extglob", true));
        assert_eq!(s.get("extglob"), Some(true));
        assert!(!s.set("bogus", true));
    }
}
