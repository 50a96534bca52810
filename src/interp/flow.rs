//! Control Flow Signals
//!
//! The evaluator returns `Result<ExecResult, ControlFlow>`. The `Err` channel
//! is not an error channel in the usual sense: it carries the shell's
//! non-local control transfers (break/continue/return/exit), the fatal shell
//! conditions (errexit, nounset, posix special-builtin failure), and the
//! expansion-time failures that abort a single command. Every signal carries
//! the stdout/stderr accumulated so far, so output produced before the
//! transfer survives propagation through enclosing constructs.

use std::collections::HashMap;

/// Output accumulated by a command or carried by an in-flight signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn absorb(&mut self, result: &ExecResult) {
        self.stdout.push_str(&result.stdout);
        self.stderr.push_str(&result.stderr);
    }
}

/// Which execution ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Commands,
    Recursion,
    Iterations,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Commands => write!(f, "command count"),
            LimitKind::Recursion => write!(f, "recursion depth"),
            LimitKind::Iterations => write!(f, "loop iterations"),
        }
    }
}

/// Non-local control transfer raised during execution.
///
/// `Break`/`Continue` are consumed by the innermost loops, `Return` by the
/// function call site (or `source` boundary), `Exit` by the script boundary.
/// `LimitExceeded` crosses every boundary without exception.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    Break { levels: u32, out: Output },
    Continue { levels: u32, out: Output },
    Return { code: i32, out: Output },
    Exit { code: i32, out: Output },
    Errexit { code: i32, out: Output },
    Nounset { name: String, out: Output },
    BadSubstitution { what: String, out: Output },
    Arithmetic { message: String, fatal: bool, out: Output },
    Glob { pattern: String, out: Output },
    LimitExceeded { kind: LimitKind, message: String, out: Output },
    SubshellExit { out: Output },
    PosixFatal { code: i32, out: Output },
}

impl ControlFlow {
    pub fn exit(code: i32) -> Self {
        ControlFlow::Exit {
            code,
            out: Output::default(),
        }
    }

    pub fn nounset(name: impl Into<String>) -> Self {
        let name = name.into();
        let out = Output::new("", format!("bash: {}: unbound variable\n", name));
        ControlFlow::Nounset { name, out }
    }

    pub fn bad_substitution(what: impl Into<String>) -> Self {
        let what = what.into();
        let out = Output::new("", format!("bash: {}: bad substitution\n", what));
        ControlFlow::BadSubstitution { what, out }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        let message = message.into();
        let out = Output::new("", format!("bash: {}\n", message));
        ControlFlow::Arithmetic {
            message,
            fatal: false,
            out,
        }
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let out = Output::new("", format!("bash: no match: {}\n", pattern));
        ControlFlow::Glob { pattern, out }
    }

    pub fn limit(kind: LimitKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let out = Output::new("", format!("bash: {}\n", message));
        ControlFlow::LimitExceeded { kind, message, out }
    }

    pub fn out(&self) -> &Output {
        match self {
            ControlFlow::Break { out, .. }
            | ControlFlow::Continue { out, .. }
            | ControlFlow::Return { out, .. }
            | ControlFlow::Exit { out, .. }
            | ControlFlow::Errexit { out, .. }
            | ControlFlow::Nounset { out, .. }
            | ControlFlow::BadSubstitution { out, .. }
            | ControlFlow::Arithmetic { out, .. }
            | ControlFlow::Glob { out, .. }
            | ControlFlow::LimitExceeded { out, .. }
            | ControlFlow::SubshellExit { out, .. }
            | ControlFlow::PosixFatal { out, .. } => out,
        }
    }

    pub fn out_mut(&mut self) -> &mut Output {
        match self {
            ControlFlow::Break { out, .. }
            | ControlFlow::Continue { out, .. }
            | ControlFlow::Return { out, .. }
            | ControlFlow::Exit { out, .. }
            | ControlFlow::Errexit { out, .. }
            | ControlFlow::Nounset { out, .. }
            | ControlFlow::BadSubstitution { out, .. }
            | ControlFlow::Arithmetic { out, .. }
            | ControlFlow::Glob { out, .. }
            | ControlFlow::LimitExceeded { out, .. }
            | ControlFlow::SubshellExit { out, .. }
            | ControlFlow::PosixFatal { out, .. } => out,
        }
    }

    /// Prepend output produced before this signal was raised.
    pub fn prepend(mut self, stdout: &str, stderr: &str) -> Self {
        let out = self.out_mut();
        out.stdout.insert_str(0, stdout);
        out.stderr.insert_str(0, stderr);
        self
    }

    /// The exit code this signal implies when converted into a result.
    pub fn implied_code(&self) -> i32 {
        match self {
            ControlFlow::Break { .. } | ControlFlow::Continue { .. } => 0,
            ControlFlow::Return { code, .. }
            | ControlFlow::Exit { code, .. }
            | ControlFlow::Errexit { code, .. }
            | ControlFlow::PosixFatal { code, .. } => *code,
            ControlFlow::Nounset { .. }
            | ControlFlow::BadSubstitution { .. }
            | ControlFlow::Glob { .. } => 1,
            ControlFlow::Arithmetic { .. } => 1,
            ControlFlow::LimitExceeded { .. } => 126,
            ControlFlow::SubshellExit { .. } => 0,
        }
    }

    /// Signals that unwind a lexical scope rather than report a failure.
    pub fn is_scope_transfer(&self) -> bool {
        matches!(
            self,
            ControlFlow::Break { .. } | ControlFlow::Continue { .. } | ControlFlow::Return { .. }
        )
    }

    /// Convert the signal into a plain result carrying its output.
    pub fn into_result(self) -> ExecResult {
        let code = self.implied_code();
        let out = match self {
            ControlFlow::Break { out, .. }
            | ControlFlow::Continue { out, .. }
            | ControlFlow::Return { out, .. }
            | ControlFlow::Exit { out, .. }
            | ControlFlow::Errexit { out, .. }
            | ControlFlow::Nounset { out, .. }
            | ControlFlow::BadSubstitution { out, .. }
            | ControlFlow::Arithmetic { out, .. }
            | ControlFlow::Glob { out, .. }
            | ControlFlow::LimitExceeded { out, .. }
            | ControlFlow::SubshellExit { out, .. }
            | ControlFlow::PosixFatal { out, .. } => out,
        };
        ExecResult::new(out.stdout, out.stderr, code)
    }
}

/// Result of executing a command, pipeline, or script.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Snapshot of the flattened environment, attached at the script boundary.
    pub env: Option<HashMap<String, String>>,
}

impl ExecResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            env: None,
        }
    }

    pub fn ok() -> Self {
        Self::new("", "", 0)
    }

    pub fn code(exit_code: i32) -> Self {
        Self::new("", "", exit_code)
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new("", stderr, 1)
    }

    pub fn failure_with_code(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self::new("", stderr, exit_code)
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }
}

/// The evaluator's universal return type.
pub type ExecOutcome = Result<ExecResult, ControlFlow>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_keeps_order() {
        let sig = ControlFlow::exit(3).prepend("early ", "warn ");
        let sig = sig.prepend("first ", "");
        assert_eq!(sig.out().stdout, "first early ");
        assert_eq!(sig.out().stderr, "warn ");
        assert_eq!(sig.implied_code(), 3);
    }

    #[test]
    fn nounset_message_shape() {
        let sig = ControlFlow::nounset("FOO");
        assert_eq!(sig.out().stderr, "bash: FOO: unbound variable\n");
        assert_eq!(sig.implied_code(), 1);
    }

    #[test]
    fn into_result_carries_output() {
        let sig = ControlFlow::Return {
            code: 7,
            out: Output::new("partial", ""),
        };
        let result = sig.into_result();
        assert_eq!(result.stdout, "partial");
        assert_eq!(result.exit_code, 7);
    }

    #[test]
    fn scope_transfer_classification() {
        assert!(ControlFlow::Break {
            levels: 1,
            out: Output::default()
        }
        .is_scope_transfer());
        assert!(!ControlFlow::exit(0).is_scope_transfer());
    }
}
