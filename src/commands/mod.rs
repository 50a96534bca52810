//! External command registry.
//!
//! Commands outside the builtin set are provided by the host through this
//! registry. Each command is an async `execute` over a context carrying the
//! filesystem, environment, stdin, and the optional host hooks (fetch,
//! sleep, nested exec). The crate ships a few small commands so pipelines
//! are usable out of the box; hosts register the rest.

mod cat;
mod seq;
mod sleep_cmd;
mod wc;

pub use cat::Cat;
pub use seq::Seq;
pub use sleep_cmd::Sleep;
pub use wc::Wc;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::fs::FileSystem;

/// Result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn error(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: 1,
        }
    }

    pub fn with_exit_code(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }
}

/// Nested script execution hook (xargs-style commands re-enter the shell).
pub type ExecFn = Arc<
    dyn Fn(
            String,
            String,
            String,
            HashMap<String, String>,
            Arc<dyn FileSystem>,
        ) -> Pin<Box<dyn Future<Output = CommandResult> + Send>>
        + Send
        + Sync,
>;

/// HTTP response handed back by the host's fetch hook.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub url: String,
}

/// Host fetch hook: (url, method, headers, body).
pub type FetchFn = Arc<
    dyn Fn(
            String,
            String,
            HashMap<String, String>,
            Option<String>,
        ) -> Pin<Box<dyn Future<Output = Result<FetchResponse, String>> + Send>>
        + Send
        + Sync,
>;

/// Host sleep hook; mockable in tests.
pub type SleepFn =
    Arc<dyn Fn(f64) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Context handed to an external command's `execute`.
pub struct CommandContext {
    pub stdin: String,
    pub cwd: String,
    /// Exported environment as the command sees it.
    pub env: HashMap<String, String>,
    pub fs: Arc<dyn FileSystem>,
    pub exec: Option<ExecFn>,
    pub fetch: Option<FetchFn>,
    pub sleep: Option<SleepFn>,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, args: &[String], ctx: CommandContext) -> CommandResult;
}

pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registry with the bundled sample commands.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Cat));
        registry.register(Box::new(Seq));
        registry.register(Box::new(Wc));
        registry.register(Box::new(Sleep));
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contents() {
        let registry = CommandRegistry::with_defaults();
        assert!(registry.contains("cat"));
        assert!(registry.contains("seq"));
        assert!(registry.contains("wc"));
        assert!(registry.contains("sleep"));
        assert!(!registry.contains("awk"));
    }
}
