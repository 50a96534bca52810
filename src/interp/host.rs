//! Sync bridge to the async host boundary.
//!
//! The evaluator core is synchronous; filesystem access, external commands,
//! and the sleep hook are async. This adapter crosses the boundary with
//! `tokio::task::block_in_place` + `Handle::block_on`, so the caller must be
//! on a multi-threaded runtime.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::commands::{CommandContext, CommandRegistry, CommandResult, ExecFn, FetchFn, SleepFn};
use crate::fs::{DirEntry, FileStat, FileSystem, FsError};
use crate::interp::state::ExecutionLimits;

pub struct HostBridge {
    pub fs: Arc<dyn FileSystem>,
    pub registry: Arc<CommandRegistry>,
    pub fetch: Option<FetchFn>,
    pub sleep: Option<SleepFn>,
    handle: tokio::runtime::Handle,
}

impl HostBridge {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        registry: Arc<CommandRegistry>,
        fetch: Option<FetchFn>,
        sleep: Option<SleepFn>,
        handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            fs,
            registry,
            fetch,
            sleep,
            handle,
        }
    }

    fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::task::block_in_place(|| self.handle.block_on(future))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.block_on(self.fs.exists(path))
    }

    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        self.block_on(self.fs.stat(path))
    }

    pub fn lstat(&self, path: &str) -> Result<FileStat, FsError> {
        self.block_on(self.fs.lstat(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_directory).unwrap_or(false)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_file).unwrap_or(false)
    }

    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.block_on(self.fs.read_file(path))
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        if path == "/dev/null" {
            return Ok(());
        }
        self.block_on(self.fs.write_file(path, content.as_bytes()))
    }

    pub fn append_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        if path == "/dev/null" {
            return Ok(());
        }
        self.block_on(self.fs.append_file(path, content.as_bytes()))
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.block_on(self.fs.read_dir(path))
    }

    pub fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        self.block_on(self.fs.mkdir(path, recursive))
    }

    pub fn resolve_path(&self, base: &str, target: &str) -> String {
        self.fs.resolve_path(base, target)
    }

    /// Run a registered external command to completion. The context carries
    /// the nested-exec hook so commands like xargs can re-enter the shell.
    pub fn run_command(
        &self,
        name: &str,
        args: &[String],
        stdin: &str,
        cwd: &str,
        env: HashMap<String, String>,
        limits: &ExecutionLimits,
    ) -> Option<CommandResult> {
        let command = self.registry.get(name)?;
        let ctx = CommandContext {
            stdin: stdin.to_string(),
            cwd: cwd.to_string(),
            env,
            fs: self.fs.clone(),
            exec: Some(self.nested_exec_fn(limits)),
            fetch: self.fetch.clone(),
            sleep: self.sleep.clone(),
        };
        Some(self.block_on(command.execute(args, ctx)))
    }

    /// Build the nested-execution hook handed to external commands: each
    /// invocation runs a fresh shell over the provided filesystem, cwd, and
    /// environment, sharing this bridge's registry, host hooks, runtime
    /// handle, and execution limits.
    pub fn nested_exec_fn(&self, limits: &ExecutionLimits) -> ExecFn {
        let registry = self.registry.clone();
        let fetch = self.fetch.clone();
        let sleep = self.sleep.clone();
        let handle = self.handle.clone();
        let limits = limits.clone();

        Arc::new(
            move |script: String,
                  stdin: String,
                  cwd: String,
                  env: HashMap<String, String>,
                  fs: Arc<dyn FileSystem>| {
                let registry = registry.clone();
                let fetch = fetch.clone();
                let sleep = sleep.clone();
                let handle = handle.clone();
                let limits = limits.clone();

                Box::pin(async move {
                    let host = HostBridge::new(fs, registry, fetch, sleep, handle);
                    let mut state = crate::interp::state::ShellState {
                        previous_dir: cwd.clone(),
                        cwd,
                        ..Default::default()
                    };
                    if !stdin.is_empty() {
                        state.group_stdin = Some(stdin);
                    }
                    for (name, value) in env {
                        let _ =
                            crate::interp::vars::set_scalar(&mut state, &name, &value, false);
                        if let Some(var) = state.vars.get_mut(&name) {
                            var.attrs.exported = true;
                        }
                    }

                    let ast = match crate::parser::parse(&script) {
                        Ok(ast) => ast,
                        Err(e) => {
                            return CommandResult::with_exit_code(
                                String::new(),
                                format!("bash: syntax error: {}\n", e),
                                2,
                            )
                        }
                    };
                    let executor = crate::interp::engine::Executor::new(&limits, &host);
                    let result = match executor.run_script(&mut state, &ast) {
                        Ok(result) => result,
                        Err(sig) => sig.into_result(),
                    };
                    CommandResult::with_exit_code(result.stdout, result.stderr, result.exit_code)
                }) as Pin<Box<dyn Future<Output = CommandResult> + Send>>
            },
        )
    }

    pub fn sleep_for(&self, seconds: f64) {
        if let Some(sleep) = &self.sleep {
            self.block_on(sleep(seconds));
        }
    }
}
