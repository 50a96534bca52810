//! Redirection processing.
//!
//! Redirections are processed left to right into a per-command route table
//! (fd → sink) plus an optional stdin override. Duplications snapshot the
//! current route at processing time, so `3>&1 1>&2 2>&3` swaps streams.
//! Output files are created (or truncated) during processing; captured
//! output is appended after the command runs. A failed redirection skips
//! the command with exit 1.

use std::collections::HashMap;

use crate::ast::{RedirOp, RedirTarget, RedirectionNode};
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, ExecResult, Output};
use crate::interp::state::{FdEntry, ShellState};
use crate::interp::vars;

/// Where a file descriptor's output goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    /// The caller's stdout stream.
    Stdout,
    /// The caller's stderr stream.
    Stderr,
    File { path: String, append: bool },
    Discard,
}

#[derive(Debug, Clone, Default)]
pub struct RedirSetup {
    pub stdin: Option<String>,
    pub routes: HashMap<i32, Sink>,
}

impl RedirSetup {
    /// The effective sink for a descriptor right now.
    fn route(&self, st: &ShellState, fd: i32) -> Sink {
        if let Some(sink) = self.routes.get(&fd) {
            return sink.clone();
        }
        match fd {
            1 => Sink::Stdout,
            2 => Sink::Stderr,
            _ => match st.fds.get(&fd) {
                Some(FdEntry::OutFile { path, append }) => Sink::File {
                    path: path.clone(),
                    append: *append,
                },
                Some(FdEntry::DupOut(n)) => self.route(st, *n),
                _ => Sink::Discard,
            },
        }
    }
}

/// Either a ready setup or the failure result that replaces the command.
pub enum RedirOutcome {
    Ready(RedirSetup),
    Failed(ExecResult),
}

impl Executor<'_> {
    /// Process a command's redirection list.
    pub fn process_redirections(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        redirections: &[RedirectionNode],
    ) -> Result<RedirOutcome, ControlFlow> {
        let mut setup = RedirSetup::default();

        for redir in redirections {
            let fd = match (&redir.fd_variable, redir.fd) {
                (Some(name), _) => {
                    let fd = st.alloc_fd();
                    if let Err(name) = vars::set_scalar(st, name, &fd.to_string(), false) {
                        return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                            "bash: {}: readonly variable\n",
                            name
                        ))));
                    }
                    fd
                }
                (None, Some(fd)) => fd,
                (None, None) => default_fd(redir.operator),
            };

            match redir.operator {
                RedirOp::In => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let path = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    let abs = self.host.resolve_path(&st.cwd, &path);
                    match self.host.read_file(&abs) {
                        Ok(content) => {
                            if fd == 0 {
                                setup.stdin = Some(content);
                            } else {
                                st.fds.insert(fd, FdEntry::Input(content));
                            }
                        }
                        Err(_) => {
                            return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                                "bash: {}: No such file or directory\n",
                                path
                            ))))
                        }
                    }
                }
                RedirOp::ReadWrite => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let path = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    let abs = self.host.resolve_path(&st.cwd, &path);
                    let content = self.host.read_file(&abs).unwrap_or_default();
                    if !self.host.exists(&abs) {
                        if let Err(e) = self.host.write_file(&abs, "") {
                            return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                                "bash: {}: {}\n",
                                path, e
                            ))));
                        }
                    }
                    if fd == 0 {
                        setup.stdin = Some(content);
                    } else {
                        st.fds.insert(fd, FdEntry::RwFile { path: abs, pos: 0 });
                    }
                }
                RedirOp::HereString => {
                    let word = match &redir.target {
                        RedirTarget::Word(w) => w,
                        RedirTarget::HereDoc(_) => unreachable!("<<< takes a word"),
                    };
                    let mut value = self.expand_word_str(st, out, word)?;
                    value.push('\n');
                    setup.stdin = Some(value);
                }
                RedirOp::HereDoc | RedirOp::HereDocTabs => {
                    let body = match &redir.target {
                        RedirTarget::HereDoc(h) => h,
                        RedirTarget::Word(_) => unreachable!("heredoc target"),
                    };
                    let content = if body.quoted {
                        crate::parser::parser::flatten_word(&body.content)
                    } else {
                        self.expand_word_str(st, out, &body.content)?
                    };
                    if fd == 0 {
                        setup.stdin = Some(content);
                    } else {
                        st.fds.insert(fd, FdEntry::Input(content));
                    }
                }
                RedirOp::DupIn => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let spec = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    if spec == "-" {
                        setup.stdin = Some(String::new());
                        continue;
                    }
                    let (num, close) = parse_dup_spec(&spec);
                    match num {
                        Some(n) => {
                            let content = match st.fds.get(&n) {
                                Some(FdEntry::Input(content)) => content.clone(),
                                Some(FdEntry::RwFile { path, .. }) => {
                                    self.host.read_file(path).unwrap_or_default()
                                }
                                _ => String::new(),
                            };
                            if fd == 0 {
                                setup.stdin = Some(content);
                            } else {
                                st.fds.insert(fd, FdEntry::Input(content));
                            }
                            if close {
                                st.fds.remove(&n);
                            }
                        }
                        None => {
                            return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                                "bash: {}: ambiguous redirect\n",
                                spec
                            ))))
                        }
                    }
                }
                RedirOp::Out | RedirOp::Append | RedirOp::Clobber => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let path = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    let abs = self.host.resolve_path(&st.cwd, &path);
                    let append = redir.operator == RedirOp::Append;
                    if redir.operator == RedirOp::Out
                        && st.options.noclobber
                        && self.host.is_file(&abs)
                    {
                        return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                            "bash: {}: cannot overwrite existing file\n",
                            path
                        ))));
                    }
                    if let Err(e) = self.prepare_out_file(&abs, append) {
                        return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                            "bash: {}: {}\n",
                            path, e
                        ))));
                    }
                    if redir.fd_variable.is_some() {
                        st.fds.insert(fd, FdEntry::OutFile { path: abs, append: true });
                    } else {
                        setup
                            .routes
                            .insert(fd, Sink::File { path: abs, append: true });
                    }
                }
                RedirOp::DupOut => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let spec = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    if spec == "-" {
                        setup.routes.insert(fd, Sink::Discard);
                        continue;
                    }
                    let (num, close) = parse_dup_spec(&spec);
                    match num {
                        Some(n) => {
                            let sink = setup.route(st, n);
                            setup.routes.insert(fd, sink);
                            if close {
                                setup.routes.insert(n, Sink::Discard);
                                st.fds.remove(&n);
                            }
                        }
                        None => {
                            // `>&word` with a non-numeric word is `&>word`.
                            let abs = self.host.resolve_path(&st.cwd, &spec);
                            if let Err(e) = self.prepare_out_file(&abs, false) {
                                return Ok(RedirOutcome::Failed(ExecResult::failure(
                                    format!("bash: {}: {}\n", spec, e),
                                )));
                            }
                            let sink = Sink::File { path: abs, append: true };
                            setup.routes.insert(1, sink.clone());
                            setup.routes.insert(2, sink);
                        }
                    }
                }
                RedirOp::OutErr | RedirOp::AppendErr => {
                    let target = self.redir_target_path(st, out, redir)?;
                    let path = match target {
                        Ok(p) => p,
                        Err(fail) => return Ok(RedirOutcome::Failed(fail)),
                    };
                    let abs = self.host.resolve_path(&st.cwd, &path);
                    let append = redir.operator == RedirOp::AppendErr;
                    if let Err(e) = self.prepare_out_file(&abs, append) {
                        return Ok(RedirOutcome::Failed(ExecResult::failure(format!(
                            "bash: {}: {}\n",
                            path, e
                        ))));
                    }
                    let sink = Sink::File { path: abs, append: true };
                    setup.routes.insert(1, sink.clone());
                    setup.routes.insert(2, sink);
                }
            }
        }

        Ok(RedirOutcome::Ready(setup))
    }

    /// Truncate (or create) the target before the command runs, so `> f`
    /// with no output still leaves an empty file.
    fn prepare_out_file(&self, abs: &str, append: bool) -> Result<(), String> {
        if append {
            if !self.host.exists(abs) {
                self.host.write_file(abs, "").map_err(|e| e.to_string())?;
            }
            Ok(())
        } else {
            self.host.write_file(abs, "").map_err(|e| e.to_string())
        }
    }

    /// Expand a redirection target to a single word; multiple fields make
    /// the redirect ambiguous.
    fn redir_target_path(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        redir: &RedirectionNode,
    ) -> Result<Result<String, ExecResult>, ControlFlow> {
        let word = match &redir.target {
            RedirTarget::Word(w) => w,
            RedirTarget::HereDoc(_) => unreachable!("heredocs handled by caller"),
        };
        let raw = crate::parser::parser::flatten_word(word);
        let fields = self.expand_words(st, out, std::slice::from_ref(word))?;
        match fields.len() {
            1 => Ok(Ok(fields.into_iter().next().unwrap())),
            _ => Ok(Err(ExecResult::failure(format!(
                "bash: {}: ambiguous redirect\n",
                raw
            )))),
        }
    }

    /// Route captured stdout/stderr through the table, writing file sinks
    /// and returning what reaches the caller's streams.
    pub fn apply_routes(
        &self,
        st: &mut ShellState,
        setup: &RedirSetup,
        stdout: String,
        stderr: String,
    ) -> (String, String) {
        let mut to_stdout = String::new();
        let mut to_stderr = String::new();

        for (text, fd) in [(stdout, 1), (stderr, 2)] {
            match setup.route(st, fd) {
                Sink::Stdout => to_stdout.push_str(&text),
                Sink::Stderr => to_stderr.push_str(&text),
                Sink::Discard => {}
                Sink::File { path, append } => {
                    let result = if append {
                        self.host.append_file(&path, &text)
                    } else {
                        self.host.write_file(&path, &text)
                    };
                    if let Err(e) = result {
                        to_stderr.push_str(&format!("bash: {}: {}\n", path, e));
                    }
                }
            }
        }
        (to_stdout, to_stderr)
    }

    /// `exec` with redirections only: make them permanent on the FD table.
    pub fn persist_redirections(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        redirections: &[RedirectionNode],
    ) -> Result<Option<ExecResult>, ControlFlow> {
        match self.process_redirections(st, out, redirections)? {
            RedirOutcome::Failed(result) => Ok(Some(result)),
            RedirOutcome::Ready(setup) => {
                if let Some(content) = setup.stdin {
                    st.group_stdin = Some(content);
                }
                for (fd, sink) in setup.routes {
                    match sink {
                        Sink::File { path, append } => {
                            st.fds.insert(fd, FdEntry::OutFile { path, append });
                        }
                        Sink::Stdout => {
                            st.fds.insert(fd, FdEntry::DupOut(1));
                        }
                        Sink::Stderr => {
                            st.fds.insert(fd, FdEntry::DupOut(2));
                        }
                        Sink::Discard => {
                            st.fds.remove(&fd);
                        }
                    }
                }
                Ok(None)
            }
        }
    }
}

fn default_fd(op: RedirOp) -> i32 {
    match op {
        RedirOp::In
        | RedirOp::ReadWrite
        | RedirOp::DupIn
        | RedirOp::HereString
        | RedirOp::HereDoc
        | RedirOp::HereDocTabs => 0,
        _ => 1,
    }
}

/// `N` or `N-` (move: duplicate then close).
fn parse_dup_spec(spec: &str) -> (Option<i32>, bool) {
    let (digits, close) = match spec.strip_suffix('-') {
        Some(d) => (d, true),
        None => (spec, false),
    };
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        (digits.parse().ok(), close)
    } else {
        (None, close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dup_spec_forms() {
        assert_eq!(parse_dup_spec("2"), (Some(2), false));
        assert_eq!(parse_dup_spec("3-"), (Some(3), true));
        assert_eq!(parse_dup_spec("out.txt"), (None, false));
    }

    #[test]
    fn route_defaults() {
        let st = ShellState::default();
        let setup = RedirSetup::default();
        assert_eq!(setup.route(&st, 1), Sink::Stdout);
        assert_eq!(setup.route(&st, 2), Sink::Stderr);
        assert_eq!(setup.route(&st, 7), Sink::Discard);
    }

    #[test]
    fn route_snapshot_swap() {
        let st = ShellState::default();
        let mut setup = RedirSetup::default();
        // 3>&1 1>&2 2>&3
        let r3 = setup.route(&st, 1);
        setup.routes.insert(3, r3);
        let r1 = setup.route(&st, 2);
        setup.routes.insert(1, r1);
        let r2 = setup.route(&st, 3);
        setup.routes.insert(2, r2);
        assert_eq!(setup.route(&st, 1), Sink::Stderr);
        assert_eq!(setup.route(&st, 2), Sink::Stdout);
    }
}
