//! The executor.
//!
//! Walks the AST over one owned `ShellState`: statements with their
//! `&&`/`||`/`;` connectives and the errexit discipline, pipelines with
//! buffered sequential segments and `PIPESTATUS`, compound commands, the
//! simple-command algorithm (aliases, assignments, redirections, expansion,
//! dispatch), function calls with local-scope frames, subshell snapshots,
//! and command substitution re-entry.

use crate::ast::*;
use crate::builtins;
use crate::interp::flow::{ControlFlow, ExecOutcome, ExecResult, LimitKind, Output};
use crate::interp::host::HostBridge;
use crate::interp::redirect::RedirOutcome;
use crate::interp::state::{ExecutionLimits, ShellState, Value};
use crate::interp::vars;

const MAX_ALIAS_DEPTH: usize = 100;

/// Builtins whose `name=value` arguments keep assignment semantics (no word
/// splitting or globbing).
pub const DECLARATION_BUILTINS: &[&str] = &["declare", "typeset", "local", "export", "readonly"];

pub struct Executor<'a> {
    pub limits: &'a ExecutionLimits,
    pub host: &'a HostBridge,
}

impl<'a> Executor<'a> {
    pub fn new(limits: &'a ExecutionLimits, host: &'a HostBridge) -> Self {
        Self { limits, host }
    }

    // =================================================================
    // Script and statement level
    // =================================================================

    /// Run a script at a boundary (top level, subshell body, command
    /// substitution): fatal signals normalize here and expansion failures
    /// fail the statement without stopping the script.
    pub fn run_script(&self, st: &mut ShellState, script: &ScriptNode) -> ExecOutcome {
        let mut out = Output::default();
        let mut code = 0;

        for statement in &script.statements {
            match self.run_statement(st, statement) {
                Ok(result) => {
                    out.absorb(&result);
                    code = result.exit_code;
                    st.update_exit_code(code);
                }
                Err(sig @ ControlFlow::LimitExceeded { .. }) => return Err(sig),
                Err(sig @ (ControlFlow::Exit { .. } | ControlFlow::Return { .. })) => {
                    return Err(sig.prepend(&out.stdout, &out.stderr))
                }
                Err(ControlFlow::Errexit { code, out: o })
                | Err(ControlFlow::PosixFatal { code, out: o }) => {
                    out.stdout.push_str(&o.stdout);
                    out.stderr.push_str(&o.stderr);
                    st.update_exit_code(code);
                    return Ok(ExecResult::new(out.stdout, out.stderr, code));
                }
                Err(ControlFlow::Nounset { out: o, .. }) => {
                    // An unbound variable aborts the non-interactive shell.
                    out.stdout.push_str(&o.stdout);
                    out.stderr.push_str(&o.stderr);
                    st.update_exit_code(1);
                    return Ok(ExecResult::new(out.stdout, out.stderr, 1));
                }
                Err(
                    sig @ (ControlFlow::Break { .. }
                    | ControlFlow::Continue { .. }
                    | ControlFlow::SubshellExit { .. }),
                ) => {
                    let o = sig.out();
                    out.stdout.push_str(&o.stdout);
                    out.stderr.push_str(&o.stderr);
                    if st.parent_has_loop_context {
                        // A loop transfer inside a subshell spawned from a
                        // loop body exits the subshell cleanly.
                        st.update_exit_code(0);
                        return Ok(ExecResult::new(out.stdout, out.stderr, 0));
                    }
                }
                Err(sig) => {
                    // Expansion-time failures fail the statement; the
                    // script continues unless errexit is on.
                    let result = sig.into_result();
                    out.absorb(&result);
                    code = result.exit_code;
                    st.update_exit_code(code);
                    if st.options.errexit && !st.in_condition {
                        return Ok(ExecResult::new(out.stdout, out.stderr, code));
                    }
                }
            }
        }

        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    /// Run a statement list inside a compound body; every signal
    /// propagates to the enclosing construct.
    pub fn run_statements(&self, st: &mut ShellState, statements: &[StatementNode]) -> ExecOutcome {
        let mut out = Output::default();
        let mut code = 0;
        for statement in statements {
            match self.run_statement(st, statement) {
                Ok(result) => {
                    out.absorb(&result);
                    code = result.exit_code;
                    st.update_exit_code(code);
                }
                Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
            }
        }
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    /// Parse and run script text against the current state (`eval`,
    /// `source`). Parse errors come back as status 2.
    pub fn run_text(&self, st: &mut ShellState, text: &str) -> ExecOutcome {
        match crate::parser::parse(text) {
            Ok(script) => self.run_statements(st, &script.statements),
            Err(e) => Ok(ExecResult::failure_with_code(
                format!("bash: eval: line {}: syntax error: {}\n", e.line, e.message),
                2,
            )),
        }
    }

    fn run_statement(&self, st: &mut ShellState, stmt: &StatementNode) -> ExecOutcome {
        if let Some(err) = &stmt.deferred_error {
            return Ok(ExecResult::failure_with_code(
                format!("bash: syntax error near unexpected token `{}'\n", err.token),
                2,
            ));
        }
        if st.options.noexec {
            return Ok(ExecResult::ok());
        }

        let mut out = Output::default();
        if st.options.verbose {
            if let Some(source) = &stmt.source_text {
                out.stderr.push_str(source);
                out.stderr.push('\n');
            }
        }

        st.errexit_safe = false;
        let mut code = 0;

        for (i, pipeline) in stmt.pipelines.iter().enumerate() {
            if i > 0 {
                match stmt.connectives[i - 1] {
                    Connective::AndIf if code != 0 => continue,
                    Connective::OrIf if code == 0 => continue,
                    _ => {}
                }
            }

            let result = match self.run_pipeline(st, pipeline) {
                Ok(r) => r,
                Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
            };
            out.absorb(&result);
            code = result.exit_code;
            st.update_exit_code(code);

            // A pipeline followed by `&&` or `||` never triggers errexit.
            let guarded = matches!(
                stmt.connectives.get(i),
                Some(Connective::AndIf) | Some(Connective::OrIf)
            );
            if code != 0
                && st.options.errexit
                && !guarded
                && !pipeline.negated
                && !st.in_condition
                && !st.errexit_safe
            {
                return Err(ControlFlow::Errexit { code, out });
            }
        }

        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    // =================================================================
    // Pipelines
    // =================================================================

    fn run_pipeline(&self, st: &mut ShellState, pipeline: &PipelineNode) -> ExecOutcome {
        let started = std::time::Instant::now();

        let mut result = if pipeline.commands.len() == 1 {
            self.run_command(st, &pipeline.commands[0], "")?
        } else {
            self.run_multi_pipeline(st, pipeline)?
        };

        if pipeline.commands.len() == 1 {
            st.pipe_status = vec![result.exit_code];
        }

        if pipeline.negated {
            result.exit_code = if result.exit_code == 0 { 1 } else { 0 };
        }

        if pipeline.timed {
            let elapsed = started.elapsed().as_secs_f64();
            if pipeline.time_posix {
                result.stderr.push_str(&format!(
                    "real {:.2}\nuser {:.2}\nsys 0.00\n",
                    elapsed, elapsed
                ));
            } else {
                let minutes = (elapsed / 60.0) as u64;
                let seconds = elapsed - (minutes as f64) * 60.0;
                result.stderr.push_str(&format!(
                    "\nreal\t{}m{:.3}s\nuser\t{}m{:.3}s\nsys\t0m0.000s\n",
                    minutes, seconds, minutes, seconds
                ));
            }
        }

        Ok(result)
    }

    /// Segments run sequentially, each seeing the prior one's buffered
    /// stdout (plus stderr for `|&`). Loop and scope transfers are caught
    /// at segment boundaries, subshell-style.
    fn run_multi_pipeline(&self, st: &mut ShellState, pipeline: &PipelineNode) -> ExecOutcome {
        let mut stdin = String::new();
        let mut out = Output::default();
        let mut codes = Vec::with_capacity(pipeline.commands.len());
        let last = pipeline.commands.len() - 1;

        for (i, command) in pipeline.commands.iter().enumerate() {
            let segment = match self.run_command(st, command, &stdin) {
                Ok(r) => r,
                Err(sig @ ControlFlow::LimitExceeded { .. }) => return Err(sig),
                Err(sig) => sig.into_result(),
            };
            codes.push(segment.exit_code);
            if i == last {
                out.stdout.push_str(&segment.stdout);
                out.stderr.push_str(&segment.stderr);
            } else if pipeline.pipe_stderr.get(i).copied().unwrap_or(false) {
                stdin = format!("{}{}", segment.stdout, segment.stderr);
            } else {
                stdin = segment.stdout;
                out.stderr.push_str(&segment.stderr);
            }
        }

        st.pipe_status = codes.clone();
        let code = if st.options.pipefail {
            codes.iter().rev().find(|c| **c != 0).copied().unwrap_or(0)
        } else {
            *codes.last().unwrap_or(&0)
        };
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    // =================================================================
    // Commands
    // =================================================================

    pub fn run_command(&self, st: &mut ShellState, cmd: &CommandNode, stdin: &str) -> ExecOutcome {
        st.command_count += 1;
        if st.command_count > self.limits.max_command_count {
            return Err(ControlFlow::limit(
                LimitKind::Commands,
                format!(
                    "maximum command count ({}) exceeded (possible infinite loop)",
                    self.limits.max_command_count
                ),
            ));
        }

        match cmd {
            CommandNode::Simple(simple) => self.run_simple(st, simple, stdin),
            CommandNode::Compound(compound) => self.run_compound(st, compound, stdin),
            CommandNode::FunctionDef(def) => {
                let mut def = def.clone();
                def.source_file = st.current_source.clone();
                st.functions.insert(def.name.clone(), def);
                Ok(ExecResult::ok())
            }
        }
    }

    // -----------------------------------------------------------------
    // Compound commands
    // -----------------------------------------------------------------

    fn run_compound(
        &self,
        st: &mut ShellState,
        compound: &CompoundCommandNode,
        stdin: &str,
    ) -> ExecOutcome {
        let mut out = Output::default();
        let setup = match self.process_redirections(st, &mut out, compound.redirections())? {
            RedirOutcome::Ready(setup) => setup,
            RedirOutcome::Failed(fail) => {
                return Ok(ExecResult::new(
                    out.stdout + &fail.stdout,
                    out.stderr + &fail.stderr,
                    fail.exit_code,
                ))
            }
        };

        // Body stdin: an explicit redirection wins over the pipeline's.
        let saved_group_stdin = st.group_stdin.clone();
        if let Some(content) = &setup.stdin {
            st.group_stdin = Some(content.clone());
        } else if !stdin.is_empty() {
            st.group_stdin = Some(stdin.to_string());
        }

        let body_result = self.run_compound_body(st, compound);
        st.group_stdin = saved_group_stdin;

        let result = match body_result {
            Ok(r) => r,
            Err(sig) => {
                // Output produced before the transfer still obeys the
                // compound's redirections.
                let mut sig = sig;
                let o = sig.out_mut();
                let (stdout, stderr) = self.apply_routes(
                    st,
                    &setup,
                    std::mem::take(&mut o.stdout),
                    std::mem::take(&mut o.stderr),
                );
                o.stdout = stdout;
                o.stderr = stderr;
                return Err(sig.prepend(&out.stdout, &out.stderr));
            }
        };
        let (stdout, stderr) = self.apply_routes(st, &setup, result.stdout, result.stderr);
        Ok(ExecResult::new(
            out.stdout + &stdout,
            out.stderr + &stderr,
            result.exit_code,
        ))
    }

    fn run_compound_body(
        &self,
        st: &mut ShellState,
        compound: &CompoundCommandNode,
    ) -> ExecOutcome {
        match compound {
            CompoundCommandNode::If(node) => self.run_if(st, node),
            CompoundCommandNode::While(node) => {
                self.run_loop(st, &node.condition, &node.body, false)
            }
            CompoundCommandNode::Until(node) => {
                self.run_loop(st, &node.condition, &node.body, true)
            }
            CompoundCommandNode::For(node) => self.run_for(st, node),
            CompoundCommandNode::CStyleFor(node) => self.run_cstyle_for(st, node),
            CompoundCommandNode::Case(node) => self.run_case(st, node),
            CompoundCommandNode::Subshell(node) => self.run_subshell(st, &node.body),
            CompoundCommandNode::Group(node) => self.run_statements(st, &node.body),
            CompoundCommandNode::Arithmetic(node) => {
                let mut out = Output::default();
                match crate::interp::arith::eval_arith(self, st, &mut out, &node.expression) {
                    Ok(value) => Ok(ExecResult::new(
                        out.stdout,
                        out.stderr,
                        if value != 0 { 0 } else { 1 },
                    )),
                    Err(sig @ ControlFlow::LimitExceeded { .. }) => Err(sig),
                    Err(sig) => {
                        let failed = sig.into_result();
                        Ok(ExecResult::new(
                            out.stdout + &failed.stdout,
                            out.stderr + &failed.stderr,
                            1,
                        ))
                    }
                }
            }
            CompoundCommandNode::Conditional(node) => {
                let mut out = Output::default();
                let code = self.eval_conditional(st, &mut out, &node.expression)?;
                Ok(ExecResult::new(out.stdout, out.stderr, code))
            }
        }
    }

    fn run_condition(&self, st: &mut ShellState, condition: &[StatementNode]) -> ExecOutcome {
        let saved = st.in_condition;
        st.in_condition = true;
        let result = self.run_statements(st, condition);
        st.in_condition = saved;
        result
    }

    fn run_if(&self, st: &mut ShellState, node: &IfNode) -> ExecOutcome {
        let mut out = Output::default();
        for arm in &node.arms {
            let cond = match self.run_condition(st, &arm.condition) {
                Ok(r) => r,
                Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
            };
            out.absorb(&cond);
            st.update_exit_code(cond.exit_code);
            if cond.exit_code == 0 {
                let body = match self.run_statements(st, &arm.body) {
                    Ok(r) => r,
                    Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
                };
                out.absorb(&body);
                return Ok(ExecResult::new(out.stdout, out.stderr, body.exit_code));
            }
        }
        if let Some(body) = &node.else_body {
            let body = match self.run_statements(st, body) {
                Ok(r) => r,
                Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
            };
            out.absorb(&body);
            return Ok(ExecResult::new(out.stdout, out.stderr, body.exit_code));
        }
        Ok(ExecResult::new(out.stdout, out.stderr, 0))
    }

    /// Shared while/until loop driver.
    fn run_loop(
        &self,
        st: &mut ShellState,
        condition: &[StatementNode],
        body: &[StatementNode],
        until: bool,
    ) -> ExecOutcome {
        let mut out = Output::default();
        let mut code = 0;
        let mut iterations: u64 = 0;

        st.loop_depth += 1;
        let finish = |st: &mut ShellState| st.loop_depth -= 1;

        loop {
            iterations += 1;
            if iterations > self.limits.max_iterations {
                finish(st);
                return Err(ControlFlow::limit(
                    LimitKind::Iterations,
                    format!("maximum loop iterations ({}) exceeded", self.limits.max_iterations),
                ));
            }

            let cond = match self.run_condition(st, condition) {
                Ok(r) => r,
                Err(sig) => {
                    finish(st);
                    return Err(sig.prepend(&out.stdout, &out.stderr));
                }
            };
            out.absorb(&cond);
            let proceed = (cond.exit_code == 0) != until;
            if !proceed {
                break;
            }

            match self.run_statements(st, body) {
                Ok(r) => {
                    out.absorb(&r);
                    code = r.exit_code;
                }
                Err(sig) => match self.handle_loop_signal(st, sig, &mut out, &mut code) {
                    LoopSignal::Continue => continue,
                    LoopSignal::Break => break,
                    LoopSignal::Propagate(sig) => {
                        finish(st);
                        return Err(sig.prepend(&out.stdout, &out.stderr));
                    }
                },
            }
        }
        finish(st);
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    fn run_for(&self, st: &mut ShellState, node: &ForNode) -> ExecOutcome {
        let mut out = Output::default();
        let words = match &node.words {
            Some(words) => self.expand_words(st, &mut out, words)?,
            None => st.positional.clone(),
        };

        let mut code = 0;
        st.loop_depth += 1;
        let mut iterations: u64 = 0;

        for word in words {
            iterations += 1;
            if iterations > self.limits.max_iterations {
                st.loop_depth -= 1;
                return Err(ControlFlow::limit(
                    LimitKind::Iterations,
                    format!("maximum loop iterations ({}) exceeded", self.limits.max_iterations),
                ));
            }
            if let Err(name) = vars::set_scalar(st, &node.variable, &word, false) {
                st.loop_depth -= 1;
                out.stderr
                    .push_str(&format!("bash: {}: readonly variable\n", name));
                return Ok(ExecResult::new(out.stdout, out.stderr, 1));
            }
            match self.run_statements(st, &node.body) {
                Ok(r) => {
                    out.absorb(&r);
                    code = r.exit_code;
                }
                Err(sig) => match self.handle_loop_signal(st, sig, &mut out, &mut code) {
                    LoopSignal::Continue => continue,
                    LoopSignal::Break => break,
                    LoopSignal::Propagate(sig) => {
                        st.loop_depth -= 1;
                        return Err(sig.prepend(&out.stdout, &out.stderr));
                    }
                },
            }
        }
        st.loop_depth -= 1;
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    fn run_cstyle_for(&self, st: &mut ShellState, node: &CStyleForNode) -> ExecOutcome {
        let mut out = Output::default();
        let mut code = 0;
        let mut iterations: u64 = 0;

        if let Some(init) = &node.init {
            crate::interp::arith::eval_arith(self, st, &mut out, init)?;
        }

        st.loop_depth += 1;
        loop {
            iterations += 1;
            if iterations > self.limits.max_iterations {
                st.loop_depth -= 1;
                return Err(ControlFlow::limit(
                    LimitKind::Iterations,
                    format!("maximum loop iterations ({}) exceeded", self.limits.max_iterations),
                ));
            }

            if let Some(cond) = &node.condition {
                let value = match crate::interp::arith::eval_arith(self, st, &mut out, cond) {
                    Ok(v) => v,
                    Err(sig) => {
                        st.loop_depth -= 1;
                        return Err(sig.prepend(&out.stdout, &out.stderr));
                    }
                };
                if value == 0 {
                    break;
                }
            }

            match self.run_statements(st, &node.body) {
                Ok(r) => {
                    out.absorb(&r);
                    code = r.exit_code;
                }
                Err(sig) => match self.handle_loop_signal(st, sig, &mut out, &mut code) {
                    LoopSignal::Continue => {
                        if let Some(update) = &node.update {
                            crate::interp::arith::eval_arith(self, st, &mut out, update)?;
                        }
                        continue;
                    }
                    LoopSignal::Break => break,
                    LoopSignal::Propagate(sig) => {
                        st.loop_depth -= 1;
                        return Err(sig.prepend(&out.stdout, &out.stderr));
                    }
                },
            }

            if let Some(update) = &node.update {
                if let Err(sig) = crate::interp::arith::eval_arith(self, st, &mut out, update) {
                    st.loop_depth -= 1;
                    return Err(sig.prepend(&out.stdout, &out.stderr));
                }
            }
        }
        st.loop_depth -= 1;
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    fn handle_loop_signal(
        &self,
        st: &mut ShellState,
        sig: ControlFlow,
        out: &mut Output,
        code: &mut i32,
    ) -> LoopSignal {
        match sig {
            ControlFlow::Break { levels, out: o } => {
                out.stdout.push_str(&o.stdout);
                out.stderr.push_str(&o.stderr);
                *code = 0;
                if levels > 1 {
                    LoopSignal::Propagate(ControlFlow::Break {
                        levels: levels - 1,
                        out: Output::default(),
                    })
                } else {
                    LoopSignal::Break
                }
            }
            ControlFlow::Continue { levels, out: o } => {
                out.stdout.push_str(&o.stdout);
                out.stderr.push_str(&o.stderr);
                *code = 0;
                if levels > 1 {
                    LoopSignal::Propagate(ControlFlow::Continue {
                        levels: levels - 1,
                        out: Output::default(),
                    })
                } else {
                    LoopSignal::Continue
                }
            }
            other => {
                let _ = st;
                LoopSignal::Propagate(other)
            }
        }
    }

    fn run_case(&self, st: &mut ShellState, node: &CaseNode) -> ExecOutcome {
        let mut out = Output::default();
        let subject = self.expand_word_str(st, &mut out, &node.word)?;
        let opts = crate::expand::pattern::PatternOpts {
            extglob: st.shopts.extglob,
            case_insensitive: st.shopts.nocasematch,
        };

        let mut code = 0;
        let mut fall_through = false;
        let mut matched_any = false;

        for item in &node.items {
            let matched = if fall_through {
                true
            } else {
                let mut hit = false;
                for pattern_word in &item.patterns {
                    let pattern = self.expand_word_pattern(st, &mut out, pattern_word)?;
                    if crate::expand::pattern::matches_pattern(&subject, &pattern, opts) {
                        hit = true;
                        break;
                    }
                }
                hit
            };
            if !matched {
                continue;
            }
            matched_any = true;
            fall_through = false;

            let body = match self.run_statements(st, &item.body) {
                Ok(r) => r,
                Err(sig) => return Err(sig.prepend(&out.stdout, &out.stderr)),
            };
            out.absorb(&body);
            code = body.exit_code;

            match item.terminator {
                CaseTerminator::Break => break,
                CaseTerminator::FallThrough => fall_through = true,
                CaseTerminator::Continue => continue,
            }
        }

        let _ = matched_any;
        Ok(ExecResult::new(out.stdout, out.stderr, code))
    }

    fn run_subshell(&self, st: &mut ShellState, body: &[StatementNode]) -> ExecOutcome {
        let mut sub = st.clone();
        sub.parent_has_loop_context = st.loop_depth > 0 || st.parent_has_loop_context;
        sub.loop_depth = 0;
        sub.bash_pid = sub.alloc_virtual_pid();

        let script = ScriptNode {
            statements: body.to_vec(),
        };
        let outcome = self.run_script(&mut sub, &script);

        // Execution accounting crosses the snapshot boundary.
        st.command_count = sub.command_count;
        st.next_virtual_pid = sub.next_virtual_pid;

        match outcome {
            Ok(result) => Ok(result),
            Err(sig @ ControlFlow::LimitExceeded { .. }) => Err(sig),
            Err(sig) => Ok(sig.into_result()),
        }
    }

    // -----------------------------------------------------------------
    // Simple commands
    // -----------------------------------------------------------------

    fn run_simple(&self, st: &mut ShellState, cmd: &SimpleCommandNode, stdin: &str) -> ExecOutcome {
        if let Some(line) = cmd.line {
            st.current_line = line;
        }
        st.last_subst_exit = None;
        let mut out = Output::default();

        let (assignments, name_word, arg_words, redirections) = self.alias_expand(st, cmd);

        // Assignment-only statement: mutations persist, `$?` keeps a
        // command substitution's exit code, `$_` clears.
        let Some(name_word) = name_word else {
            let mut failed = false;
            for assignment in &assignments {
                if let Err(message) = self.perform_assignment(st, &mut out, assignment) {
                    out.stderr.push_str(&message);
                    failed = true;
                }
            }
            if !redirections.is_empty() {
                if let RedirOutcome::Failed(fail) =
                    self.process_redirections(st, &mut out, &redirections)?
                {
                    out.stderr.push_str(&fail.stderr);
                    failed = true;
                }
            }
            st.last_arg = String::new();
            let code = if failed {
                1
            } else {
                st.last_subst_exit.take().unwrap_or(0)
            };
            return Ok(ExecResult::new(out.stdout, out.stderr, code));
        };

        // Prefix assignments shadow until the command finishes.
        let has_prefix = !assignments.is_empty();
        if has_prefix {
            self.push_temp_frame(st, &assignments, &mut out)?;
        }

        let finishing = |st: &mut ShellState, exec: &Self, name: &str, persist_ok: bool| {
            if has_prefix {
                let persist = persist_ok
                    && st.options.posix
                    && builtins::is_special_builtin(name)
                    && !matches!(name, "unset" | "eval");
                exec.pop_temp_frame(st, persist);
            }
        };

        // Redirections: input first, then expansion, then dispatch.
        let setup = match self.process_redirections(st, &mut out, &redirections) {
            Ok(RedirOutcome::Ready(setup)) => setup,
            Ok(RedirOutcome::Failed(fail)) => {
                finishing(st, self, "", false);
                return Ok(ExecResult::new(
                    out.stdout + &fail.stdout,
                    out.stderr + &fail.stderr,
                    fail.exit_code,
                ));
            }
            Err(sig) => {
                finishing(st, self, "", false);
                return Err(sig.prepend(&out.stdout, &out.stderr));
            }
        };

        // Expand the command name; it may fan out or vanish entirely.
        let mut fields = match self.expand_words(st, &mut out, std::slice::from_ref(&name_word)) {
            Ok(f) => f,
            Err(sig) => {
                finishing(st, self, "", false);
                return Err(sig.prepend(&out.stdout, &out.stderr));
            }
        };

        let arg_expansion = |exec: &Self, st: &mut ShellState, out: &mut Output, declaration: bool| {
            if declaration {
                exec.expand_words_no_split(st, out, &arg_words)
            } else {
                exec.expand_words(st, out, &arg_words)
            }
        };

        if fields.is_empty() {
            // The name expanded to nothing; the first argument field (if
            // any) becomes the command.
            match arg_expansion(self, st, &mut out, false) {
                Ok(rest) => fields = rest,
                Err(sig) => {
                    finishing(st, self, "", false);
                    return Err(sig.prepend(&out.stdout, &out.stderr));
                }
            }
            if fields.is_empty() {
                finishing(st, self, "", false);
                let code = st.last_subst_exit.take().unwrap_or(0);
                return Ok(ExecResult::new(out.stdout, out.stderr, code));
            }
        } else {
            let name = fields[0].clone();
            let declaration = DECLARATION_BUILTINS.contains(&name.as_str());
            match arg_expansion(self, st, &mut out, declaration) {
                Ok(rest) => fields.extend(rest),
                Err(sig) => {
                    finishing(st, self, "", false);
                    return Err(sig.prepend(&out.stdout, &out.stderr));
                }
            }
        }

        let name = fields[0].clone();
        let args: Vec<String> = fields[1..].to_vec();

        if st.options.xtrace {
            let ps4 = vars::get_string(st, "PS4").unwrap_or_else(|| "+ ".to_string());
            out.stderr.push_str(&ps4);
            out.stderr.push_str(&fields.join(" "));
            out.stderr.push('\n');
        }

        let effective_stdin = setup
            .stdin
            .clone()
            .unwrap_or_else(|| stdin.to_string());

        let dispatched = self.dispatch_command(st, &name, &args, &effective_stdin, false);

        let result = match dispatched {
            Ok(r) => r,
            Err(sig) => {
                finishing(st, self, &name, true);
                let mut sig = sig;
                let o = sig.out_mut();
                let (stdout, stderr) = self.apply_routes(
                    st,
                    &setup,
                    std::mem::take(&mut o.stdout),
                    std::mem::take(&mut o.stderr),
                );
                o.stdout = stdout;
                o.stderr = stderr;
                return Err(sig.prepend(&out.stdout, &out.stderr));
            }
        };

        finishing(st, self, &name, true);
        st.last_arg = args.last().cloned().unwrap_or_else(|| name.clone());

        let (stdout, stderr) = self.apply_routes(st, &setup, result.stdout, result.stderr);
        Ok(ExecResult::new(
            out.stdout + &stdout,
            out.stderr + &stderr,
            result.exit_code,
        ))
    }

    /// Resolve and run a named command: special builtins, functions,
    /// builtins, then the external registry.
    pub fn dispatch_command(
        &self,
        st: &mut ShellState,
        name: &str,
        args: &[String],
        stdin: &str,
        skip_functions: bool,
    ) -> ExecOutcome {
        if builtins::is_special_builtin(name) {
            return builtins::run(self, st, name, args, stdin)
                .expect("special builtins are always registered");
        }
        if !skip_functions && st.functions.contains_key(name) {
            return self.call_function(st, name, args, stdin);
        }
        if let Some(result) = builtins::run(self, st, name, args, stdin) {
            return result;
        }
        self.run_external(st, name, args, stdin)
    }

    pub fn run_external(
        &self,
        st: &mut ShellState,
        name: &str,
        args: &[String],
        stdin: &str,
    ) -> ExecOutcome {
        let lookup = if name.contains('/') {
            let abs = self.host.resolve_path(&st.cwd, name);
            if !self.host.exists(&abs) {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: {}: No such file or directory\n", name),
                    127,
                ));
            }
            name.rsplit('/').next().unwrap_or(name).to_string()
        } else {
            name.to_string()
        };

        // External commands consume the group's pending stdin.
        let effective_stdin = if stdin.is_empty() {
            st.group_stdin.take().unwrap_or_default()
        } else {
            stdin.to_string()
        };

        let env = vars::exported_env(st);
        match self
            .host
            .run_command(&lookup, args, &effective_stdin, &st.cwd, env, self.limits)
        {
            Some(result) => Ok(ExecResult::new(
                result.stdout,
                result.stderr,
                result.exit_code,
            )),
            None => Ok(ExecResult::failure_with_code(
                format!("bash: {}: command not found\n", name),
                127,
            )),
        }
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    pub fn call_function(
        &self,
        st: &mut ShellState,
        name: &str,
        args: &[String],
        stdin: &str,
    ) -> ExecOutcome {
        if st.call_depth >= self.limits.max_recursion_depth {
            return Err(ControlFlow::limit(
                LimitKind::Recursion,
                format!(
                    "maximum function recursion depth ({}) exceeded",
                    self.limits.max_recursion_depth
                ),
            ));
        }
        let def = match st.functions.get(name) {
            Some(def) => def.clone(),
            None => {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: {}: command not found\n", name),
                    127,
                ))
            }
        };

        let saved_positional = std::mem::replace(&mut st.positional, args.to_vec());
        let saved_loop_depth = std::mem::replace(&mut st.loop_depth, 0);
        st.local_scopes.push(Default::default());
        st.func_name_stack.push(name.to_string());
        let source_name = def
            .source_file
            .clone()
            .unwrap_or_else(|| st.script_name.clone());
        st.source_stack.push(source_name);
        st.call_depth += 1;

        let mut out = Output::default();
        let body_result = match self.process_redirections(st, &mut out, &def.redirections) {
            Ok(RedirOutcome::Ready(setup)) => {
                let saved_group = st.group_stdin.clone();
                if let Some(content) = &setup.stdin {
                    st.group_stdin = Some(content.clone());
                } else if !stdin.is_empty() {
                    st.group_stdin = Some(stdin.to_string());
                }
                let r = self.run_compound_body(st, &def.body).map(|result| {
                    let (stdout, stderr) =
                        self.apply_routes(st, &setup, result.stdout, result.stderr);
                    ExecResult::new(stdout, stderr, result.exit_code)
                });
                st.group_stdin = saved_group;
                r
            }
            Ok(RedirOutcome::Failed(fail)) => Ok(fail),
            Err(sig) => Err(sig),
        };

        // The frame unwinds on every path, including returns and errors.
        st.call_depth -= 1;
        st.func_name_stack.pop();
        st.source_stack.pop();
        vars::pop_local_frame(st);
        st.loop_depth = saved_loop_depth;
        st.positional = saved_positional;

        match body_result {
            Ok(result) => Ok(ExecResult::new(
                out.stdout + &result.stdout,
                out.stderr + &result.stderr,
                result.exit_code,
            )),
            Err(ControlFlow::Return { code, out: o }) => Ok(ExecResult::new(
                out.stdout + &o.stdout,
                out.stderr + &o.stderr,
                code,
            )),
            Err(ControlFlow::Break { out: o, .. }) | Err(ControlFlow::Continue { out: o, .. }) => {
                Ok(ExecResult::new(
                    out.stdout + &o.stdout,
                    out.stderr + &o.stderr,
                    0,
                ))
            }
            Err(sig) => Err(sig.prepend(&out.stdout, &out.stderr)),
        }
    }

    // -----------------------------------------------------------------
    // Command substitution
    // -----------------------------------------------------------------

    /// Run `$(...)` against a snapshot: the exit code flows to `$?`, state
    /// changes and `set -e` termination stay inside, limits always escape.
    pub fn run_command_substitution(
        &self,
        st: &mut ShellState,
        script: &ScriptNode,
    ) -> Result<ExecResult, ControlFlow> {
        let mut sub = st.clone();
        sub.options.verbose = false;
        sub.bash_pid = sub.alloc_virtual_pid();

        let outcome = self.run_script(&mut sub, script);
        st.command_count = sub.command_count;
        st.next_virtual_pid = sub.next_virtual_pid;

        let result = match outcome {
            Ok(result) => result,
            Err(sig @ ControlFlow::LimitExceeded { .. }) => return Err(sig),
            Err(sig) => sig.into_result(),
        };
        st.last_exit_code = result.exit_code;
        st.last_subst_exit = Some(result.exit_code);
        Ok(result)
    }

    // -----------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------

    /// Perform one persistent assignment. Returns an error message for
    /// readonly violations.
    pub fn perform_assignment(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        assignment: &AssignmentNode,
    ) -> Result<(), String> {
        match self.assignment_inner(st, out, assignment) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(name)) => Err(format!("bash: {}: readonly variable\n", name)),
            Err(sig) => {
                // Expansion failures inside an assignment report and fail.
                let failed = sig.into_result();
                out.stdout.push_str(&failed.stdout);
                Err(failed.stderr)
            }
        }
    }

    fn assignment_inner(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        assignment: &AssignmentNode,
    ) -> Result<Result<(), String>, ControlFlow> {
        if let Some(items) = &assignment.array {
            return self.assign_array(st, out, &assignment.name, items, assignment.append);
        }

        let raw = match &assignment.value {
            Some(word) => self.expand_word_str(st, out, word)?,
            None => String::new(),
        };

        let (bare, _) = vars::split_subscript(&assignment.name);
        let integer = st.vars.get(&bare).map_or(false, |v| v.attrs.integer);
        let value = if integer {
            let expr = crate::parser::arith::parse_arith(&raw);
            match crate::interp::arith::eval_arith(self, st, out, &expr) {
                Ok(n) => n.to_string(),
                Err(sig) => {
                    out.stderr.push_str(&sig.out().stderr);
                    "0".to_string()
                }
            }
        } else {
            raw
        };

        // Integer append adds numerically; string append concatenates.
        if integer && assignment.append {
            let current = vars::get_string(st, &assignment.name)
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
            let addend: i64 = value.parse().unwrap_or(0);
            return Ok(vars::set_scalar(
                st,
                &assignment.name,
                &(current + addend).to_string(),
                false,
            ));
        }

        // Subscripted names evaluate their index here, after the RHS.
        let (name, sub) = vars::split_subscript(&assignment.name);
        if let Some(sub) = sub {
            let key = if vars::is_assoc(st, &name) {
                self.expand_subscript_key(st, out, &sub)?
            } else {
                self.eval_subscript(st, out, &sub)?.to_string()
            };
            return Ok(vars::set_element(
                st,
                &name,
                &key,
                &value,
                assignment.append,
            ));
        }
        Ok(vars::set_scalar(st, &assignment.name, &value, assignment.append))
    }

    /// Array initializer: expand every value first, then evaluate indices,
    /// then clear the old value, then assign. `a=(0 "${a[@]}" 1)` therefore
    /// observes the old elements.
    fn assign_array(
        &self,
        st: &mut ShellState,
        out: &mut Output,
        name: &str,
        items: &[WordNode],
        append: bool,
    ) -> Result<Result<(), String>, ControlFlow> {
        enum Item {
            Plain(Vec<String>),
            Keyed {
                key: String,
                value: String,
                append: bool,
            },
        }

        let assoc = vars::is_assoc(st, name);

        // Phase 1: right-hand sides.
        let mut staged = Vec::new();
        for word in items {
            let raw = crate::parser::parser::flatten_word(word);
            if let Some((key_text, rest)) = split_keyed_item(&raw) {
                let value_word = crate::parser::word::parse_word_text(&rest.text, true)
                    .unwrap_or_else(|_| WordNode::literal(&rest.text));
                let value = self.expand_word_str(st, out, &value_word)?;
                staged.push(Item::Keyed {
                    key: key_text,
                    value,
                    append: rest.append,
                });
            } else {
                let fields = self.expand_words(st, out, std::slice::from_ref(word))?;
                staged.push(Item::Plain(fields));
            }
        }

        // Phase 2: indices.
        let mut resolved: Vec<(Option<String>, Vec<(String, bool)>)> = Vec::new();
        for item in staged {
            match item {
                Item::Plain(fields) => {
                    resolved.push((None, fields.into_iter().map(|f| (f, false)).collect()));
                }
                Item::Keyed { key, value, append } => {
                    let evaluated = if assoc {
                        self.expand_subscript_key(st, out, &key)?
                    } else {
                        self.eval_subscript(st, out, &key)?.to_string()
                    };
                    resolved.push((Some(evaluated), vec![(value, append)]));
                }
            }
        }

        // Phase 3: clear, phase 4: assign.
        if !append {
            let empty = if assoc {
                Value::Assoc(Default::default())
            } else {
                Value::Indexed(Default::default())
            };
            if let Err(name) = vars::set_array(st, name, empty) {
                return Ok(Err(name));
            }
        }

        let mut next_index: i64 = if append {
            match vars::read_var(st, name) {
                Some(Value::Indexed(map)) => map.keys().next_back().copied().unwrap_or(-1) + 1,
                _ => 0,
            }
        } else {
            0
        };

        for (key, values) in resolved {
            match key {
                Some(key) => {
                    for (value, elem_append) in values {
                        if let Err(name) = vars::set_element(st, name, &key, &value, elem_append) {
                            return Ok(Err(name));
                        }
                    }
                    if !assoc {
                        if let Ok(idx) = key.parse::<i64>() {
                            next_index = idx + 1;
                        }
                    }
                }
                None => {
                    for (value, _) in values {
                        let key = if assoc {
                            // Associative arrays need explicit keys; bash
                            // treats a bare word as key "0"-style error.
                            out.stderr.push_str(&format!(
                                "bash: {}: {}: must use subscript when assigning associative array\n",
                                name, value
                            ));
                            continue;
                        } else {
                            next_index.to_string()
                        };
                        if let Err(name) = vars::set_element(st, name, &key, &value, false) {
                            return Ok(Err(name));
                        }
                        next_index += 1;
                    }
                }
            }
        }
        Ok(Ok(()))
    }

    fn push_temp_frame(
        &self,
        st: &mut ShellState,
        assignments: &[AssignmentNode],
        out: &mut Output,
    ) -> Result<(), ControlFlow> {
        let mut frame = Vec::new();
        let mut names = Vec::new();
        for assignment in assignments {
            let (bare, _) = vars::split_subscript(&assignment.name);
            frame.push((bare.clone(), st.vars.get(&bare).cloned()));
            names.push(bare);
        }
        st.temp_bindings.push(frame);
        st.temp_exported = names;

        for assignment in assignments {
            let (bare, _) = vars::split_subscript(&assignment.name);
            if vars::is_readonly(st, &bare) {
                // A prefix binding on a readonly variable warns; the value
                // stays unchanged and the command still runs.
                out.stderr
                    .push_str(&format!("bash: {}: readonly variable\n", bare));
                continue;
            }
            if let Err(message) = self.perform_assignment(st, out, assignment) {
                out.stderr.push_str(&message);
            }
        }
        Ok(())
    }

    fn pop_temp_frame(&self, st: &mut ShellState, persist: bool) {
        st.temp_exported.clear();
        if let Some(frame) = st.temp_bindings.pop() {
            if persist {
                return;
            }
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

    // -----------------------------------------------------------------
    // Alias expansion
    // -----------------------------------------------------------------

    /// Expand aliases on the command word, merging simple-command
    /// replacements into the command being built. A replacement ending in
    /// a space exposes the next word to alias expansion too.
    fn alias_expand(
        &self,
        st: &ShellState,
        cmd: &SimpleCommandNode,
    ) -> (
        Vec<AssignmentNode>,
        Option<WordNode>,
        Vec<WordNode>,
        Vec<RedirectionNode>,
    ) {
        let mut assignments = cmd.assignments.clone();
        let mut name = cmd.name.clone();
        let mut args = cmd.args.clone();
        let mut redirections = cmd.redirections.clone();

        if !st.shopts.expand_aliases {
            return (assignments, name, args, redirections);
        }

        let mut seen: Vec<String> = Vec::new();
        let mut expand_next = true;
        while expand_next {
            expand_next = false;
            let Some(word) = &name else { break };
            let Some(text) = word.as_literal() else { break };
            if seen.contains(&text) || seen.len() >= MAX_ALIAS_DEPTH {
                break;
            }
            let Some(replacement) = st.aliases.get(&text).cloned() else {
                break;
            };
            seen.push(text);

            let Ok(script) = crate::parser::parse(&replacement) else {
                break;
            };
            // Only a single simple command merges; anything more complex
            // leaves the alias unexpanded.
            let simple = match script.statements.as_slice() {
                [stmt] if stmt.pipelines.len() == 1 && stmt.pipelines[0].commands.len() == 1 => {
                    match &stmt.pipelines[0].commands[0] {
                        CommandNode::Simple(s) => s.clone(),
                        _ => break,
                    }
                }
                _ => break,
            };

            assignments.splice(0..0, simple.assignments);
            redirections.extend(simple.redirections);
            let mut new_args = simple.args;
            new_args.extend(std::mem::take(&mut args));
            match simple.name {
                Some(new_name) => {
                    name = Some(new_name);
                    args = new_args;
                }
                None => {
                    // Alias expanded to assignments only.
                    name = new_args.first().cloned();
                    args = new_args.into_iter().skip(1).collect();
                }
            }

            // The replacement's command word may itself be an alias; the
            // `seen` stack stops recursion.
            expand_next = true;
        }

        (assignments, name, args, redirections)
    }
}

enum LoopSignal {
    Continue,
    Break,
    Propagate(ControlFlow),
}

struct KeyedRest {
    text: String,
    append: bool,
}

/// Recognize `[key]=value` / `[key]+=value` array-initializer items.
fn split_keyed_item(raw: &str) -> Option<(String, KeyedRest)> {
    if !raw.starts_with('[') {
        return None;
    }
    let chars: Vec<char> = raw.chars().collect();
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let key: String = chars[1..i].iter().collect();
                    let rest: String = chars[i + 1..].iter().collect();
                    if let Some(value) = rest.strip_prefix("+=") {
                        return Some((
                            key,
                            KeyedRest {
                                text: value.to_string(),
                                append: true,
                            },
                        ));
                    }
                    if let Some(value) = rest.strip_prefix('=') {
                        return Some((
                            key,
                            KeyedRest {
                                text: value.to_string(),
                                append: false,
                            },
                        ));
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_item_recognition() {
        let (key, rest) = split_keyed_item("[2]=c").unwrap();
        assert_eq!(key, "2");
        assert_eq!(rest.text, "c");
        assert!(!rest.append);

        let (key, rest) = split_keyed_item("[x+1]+=v").unwrap();
        assert_eq!(key, "x+1");
        assert!(rest.append);

        assert!(split_keyed_item("plain").is_none());
    }
}
