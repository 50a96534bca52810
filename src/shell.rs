//! Shell environment entry point.
//!
//! Ties the parser, executor, filesystem, and command registry together:
//! `Shell::new` builds the default sandbox (environment variables,
//! filesystem layout, limits) and `exec` parses and runs a script against
//! the persistent state. The evaluator core is synchronous; `exec` enters
//! it through `block_in_place`, so callers need a multi-threaded runtime.

use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::{CommandRegistry, FetchFn, SleepFn};
use crate::fs::{FileSystem, MemFs};
use crate::interp::engine::Executor;
use crate::interp::flow::{ControlFlow, ExecResult};
use crate::interp::host::HostBridge;
use crate::interp::state::{ExecutionLimits, ShellState};
use crate::interp::vars;

/// Construction options for a [`Shell`].
#[derive(Default)]
pub struct ShellConfig {
    /// Extra environment variables (exported).
    pub env: Option<HashMap<String, String>>,
    /// Working directory; defaults to `/home/user` with a standard layout.
    pub cwd: Option<String>,
    /// Filesystem; defaults to a fresh in-memory one.
    pub fs: Option<Arc<dyn FileSystem>>,
    /// External commands; defaults to the bundled sample registry.
    pub commands: Option<CommandRegistry>,
    pub limits: Option<ExecutionLimits>,
    pub fetch: Option<FetchFn>,
    pub sleep: Option<SleepFn>,
}

pub struct Shell {
    pub fs: Arc<dyn FileSystem>,
    registry: Arc<CommandRegistry>,
    limits: ExecutionLimits,
    fetch: Option<FetchFn>,
    sleep: Option<SleepFn>,
    state: ShellState,
}

impl Shell {
    pub async fn new(config: ShellConfig) -> Self {
        let default_layout = config.cwd.is_none();
        let cwd = config.cwd.unwrap_or_else(|| "/home/user".to_string());
        let fs: Arc<dyn FileSystem> = config
            .fs
            .unwrap_or_else(|| Arc::new(MemFs::new()));
        let registry = Arc::new(config.commands.unwrap_or_default());
        let limits = config.limits.unwrap_or_default();

        let mut state = ShellState {
            cwd: cwd.clone(),
            previous_dir: cwd.clone(),
            ..Default::default()
        };

        let home = if default_layout { "/home/user" } else { "/" };
        let defaults = [
            ("HOME", home),
            ("PATH", "/bin:/usr/bin"),
            ("IFS", " \t\n"),
            ("PWD", cwd.as_str()),
            ("OLDPWD", cwd.as_str()),
            ("OPTIND", "1"),
            ("OSTYPE", "linux-gnu"),
            ("HOSTNAME", "localhost"),
            ("HOSTTYPE", "x86_64"),
            ("MACHTYPE", "x86_64-pc-linux-gnu"),
        ];
        for (name, value) in defaults {
            let _ = vars::set_scalar(&mut state, name, value, false);
        }
        for name in ["HOME", "PATH", "PWD", "OLDPWD"] {
            if let Some(var) = state.vars.get_mut(name) {
                var.attrs.exported = true;
            }
        }
        if let Some(user_env) = config.env {
            for (name, value) in user_env {
                let _ = vars::set_scalar(&mut state, &name, &value, false);
                if let Some(var) = state.vars.get_mut(&name) {
                    var.attrs.exported = true;
                }
            }
        }

        init_filesystem(&*fs, default_layout).await;
        let _ = fs.mkdir(&cwd, true).await;

        Self {
            fs,
            registry,
            limits,
            fetch: config.fetch,
            sleep: config.sleep,
            state,
        }
    }

    /// Execute a script and return its buffered result. State (variables,
    /// cwd, functions, options) persists across calls.
    pub async fn exec(&mut self, script: &str) -> ExecResult {
        self.exec_with(script, false).await
    }

    /// Execute without normalizing leading indentation.
    pub async fn exec_raw(&mut self, script: &str) -> ExecResult {
        self.exec_with(script, true).await
    }

    async fn exec_with(&mut self, script: &str, raw: bool) -> ExecResult {
        if script.trim().is_empty() {
            return ExecResult::ok();
        }
        let source = if raw {
            script.to_string()
        } else {
            normalize_script(script)
        };

        let ast = match crate::parser::parse(&source) {
            Ok(ast) => ast,
            Err(e) => {
                return ExecResult::failure_with_code(
                    format!("bash: syntax error: {}\n", e),
                    2,
                )
            }
        };

        self.state.command_count = 0;
        let handle = tokio::runtime::Handle::current();
        let host = HostBridge::new(
            self.fs.clone(),
            self.registry.clone(),
            self.fetch.clone(),
            self.sleep.clone(),
            handle,
        );
        let limits = self.limits.clone();
        let state = &mut self.state;

        let mut result = tokio::task::block_in_place(|| {
            let executor = Executor::new(&limits, &host);
            match executor.run_script(state, &ast) {
                Ok(result) => result,
                Err(ControlFlow::LimitExceeded { out, .. }) => {
                    ExecResult::new(out.stdout, out.stderr, 126)
                }
                Err(sig) => sig.into_result(),
            }
        });
        self.state.update_exit_code(result.exit_code);
        result.env = Some(vars::env_snapshot(&self.state));
        result
    }

    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub async fn read_file(&self, path: &str) -> Result<String, crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.read_file(&resolved).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.write_file(&resolved, content.as_bytes()).await
    }
}

/// Standard sandbox layout.
async fn init_filesystem(fs: &dyn FileSystem, default_layout: bool) {
    let _ = fs.mkdir("/bin", true).await;
    let _ = fs.mkdir("/usr/bin", true).await;
    let _ = fs.mkdir("/dev", true).await;
    let _ = fs.write_file("/dev/null", b"").await;
    if default_layout {
        let _ = fs.mkdir("/home/user", true).await;
        let _ = fs.mkdir("/tmp", true).await;
        let _ = fs.mkdir("/root", true).await;
    }
}

/// Strip leading indentation from embedded scripts while preserving heredoc
/// bodies verbatim.
fn normalize_script(script: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut pending: Vec<(String, bool)> = Vec::new();

    for line in script.split('\n') {
        if let Some((delimiter, strip_tabs)) = pending.last() {
            let candidate = if *strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            if candidate == delimiter {
                result.push(line.trim_start());
                pending.pop();
            } else {
                result.push(line);
            }
            continue;
        }

        let trimmed = line.trim_start();
        result.push(trimmed);

        // Register heredoc openers on this line.
        let chars: Vec<char> = trimmed.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '<' && chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<')
            {
                i += 2;
                let strip_tabs = chars.get(i) == Some(&'-');
                if strip_tabs {
                    i += 1;
                }
                while matches!(chars.get(i), Some(' ' | '\t')) {
                    i += 1;
                }
                let quote = match chars.get(i) {
                    Some(&q @ ('\'' | '"')) => {
                        i += 1;
                        Some(q)
                    }
                    _ => None,
                };
                let mut delimiter = String::new();
                while let Some(&c) = chars.get(i) {
                    match quote {
                        Some(q) if c == q => break,
                        None if !(c.is_alphanumeric() || c == '_' || c == '-') => break,
                        _ => {
                            delimiter.push(c);
                            i += 1;
                        }
                    }
                }
                if !delimiter.is_empty() {
                    pending.push((delimiter, strip_tabs));
                }
            }
            i += 1;
        }
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn shell() -> Shell {
        Shell::new(ShellConfig::default()).await
    }

    async fn run(script: &str) -> ExecResult {
        shell().await.exec(script).await
    }

    #[test]
    fn normalize_strips_indentation_outside_heredocs() {
        assert_eq!(normalize_script("  echo a\n  echo b"), "echo a\necho b");
        assert_eq!(
            normalize_script("  cat <<EOF\n  body\nEOF"),
            "cat <<EOF\n  body\nEOF"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn defaults() {
        let mut sh = shell().await;
        assert_eq!(sh.cwd(), "/home/user");
        let result = sh.exec("echo $HOME:$PATH").await;
        assert_eq!(result.stdout, "/home/user:/bin:/usr/bin\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn syntax_error_is_status_2() {
        let result = run("if then").await;
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("syntax error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_persists_across_exec() {
        let mut sh = shell().await;
        sh.exec("x=42; cd /tmp").await;
        let result = sh.exec("echo $x $PWD").await;
        assert_eq!(result.stdout, "42 /tmp\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ifs_splitting_of_quoted_at() {
        // set -- a 'b c' d; for x in "$@" keeps fields intact.
        let result = run("set -- a 'b c' d; for x in \"$@\"; do echo \"[$x]\"; done").await;
        assert_eq!(result.stdout, "[a]\n[b c]\n[d]\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn parameter_expansion_with_patterns() {
        let result = run(
            "v=/path/to/file.tar.gz; echo \"${v##*/}\"; echo \"${v%.*}\"; echo \"${v//\\//_}\"",
        )
        .await;
        assert_eq!(
            result.stdout,
            "file.tar.gz\n/path/to/file.tar\n_path_to_file.tar.gz\n"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn brace_range_with_zero_padding() {
        let result = run("for i in {01..05..2}; do printf '%s ' \"$i\"; done; echo").await;
        assert_eq!(result.stdout, "01 03 05 \n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipefail_takes_rightmost_failure() {
        let result =
            run("set -o pipefail; ( exit 3 ) | ( exit 0 ) | ( exit 5 ) | ( exit 0 ); echo $?")
                .await;
        assert_eq!(result.stdout, "5\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errexit_condition_exemption() {
        let result =
            run("set -e; f() { return 7; }; if f; then echo yes; else echo \"no=$?\"; fi; echo after=$?")
                .await;
        assert_eq!(result.stdout, "no=7\nafter=0\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn command_substitution_trims_trailing_newlines() {
        let result = run("a=$(printf 'x\\ny\\n\\n'); printf '[%s]\\n' \"$a\"").await;
        assert_eq!(result.stdout, "[x\ny]\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn short_circuit_errexit_exemption() {
        let result = run("set -e; false && true; echo ok").await;
        assert_eq!(result.stdout, "ok\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subshell_exit_code_is_isolated() {
        let result = run("( exit 42 ); echo $?").await;
        assert_eq!(result.stdout, "42\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn array_scalar_interplay() {
        let result = run("a=(1 2 3); echo $a; a=9; echo ${a[0]} ${a[2]}").await;
        assert_eq!(result.stdout, "1\n9 3\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn locals_restore_on_return() {
        let script = r#"
            x=outer
            f() { local x=inner; g; echo "in f: $x"; return 42; }
            g() { echo "in g: $x"; }
            f
            echo "rc=$? x=$x"
        "#;
        let result = run(script).await;
        assert_eq!(result.stdout, "in g: inner\nin f: inner\nrc=42 x=outer\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn loops_and_break_continue() {
        let result =
            run("for i in 1 2 3 4; do if [ $i = 2 ]; then continue; fi; if [ $i = 4 ]; then break; fi; echo $i; done")
                .await;
        assert_eq!(result.stdout, "1\n3\n");

        let result = run("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done").await;
        assert_eq!(result.stdout, "0\n1\n2\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_loop_break_levels() {
        let result =
            run("for i in 1 2; do for j in a b; do echo $i$j; break 2; done; done; echo end").await;
        assert_eq!(result.stdout, "1a\nend\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn case_fallthrough_and_continue() {
        let result = run("case x in x) echo one;& y) echo two;; z) echo three;; esac").await;
        assert_eq!(result.stdout, "one\ntwo\n");
        let result = run("case ab in a*) echo first;;& *b) echo second;; esac").await;
        assert_eq!(result.stdout, "first\nsecond\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heredocs_expand_unless_quoted() {
        let result = run("x=val\ncat <<EOF\ngot $x\nEOF").await;
        assert_eq!(result.stdout, "got val\n");
        let result = run("x=val\ncat <<'EOF'\ngot $x\nEOF").await;
        assert_eq!(result.stdout, "got $x\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn redirections_to_files() {
        let mut sh = shell().await;
        let result = sh.exec("echo hello > out.txt; cat out.txt").await;
        assert_eq!(result.stdout, "hello\n");
        sh.exec("echo more >> out.txt").await;
        let content = sh.read_file("out.txt").await.unwrap();
        assert_eq!(content, "hello\nmore\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stderr_redirection_and_merge() {
        let mut sh = shell().await;
        let result = sh.exec("missing_command 2>/dev/null; echo $?").await;
        assert_eq!(result.stdout, "127\n");
        assert_eq!(result.stderr, "");

        let result = sh.exec("missing_command 2>&1 | wc -l").await;
        assert_eq!(result.stdout, "1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn globbing_against_fs() {
        let mut sh = shell().await;
        sh.exec("touch() { for f in \"$@\"; do echo -n > \"$f\"; done; }; touch a.txt b.txt c.md")
            .await;
        let result = sh.exec("echo *.txt").await;
        assert_eq!(result.stdout, "a.txt b.txt\n");
        let result = sh.exec("echo *.rs").await;
        assert_eq!(result.stdout, "*.rs\n");
        let result = sh.exec("shopt -s nullglob; echo x *.rs y").await;
        assert_eq!(result.stdout, "x y\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipeline_into_external_commands() {
        let result = run("seq 1 5 | wc -l").await;
        assert_eq!(result.stdout, "5\n");
        let result = run("echo hi | cat | cat").await;
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn while_read_consumes_input() {
        let mut sh = shell().await;
        sh.exec("printf 'a\\nb\\nc\\n' > lines.txt").await;
        let result = sh
            .exec("while read line; do echo \"<$line>\"; done < lines.txt")
            .await;
        assert_eq!(result.stdout, "<a>\n<b>\n<c>\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn arithmetic_forms() {
        let result = run("echo $((2 ** 10)) $((7 / 2)) $((7 % 3))").await;
        assert_eq!(result.stdout, "1024 3 1\n");
        let result = run("x=5; (( x += 3 )); echo $x").await;
        assert_eq!(result.stdout, "8\n");
        let result = run("for ((i=0; i<3; i++)); do echo $i; done").await;
        assert_eq!(result.stdout, "0\n1\n2\n");
        let result = run("if (( 0 )); then echo t; else echo f; fi").await;
        assert_eq!(result.stdout, "f\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conditional_command() {
        let result = run("[[ abc == a* ]] && echo match").await;
        assert_eq!(result.stdout, "match\n");
        let result = run("[[ abc == \"a*\" ]] || echo literal").await;
        assert_eq!(result.stdout, "literal\n");
        let result = run("x=2026-08; [[ $x =~ ^([0-9]+)-([0-9]+)$ ]] && echo \"${BASH_REMATCH[1]}\"").await;
        assert_eq!(result.stdout, "2026\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nounset_reports_unbound() {
        let result = run("set -u; echo $missing; echo after").await;
        assert!(result.stderr.contains("missing: unbound variable"));
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exit_terminates_script() {
        let result = run("echo before; exit 3; echo after").await;
        assert_eq!(result.stdout, "before\n");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn command_count_limit_propagates() {
        let mut sh = Shell::new(ShellConfig {
            limits: Some(ExecutionLimits {
                max_command_count: 10,
                ..Default::default()
            }),
            ..Default::default()
        })
        .await;
        let result = sh.exec("while true; do :; done").await;
        assert_eq!(result.exit_code, 126);
        assert!(result.stderr.contains("command count"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn env_snapshot_attached() {
        let result = run("x=1; echo hi").await;
        let env = result.env.unwrap();
        assert_eq!(env.get("x").map(|s| s.as_str()), Some("1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipestatus_array() {
        let result = run("( exit 1 ) | ( exit 2 ) | ( exit 0 ); echo \"${PIPESTATUS[@]}\"").await;
        assert_eq!(result.stdout, "1 2 0\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn assignment_only_preserves_subst_status() {
        let result = run("x=$( exit 9 ); echo $?").await;
        assert_eq!(result.stdout, "9\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ifs_custom_separator() {
        let result = run("IFS=:; v=\"a:b:c\"; for x in $v; do echo \"<$x>\"; done").await;
        assert_eq!(result.stdout, "<a>\n<b>\n<c>\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn star_joins_with_first_ifs_char() {
        let result = run("IFS=:; set -- a b c; echo \"$*\"").await;
        assert_eq!(result.stdout, "a:b:c\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tilde_expansion() {
        let result = run("echo ~ ~root ~nobody").await;
        assert_eq!(result.stdout, "/home/user /root ~nobody\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn alias_expansion() {
        let result = run("shopt -s expand_aliases; alias ll='echo listing'; ll now").await;
        assert_eq!(result.stdout, "listing now\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn getopts_loop() {
        let script = r#"
            parse() {
                local opt
                while getopts "ab:" opt; do
                    case $opt in
                        a) echo "flag a";;
                        b) echo "b=$OPTARG";;
                    esac
                done
            }
            parse -a -b value
        "#;
        let result = run(script).await;
        assert_eq!(result.stdout, "flag a\nb=value\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn external_commands_can_reenter_the_shell() {
        use crate::commands::{Command, CommandContext, CommandResult};

        // A command that runs its first argument as a script through the
        // nested-exec hook, the way xargs-style commands do.
        struct Runscript;

        #[async_trait::async_trait]
        impl Command for Runscript {
            fn name(&self) -> &'static str {
                "runscript"
            }

            async fn execute(&self, args: &[String], ctx: CommandContext) -> CommandResult {
                let exec = ctx.exec.expect("nested-exec hook is provided");
                let script = args.first().cloned().unwrap_or_default();
                exec(script, ctx.stdin.clone(), ctx.cwd.clone(), ctx.env.clone(), ctx.fs.clone())
                    .await
            }
        }

        let mut registry = CommandRegistry::with_defaults();
        registry.register(Box::new(Runscript));
        let mut sh = Shell::new(ShellConfig {
            commands: Some(registry),
            ..Default::default()
        })
        .await;

        let result = sh.exec("runscript 'echo nested-$((1+1))'").await;
        assert_eq!(result.stdout, "nested-2\n");
        assert_eq!(result.exit_code, 0);

        // The nested shell sees the caller's exported environment and cwd.
        let result = sh
            .exec("export GREETING=hi; cd /tmp; runscript 'echo $GREETING $PWD'")
            .await;
        assert_eq!(result.stdout, "hi /tmp\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_prefix_expansion_lists_all_matches() {
        // Double underscores are ordinary name characters.
        let result = run("my_a=1; my__b=2; echo \"${!my*}\"").await;
        assert_eq!(result.stdout, "my_a my__b\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn associative_arrays() {
        let script = r##"
            declare -A colors
            colors[red]="#f00"
            colors[green]="#0f0"
            echo "${colors[red]} ${#colors[@]}"
        "##;
        let result = run(script).await;
        assert_eq!(result.stdout, "#f00 2\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn array_iteration_count() {
        let result =
            run("a=(one 'two words' 'g*'); n=0; for x in \"${a[@]}\"; do n=$((n+1)); done; echo $n ${#a[@]}")
                .await;
        assert_eq!(result.stdout, "3 3\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keyed_array_initializer_order() {
        // All values expand before any index is evaluated, and clearing
        // happens after expansion.
        let result = run("a=(x y z); a=(0 \"${a[@]}\" 1); echo \"${a[@]}\"").await;
        assert_eq!(result.stdout, "0 x y z 1\n");
        // A plain element continues from the last explicit index.
        let result = run("a=([2]=c [0]=a b); echo \"${a[0]} ${a[1]} ${a[2]}\"").await;
        assert_eq!(result.stdout, "a b c\n");
    }
}
