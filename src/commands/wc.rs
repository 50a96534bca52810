//! wc - count lines, words, and bytes.

use async_trait::async_trait;

use super::{Command, CommandContext, CommandResult};

pub struct Wc;

fn counts(text: &str) -> (usize, usize, usize) {
    let lines = text.matches('\n').count();
    let words = text.split_whitespace().count();
    let bytes = text.len();
    (lines, words, bytes)
}

#[async_trait]
impl Command for Wc {
    fn name(&self) -> &'static str {
        "wc"
    }

    async fn execute(&self, args: &[String], ctx: CommandContext) -> CommandResult {
        let mut show_lines = false;
        let mut show_words = false;
        let mut show_bytes = false;
        let mut files: Vec<&str> = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-l" => show_lines = true,
                "-w" => show_words = true,
                "-c" => show_bytes = true,
                _ => files.push(arg),
            }
        }
        if !show_lines && !show_words && !show_bytes {
            show_lines = true;
            show_words = true;
            show_bytes = true;
        }
        let single_field = [show_lines, show_words, show_bytes]
            .iter()
            .filter(|b| **b)
            .count()
            == 1;

        let format = |l: usize, w: usize, b: usize, name: Option<&str>| -> String {
            let mut fields = Vec::new();
            if show_lines {
                fields.push(l.to_string());
            }
            if show_words {
                fields.push(w.to_string());
            }
            if show_bytes {
                fields.push(b.to_string());
            }
            let joined = if single_field {
                fields.join(" ")
            } else {
                fields
                    .iter()
                    .map(|f| format!("{:>7}", f))
                    .collect::<Vec<_>>()
                    .join("")
            };
            match name {
                Some(n) => format!("{} {}\n", joined, n),
                None => format!("{}\n", joined),
            }
        };

        if files.is_empty() {
            let (l, w, b) = counts(&ctx.stdin);
            return CommandResult::success(format(l, w, b, None));
        }

        let mut out = String::new();
        let mut err = String::new();
        let mut exit_code = 0;
        let mut totals = (0usize, 0usize, 0usize);
        for file in &files {
            let path = ctx.fs.resolve_path(&ctx.cwd, file);
            match ctx.fs.read_file(&path).await {
                Ok(content) => {
                    let (l, w, b) = counts(&content);
                    totals.0 += l;
                    totals.1 += w;
                    totals.2 += b;
                    out.push_str(&format(l, w, b, Some(file)));
                }
                Err(_) => {
                    err.push_str(&format!("wc: {}: No such file or directory\n", file));
                    exit_code = 1;
                }
            }
        }
        if files.len() > 1 {
            out.push_str(&format(totals.0, totals.1, totals.2, Some("total")));
        }
        CommandResult::with_exit_code(out, err, exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx(stdin: &str) -> CommandContext {
        CommandContext {
            stdin: stdin.to_string(),
            cwd: "/".to_string(),
            env: HashMap::new(),
            fs: Arc::new(MemFs::new()),
            exec: None,
            fetch: None,
            sleep: None,
        }
    }

    #[tokio::test]
    async fn stdin_line_count() {
        let result = Wc.execute(&["-l".into()], ctx("a\nb\nc\n")).await;
        assert_eq!(result.stdout, "3\n");
    }

    #[tokio::test]
    async fn full_counts() {
        let result = Wc.execute(&[], ctx("one two\n")).await;
        assert_eq!(result.stdout, "      1      2      8\n");
    }
}
