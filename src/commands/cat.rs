//! cat - concatenate files to stdout.

use async_trait::async_trait;

use super::{Command, CommandContext, CommandResult};

pub struct Cat;

#[async_trait]
impl Command for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }

    async fn execute(&self, args: &[String], ctx: CommandContext) -> CommandResult {
        let mut number_lines = false;
        let mut show_ends = false;
        let mut files: Vec<&str> = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-n" => number_lines = true,
                "-E" => show_ends = true,
                "-" => files.push("-"),
                _ => files.push(arg),
            }
        }
        if files.is_empty() {
            files.push("-");
        }

        let mut out = String::new();
        let mut err = String::new();
        let mut exit_code = 0;

        for file in files {
            let content = if file == "-" {
                ctx.stdin.clone()
            } else {
                let path = ctx.fs.resolve_path(&ctx.cwd, file);
                match ctx.fs.read_file(&path).await {
                    Ok(c) => c,
                    Err(_) => {
                        err.push_str(&format!("cat: {}: No such file or directory\n", file));
                        exit_code = 1;
                        continue;
                    }
                }
            };
            if show_ends {
                for line in content.split_inclusive('\n') {
                    match line.strip_suffix('\n') {
                        Some(body) => {
                            out.push_str(body);
                            out.push_str("$\n");
                        }
                        None => out.push_str(line),
                    }
                }
            } else if number_lines {
                for (i, line) in content.split_inclusive('\n').enumerate() {
                    out.push_str(&format!("{:>6}\t{}", i + 1, line));
                }
            } else {
                out.push_str(&content);
            }
        }

        CommandResult::with_exit_code(out, err, exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::fs::MemFs;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx(stdin: &str, fs: Arc<MemFs>) -> CommandContext {
        CommandContext {
            stdin: stdin.to_string(),
            cwd: "/".to_string(),
            env: HashMap::new(),
            fs,
            exec: None,
            fetch: None,
            sleep: None,
        }
    }

    #[tokio::test]
    async fn cat_stdin() {
        let result = Cat.execute(&[], ctx("hello\n", Arc::new(MemFs::new()))).await;
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn cat_file_and_missing() {
        let fs = Arc::new(MemFs::new());
        fs.write_file("/f.txt", b"data\n").await.unwrap();
        let result = Cat
            .execute(&["f.txt".into(), "nope".into()], ctx("", fs))
            .await;
        assert_eq!(result.stdout, "data\n");
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("nope"));
    }

    #[tokio::test]
    async fn cat_numbered() {
        let result = Cat
            .execute(&["-n".into()], ctx("a\nb\n", Arc::new(MemFs::new())))
            .await;
        assert_eq!(result.stdout, "     1\ta\n     2\tb\n");
    }
}
