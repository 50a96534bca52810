//! seq - print a sequence of numbers.

use async_trait::async_trait;

use super::{Command, CommandContext, CommandResult};

pub struct Seq;

#[async_trait]
impl Command for Seq {
    fn name(&self) -> &'static str {
        "seq"
    }

    async fn execute(&self, args: &[String], _ctx: CommandContext) -> CommandResult {
        let mut separator = "\n".to_string();
        let mut positional: Vec<&String> = Vec::new();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-s" => {
                    i += 1;
                    match args.get(i) {
                        Some(s) => separator = s.clone(),
                        None => return CommandResult::error("seq: option requires an argument -- 's'\n"),
                    }
                }
                _ => positional.push(&args[i]),
            }
            i += 1;
        }

        let parse = |s: &String| -> Result<i64, CommandResult> {
            s.parse::<i64>()
                .map_err(|_| CommandResult::error(format!("seq: invalid floating point argument: '{}'\n", s)))
        };

        let (first, step, last) = match positional.len() {
            1 => match parse(positional[0]) {
                Ok(last) => (1, 1, last),
                Err(e) => return e,
            },
            2 => match (parse(positional[0]), parse(positional[1])) {
                (Ok(first), Ok(last)) => (first, 1, last),
                (Err(e), _) | (_, Err(e)) => return e,
            },
            3 => match (parse(positional[0]), parse(positional[1]), parse(positional[2])) {
                (Ok(first), Ok(step), Ok(last)) => (first, step, last),
                (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => return e,
            },
            _ => return CommandResult::error("seq: missing operand\n"),
        };

        if step == 0 {
            return CommandResult::error("seq: invalid Zero increment value: '0'\n");
        }

        let mut values = Vec::new();
        let mut n = first;
        while (step > 0 && n <= last) || (step < 0 && n >= last) {
            values.push(n.to_string());
            n += step;
        }
        let mut out = values.join(&separator);
        if !out.is_empty() {
            out.push('\n');
        }
        CommandResult::success(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx() -> CommandContext {
        CommandContext {
            stdin: String::new(),
            cwd: "/".to_string(),
            env: HashMap::new(),
            fs: Arc::new(MemFs::new()),
            exec: None,
            fetch: None,
            sleep: None,
        }
    }

    #[tokio::test]
    async fn basic_sequences() {
        assert_eq!(Seq.execute(&["3".into()], ctx()).await.stdout, "1\n2\n3\n");
        assert_eq!(
            Seq.execute(&["2".into(), "4".into()], ctx()).await.stdout,
            "2\n3\n4\n"
        );
        assert_eq!(
            Seq.execute(&["5".into(), "-2".into(), "1".into()], ctx())
                .await
                .stdout,
            "5\n3\n1\n"
        );
    }

    #[tokio::test]
    async fn custom_separator() {
        assert_eq!(
            Seq.execute(&["-s".into(), " ".into(), "3".into()], ctx())
                .await
                .stdout,
            "1 2 3\n"
        );
    }
}
