//! sleep - delay via the host's sleep hook.

use async_trait::async_trait;

use super::{Command, CommandContext, CommandResult};

pub struct Sleep;

fn parse_duration(arg: &str) -> Option<f64> {
    let (number, unit) = match arg.chars().last() {
        Some('s') => (&arg[..arg.len() - 1], 1.0),
        Some('m') => (&arg[..arg.len() - 1], 60.0),
        Some('h') => (&arg[..arg.len() - 1], 3600.0),
        Some('d') => (&arg[..arg.len() - 1], 86400.0),
        _ => (arg, 1.0),
    };
    number.parse::<f64>().ok().map(|n| n * unit)
}

#[async_trait]
impl Command for Sleep {
    fn name(&self) -> &'static str {
        "sleep"
    }

    async fn execute(&self, args: &[String], ctx: CommandContext) -> CommandResult {
        if args.is_empty() {
            return CommandResult::error("sleep: missing operand\n");
        }
        let mut total = 0.0;
        for arg in args {
            match parse_duration(arg) {
                Some(d) if d >= 0.0 => total += d,
                _ => {
                    return CommandResult::error(format!(
                        "sleep: invalid time interval '{}'\n",
                        arg
                    ))
                }
            }
        }
        if let Some(sleep) = &ctx.sleep {
            sleep(total).await;
        }
        CommandResult::success("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("2"), Some(2.0));
        assert_eq!(parse_duration("0.5"), Some(0.5));
        assert_eq!(parse_duration("2m"), Some(120.0));
        assert_eq!(parse_duration("x"), None);
    }
}
