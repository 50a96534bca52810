use clap::Parser;
use std::io::Read;

use sandbash::shell::{Shell, ShellConfig};

#[derive(Parser)]
#[command(name = "sandbash")]
#[command(about = "A sandboxed bash interpreter with a virtual filesystem")]
#[command(version)]
struct Cli {
    /// Execute the script from the command line
    #[arg(short = 'c')]
    script: Option<String>,

    /// Exit immediately if a command exits with non-zero status
    #[arg(short = 'e', long = "errexit")]
    errexit: bool,

    /// Working directory within the sandbox
    #[arg(long = "cwd")]
    cwd: Option<String>,

    /// Output the result as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("sandbash: cannot read script file {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!(
                "sandbash: no script provided; use -c 'script', a script file, or pipe via stdin"
            );
            std::process::exit(1);
        }
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).unwrap_or_default();
        buffer
    };

    if script.trim().is_empty() {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({"stdout": "", "stderr": "", "exitCode": 0})
            );
        }
        std::process::exit(0);
    }

    let mut shell = Shell::new(ShellConfig {
        cwd: cli.cwd,
        ..Default::default()
    })
    .await;

    let source = if cli.errexit {
        format!("set -e\n{}", script)
    } else {
        script
    };

    let result = shell.exec(&source).await;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exitCode": result.exit_code,
            })
        );
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }
    std::process::exit(result.exit_code.clamp(0, 255));
}
