//! Support Triage console entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build oracle client + orchestrator
//!   6. Spawn Ctrl-C → cancel watcher
//!   7. Prompt for session attributes and the query
//!   8. Run one request and print its outcome

use support_triage::error::AppError;
use support_triage::pipeline::{Context, Orchestrator, Outcome};
use support_triage::{config, logger};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::info;

const BLOCKED_MESSAGE: &str = "Tripwire triggered. Offensive language is not allowed.";

#[tokio::main]
async fn main() {
    match run().await {
        Ok(Session::Finished) => {}
        // The stdin reader thread is still blocked in read(); dropping the
        // runtime would wait for it.
        Ok(Session::Interrupted) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// How the console session ended.
#[derive(Debug, PartialEq, Eq)]
enum Session {
    Finished,
    /// Ctrl-C at a prompt or during the request.
    Interrupted,
}

/// One prompt's answer.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Line(String),
    Eof,
    Cancelled,
}

impl Reply {
    /// The line, or the way the session ends.
    fn into_line(self) -> Result<String, Session> {
        match self {
            Reply::Line(line) => Ok(line),
            Reply::Eof => Err(Session::Finished),
            Reply::Cancelled => {
                println!();
                Err(Session::Interrupted)
            }
        }
    }
}

/// Unwrap a prompt's line or return from `run` with how the session ended.
macro_rules! answer {
    ($reply:expr) => {
        match $reply.into_line() {
            Ok(line) => line,
            Err(session) => return Ok(session),
        }
    };
}

async fn run() -> Result<Session, AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let (effective_log_level, force_cli_level) =
        logger::effective_level(args.log_level, config.log_level.as_str());

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        app = %config.app_name,
        provider = %config.llm.provider,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let orchestrator = Orchestrator::from_config(&config)?;

    // Ctrl-C cancels the prompts and any in-flight request.
    let cancel = CancellationToken::new();
    let ctrlc_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling");
            ctrlc_token.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("\nWelcome to the Support Desk");
    let name = answer!(prompt(&mut lines, "Enter your name: ", &cancel).await?);
    let premium = answer!(prompt(&mut lines, "Are you a premium user? (yes/no): ", &cancel).await?);
    let issue = answer!(
        prompt(
            &mut lines,
            "What type of issue are you facing? (billing/technical/general): ",
            &cancel,
        )
        .await?
    );

    let premium = premium.trim().eq_ignore_ascii_case("yes");
    let ctx = Context::new(name.trim(), premium, issue.as_str());

    let query = answer!(prompt(&mut lines, "\nPlease describe your issue: ", &cancel).await?);
    println!("\nRouting your query...\n");

    match orchestrator.handle_request_with_cancel(&ctx, &query, &cancel).await {
        Outcome::Released(text) => {
            println!("Final Output:");
            println!("{text}");
        }
        Outcome::Blocked(_) => println!("{BLOCKED_MESSAGE}"),
        Outcome::Failed(e) => {
            eprintln!("Request failed ({:?}): {e}", e.kind());
        }
        Outcome::Cancelled => {
            println!("Request cancelled.");
            return Ok(Session::Interrupted);
        }
    }

    Ok(Session::Finished)
}

/// Print `label` and read one line.
async fn prompt<R>(
    lines: &mut Lines<R>,
    label: &str,
    cancel: &CancellationToken,
) -> Result<Reply, AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Reply::Cancelled),
        line = lines.next_line() => Ok(line?.map_or(Reply::Eof, Reply::Line)),
    }
}

const USAGE: &str = "\
Usage: support-triage [OPTIONS]

Asks for your name, membership and issue type, then routes one support query.

Options:
  -h, --help             Print help
  -f, --config <PATH>    Configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv   More log output (warn, info, debug, trace)";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Cli {
    Run(CliArgs),
    Help,
}

fn parse_cli_args() -> CliArgs {
    match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Run(args)) => args,
        Ok(Cli::Help) => {
            println!("{USAGE}");
            std::process::exit(0);
        }
        Err(msg) => {
            eprintln!("error: {msg}\n\n{USAGE}");
            std::process::exit(2);
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Cli, String> {
    let mut verbosity = 0usize;
    let mut parsed = CliArgs::default();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => return Ok(Cli::Help),
            "-f" | "--config" => {
                let path = args.next().ok_or("-f/--config requires a path argument")?;
                parsed.config_path = Some(path);
            }
            "--verbose" => verbosity += 1,
            flag if is_verbosity_flag(flag) => verbosity += flag.len() - 1,
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    parsed.log_level = verbosity_level(verbosity);
    Ok(Cli::Run(parsed))
}

/// `-v`, `-vv`, ...
fn is_verbosity_flag(flag: &str) -> bool {
    flag.strip_prefix('-').is_some_and(|v| !v.is_empty() && v.chars().all(|c| c == 'v'))
}

/// No flag keeps the configured level.
fn verbosity_level(count: usize) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, String> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn no_args_keeps_config_level() {
        assert_eq!(parse(&[]), Ok(Cli::Run(CliArgs::default())));
    }

    #[test]
    fn verbosity_accumulates() {
        let Ok(Cli::Run(args)) = parse(&["-v", "-vv"]) else { panic!("expected run") };
        assert_eq!(args.log_level, Some("debug"));
        let Ok(Cli::Run(args)) = parse(&["-vvvvv"]) else { panic!("expected run") };
        assert_eq!(args.log_level, Some("trace"));
    }

    #[test]
    fn config_path_is_taken() {
        let Ok(Cli::Run(args)) = parse(&["--config", "desk.toml"]) else { panic!("expected run") };
        assert_eq!(args.config_path.as_deref(), Some("desk.toml"));
        assert!(parse(&["-f"]).is_err());
    }

    #[test]
    fn help_and_unknown_flags() {
        assert_eq!(parse(&["-v", "--help"]), Ok(Cli::Help));
        assert!(parse(&["--interactive"]).unwrap_err().contains("--interactive"));
        assert!(parse(&["-"]).is_err());
    }

    #[tokio::test]
    async fn prompt_reads_lines_then_eof() {
        let cancel = CancellationToken::new();
        let mut lines = BufReader::new(&b"Ana\nyes\n"[..]).lines();
        assert_eq!(prompt(&mut lines, "", &cancel).await.unwrap(), Reply::Line("Ana".into()));
        assert_eq!(prompt(&mut lines, "", &cancel).await.unwrap(), Reply::Line("yes".into()));
        assert_eq!(prompt(&mut lines, "", &cancel).await.unwrap(), Reply::Eof);
    }

    #[tokio::test]
    async fn ctrl_c_at_prompt_interrupts_pending_read() {
        let cancel = CancellationToken::new();
        // The writer stays open, so the read never completes on its own.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });

        let reply = prompt(&mut lines, "", &cancel).await.unwrap();
        assert_eq!(reply, Reply::Cancelled);
        assert_eq!(reply.into_line(), Err(Session::Interrupted));
        assert_eq!(Reply::Eof.into_line(), Err(Session::Finished));
    }
}
