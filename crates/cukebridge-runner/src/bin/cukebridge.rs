//! `cukebridge`: correlate cucumber-js message output with a test tree.
//!
//! ```text
//! cukebridge replay --tree <tree.json> --messages <run.ndjson> [--stderr <file>]
//!                   [--prefix <p>] [--workspace <dir>]
//! cukebridge run    --tree <tree.json> --workspace <dir> [--settings <file>] [--debug]
//! ```
//!
//! Sink events are written to stdout as JSON lines; logs go to stderr.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};

use cukebridge_core::{Correlator, RunContext, TestTree};
use cukebridge_error::{BridgeError, Result};
use cukebridge_runner::{
    AttachRequest, DebuggerAttach, JsonLinesSink, LogFormat, RunnerSettings, init_logging,
    run_session, spawn_run,
};
use tracing::{info, warn};

fn main() {
    let exit_code = run_cli(std::env::args_os());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReplayArgs {
    tree: PathBuf,
    messages: PathBuf,
    stderr: Option<PathBuf>,
    prefix: String,
    workspace: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunArgs {
    tree: PathBuf,
    workspace: PathBuf,
    settings: Option<PathBuf>,
    debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Replay(ReplayArgs),
    Run(RunArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    command: Command,
    log_format: LogFormat,
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let raw: Vec<String> = os_args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let tail = if raw.len() > 1 { &raw[1..] } else { &[] };

    let cli = match parse_args(tail) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("run `cukebridge --help` for usage");
            return 2;
        }
    };

    match cli.command {
        Command::Help => {
            print_help();
            0
        }
        Command::Replay(args) => {
            init_logging(cli.log_format);
            report(replay(&args))
        }
        Command::Run(args) => {
            init_logging(cli.log_format);
            report(run(&args))
        }
    }
}

fn report(result: Result<bool>) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn parse_args(tail: &[String]) -> std::result::Result<Cli, String> {
    let mut log_format = LogFormat::Compact;
    let mut positional = None;
    let mut tree = None;
    let mut messages = None;
    let mut stderr = None;
    let mut prefix = String::new();
    let mut workspace = None;
    let mut settings = None;
    let mut debug = false;

    if tail.is_empty() || tail.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Cli {
            command: Command::Help,
            log_format,
        });
    }

    let mut i = 0;
    while i < tail.len() {
        let arg = tail[i].as_str();
        let mut value = |name: &str| -> std::result::Result<String, String> {
            i += 1;
            tail.get(i)
                .cloned()
                .ok_or_else(|| format!("{name} requires an argument"))
        };
        match arg {
            "--tree" => tree = Some(PathBuf::from(value("--tree")?)),
            "--messages" => messages = Some(PathBuf::from(value("--messages")?)),
            "--stderr" => stderr = Some(PathBuf::from(value("--stderr")?)),
            "--prefix" => prefix = value("--prefix")?,
            "--workspace" => workspace = Some(PathBuf::from(value("--workspace")?)),
            "--settings" => settings = Some(PathBuf::from(value("--settings")?)),
            "--debug" => debug = true,
            "--log-json" => log_format = LogFormat::Json,
            other if other.starts_with('-') => return Err(format!("unknown option `{other}`")),
            other => {
                if positional.is_some() {
                    return Err(format!("unexpected argument `{other}`"));
                }
                positional = Some(other.to_owned());
            }
        }
        i += 1;
    }

    let tree = tree.ok_or("--tree is required")?;
    let command = match positional.as_deref() {
        Some("replay") => Command::Replay(ReplayArgs {
            tree,
            messages: messages.ok_or("replay requires --messages")?,
            stderr,
            prefix,
            workspace: workspace.unwrap_or_else(|| PathBuf::from(".")),
        }),
        Some("run") => Command::Run(RunArgs {
            tree,
            workspace: workspace.ok_or("run requires --workspace")?,
            settings,
            debug,
        }),
        Some(other) => return Err(format!("unknown command `{other}`")),
        None => return Err("missing command (replay or run)".to_owned()),
    };
    Ok(Cli {
        command,
        log_format,
    })
}

fn load_tree(path: &Path) -> Result<TestTree> {
    let text = std::fs::read_to_string(path)?;
    TestTree::from_json(&text)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| {
        BridgeError::Io(io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    })
}

/// Correlate a recorded run. Succeeds unless the stream was rejected.
fn replay(args: &ReplayArgs) -> Result<bool> {
    let tree = load_tree(&args.tree)?;
    let messages = open(&args.messages)?;
    let stderr: Box<dyn Read + Send> = match &args.stderr {
        Some(path) => Box::new(open(path)?),
        None => Box::new(io::empty()),
    };

    let context = RunContext::new(args.workspace.clone(), args.prefix.clone());
    let mut correlator = Correlator::new(tree, context);
    let mut sink = JsonLinesSink::new(BufWriter::new(io::stdout().lock()));
    let session = run_session(&mut correlator, messages, stderr, &mut sink, None);
    let events = sink.written();
    sink.finish()?;

    let report = session?;
    info!(
        events,
        stdout_lines = report.stdout_lines,
        any_test_case_started = report.any_test_case_started,
        "replay complete"
    );
    Ok(true)
}

/// Spawn the runner. Succeeds when the runner exits with status 0.
fn run(args: &RunArgs) -> Result<bool> {
    let tree = load_tree(&args.tree)?;
    let settings = match &args.settings {
        Some(path) => RunnerSettings::load(path)?,
        None => RunnerSettings::default(),
    };

    let mut attach = |request: &AttachRequest| match serde_json::to_string(request) {
        Ok(json) => eprintln!("attach {json}"),
        Err(err) => warn!(error = %err, "could not encode attach request"),
    };
    let debugger: Option<&mut dyn DebuggerAttach> = if args.debug {
        Some(&mut attach)
    } else {
        None
    };

    let mut sink = JsonLinesSink::new(BufWriter::new(io::stdout().lock()));
    let outcome = spawn_run(&settings, &args.workspace, tree, &mut sink, debugger);
    sink.finish()?;

    let outcome = outcome?;
    Ok(outcome.success)
}

fn print_help() {
    println!(
        "cukebridge: correlate cucumber-js message output with a test tree

USAGE:
  cukebridge replay --tree <tree.json> --messages <run.ndjson> [OPTIONS]
  cukebridge run --tree <tree.json> --workspace <dir> [OPTIONS]

OPTIONS:
  --tree <file>       Selected test tree, JSON {{\"roots\": [...]}}
  --messages <file>   Recorded runner stdout (replay)
  --stderr <file>     Recorded runner stderr (replay)
  --prefix <p>        Uri prefix for document ids (replay)
  --workspace <dir>   Workspace root
  --settings <file>   Runner settings JSON (run)
  --debug             Start the runner under the inspector (run)
  --log-json          Log as JSON lines; filter with CUKEBRIDGE_LOG
  -h, --help          Show this help

Events are written to stdout as JSON lines."
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| (*a).to_owned()).collect()
    }

    #[test]
    fn replay_defaults() {
        let cli = parse_args(&args(&["replay", "--tree", "t.json", "--messages", "m.ndjson"]))
            .unwrap();
        assert_eq!(cli.log_format, LogFormat::Compact);
        assert_eq!(
            cli.command,
            Command::Replay(ReplayArgs {
                tree: PathBuf::from("t.json"),
                messages: PathBuf::from("m.ndjson"),
                stderr: None,
                prefix: String::new(),
                workspace: PathBuf::from("."),
            })
        );
    }

    #[test]
    fn run_with_all_flags() {
        let cli = parse_args(&args(&[
            "--log-json",
            "run",
            "--tree",
            "t.json",
            "--workspace",
            "/work",
            "--settings",
            "s.json",
            "--debug",
        ]))
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.command,
            Command::Run(RunArgs {
                tree: PathBuf::from("t.json"),
                workspace: PathBuf::from("/work"),
                settings: Some(PathBuf::from("s.json")),
                debug: true,
            })
        );
    }

    #[test]
    fn usage_errors() {
        let cases: [(&[&str], &str); 5] = [
            (&["replay", "--tree"], "--tree requires an argument"),
            (&["replay", "--messages", "m"], "--tree is required"),
            (&["run", "--tree", "t"], "run requires --workspace"),
            (&["walk", "--tree", "t"], "unknown command `walk`"),
            (&["run", "--tree", "t", "--bogus"], "unknown option `--bogus`"),
        ];
        for (input, expected) in cases {
            let err = parse_args(&args(input)).unwrap_err();
            assert_eq!(err, expected, "case=usage input={input:?}");
        }
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args(&[]).unwrap().command, Command::Help);
        assert_eq!(
            parse_args(&args(&["run", "-h"])).unwrap().command,
            Command::Help
        );
        assert_eq!(run_cli(["cukebridge", "--help"].map(OsString::from)), 0);
        assert_eq!(run_cli(["cukebridge", "replay"].map(OsString::from)), 2);
    }
}
