//! Host simulator: runs a JSON-lines script of calls against the demonstration library.

use std::{
    env, fs, io,
    io::{BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use xlbridge::{Bridge, BridgeConfig, Dispatcher, ExportId, Handle, TaggedValue};

mod demo;

const USAGE: &str = "usage: xlbridge [--config FILE] SCRIPT";

/// One line of a script.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Call {
        call: String,
        #[serde(default)]
        args: Vec<TaggedValue>,
    },
    Export {
        export: ExportId,
        #[serde(default)]
        args: Vec<TaggedValue>,
    },
    Release {
        release: Handle,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outcome {
    Value(TaggedValue),
    Released { released: bool },
}

struct Args {
    config: Option<PathBuf>,
    script: PathBuf,
}

fn main() -> ExitCode {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    let config = match &args.config {
        Some(path) => match BridgeConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => BridgeConfig::default(),
    };
    init_logging(&config);

    let script = match fs::read_to_string(&args.script) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", args.script.display());
            return ExitCode::FAILURE;
        }
    };
    let dispatcher = match demo::dispatcher(Bridge::new(config)) {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let mut out = BufWriter::new(io::stdout().lock());
    let result = run(&dispatcher, &script, &mut out);
    if let Err(err) = out.flush() {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    let elapsed = start.elapsed();
    match result {
        Ok(steps) => {
            let heap = dispatcher.bridge().heap().stats();
            eprintln!(
                "{steps} steps after: {elapsed:?} ({} live handles, {} minted)",
                heap.live_handles, heap.minted
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error after: {elapsed:?}\n{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config = None;
    let mut script = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            _ if script.is_some() => return Err("only one script may be given".to_owned()),
            path => script = Some(PathBuf::from(path)),
        }
    }
    let script = script.ok_or("missing script")?;
    Ok(Args { config, script })
}

/// `RUST_LOG` wins over the configured filter; without either only warnings are shown.
fn init_logging(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Runs every step, writing one JSON result per line. Returns the number of steps run.
fn run(dispatcher: &Dispatcher, script: &str, out: &mut impl Write) -> Result<usize, String> {
    let mut steps = 0;
    for (index, line) in script.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let step: Step = serde_json::from_str(line).map_err(|err| format!("line {line_no}: malformed step: {err}"))?;
        let outcome = match step {
            Step::Call { call, args } => dispatcher.invoke_by_name(&call, &args).map(Outcome::Value),
            Step::Export { export, args } => dispatcher.invoke(export, &args).map(Outcome::Value),
            Step::Release { release } => Ok(Outcome::Released {
                released: dispatcher.bridge().heap().release(release),
            }),
        }
        .map_err(|err| format!("line {line_no}: {err}"))?;
        let json = serde_json::to_string(&outcome).map_err(|err| format!("line {line_no}: {err}"))?;
        writeln!(out, "{json}").map_err(|err| err.to_string())?;
        steps += 1;
    }
    Ok(steps)
}
