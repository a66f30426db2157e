//! Corral CLI
//!
//! Evaluate JavaScript in a bounded sandbox from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod smoke;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use console::style;
use corral_sandbox::{
    BoundedText, EnvironmentPolicy, EvalError, GlobalFn, Sandbox, SandboxConfig, Variant,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "Corral - bounded, deterministic JavaScript sandbox", long_about = None)]
struct Cli {
    /// Arena size in bytes
    #[arg(short, long, global = true)]
    memory: Option<i64>,
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a snippet
    Eval {
        /// Source text
        code: String,
    },
    /// Evaluate a script file
    Run {
        /// Path to script
        file: PathBuf,
    },
    /// Show the environment policy of this build
    Policy,
    /// Run the built-in smoke checks
    Smoke,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load(cli.config.as_deref(), cli.memory)?;

    match cli.command {
        Commands::Eval { code } => evaluate(config, code.into_bytes(), cli.json),
        Commands::Run { file } => {
            let source = std::fs::read(&file)
                .wrap_err_with(|| format!("failed to read script {}", file.display()))?;
            evaluate(config, source, cli.json)
        }
        Commands::Policy => {
            show_policy(&EnvironmentPolicy::for_build(), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Smoke => run_smoke(&config, cli.json),
    }
}

/// Log to stderr, filtered by `RUST_LOG` when set
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn evaluate(config: SandboxConfig, source: Vec<u8>, as_json: bool) -> Result<ExitCode> {
    let mut sandbox = Sandbox::new(config)?;
    let outcome = sandbox.eval(source);
    print_outcome(&outcome, as_json)?;
    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(outcome: &Result<BoundedText, EvalError>, as_json: bool) -> Result<()> {
    if as_json {
        let value = match outcome {
            Ok(text) => json!({
                "ok": true,
                "result": text.as_str(),
                "truncated": text.is_truncated(),
            }),
            Err(err) => json!({ "ok": false, "error": err.message() }),
        };
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    match outcome {
        Ok(text) => {
            println!("{text}");
            if text.is_truncated() {
                eprintln!("{}", style("(result truncated)").dim());
            }
        }
        Err(err) => eprintln!("{} {}", style("error:").red().bold(), err.message()),
    }
    Ok(())
}

fn show_policy(policy: &EnvironmentPolicy, as_json: bool) -> Result<()> {
    let variant = policy.variant();
    if as_json {
        let globals: Vec<_> = GlobalFn::ALL
            .iter()
            .map(|global| {
                json!({
                    "name": global.path(),
                    "disabled": variant.disabled_message(*global),
                })
            })
            .collect();
        let value = json!({
            "variant": variant.name(),
            "capabilities": policy.capabilities(),
            "seed_reproducible": variant == Variant::Inert,
            "globals": globals,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", style("variant:").bold(), variant);
    println!("{} {}", style("capabilities:").bold(), policy.capabilities());
    println!("{}", style("globals:").bold());
    for global in GlobalFn::ALL {
        match variant.disabled_message(global) {
            Some(message) => println!(
                "  {:<16} {}",
                global.path(),
                style(format!("throws TypeError: {message}")).yellow()
            ),
            None => println!("  {:<16} {}", global.path(), style("available").green()),
        }
    }
    Ok(())
}

fn run_smoke(config: &SandboxConfig, as_json: bool) -> Result<ExitCode> {
    let report = smoke::run(config, &EnvironmentPolicy::for_build())?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", style("variant:").bold(), report.variant);
        for case in &report.cases {
            let mark = if case.passed {
                style("OK  ").green()
            } else {
                style("FAIL").red()
            };
            println!("{mark} {} -> {}", case.name, case.detail);
        }
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
