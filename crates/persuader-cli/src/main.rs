//! `persuader` — the command-line entry point for the schema-driven orchestration
//! runtime. Everything this binary does (flag parsing, config discovery, file I/O,
//! log sinks) is explicitly out of the core's scope per spec §1; this crate is the
//! external collaborator that wires those concerns to `persuader_core::persuade`.

mod adapters;
mod config;
mod io;
mod logging;
mod session_store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use persuader_core::orchestrator::{PersuadeOptions, persuade};
use persuader_core::prompt::{PromptParts, compose};
use persuader_core::schema::example;
use persuader_core::session::SessionManager;

use crate::config::{ConfigError, PersuaderConfig};
use crate::io::IoError;

#[derive(Parser, Debug)]
#[command(name = "persuader", author, version, about = "Schema-driven LLM output orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a prompt, call the provider, validate the reply, retry on failure.
    Run {
        #[command(flatten)]
        args: Box<RunArgs>,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to a JSON file holding a declarative Schema (see persuader_core::schema::Schema).
    #[arg(long)]
    schema: PathBuf,

    /// Path to a JSON input file, or a glob matching several; each match is one call.
    #[arg(long)]
    input: String,

    /// Where to write the validated output. A directory when `--input` is a glob
    /// with more than one match; a single file otherwise. Omit to print to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Resume a prior logical session.
    #[arg(long = "session-id")]
    session_id: Option<String>,

    /// Durable system instruction for a new session.
    #[arg(long)]
    context: Option<String>,

    /// Per-call perspective modifier.
    #[arg(long)]
    lens: Option<String>,

    /// Maximum additional attempts after the first.
    #[arg(long)]
    retries: Option<u32>,

    /// Adapter model hint.
    #[arg(long)]
    model: Option<String>,

    /// Which configured adapter to use; falls back to the config's `default_provider`.
    #[arg(long)]
    provider: Option<String>,

    /// Path to a TOML config file; falls back to `PERSUADER_CONFIG` then the
    /// platform config dir.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compose the first prompt for each matched input and print it without
    /// contacting any provider.
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { args } => run(*args).await,
    }
}

async fn run(args: RunArgs) -> ExitCode {
    logging::init(args.verbose, args.debug);

    let schema = match io::load_schema(&args.schema) {
        Ok(schema) => schema,
        Err(err) => return io_failure(&err),
    };

    let inputs = match io::resolve_inputs(&args.input) {
        Ok(inputs) => inputs,
        Err(err) => return io_failure(&err),
    };

    if args.dry_run {
        return dry_run(&schema, &inputs, &args);
    }

    let config = match PersuaderConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return config_failure(&err),
    };

    let provider_name = args.provider.clone().unwrap_or_else(|| config.default_provider.clone());
    let adapter_config = match config.adapter_config(&provider_name) {
        Ok(adapter_config) => adapter_config,
        Err(err) => return config_failure(&err),
    };
    let adapter = match adapters::build(&provider_name, adapter_config) {
        Ok(adapter) => adapter,
        Err(err) => return config_failure(&err),
    };

    let retries = args.retries.unwrap_or(config.default_retries);
    let model = args.model.clone().or_else(|| config.default_model.clone());
    let manager = SessionManager::new();

    let multi_output = inputs.len() > 1;
    if multi_output {
        if let Some(output) = &args.output {
            if let Err(err) = std::fs::create_dir_all(output) {
                tracing::error!(?output, %err, "failed to create output directory");
                return ExitCode::from(4);
            }
        }
    }

    let mut worst_code: Option<u8> = None;
    let mut session_id = args.session_id.clone();

    for input_path in &inputs {
        let input_value = match io::load_input(input_path) {
            Ok(value) => value,
            Err(err) => {
                worst_code = Some(worst(worst_code, 4));
                tracing::error!(?input_path, %err, "failed to load input");
                continue;
            }
        };

        let mut options = PersuadeOptions::new(&schema, input_value, adapter.as_ref())
            .retries(retries)
            .session_manager(&manager);
        if let Some(context) = &args.context {
            options = options.context(context.clone());
        }
        if let Some(lens) = &args.lens {
            options = options.lens(lens.clone());
        }
        if let Some(id) = &session_id {
            options = options.session_id(id.clone());
        }
        options.model = model.clone();
        options.provider_options.model = model.clone();

        match persuade(options).await {
            Ok(success) => {
                session_id = Some(success.session_id.clone());
                if let Some(session) = manager.get(&success.session_id).await {
                    if let Err(err) = session_store::persist(&session) {
                        tracing::warn!(%err, "failed to persist session to disk");
                    }
                }

                let destination = output_path_for(&args, input_path, multi_output);
                match destination {
                    Some(path) => {
                        if let Err(err) = io::write_output(&path, &success.value) {
                            worst_code = Some(worst(worst_code, 4));
                            tracing::error!(%err, "failed to write output");
                        }
                    }
                    None => {
                        if multi_output {
                            println!("--- {} ---", input_path.display());
                        }
                        println!("{}", serde_json::to_string_pretty(&success.value).unwrap_or_default());
                    }
                }
            }
            Err(failure) => {
                session_id = Some(failure.session_id.clone());
                let code = exit_code_for_class(failure.error.class());
                worst_code = Some(worst(worst_code, code));
                tracing::error!(
                    input = ?input_path,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "persuade call failed"
                );
            }
        }
    }

    let ttl = std::time::Duration::from_secs(config.session_ttl_days.saturating_mul(86_400));
    let expired = manager.cleanup(ttl, Some(adapter.as_ref())).await;
    if expired > 0 {
        tracing::debug!(expired, "swept expired sessions");
    }

    ExitCode::from(worst_code.unwrap_or(0))
}

fn output_path_for(args: &RunArgs, input_path: &std::path::Path, multi_output: bool) -> Option<PathBuf> {
    let output = args.output.as_ref()?;
    if !multi_output {
        return Some(output.clone());
    }
    let stem = input_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "output".to_string());
    Some(output.join(format!("{stem}.json")))
}

fn dry_run(schema: &persuader_core::schema::Schema, inputs: &[PathBuf], args: &RunArgs) -> ExitCode {
    for input_path in inputs {
        let input_value = match io::load_input(input_path) {
            Ok(value) => value,
            Err(err) => return io_failure(&err),
        };
        let example_value = example(schema);
        let parts = PromptParts {
            context: args.context.as_deref(),
            lens: args.lens.as_deref(),
            example: Some(&example_value),
            input: &input_value,
            feedback: None,
        };
        println!("--- {} ---", input_path.display());
        println!("{}", compose(&parts));
    }
    ExitCode::from(0)
}

fn exit_code_for_class(class: &str) -> u8 {
    match class {
        "validation" => 1,
        "provider" => 2,
        "configuration" => 3,
        "session" => 3,
        "cancelled" => 2,
        _ => 2,
    }
}

fn worst(current: Option<u8>, candidate: u8) -> u8 {
    current.map(|c| c.max(candidate)).unwrap_or(candidate)
}

fn io_failure(err: &IoError) -> ExitCode {
    eprintln!("{err}");
    ExitCode::from(4)
}

fn config_failure(err: &ConfigError) -> ExitCode {
    eprintln!("{err}");
    ExitCode::from(3)
}
