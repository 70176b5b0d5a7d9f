use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{create, deploy, job, pipeline, run, stats};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    RawPassthrough,
}

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(version = VERSION)]
#[command(about = "Bundle local projects and submit them to the Conveyor execution service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create jobs and pipelines from a config file
    Create(create::CreateArgs),
    /// Deploy a model serving job
    Deploy(deploy::DeployArgs),
    /// Start an existing job or pipeline
    Run(run::RunArgs),
    /// Inspect and manage jobs
    #[command(visible_alias = "jobs")]
    Job(job::JobArgs),
    /// Inspect and manage pipelines
    #[command(visible_alias = "pipelines")]
    Pipeline(pipeline::PipelineArgs),
    /// Show account-level usage statistics
    Stats(stats::StatsArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Create(args) if create::is_streaming(args) => ResponseMode::RawPassthrough,
        Commands::Job(args) if job::is_streaming(args) => ResponseMode::RawPassthrough,
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    // Load .env if present. Variables already set in the environment win.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mode = response_mode(&cli.command);

    let (json_result, exit_code) = commands::run_json(cli.command);

    match mode {
        ResponseMode::Json => {
            output::print_json_result(json_result).ok();
        }
        ResponseMode::RawPassthrough => {
            // Streamed lines already went to stdout. Only a failure still
            // gets the JSON envelope.
            if json_result.is_err() {
                output::print_json_result(json_result).ok();
            }
        }
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
