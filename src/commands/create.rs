use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use conveyor::config::{self, JobConfig};
use conveyor::pipeline::{self, PipelineSpec};
use conveyor::{bundle, paths, ApiClient};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct CreateArgs {
    #[command(subcommand)]
    command: CreateCommand,
}

#[derive(Subcommand)]
pub enum CreateCommand {
    /// Package a project and register it as a job
    Job {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: String,
        /// Start the job right after the build
        #[arg(long)]
        run: bool,
    },
    /// Package per-step projects and register a pipeline
    Pipeline {
        /// Path to the pipeline YAML configuration file
        #[arg(short, long)]
        config: String,
    },
}

/// Pipeline submission streams backend build logs straight to stdout.
pub fn is_streaming(args: &CreateArgs) -> bool {
    matches!(args.command, CreateCommand::Pipeline { .. })
}

pub fn run(args: CreateArgs) -> CmdResult<CreateOutput> {
    match args.command {
        CreateCommand::Job { config, run } => create_job(&config, run),
        CreateCommand::Pipeline { config } => create_pipeline(&config),
    }
}

#[derive(Serialize, Default)]
pub struct CreateOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_streamed: Option<usize>,
}

fn create_job(config_arg: &str, run: bool) -> CmdResult<CreateOutput> {
    let config_path = paths::expand(config_arg)?;
    let mut config = JobConfig::load(&config_path)?;
    let token = config::resolve_token(&config)?;
    config.set_token(&token);

    let client = ApiClient::new(token)?;

    let response = match config.entry_script().map(str::to_string) {
        Some(entry) => {
            // The entry script is declared relative to the config file; its
            // directory is the project to bundle.
            let config_dir = config_path.parent().unwrap_or(Path::new("."));
            let script_path = config_dir.join(&entry);
            let project_dir = script_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config_dir.to_path_buf());

            let extra = config_base_name(&config_path);
            let bundle =
                bundle::stage_project(&project_dir, Some(&script_path), &mut config, &extra)?;
            client.submit_job(&bundle, run)?
        }
        None => {
            let (_staging, staged_config) = crate::commands::stage_config_only(&config)?;
            client.submit_job_config(&staged_config, run)?
        }
    };

    Ok((
        CreateOutput {
            command: "create.job".to_string(),
            job_name: config.job_name().map(str::to_string),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}

fn create_pipeline(config_arg: &str) -> CmdResult<CreateOutput> {
    let config_path = paths::expand(config_arg)?;
    let config = JobConfig::load(&config_path)?;
    let token = config::resolve_token(&config)?;

    let spec = PipelineSpec::from_config(&config, &config_path)?;
    let bundle = pipeline::assemble(&spec)?;

    let client = ApiClient::new(token)?;
    let stream = client.submit_pipeline(&bundle)?;
    let lines_streamed = crate::commands::stream_to_stdout(stream)?;

    Ok((
        CreateOutput {
            command: "create.pipeline".to_string(),
            job_name: config.job_name().map(str::to_string),
            lines_streamed: Some(lines_streamed),
            ..Default::default()
        },
        0,
    ))
}

/// The config file's own base name, excluded from the project copy so the
/// staged `config.yaml` is the only configuration in the bundle.
pub(crate) fn config_base_name(config_path: &Path) -> Vec<String> {
    config_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| vec![n.to_string()])
        .unwrap_or_default()
}
