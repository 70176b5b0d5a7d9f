use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use conveyor::paths;

use super::CmdResult;

#[derive(Args)]
pub struct RunArgs {
    #[command(subcommand)]
    command: RunCommand,
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Start a registered job
    Job {
        /// Job ID to start
        job_id: String,
        /// Data file shipped with the start request
        #[arg(long)]
        data_file: Option<String>,
    },
    /// Start a registered pipeline
    Pipeline {
        /// Pipeline ID to start
        pipeline_id: String,
        /// Data file shipped with the start request
        #[arg(long)]
        data_file: Option<String>,
    },
}

#[derive(Serialize)]
pub struct RunOutput {
    pub command: String,
    pub id: String,
    pub response: Value,
}

pub fn run(args: RunArgs) -> CmdResult<RunOutput> {
    match args.command {
        RunCommand::Job { job_id, data_file } => start_job(&job_id, data_file.as_deref()),
        RunCommand::Pipeline {
            pipeline_id,
            data_file,
        } => start_pipeline(&pipeline_id, data_file.as_deref()),
    }
}

fn start_job(job_id: &str, data_file: Option<&str>) -> CmdResult<RunOutput> {
    let client = super::env_client()?;
    let data_path = expand_data_file(data_file)?;
    let response = client.run_job(job_id, data_path.as_deref())?;

    Ok((
        RunOutput {
            command: "run.job".to_string(),
            id: job_id.to_string(),
            response,
        },
        0,
    ))
}

fn start_pipeline(pipeline_id: &str, data_file: Option<&str>) -> CmdResult<RunOutput> {
    let client = super::env_client()?;
    let data_path = expand_data_file(data_file)?;
    let response = client.run_pipeline(pipeline_id, data_path.as_deref())?;

    Ok((
        RunOutput {
            command: "run.pipeline".to_string(),
            id: pipeline_id.to_string(),
            response,
        },
        0,
    ))
}

fn expand_data_file(data_file: Option<&str>) -> conveyor::Result<Option<PathBuf>> {
    data_file.map(paths::expand).transpose()
}
