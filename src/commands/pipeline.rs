use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use conveyor::api::{PipelineExecutionSummary, PipelineSummary};

use super::CmdResult;

#[derive(Args)]
pub struct PipelineArgs {
    #[command(subcommand)]
    command: PipelineCommand,
}

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// List pipelines
    List {
        /// Filter pipelines by status
        #[arg(long)]
        status: Option<String>,
        /// Only pipelines created after this date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Only pipelines created before this date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Show detailed information about a pipeline
    Info {
        /// Pipeline ID
        pipeline_id: String,
    },
    /// List executions for a pipeline
    Executions {
        /// Pipeline ID
        pipeline_id: String,
        /// Filter executions by status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one pipeline execution with its per-step breakdown
    Details {
        /// Pipeline ID
        pipeline_id: String,
        /// Pipeline execution ID
        execution_id: String,
    },
    /// Fetch image build logs for a pipeline
    Buildlogs {
        /// Pipeline ID
        pipeline_id: String,
    },
    /// Stop a running pipeline
    Stop {
        /// Pipeline ID
        pipeline_id: String,
    },
    /// Resume a stopped pipeline
    Resume {
        /// Pipeline ID
        pipeline_id: String,
    },
}

pub fn run(args: PipelineArgs) -> CmdResult<PipelineOutput> {
    match args.command {
        PipelineCommand::List {
            status,
            start_date,
            end_date,
        } => list(status.as_deref(), start_date.as_deref(), end_date.as_deref()),
        PipelineCommand::Info { pipeline_id } => info(&pipeline_id),
        PipelineCommand::Executions {
            pipeline_id,
            status,
        } => executions(&pipeline_id, status.as_deref()),
        PipelineCommand::Details {
            pipeline_id,
            execution_id,
        } => details(&pipeline_id, &execution_id),
        PipelineCommand::Buildlogs { pipeline_id } => build_logs(&pipeline_id),
        PipelineCommand::Stop { pipeline_id } => stop(&pipeline_id),
        PipelineCommand::Resume { pipeline_id } => resume(&pipeline_id),
    }
}

#[derive(Serialize, Default)]
pub struct PipelineOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<Vec<PipelineSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executions: Option<Vec<PipelineExecutionSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

fn list(
    status: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let pipelines = client.list_pipelines(status, start_date, end_date)?;

    Ok((
        PipelineOutput {
            command: "pipeline.list".to_string(),
            pipelines: Some(pipelines),
            ..Default::default()
        },
        0,
    ))
}

fn info(pipeline_id: &str) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let info = client.pipeline_info(pipeline_id)?;

    Ok((
        PipelineOutput {
            command: "pipeline.info".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            info: Some(info),
            ..Default::default()
        },
        0,
    ))
}

fn executions(pipeline_id: &str, status: Option<&str>) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let executions = client.pipeline_executions(pipeline_id, status)?;

    Ok((
        PipelineOutput {
            command: "pipeline.executions".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            executions: Some(executions),
            ..Default::default()
        },
        0,
    ))
}

fn details(pipeline_id: &str, execution_id: &str) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let details = client.pipeline_execution_details(pipeline_id, execution_id)?;

    Ok((
        PipelineOutput {
            command: "pipeline.details".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            details: Some(details),
            ..Default::default()
        },
        0,
    ))
}

fn build_logs(pipeline_id: &str) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let build_logs = client.pipeline_build_logs(pipeline_id)?;

    Ok((
        PipelineOutput {
            command: "pipeline.buildlogs".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            build_logs: Some(build_logs),
            ..Default::default()
        },
        0,
    ))
}

fn stop(pipeline_id: &str) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let response = client.stop_pipeline(pipeline_id)?;

    Ok((
        PipelineOutput {
            command: "pipeline.stop".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}

fn resume(pipeline_id: &str) -> CmdResult<PipelineOutput> {
    let client = super::env_client()?;
    let response = client.resume_pipeline(pipeline_id)?;

    Ok((
        PipelineOutput {
            command: "pipeline.resume".to_string(),
            pipeline_id: Some(pipeline_id.to_string()),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}
