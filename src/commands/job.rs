use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use conveyor::api::{ArtifactDownload, JobExecutions, JobSummary};
use conveyor::{paths, Error, JobSelector};

use super::CmdResult;

#[derive(Args)]
pub struct JobArgs {
    #[command(subcommand)]
    command: JobCommand,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// List jobs
    List {
        /// Filter jobs by status
        #[arg(long)]
        status: Option<String>,
        /// Filter jobs by pipeline execution ID
        #[arg(long)]
        pipeline_execution_id: Option<String>,
    },
    /// List executions for a job
    Executions {
        /// Job ID
        job_id: String,
        /// Filter executions by status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show the stored configuration of a job
    Info {
        /// Job ID
        job_id: String,
    },
    /// Fetch logs for a job or one of its executions
    Logs {
        /// Job ID
        #[arg(long, conflicts_with = "execution_id")]
        job_id: Option<String>,
        /// Job execution ID
        #[arg(long)]
        execution_id: Option<String>,
        /// Stream the logs in real time
        #[arg(short, long)]
        follow: bool,
    },
    /// Fetch image build logs for a job
    Buildlogs {
        /// Job ID
        job_id: String,
    },
    /// Download and unpack the artifacts of a job or one of its executions
    Artifacts {
        /// Job ID
        #[arg(long, conflicts_with = "execution_id")]
        job_id: Option<String>,
        /// Job execution ID
        #[arg(long)]
        execution_id: Option<String>,
        /// Directory to unpack into
        #[arg(short, long)]
        output_dir: Option<String>,
    },
    /// Stop a running job
    Stop {
        /// Job ID
        job_id: String,
    },
    /// Resume a stopped job
    Resume {
        /// Job ID
        job_id: String,
    },
    /// Delete a job
    Delete {
        /// Job ID
        job_id: String,
    },
}

/// Following logs prints raw lines to stdout instead of the JSON envelope.
pub fn is_streaming(args: &JobArgs) -> bool {
    matches!(args.command, JobCommand::Logs { follow: true, .. })
}

pub fn run(args: JobArgs) -> CmdResult<JobOutput> {
    match args.command {
        JobCommand::List {
            status,
            pipeline_execution_id,
        } => list(status.as_deref(), pipeline_execution_id.as_deref()),
        JobCommand::Executions { job_id, status } => executions(&job_id, status.as_deref()),
        JobCommand::Info { job_id } => info(&job_id),
        JobCommand::Logs {
            job_id,
            execution_id,
            follow,
        } => logs(selector(job_id, execution_id)?, follow),
        JobCommand::Buildlogs { job_id } => build_logs(&job_id),
        JobCommand::Artifacts {
            job_id,
            execution_id,
            output_dir,
        } => artifacts(selector(job_id, execution_id)?, output_dir.as_deref()),
        JobCommand::Stop { job_id } => stop(&job_id),
        JobCommand::Resume { job_id } => resume(&job_id),
        JobCommand::Delete { job_id } => delete(&job_id),
    }
}

#[derive(Serialize, Default)]
pub struct JobOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<JobSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executions: Option<JobExecutions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactDownload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

fn selector(job_id: Option<String>, execution_id: Option<String>) -> conveyor::Result<JobSelector> {
    match (job_id, execution_id) {
        (Some(id), None) => Ok(JobSelector::Job(id)),
        (None, Some(id)) => Ok(JobSelector::Execution(id)),
        _ => Err(Error::Config(
            "provide either --job-id or --execution-id".to_string(),
        )),
    }
}

fn list(status: Option<&str>, pipeline_execution_id: Option<&str>) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let jobs = client.list_jobs(status, pipeline_execution_id)?;

    Ok((
        JobOutput {
            command: "job.list".to_string(),
            jobs: Some(jobs),
            ..Default::default()
        },
        0,
    ))
}

fn executions(job_id: &str, status: Option<&str>) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let executions = client.job_executions(job_id, status)?;

    Ok((
        JobOutput {
            command: "job.executions".to_string(),
            job_id: Some(job_id.to_string()),
            executions: Some(executions),
            ..Default::default()
        },
        0,
    ))
}

fn info(job_id: &str) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let info = client.job_info(job_id)?;

    Ok((
        JobOutput {
            command: "job.info".to_string(),
            job_id: Some(job_id.to_string()),
            info: Some(info),
            ..Default::default()
        },
        0,
    ))
}

fn logs(selector: JobSelector, follow: bool) -> CmdResult<JobOutput> {
    let client = super::env_client()?;

    if follow {
        let stream = client.follow_job_logs(&selector)?;
        super::stream_to_stdout(stream)?;

        return Ok((
            JobOutput {
                command: "job.logs.follow".to_string(),
                ..Default::default()
            },
            0,
        ));
    }

    let logs = client.job_logs(&selector)?;

    Ok((
        JobOutput {
            command: "job.logs".to_string(),
            logs: Some(logs),
            ..Default::default()
        },
        0,
    ))
}

fn build_logs(job_id: &str) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let build_logs = client.job_build_logs(job_id)?;

    Ok((
        JobOutput {
            command: "job.buildlogs".to_string(),
            job_id: Some(job_id.to_string()),
            build_logs: Some(build_logs),
            ..Default::default()
        },
        0,
    ))
}

fn artifacts(selector: JobSelector, output_dir: Option<&str>) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let output_dir = output_dir.map(paths::expand).transpose()?;
    let artifacts = client.download_artifacts(&selector, output_dir.as_deref())?;

    Ok((
        JobOutput {
            command: "job.artifacts".to_string(),
            artifacts: Some(artifacts),
            ..Default::default()
        },
        0,
    ))
}

fn stop(job_id: &str) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let response = client.stop_job(job_id)?;

    Ok((
        JobOutput {
            command: "job.stop".to_string(),
            job_id: Some(job_id.to_string()),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}

fn resume(job_id: &str) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let response = client.resume_job(job_id)?;

    Ok((
        JobOutput {
            command: "job.resume".to_string(),
            job_id: Some(job_id.to_string()),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}

fn delete(job_id: &str) -> CmdResult<JobOutput> {
    let client = super::env_client()?;
    let response = client.delete_job(job_id)?;

    Ok((
        JobOutput {
            command: "job.delete".to_string(),
            job_id: Some(job_id.to_string()),
            response: Some(response),
            ..Default::default()
        },
        0,
    ))
}
