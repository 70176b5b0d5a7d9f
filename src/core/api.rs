use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::archive;
use crate::core::bundle::Bundle;
use crate::core::defaults;
use crate::core::error::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Blocking client for the conveyor backend. One instance per CLI invocation;
/// every request carries the bearer token resolved at startup.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_base_url(defaults::api_base_url(), token)
    }

    /// Only a connect timeout is set. Log follows and pipeline submissions
    /// hold the connection open for as long as the remote run takes, so an
    /// overall request timeout would cut them off mid-stream.
    pub fn with_base_url(base_url: String, token: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("conveyor/{}", VERSION))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(ApiClient {
            http,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    // ----- submission -----

    /// Multipart submit of a staged job bundle to `/create-job`. `run`
    /// controls whether the backend starts the job right after the build.
    pub fn submit_job(&self, bundle: &Bundle, run: bool) -> Result<Value> {
        log_status!("submit", "sending job bundle to {}", self.base_url);
        let form = Form::new()
            .part("config_file", yaml_part(&bundle.config_path)?)
            .part(
                "project_file",
                zip_part(&bundle.archive_path, defaults::PROJECT_ARCHIVE_NAME)?,
            );
        self.submit("/create-job", Some(run), form)
    }

    /// Config-only job submission, used when the config declares no entry
    /// script and there is nothing to bundle.
    pub fn submit_job_config(&self, config_path: &Path, run: bool) -> Result<Value> {
        let form = Form::new().part("config_file", yaml_part(config_path)?);
        self.submit("/create-job", Some(run), form)
    }

    /// Pipeline submission. The backend streams build progress back in the
    /// response body, so the caller gets a [`LogStream`] rather than an ack.
    pub fn submit_pipeline(&self, bundle: &Bundle) -> Result<LogStream> {
        log_status!("submit", "sending pipeline bundle to {}", self.base_url);
        let form = Form::new()
            .part("config_file", yaml_part(&bundle.config_path)?)
            .part(
                "pipeline_file",
                zip_part(&bundle.archive_path, defaults::PIPELINE_ARCHIVE_NAME)?,
            );
        let response = check(self.post("/create-pipeline").multipart(form).send()?)?;
        Ok(LogStream::new(response))
    }

    /// Model-serving variant of [`submit_job`](Self::submit_job) against
    /// `/deploy-model`.
    pub fn deploy_model(&self, bundle: &Bundle) -> Result<Value> {
        log_status!("submit", "sending deployment bundle to {}", self.base_url);
        let form = Form::new()
            .part("config_file", yaml_part(&bundle.config_path)?)
            .part(
                "project_file",
                zip_part(&bundle.archive_path, defaults::PROJECT_ARCHIVE_NAME)?,
            );
        self.submit("/deploy-model", None, form)
    }

    pub fn deploy_model_config(&self, config_path: &Path) -> Result<Value> {
        let form = Form::new().part("config_file", yaml_part(config_path)?);
        self.submit("/deploy-model", None, form)
    }

    fn submit(&self, endpoint: &str, run: Option<bool>, form: Form) -> Result<Value> {
        let mut request = self.post(endpoint).multipart(form);
        if let Some(run) = run {
            request = request.query(&[("run", if run { "true" } else { "false" })]);
        }
        Ok(check(request.send()?)?.json()?)
    }

    // ----- execution -----

    pub fn run_job(&self, job_id: &str, data_file: Option<&Path>) -> Result<Value> {
        self.run(&format!("/run-job/{job_id}"), data_file)
    }

    pub fn run_pipeline(&self, pipeline_id: &str, data_file: Option<&Path>) -> Result<Value> {
        self.run(&format!("/run-pipeline/{pipeline_id}"), data_file)
    }

    fn run(&self, endpoint: &str, data_file: Option<&Path>) -> Result<Value> {
        let mut request = self.post(endpoint);
        if let Some(path) = data_file {
            request = request.multipart(Form::new().part("file", data_part(path)?));
        }
        Ok(check(request.send()?)?.json()?)
    }

    // ----- jobs -----

    pub fn list_jobs(
        &self,
        status: Option<&str>,
        pipeline_execution_id: Option<&str>,
    ) -> Result<Vec<JobSummary>> {
        let mut request = self.get("/jobs");
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        if let Some(id) = pipeline_execution_id {
            request = request.query(&[("pipeline_execution_id", id)]);
        }
        let mut jobs: Vec<JobSummary> = check(request.send()?)?.json()?;
        for job in &mut jobs {
            job.normalize();
        }
        Ok(jobs)
    }

    pub fn job_info(&self, job_id: &str) -> Result<Value> {
        Ok(check(self.get(&format!("/jobs/{job_id}")).send()?)?.json()?)
    }

    pub fn job_executions(&self, job_id: &str, status: Option<&str>) -> Result<JobExecutions> {
        let mut request = self.get(&format!("/jobs/{job_id}/executions"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        let mut data: JobExecutions = check(request.send()?)?.json()?;
        for execution in &mut data.executions {
            execution.normalize();
        }
        Ok(data)
    }

    pub fn job_build_logs(&self, job_id: &str) -> Result<String> {
        let body: Value = check(self.get(&format!("/jobs/{job_id}/build-logs")).send()?)?.json()?;
        Ok(extract_text(&body, "build_logs"))
    }

    /// One-shot log fetch for a job or a single execution.
    pub fn job_logs(&self, selector: &JobSelector) -> Result<String> {
        let (key, id) = selector.query_pair();
        let body: Value = check(
            self.get("/job-logs")
                .query(&[("follow", "false"), (key, id)])
                .send()?,
        )?
        .json()?;
        Ok(extract_text(&body, "logs"))
    }

    /// Live log follow. The backend frames lines as server-sent events;
    /// [`LogStream`] unwraps the framing.
    pub fn follow_job_logs(&self, selector: &JobSelector) -> Result<LogStream> {
        let (key, id) = selector.query_pair();
        let response = check(
            self.get("/job-logs")
                .query(&[("follow", "true"), (key, id)])
                .send()?,
        )?;
        Ok(LogStream::new(response))
    }

    /// Download the artifact archive for a job or execution, unpack it into
    /// `output_dir` (or a fresh `conveyor-artifacts-<execution_id>` directory
    /// next to the current directory) and delete the archive afterwards.
    pub fn download_artifacts(
        &self,
        selector: &JobSelector,
        output_dir: Option<&Path>,
    ) -> Result<ArtifactDownload> {
        let (key, id) = selector.query_pair();
        let mut response = check(self.get("/jobs/artifacts").query(&[(key, id)]).send()?)?;

        // The backend names the attachment artifacts_<execution_id>.zip; the
        // id recovered from it labels the default output directory.
        let execution_id = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename)
            .and_then(|name| execution_id_from_filename(&name))
            .unwrap_or_else(|| id.to_string());

        let dir_path = match output_dir {
            Some(dir) => std::path::absolute(dir)?,
            None => {
                let cwd = std::env::current_dir()?;
                unused_dir(&cwd, &format!("conveyor-artifacts-{execution_id}"))
            }
        };
        fs::create_dir_all(&dir_path)?;

        let zip_path = dir_path.join("artifacts.zip");
        {
            let mut file = File::create(&zip_path)?;
            response.copy_to(&mut file)?;
        }

        let files_written = archive::unpack(&zip_path, &dir_path)?;
        fs::remove_file(&zip_path)?;

        log_status!(
            "artifacts",
            "extracted {} files to {}",
            files_written,
            dir_path.display()
        );

        Ok(ArtifactDownload {
            output_dir: dir_path,
            files_written,
        })
    }

    pub fn stop_job(&self, job_id: &str) -> Result<Value> {
        ack(self.post(&format!("/jobs/{job_id}/stop")).send()?)
    }

    pub fn resume_job(&self, job_id: &str) -> Result<Value> {
        ack(self.post(&format!("/jobs/{job_id}/resume")).send()?)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<Value> {
        ack(self.delete(&format!("/jobs/{job_id}")).send()?)
    }

    // ----- pipelines -----

    pub fn list_pipelines(
        &self,
        status: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Vec<PipelineSummary>> {
        let mut request = self.get("/pipelines");
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        if let Some(date) = start_date {
            request = request.query(&[("start_date", date)]);
        }
        if let Some(date) = end_date {
            request = request.query(&[("end_date", date)]);
        }
        let mut pipelines: Vec<PipelineSummary> = check(request.send()?)?.json()?;
        for pipeline in &mut pipelines {
            pipeline.normalize();
        }
        Ok(pipelines)
    }

    pub fn pipeline_info(&self, pipeline_id: &str) -> Result<Value> {
        Ok(check(self.get(&format!("/pipelines/{pipeline_id}")).send()?)?.json()?)
    }

    pub fn pipeline_build_logs(&self, pipeline_id: &str) -> Result<String> {
        let body: Value = check(
            self.get(&format!("/pipelines/{pipeline_id}/build-logs"))
                .send()?,
        )?
        .json()?;
        Ok(extract_text(&body, "build_logs"))
    }

    pub fn pipeline_executions(
        &self,
        pipeline_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<PipelineExecutionSummary>> {
        let mut request = self.get(&format!("/pipelines/{pipeline_id}/executions"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        let mut executions: Vec<PipelineExecutionSummary> = check(request.send()?)?.json()?;
        for execution in &mut executions {
            execution.normalize();
        }
        Ok(executions)
    }

    pub fn pipeline_execution_details(
        &self,
        pipeline_id: &str,
        execution_id: &str,
    ) -> Result<Value> {
        Ok(check(
            self.get(&format!(
                "/pipelines/{pipeline_id}/executions/{execution_id}"
            ))
            .send()?,
        )?
        .json()?)
    }

    pub fn stop_pipeline(&self, pipeline_id: &str) -> Result<Value> {
        ack(self.post(&format!("/pipelines/{pipeline_id}/stop")).send()?)
    }

    pub fn resume_pipeline(&self, pipeline_id: &str) -> Result<Value> {
        ack(self.post(&format!("/pipelines/{pipeline_id}/resume")).send()?)
    }

    // ----- stats -----

    pub fn stats(&self) -> Result<Value> {
        Ok(check(self.get("/stats").send()?)?.json()?)
    }
}

/// Either a job or one specific execution of it. The log and artifact
/// endpoints accept exactly one of the two.
#[derive(Debug, Clone)]
pub enum JobSelector {
    Job(String),
    Execution(String),
}

impl JobSelector {
    fn query_pair(&self) -> (&'static str, &str) {
        match self {
            JobSelector::Job(id) => ("job_id", id),
            JobSelector::Execution(id) => ("job_execution_id", id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub build_status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_execution_status: Option<String>,
    #[serde(default)]
    pub last_execution_start_time: Option<String>,
    #[serde(default)]
    pub last_execution_end_time: Option<String>,
    #[serde(default)]
    pub gpu_type: Option<Value>,
}

impl JobSummary {
    fn normalize(&mut self) {
        if let Some(created) = &self.created_at {
            self.created_at = Some(format_timestamp(created));
        }
        if let Some(start) = &self.last_execution_start_time {
            self.last_execution_start_time = Some(truncate_timestamp(start).to_string());
        }
        if let Some(end) = &self.last_execution_end_time {
            self.last_execution_end_time = Some(truncate_timestamp(end).to_string());
        }
    }
}

/// `/jobs/{id}/executions` wraps the execution list together with the job
/// type, which decides whether the deploy-only fields are meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutions {
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub executions: Vec<ExecutionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    #[serde(default)]
    pub job_execution_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub gpu_type: Option<Value>,
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl ExecutionSummary {
    fn normalize(&mut self) {
        if let Some(created) = &self.created {
            self.created = Some(format_timestamp(created));
        }
        if let Some(start) = &self.start_time {
            self.start_time = Some(truncate_timestamp(start).to_string());
        }
        if let Some(end) = &self.end_time {
            self.end_time = Some(truncate_timestamp(end).to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub pipeline_id: String,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub build_status: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_execution: Option<PipelineExecutionSummary>,
}

impl PipelineSummary {
    fn normalize(&mut self) {
        if let Some(created) = &self.created_at {
            self.created_at = Some(format_timestamp(created));
        }
        if let Some(execution) = &mut self.last_execution {
            execution.normalize();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecutionSummary {
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl PipelineExecutionSummary {
    fn normalize(&mut self) {
        if let Some(start) = &self.start_time {
            self.start_time = Some(truncate_timestamp(start).to_string());
        }
        if let Some(end) = &self.end_time {
            self.end_time = Some(truncate_timestamp(end).to_string());
        }
    }
}

/// Where an artifact download landed and how many files came out of it.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactDownload {
    pub output_dir: PathBuf,
    pub files_written: usize,
}

/// Streamed response body, line by line. Blank lines are skipped and SSE
/// `data:` framing is unwrapped, so callers always see bare log lines.
/// Finite once the connection closes; not restartable.
pub struct LogStream {
    lines: io::Lines<BufReader<Box<dyn Read>>>,
}

impl LogStream {
    fn new(response: Response) -> Self {
        Self::from_reader(Box::new(response))
    }

    fn from_reader(reader: Box<dyn Read>) -> Self {
        LogStream {
            lines: BufReader::new(reader).lines(),
        }
    }
}

impl Iterator for LogStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            match line {
                Ok(raw) => {
                    let text = unwrap_sse_frame(&raw);
                    if text.is_empty() {
                        continue;
                    }
                    return Some(Ok(text.to_string()));
                }
                Err(err) => return Some(Err(Error::Io(err))),
            }
        }
        None
    }
}

/// Non-success responses surface the backend body verbatim.
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Backend {
        status: status.as_u16(),
        body,
    })
}

/// Control endpoints (stop, resume, delete) are not guaranteed to answer
/// with JSON; empty bodies become null and plain text is passed through.
fn ack(response: Response) -> Result<Value> {
    let response = check(response)?;
    let text = response.text()?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn yaml_part(path: &Path) -> Result<Part> {
    let part = Part::bytes(fs::read(path)?)
        .file_name(defaults::CONFIG_FILE_NAME)
        .mime_str("application/x-yaml")?;
    Ok(part)
}

fn zip_part(path: &Path, name: &'static str) -> Result<Part> {
    let part = Part::bytes(fs::read(path)?)
        .file_name(name)
        .mime_str("application/zip")?;
    Ok(part)
}

fn data_part(path: &Path) -> Result<Part> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    Ok(Part::bytes(fs::read(path)?).file_name(name))
}

fn extract_text(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `data: hello` -> `hello`; non-SSE lines pass through untouched.
fn unwrap_sse_frame(line: &str) -> &str {
    match line.strip_prefix("data:") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    }
}

/// ISO-8601 input rendered as `YYYY-MM-DD HH:MM:SS`; anything unparsable is
/// truncated instead, which covers backends that already send the short form.
fn format_timestamp(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    truncate_timestamp(raw).to_string()
}

/// First 19 characters, the `YYYY-MM-DD HH:MM:SS` prefix of an ISO timestamp.
fn truncate_timestamp(raw: &str) -> &str {
    raw.get(..19).unwrap_or(raw)
}

/// First of `base`, `base-1`, `base-2`, ... under `parent` that does not
/// exist yet.
fn unused_dir(parent: &Path, base: &str) -> PathBuf {
    let mut dir = parent.join(base);
    let mut counter = 1;
    while dir.exists() {
        dir = parent.join(format!("{base}-{counter}"));
        counter += 1;
    }
    dir
}

/// Pull the bare filename out of a Content-Disposition header value.
fn attachment_filename(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let name = rest
        .split(';')
        .next()
        .unwrap_or(rest)
        .trim()
        .trim_matches('"');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// `artifacts_<execution_id>.zip` -> `<execution_id>`.
fn execution_id_from_filename(name: &str) -> Option<String> {
    let id = name.strip_prefix("artifacts_")?.strip_suffix(".zip")?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_in_the_listing_format() {
        assert_eq!(
            format_timestamp("2024-03-01T12:30:45Z"),
            "2024-03-01 12:30:45"
        );
        assert_eq!(
            format_timestamp("2024-03-01T12:30:45.123456+00:00"),
            "2024-03-01 12:30:45"
        );
        assert_eq!(
            format_timestamp("2024-03-01T12:30:45.123456"),
            "2024-03-01 12:30:45"
        );
        // Already short or unparsable input falls back to truncation.
        assert_eq!(
            format_timestamp("2024-03-01 12:30:45.999"),
            "2024-03-01 12:30:45"
        );
        assert_eq!(format_timestamp("pending"), "pending");
    }

    #[test]
    fn sse_frames_are_unwrapped() {
        assert_eq!(unwrap_sse_frame("data: hello"), "hello");
        assert_eq!(unwrap_sse_frame("data:hello"), "hello");
        assert_eq!(unwrap_sse_frame("plain line"), "plain line");
        assert_eq!(unwrap_sse_frame("data: "), "");
    }

    #[test]
    fn log_stream_skips_blanks_and_unwraps_frames() {
        let body = b"data: step one\n\ndata:step two\nplain\n\n".to_vec();
        let stream = LogStream::from_reader(Box::new(io::Cursor::new(body)));
        let lines: Vec<String> = stream.map(|line| line.unwrap()).collect();
        assert_eq!(lines, vec!["step one", "step two", "plain"]);
    }

    #[test]
    fn attachment_filenames_are_parsed() {
        assert_eq!(
            attachment_filename("attachment; filename=\"artifacts_abc123.zip\""),
            Some("artifacts_abc123.zip".to_string())
        );
        assert_eq!(
            attachment_filename("attachment; filename=artifacts_abc123.zip"),
            Some("artifacts_abc123.zip".to_string())
        );
        assert_eq!(attachment_filename("attachment"), None);
        assert_eq!(
            execution_id_from_filename("artifacts_abc123.zip"),
            Some("abc123".to_string())
        );
        assert_eq!(execution_id_from_filename("other.zip"), None);
    }

    #[test]
    fn artifact_dirs_get_counter_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let base = "conveyor-artifacts-e1";

        assert_eq!(unused_dir(dir.path(), base), dir.path().join(base));

        std::fs::create_dir(dir.path().join(base)).unwrap();
        assert_eq!(
            unused_dir(dir.path(), base),
            dir.path().join("conveyor-artifacts-e1-1")
        );

        std::fs::create_dir(dir.path().join("conveyor-artifacts-e1-1")).unwrap();
        assert_eq!(
            unused_dir(dir.path(), base),
            dir.path().join("conveyor-artifacts-e1-2")
        );
    }

    #[test]
    fn summaries_normalize_their_timestamps() {
        let mut job: JobSummary = serde_json::from_value(serde_json::json!({
            "job_id": "j1",
            "job_name": "train",
            "created_at": "2024-03-01T12:30:45Z",
            "last_execution_start_time": "2024-03-01T12:31:00.123456",
        }))
        .unwrap();
        job.normalize();
        assert_eq!(job.created_at.as_deref(), Some("2024-03-01 12:30:45"));
        assert_eq!(
            job.last_execution_start_time.as_deref(),
            Some("2024-03-01T12:31:00")
        );
        assert_eq!(job.last_execution_end_time, None);
    }
}
