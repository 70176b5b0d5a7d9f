use std::path::Path;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use conveyor::config::{self, JobConfig};
use conveyor::{bundle, paths, ApiClient};

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Entry script for the served model (bundled along with its directory)
    pub script: Option<String>,

    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: String,
}

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

pub fn run(args: DeployArgs) -> CmdResult<DeployOutput> {
    let config_path = paths::expand(&args.config)?;
    let mut config = JobConfig::load(&config_path)?;
    let token = config::resolve_token(&config)?;
    config.set_token(&token);

    let client = ApiClient::new(token)?;

    let response = match args.script.as_deref() {
        Some(script) => {
            // Unlike `create job`, the script is a plain CLI path argument,
            // resolved from the working directory.
            let script_path = paths::expand(script)?;
            let project_dir = script_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config_path.parent().unwrap_or(Path::new(".")).to_path_buf());

            let extra = super::create::config_base_name(&config_path);
            let bundle =
                bundle::stage_project(&project_dir, Some(&script_path), &mut config, &extra)?;
            client.deploy_model(&bundle)?
        }
        None => {
            let (_staging, staged_config) = super::stage_config_only(&config)?;
            client.deploy_model_config(&staged_config)?
        }
    };

    Ok((
        DeployOutput {
            command: "deploy".to_string(),
            job_name: config.job_name().map(str::to_string),
            response: Some(response),
        },
        0,
    ))
}
