use std::env;

/// Environment variable consulted for the backend base URL.
pub const API_URL_ENV: &str = "CONVEYOR_API_URL";

/// Environment variable consulted for the API token when the config file
/// does not carry one.
pub const API_TOKEN_ENV: &str = "CONVEYOR_API_TOKEN";

/// Config key holding the API token inside the job/pipeline config file.
pub const TOKEN_CONFIG_KEY: &str = "conveyor_api_token";

/// Base URL used when CONVEYOR_API_URL is unset.
pub const DEFAULT_API_URL: &str = "https://api.conveyor.run/api";

/// Name the staged config file always gets, regardless of the path the
/// user passed on the command line.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Archive name for a single-job bundle.
pub const PROJECT_ARCHIVE_NAME: &str = "project.zip";

/// Archive name for a pipeline bundle.
pub const PIPELINE_ARCHIVE_NAME: &str = "pipeline.zip";

/// Subdirectory of the staging area that holds the assembled pipeline tree.
pub const PIPELINE_DIR_NAME: &str = "pipeline";

/// Resolve the backend base URL, preferring CONVEYOR_API_URL.
///
/// A trailing slash is stripped so endpoint paths can be joined with a
/// plain `format!("{base}/jobs")`.
pub fn api_base_url() -> String {
    let url = env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    url.trim_end_matches('/').to_string()
}
