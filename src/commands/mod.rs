use std::io::{self, Write};
use std::path::PathBuf;

use conveyor::{config, defaults, ApiClient, JobConfig, LogStream};

pub type CmdResult<T> = conveyor::Result<(T, i32)>;

pub mod create;
pub mod deploy;
pub mod job;
pub mod pipeline;
pub mod run;
pub mod stats;

/// Client for commands that operate on existing jobs and pipelines; the
/// token comes from the environment alone since no config file is in play.
pub(crate) fn env_client() -> conveyor::Result<ApiClient> {
    let token = config::env_token()?;
    ApiClient::new(token)
}

/// Write a token-bearing copy of the config to a temp file for config-only
/// submissions. The user's own file is never rewritten.
pub(crate) fn stage_config_only(
    config: &JobConfig,
) -> conveyor::Result<(tempfile::TempDir, PathBuf)> {
    let staging = tempfile::tempdir()?;
    let path = staging.path().join(defaults::CONFIG_FILE_NAME);
    config.save(&path)?;
    Ok((staging, path))
}

/// Print every streamed line to stdout. A closed pipe ends the stream
/// quietly instead of erroring.
pub(crate) fn stream_to_stdout(stream: LogStream) -> conveyor::Result<usize> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let mut lines = 0usize;
    for line in stream {
        let line = line?;
        if let Err(e) = writeln!(handle, "{}", line) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                break;
            }
            return Err(e.into());
        }
        lines += 1;
    }
    Ok(lines)
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (conveyor::Result<serde_json::Value>, i32) {
    crate::tty::status("conveyor is working...");

    match command {
        crate::Commands::Create(args) => dispatch!(args, create),
        crate::Commands::Deploy(args) => dispatch!(args, deploy),
        crate::Commands::Run(args) => dispatch!(args, run),
        crate::Commands::Job(args) => dispatch!(args, job),
        crate::Commands::Pipeline(args) => dispatch!(args, pipeline),
        crate::Commands::Stats(args) => dispatch!(args, stats),
    }
}
