use clap::Args;
use serde::Serialize;
use serde_json::Value;

use super::CmdResult;

#[derive(Args)]
pub struct StatsArgs {}

#[derive(Serialize)]
pub struct StatsOutput {
    pub command: String,
    pub stats: Value,
}

pub fn run(_args: StatsArgs) -> CmdResult<StatsOutput> {
    let client = super::env_client()?;
    let stats = client.stats()?;

    Ok((
        StatsOutput {
            command: "stats".to_string(),
            stats,
        },
        0,
    ))
}
