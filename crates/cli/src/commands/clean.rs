//! `rigger clean` - remove build output

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use rigger_common::{config::default_clean_paths, TaskSpec};

use super::{finish_run, Context};

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Paths to remove (default: the configured clean task, else dist and temp)
    pub paths: Vec<PathBuf>,
}

pub async fn execute(args: CleanArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    let paths = if !args.paths.is_empty() {
        args.paths
    } else {
        match config.task("clean") {
            Some(TaskSpec::Clean { paths }) => paths.clone(),
            _ => default_clean_paths(),
        }
    };

    let orchestrator = ctx.orchestrator(&config)?;
    let summary = ctx
        .runner(config, orchestrator)
        .run_spec("clean", &TaskSpec::Clean { paths })
        .await?;
    finish_run(&summary)
}
