//! `rigger run` - run named tasks in order

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{finish_run, Context};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tasks to run, in order
    #[arg(default_value = "default")]
    pub tasks: Vec<String>,
}

pub async fn execute(args: RunArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let orchestrator = ctx.orchestrator(&config)?;

    // A test task interrupted mid-session must still stop its processes
    let trap = orchestrator.register_on_interrupt()?;

    info!("Running {}", args.tasks.join(", "));
    let summary = ctx.runner(config, orchestrator).run(&args.tasks).await?;

    trap.disarm();
    finish_run(&summary)
}
