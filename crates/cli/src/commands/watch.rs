//! `rigger watch` - rebuild on source changes while processes stay up

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::{error, info};

use rigger_harness::{FileWatcher, HarnessError};

use super::Context;
use crate::output::{print_info, print_success, print_warning};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Task re-run on every change (defaults to the configured watch task)
    #[arg(long)]
    pub task: Option<String>,
}

pub async fn execute(args: WatchArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let mut watch = config.watch_config();
    if let Some(task) = args.task {
        watch.task = task;
    }
    if config.task(&watch.task).is_none() {
        return Err(HarnessError::UnknownTask(watch.task).into());
    }

    let workdir = ctx.workdir();
    let mut watcher = FileWatcher::new(&watch, &workdir)
        .with_context(|| format!("Cannot watch {:?} in {}", watch.paths, workdir.display()))?;

    let orchestrator = ctx.orchestrator(&config)?;
    let trap = orchestrator.register_on_interrupt()?;
    orchestrator.setup().await?;

    let runner = ctx.runner(config, orchestrator.clone()).with_external_session(true);
    let tasks = vec![watch.task.clone()];

    run_once(&runner, &tasks).await;
    print_info(&format!("Watching for changes, running {} on each", watch.task));

    while let Some(changed) = watcher.next_change().await {
        info!("{} file(s) changed", changed.len());
        for path in &changed {
            info!("  {}", path.display());
        }
        run_once(&runner, &tasks).await;
    }

    print_warning("File watcher stopped");
    orchestrator.teardown().await?;
    trap.disarm();
    Ok(())
}

/// Run the watch task; failures are reported and watching continues
async fn run_once(runner: &rigger_harness::TaskRunner, tasks: &[String]) {
    match runner.run(tasks).await {
        Ok(summary) => match summary.failure() {
            None => print_success(&format!("{} finished in {}ms", tasks.join(", "), summary.duration_ms)),
            Some(failed) => error!(
                "{} failed: {}",
                failed.name,
                failed.error.as_deref().unwrap_or("unknown error")
            ),
        },
        Err(e) => error!("{}", e),
    }
}
