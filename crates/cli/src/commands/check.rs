//! `rigger check` - validate the configuration without running anything

use anyhow::Result;

use super::Context;
use crate::output::{print_info, print_success};

pub async fn execute(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    // Builds every readiness probe, which catches malformed URLs
    let orchestrator = ctx.orchestrator(&config)?;

    print_success(&format!(
        "{} is valid: {} process(es), {} task(s)",
        ctx.config_path.display(),
        orchestrator.len(),
        config.tasks.len()
    ));
    if let Some(watch) = &config.watch {
        print_info(&format!(
            "Watching {} for {}",
            watch
                .paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            watch.task
        ));
    }
    Ok(())
}
