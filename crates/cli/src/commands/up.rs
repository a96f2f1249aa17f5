//! `rigger up` - start every process and keep it running until Ctrl-C

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use rigger_harness::Orchestrator;

use super::Context;
use crate::output::{print_info, print_success, print_table, TableDisplay};

#[derive(Serialize)]
struct StatusRow {
    name: String,
    state: String,
    pid: String,
}

impl TableDisplay for StatusRow {
    fn headers() -> Vec<&'static str> {
        vec!["Process", "State", "PID"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.state.clone(), self.pid.clone()]
    }
}

fn status_rows(orchestrator: &Orchestrator) -> Vec<StatusRow> {
    orchestrator
        .handles()
        .iter()
        .map(|h| StatusRow {
            name: h.name().to_string(),
            state: h.state().to_string(),
            pid: h.pid().map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

pub async fn execute(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let orchestrator: Arc<Orchestrator> = ctx.orchestrator(&config)?;

    // Armed before setup so an interrupt during a slow start still cleans up
    let _trap = orchestrator.register_on_interrupt()?;

    orchestrator.setup().await?;
    print_success(&format!("{} process(es) running", orchestrator.len()));
    print_table(&status_rows(&orchestrator));
    print_info("Press Ctrl-C to stop");

    // The trap tears the session down and exits the program
    std::future::pending::<()>().await;
    Ok(())
}
