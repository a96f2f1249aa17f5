//! `rigger list` - show configured processes and tasks

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use rigger_common::RigConfig;

use super::Context;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct ProcessRow {
    pub name: String,
    pub command: String,
    pub readiness: String,
    pub stop_signal: String,
}

impl TableDisplay for ProcessRow {
    fn headers() -> Vec<&'static str> {
        vec!["Process", "Command", "Ready when", "Stop signal"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.command.clone(),
            self.readiness.clone(),
            self.stop_signal.clone(),
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub name: String,
    pub kind: String,
    pub summary: String,
}

impl TableDisplay for TaskRow {
    fn headers() -> Vec<&'static str> {
        vec!["Task", "Kind", "Runs"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.kind.clone(), self.summary.clone()]
    }
}

/// Processes in setup order
pub fn process_rows(config: &RigConfig) -> Vec<ProcessRow> {
    config
        .processes
        .iter()
        .map(|p| ProcessRow {
            name: p.name.clone(),
            command: p.command_line(),
            readiness: p.readiness.to_string(),
            stop_signal: p.stop_signal.to_string(),
        })
        .collect()
}

pub fn task_rows(config: &RigConfig) -> Vec<TaskRow> {
    config
        .tasks
        .iter()
        .map(|(name, task)| TaskRow {
            name: name.clone(),
            kind: task.kind().to_string(),
            summary: task.summary(),
        })
        .collect()
}

pub async fn execute(args: ListArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let processes = process_rows(&config);
    let tasks = task_rows(&config);

    if args.format == OutputFormat::Json {
        let listing = serde_json::json!({ "processes": processes, "tasks": tasks });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_list(&processes, args.format);
    println!();
    print_list(&tasks, args.format);
    Ok(())
}
