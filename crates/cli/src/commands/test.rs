//! `rigger test` - run tests inside a process session

use anyhow::Result;
use clap::Args;

use rigger_common::{CommandSpec, RigConfig, TaskSpec};
use rigger_harness::HarnessError;

use super::{finish_run, Context};

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Configured task to run
    #[arg(long, default_value = "test")]
    pub task: String,

    /// Ad-hoc test command, run instead of the configured task
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// The ad-hoc command as a test task, if one was given
pub fn adhoc_task(command: &[String]) -> Option<TaskSpec> {
    let (program, args) = command.split_first()?;
    Some(TaskSpec::Test(CommandSpec::new(program.clone(), args.iter().cloned())))
}

/// The named task must exist and be a test (or a sequence around one)
pub fn check_test_task(ctx: &Context, config: &RigConfig, name: &str) -> Result<()> {
    match config.task(name) {
        Some(TaskSpec::Test(_)) | Some(TaskSpec::Sequence { .. }) => Ok(()),
        Some(other) => Err(ctx.config_error(format!(
            "task {} is a {} task, not a test",
            name,
            other.kind()
        ))),
        None => Err(HarnessError::UnknownTask(name.to_string()).into()),
    }
}

pub async fn execute(args: TestArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    let adhoc = adhoc_task(&args.command);
    if adhoc.is_none() {
        check_test_task(ctx, &config, &args.task)?;
    }

    let orchestrator = ctx.orchestrator(&config)?;
    let trap = orchestrator.register_on_interrupt()?;
    let runner = ctx.runner(config, orchestrator);

    let summary = match adhoc {
        Some(task) => runner.run_spec("test", &task).await?,
        None => runner.run(std::slice::from_ref(&args.task)).await?,
    };

    trap.disarm();
    finish_run(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{exit_code, EXIT_CONFIG_ERROR};

    fn config() -> RigConfig {
        RigConfig::from_toml(
            r#"
            [tasks.lint]
            kind = "exec"
            command = "jshint"

            [tasks.protractor]
            kind = "test"
            command = "protractor"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_non_test_task_is_config_error() {
        let ctx = Context::new("rigger.toml".into());
        let err = check_test_task(&ctx, &config(), "lint").unwrap_err();
        assert!(err.to_string().contains("lint is a exec task"));
        assert_eq!(exit_code(&err), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_check_test_task() {
        let ctx = Context::new("rigger.toml".into());
        assert!(check_test_task(&ctx, &config(), "protractor").is_ok());

        let err = check_test_task(&ctx, &config(), "missing").unwrap_err();
        assert_eq!(exit_code(&err), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_adhoc_task() {
        assert!(adhoc_task(&[]).is_none());

        let command = vec!["protractor".to_string(), "protractor.config.js".to_string()];
        match adhoc_task(&command) {
            Some(TaskSpec::Test(cmd)) => {
                assert_eq!(cmd.command, "protractor");
                assert_eq!(cmd.args, vec!["protractor.config.js"]);
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }
}
