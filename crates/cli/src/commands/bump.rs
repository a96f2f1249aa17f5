//! `rigger bump` - bump the version in package manifests

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use rigger_common::{config::default_manifests, BumpLevel};
use rigger_harness::bump_manifest;

use super::{resolve, Context};
use crate::output::{print_success, print_table, print_warning, TableDisplay};

#[derive(Args, Debug)]
pub struct BumpArgs {
    /// Bump the major version
    #[arg(long, conflicts_with = "patch")]
    pub major: bool,

    /// Bump the patch version
    #[arg(long)]
    pub patch: bool,

    /// Manifests to bump (default: package.json and bower.json)
    pub files: Vec<PathBuf>,
}

impl BumpArgs {
    pub fn level(&self) -> BumpLevel {
        if self.major {
            BumpLevel::Major
        } else if self.patch {
            BumpLevel::Patch
        } else {
            BumpLevel::Minor
        }
    }
}

#[derive(Serialize)]
struct BumpRow {
    file: String,
    previous: String,
    current: String,
}

impl TableDisplay for BumpRow {
    fn headers() -> Vec<&'static str> {
        vec!["File", "Previous", "Current"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.file.clone(), self.previous.clone(), self.current.clone()]
    }
}

pub async fn execute(args: BumpArgs, ctx: &Context) -> Result<()> {
    let level = args.level();
    let files = if args.files.is_empty() {
        let base = ctx.workdir();
        default_manifests()
            .iter()
            .map(|f| resolve(&base, f))
            .collect()
    } else {
        args.files.clone()
    };

    let mut rows = Vec::new();
    for file in &files {
        if !file.exists() {
            print_warning(&format!("{} not found, skipping", file.display()));
            continue;
        }
        let outcome = bump_manifest(file, level).await?;
        rows.push(BumpRow {
            file: outcome.path.display().to_string(),
            previous: outcome.previous.to_string(),
            current: outcome.current.to_string(),
        });
    }

    if rows.is_empty() {
        bail!("No manifests found to bump");
    }

    print_table(&rows);
    print_success(&format!("Bumped {} manifest(s) ({})", rows.len(), level));
    Ok(())
}
