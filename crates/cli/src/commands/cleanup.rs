//! Cleanup command

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use notes_e2e::cleanup::CleanupCoordinator;
use notes_e2e::runner::RunResult;
use notes_e2e::{E2eConfig, HttpAdminApi};

use crate::output::{print_item, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct CleanupArgs {
    /// Results file written by `provision`
    #[arg(long, default_value = "fixture-results/fixture-results.json")]
    pub results: PathBuf,

    /// Run to purge (defaults to the run recorded in the results file)
    #[arg(long, env = "NOTES_E2E_RUN_ID")]
    pub run_id: Option<String>,
}

pub async fn execute(args: CleanupArgs, config: E2eConfig, format: OutputFormat) -> Result<()> {
    let result = RunResult::load(&args.results)
        .with_context(|| format!("reading results from {}", args.results.display()))?;
    let run_id = args.run_id.unwrap_or(result.run_id);

    let admin = HttpAdminApi::from_config(&config)?;
    let report = CleanupCoordinator::new(&admin, &config.cleanup, &run_id)
        .run(&result.records)
        .await;

    print_item(&report, format);
    if report.is_clean() {
        print_success(&format!("Run {} cleaned up ({} deleted)", run_id, report.deleted));
    } else {
        for failure in &report.errors {
            print_warning(&failure.message);
        }
    }
    Ok(())
}
