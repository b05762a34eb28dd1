//! Provision command

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use notes_e2e::driver::{DialogPolicy, UiDriver};
use notes_e2e::playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
use notes_e2e::{E2eConfig, FixturePlan, FixtureRunner, HttpAdminApi, Provisioner};

use crate::output::{print_error, print_item, print_list, print_success, OutputFormat};

#[derive(Args)]
pub struct ProvisionArgs {
    /// Plan file or directory of plans
    pub plans: PathBuf,

    /// Only run plans carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Clean up everything again once provisioned
    #[arg(long)]
    pub cleanup: bool,

    /// Directory for the results file
    #[arg(long, default_value = "fixture-results")]
    pub output: PathBuf,

    /// Browser engine
    #[arg(long, default_value = "chromium")]
    pub browser: Browser,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

pub async fn execute(args: ProvisionArgs, config: E2eConfig, format: OutputFormat) -> Result<()> {
    let all = FixturePlan::load_all(&args.plans)?;
    let plans: Vec<FixturePlan> = match &args.tag {
        Some(tag) => FixturePlan::filter_by_tag(&all, tag).into_iter().cloned().collect(),
        None => all,
    };
    if plans.is_empty() {
        bail!("no fixture plans found in {}", args.plans.display());
    }

    let driver = PlaywrightDriver::launch(PlaywrightConfig {
        base_url: config.base_url.clone(),
        browser: args.browser,
        headless: !args.headed,
        ..PlaywrightConfig::default()
    })
    .await?;
    driver.on_native_dialog(DialogPolicy::Accept).await?;
    driver.navigate(&config.base_url).await?;

    info!("Run id: {}", config.run_id);
    let admin = HttpAdminApi::from_config(&config)?;
    let provisioner = Arc::new(Provisioner::new(Arc::new(driver), config));
    let runner = FixtureRunner::new(provisioner.clone(), &args.output);

    let mut result = runner.run_plans(&plans).await;
    print_list(&result.plans, format);
    print_list(&result.records, format);

    if args.cleanup {
        let report = runner.cleanup(&admin, &mut result).await;
        print_item(&report, format);
    }

    let path = runner.write_results(&result)?;

    if let Err(e) = provisioner.driver().close().await {
        warn!("Browser did not shut down cleanly: {}", e);
    }

    if result.failed > 0 {
        print_error(&format!("{} of {} plan(s) failed", result.failed, result.total));
        std::process::exit(1);
    }
    print_success(&format!(
        "{} plan(s) provisioned, results in {}",
        result.passed,
        path.display()
    ));
    Ok(())
}
