//! Runs fixture plans through a [`Provisioner`] and records the results

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::admin::AdminApi;
use crate::cleanup::CleanupReport;
use crate::driver::UiDriver;
use crate::error::{E2eError, E2eResult};
use crate::model::{ProvisionedResourceRecord, ResourceSpec};
use crate::plan::FixturePlan;
use crate::provisioner::Provisioner;

/// Result of provisioning one plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub resources: Vec<ProvisionedResourceRecord>,
    pub error: Option<String>,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub plans: Vec<PlanResult>,
    /// Every record the engine created, including synthetic parents
    pub records: Vec<ProvisionedResourceRecord>,
    #[serde(default)]
    pub cleanup: Option<CleanupReport>,
}

impl RunResult {
    pub fn load(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub struct FixtureRunner<D: UiDriver> {
    provisioner: Arc<Provisioner<D>>,
    output_dir: PathBuf,
}

impl<D: UiDriver> FixtureRunner<D> {
    pub fn new(provisioner: Arc<Provisioner<D>>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            provisioner,
            output_dir: output_dir.into(),
        }
    }

    pub fn provisioner(&self) -> &Arc<Provisioner<D>> {
        &self.provisioner
    }

    /// Provision every plan in order. A failing plan does not stop the others.
    pub async fn run_plans(&self, plans: &[FixturePlan]) -> RunResult {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("Provisioning {} plan(s)...", plans.len());

        for plan in plans {
            let result = self.run_plan(plan).await;
            if result.success {
                passed += 1;
                info!(
                    "✓ {} ({} resources, {} ms)",
                    result.name,
                    result.resources.len(),
                    result.duration_ms
                );
            } else {
                failed += 1;
                let reason = result.error.as_deref().unwrap_or("unknown error");
                error!("✗ {} - {}", result.name, reason);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Plans: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        RunResult {
            run_id: self.provisioner.config().run_id.clone(),
            total: plans.len(),
            passed,
            failed,
            duration_ms,
            plans: results,
            records: self.provisioner.records(),
            cleanup: None,
        }
    }

    /// Provision one plan, stopping at its first failure.
    pub async fn run_plan(&self, plan: &FixturePlan) -> PlanResult {
        let start = Instant::now();
        debug!("Running plan: {}", plan.name);

        let mut resolved: HashMap<&str, String> = HashMap::new();
        let mut resources = Vec::new();
        let mut error = None;

        for resource in &plan.resources {
            let parent = match resource.parent.as_deref() {
                Some(key) => match resolved.get(key) {
                    Some(label) => Some(label.clone()),
                    None => {
                        let err = E2eError::PlanParse(format!("unresolved parent '{}'", key));
                        error = Some(err.to_string());
                        break;
                    }
                },
                None => None,
            };

            let spec = ResourceSpec {
                kind: resource.kind,
                requested_name: resource.name.clone(),
                parent,
                content: resource.content.clone(),
            };

            match self.provisioner.provision(spec).await {
                Ok(record) => {
                    resolved.insert(resource.key(), record.resolved_name.clone());
                    resources.push(record);
                }
                Err(e) => {
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        PlanResult {
            name: plan.name.clone(),
            success: error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            resources,
            error,
        }
    }

    /// Clean up and attach the report to `result`.
    pub async fn cleanup<A: AdminApi + ?Sized>(
        &self,
        admin: &A,
        result: &mut RunResult,
    ) -> CleanupReport {

        let report = self.provisioner.cleanup_all(admin).await;
        result.cleanup = Some(report.clone());
        report
    }

    /// Write results to JSON file
    pub fn write_results(&self, result: &RunResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("fixture-results.json");
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
