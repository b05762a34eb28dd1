//! Suite-level teardown
//!
//! Two tiers: one bulk call for the whole run, and if that is unavailable
//! or fails, a per-identity pass (authenticate, delete known items, then
//! sweep the identity). Failures end up in the report; nothing is raised,
//! since the test outcome is already decided when this runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::admin::{AdminApi, AdminSession, BulkOutcome};
use crate::config::CleanupConfig;
use crate::model::ProvisionedResourceRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTier {
    /// Nothing to clean up; no calls issued
    #[default]
    Noop,
    Bulk,
    PerIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub identity: Option<String>,
    pub resource: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub tier: CleanupTier,
    pub deleted: usize,
    pub failed: usize,
    /// Every failure seen, including ones a later step recovered from
    pub errors: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn note(&mut self, identity: Option<&str>, resource: Option<&str>, message: String) {
        warn!(
            "cleanup: {}{}{}",
            identity.map(|i| format!("[{}] ", i)).unwrap_or_default(),
            resource.map(|r| format!("'{}': ", r)).unwrap_or_default(),
            message
        );
        self.errors.push(CleanupFailure {
            identity: identity.map(String::from),
            resource: resource.map(String::from),
            message,
        });
    }
}

pub struct CleanupCoordinator<'a, A: AdminApi + ?Sized> {
    admin: &'a A,
    config: &'a CleanupConfig,
    run_id: &'a str,
}

impl<'a, A: AdminApi + ?Sized> CleanupCoordinator<'a, A> {
    pub fn new(admin: &'a A, config: &'a CleanupConfig, run_id: &'a str) -> Self {
        Self { admin, config, run_id }
    }

    /// Remove every record this run created. Adopted items are left alone.
    pub async fn run(&self, records: &[ProvisionedResourceRecord]) -> CleanupReport {
        let targets: Vec<&ProvisionedResourceRecord> =
            records.iter().filter(|r| !r.adopted).collect();
        let mut report = CleanupReport::default();

        if targets.is_empty() {
            info!("Nothing to clean up for run {}", self.run_id);
            return report;
        }

        if self.config.bulk_enabled {
            match self.admin.bulk_delete_run(self.run_id).await {
                Ok(BulkOutcome::Deleted(count)) => {
                    info!(
                        "Bulk cleanup of run {} removed {} item(s) ({} known)",
                        self.run_id,
                        count,
                        targets.len()
                    );
                    report.tier = CleanupTier::Bulk;
                    report.deleted = targets.len();
                    return report;
                }
                Ok(BulkOutcome::Unavailable) => {
                    info!("Bulk cleanup unavailable, falling back to per-identity cleanup");
                }
                Err(e) => {
                    report.note(None, None, format!("bulk cleanup failed: {}", e));
                }
            }
        }

        report.tier = CleanupTier::PerIdentity;
        self.per_identity(&targets, &mut report).await;
        info!(
            "Per-identity cleanup finished: {} deleted, {} failed",
            report.deleted, report.failed
        );
        report
    }

    /// Authenticate as each seed identity in turn, delete the records it
    /// owns, then sweep it. Records without an owner are left to the sweeps.
    async fn per_identity(
        &self,
        targets: &[&ProvisionedResourceRecord],
        report: &mut CleanupReport,
    ) {
        let identities = &self.config.seed_identities;
        let known = |login: &str| identities.iter().any(|i| i.login == login);

        for record in targets {
            if let Some(owner) = record.owner.as_deref().filter(|o| !known(*o)) {
                report.failed += 1;
                report.note(
                    Some(owner),
                    Some(record.resolved_name.as_str()),

                    "no seed credentials for identity".to_string(),
                );
            }
        }

        let unowned = targets.iter().filter(|r| r.owner.is_none()).count();
        let mut swept_any = false;

        for identity in identities {
            let login = identity.login.as_str();
            // Newest first, so children go before their folders.
            let owned: Vec<&ProvisionedResourceRecord> = targets
                .iter()
                .rev()
                .filter(|r| r.owner.as_deref() == Some(login))
                .copied()
                .collect();

            let session = match self.admin.authenticate(identity).await {
                Ok(session) => session,
                Err(e) => {
                    report.failed += owned.len();
                    report.note(Some(login), None, format!("authentication failed: {}", e));
                    continue;
                }
            };

            swept_any |= self.clean_identity(&session, &owned, report).await;
        }

        if unowned == 0 {
            return;
        }
        if swept_any {
            report.deleted += unowned;
        } else {
            report.failed += unowned;
            report.note(
                None,
                None,
                format!("{} item(s) without an owner were not swept", unowned),
            );
        }
    }

    /// Delete `owned` one by one, then sweep the identity. Returns whether
    /// the sweep succeeded.
    async fn clean_identity(
        &self,
        session: &AdminSession,
        owned: &[&ProvisionedResourceRecord],
        report: &mut CleanupReport,
    ) -> bool {
        let login = session.identity.as_str();
        let mut remaining: HashSet<&str> = HashSet::new();

        for record in owned {
            let name = record.resolved_name.as_str();
            match record.resource_id.as_deref() {
                Some(id) => match self.admin.delete_resource(session, id).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        report.note(Some(login), Some(name), format!("delete failed: {}", e));
                        remaining.insert(name);
                    }
                },
                None => {
                    remaining.insert(name);
                }
            }
        }

        // The sweep removes whatever the individual deletes left behind.
        match self.admin.delete_identity_resources(session).await {
            Ok(count) => {
                info!("Swept {} item(s) owned by {}", count, login);
                report.deleted += remaining.len();
                true
            }
            Err(e) => {
                report.failed += remaining.len();
                report.note(Some(login), None, format!("identity sweep failed: {}", e));
                false
            }
        }
    }
}
