//! Provisioning facade exposed to test authors
//!
//! One `Provisioner` drives one UI session. Whole provisioning calls are
//! serialized on a session lock, because the creation menu and dialog can
//! only be in one state at a time.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admin::AdminApi;
use crate::cleanup::{CleanupCoordinator, CleanupReport};
use crate::config::{E2eConfig, ProvisionMode};
use crate::content::ContentPopulator;
use crate::diagnostics::DiagnosticsCollector;
use crate::driver::UiDriver;
use crate::error::{E2eError, E2eResult};
use crate::model::{ProvisionedResourceRecord, ResourceKind, ResourceSpec};
use crate::naming::NameGenerator;
use crate::oracle::ExistenceOracle;
use crate::orchestrator::{CreationOrchestrator, CreationOutcome, Created};
use crate::readiness::{Readiness, ReadinessPoller};
use crate::retry::{ConflictRetryController, RetryPolicy};

pub struct Provisioner<D: UiDriver> {
    driver: Arc<D>,
    config: E2eConfig,
    names: NameGenerator,
    diagnostics: DiagnosticsCollector,
    session: tokio::sync::Mutex<()>,
    ledger: Mutex<Vec<ProvisionedResourceRecord>>,
}

impl<D: UiDriver> Provisioner<D> {
    pub fn new(driver: Arc<D>, config: E2eConfig) -> Self {
        let names = NameGenerator::new(config.naming.separator.clone());
        Self::with_names(driver, config, names)
    }

    /// Use a caller-provided name generator, e.g. one sharing its sequence
    /// with other engines in the same process.
    pub fn with_names(driver: Arc<D>, config: E2eConfig, names: NameGenerator) -> Self {
        let diagnostics = DiagnosticsCollector::new(
            config.diagnostics_dir.clone(),
            config.selectors.tree_item_label.clone(),
        );
        Self {
            driver,
            config,
            names,
            diagnostics,
            session: tokio::sync::Mutex::new(()),
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }

    /// Snapshot of everything provisioned so far, oldest first.
    pub fn records(&self) -> Vec<ProvisionedResourceRecord> {
        self.ledger.lock().clone()
    }

    pub fn record(&self, resolved_name: &str) -> Option<ProvisionedResourceRecord> {
        self.ledger
            .lock()
            .iter()
            .find(|r| r.resolved_name == resolved_name)
            .cloned()
    }

    pub async fn provision_folder(&self, name: &str, parent: Option<&str>) -> E2eResult<String> {
        let spec = ResourceSpec {
            parent: parent.map(String::from),
            ..ResourceSpec::folder(name)
        };
        Ok(self.provision(spec).await?.resolved_name)
    }

    pub async fn provision_note(
        &self,
        name: &str,
        content: Option<&str>,
        parent: Option<&str>,
    ) -> E2eResult<String> {
        let spec = ResourceSpec {
            parent: parent.map(String::from),
            content: content.map(String::from),
            ..ResourceSpec::note(name)
        };
        Ok(self.provision(spec).await?.resolved_name)
    }

    pub async fn provision_task(&self, name: &str, parent: Option<&str>) -> E2eResult<String> {
        let spec = ResourceSpec {
            parent: parent.map(String::from),
            ..ResourceSpec::task(name)
        };
        Ok(self.provision(spec).await?.resolved_name)
    }

    /// Create the resource described by `spec` and return its record once it
    /// is ready (and, for notes with content, saved).
    pub async fn provision(&self, spec: ResourceSpec) -> E2eResult<ProvisionedResourceRecord> {
        if spec.requested_name.trim().is_empty() {
            return Err(E2eError::InvalidRequest("requested name is empty".to_string()));
        }
        if spec.content.is_some() && spec.kind != ResourceKind::Note {
            return Err(E2eError::InvalidRequest(format!(
                "content is only supported on notes, not on a {}",
                spec.kind
            )));
        }

        let _session = self.session.lock().await;
        debug!("Provisioning {} '{}'", spec.kind, spec.requested_name);

        if self.config.mode == ProvisionMode::Idempotent {
            if let Some(existing) = self.find_existing(&spec).await? {
                return Ok(existing);
            }
        }

        let (parent, parent_synthetic) = self.resolve_parent(&spec).await?;
        let created = self.create(spec.kind, &spec.requested_name, parent.as_deref()).await?;
        let record = self.remember(spec, created, parent, parent_synthetic);

        if let Some(content) = record.spec.content.as_deref() {
            ContentPopulator::new(self.driver.as_ref(), &self.config, &self.diagnostics)
                .populate(&record, content)
                .await?;
        }

        let placement = match (&record.parent, record.parent_synthetic) {
            (Some(p), true) => format!(" in '{}' (synthetic)", p),
            (Some(p), false) => format!(" in '{}'", p),
            (None, _) => String::new(),
        };
        info!("Provisioned {} '{}'{}", record.kind(), record.resolved_name, placement);
        Ok(record)
    }

    /// Block until `label` is present and visible, or time out.
    pub async fn await_ready(
        &self,
        label: &str,
        timeout: std::time::Duration,
    ) -> E2eResult<Readiness> {
        ReadinessPoller::new(
            self.driver.as_ref(),
            &self.config.selectors,
            &self.diagnostics,
            self.config.timeouts.poll_interval(),
        )
        .await_ready(label, timeout)
        .await
    }

    pub async fn exists(&self, label: &str) -> E2eResult<bool> {
        self.oracle().exists(label).await
    }

    /// Tear down everything this engine created and forget it.
    pub async fn cleanup_all<A: AdminApi + ?Sized>(&self, admin: &A) -> CleanupReport {
        let _session = self.session.lock().await;
        let records = std::mem::take(&mut *self.ledger.lock());
        CleanupCoordinator::new(admin, &self.config.cleanup, &self.config.run_id)
            .run(&records)
            .await
    }

    /// Idempotent mode: reuse an item already carrying the requested name,
    /// provided it is of the requested kind and under the requested parent.
    async fn find_existing(
        &self,
        spec: &ResourceSpec,
    ) -> E2eResult<Option<ProvisionedResourceRecord>> {
        let known = self
            .ledger
            .lock()
            .iter()
            .find(|r| {
                r.resolved_name == spec.requested_name
                    && r.kind() == spec.kind
                    && (spec.parent.is_none() || r.parent == spec.parent)
            })
            .cloned();
        if let Some(record) = known {
            debug!("'{}' already provisioned by this engine", spec.requested_name);
            return Ok(Some(record));
        }

        let parent = spec.parent.as_deref();
        if !self.matches_existing(&spec.requested_name, spec.kind, parent).await? {
            return Ok(None);
        }

        info!("Adopting existing {} '{}'", spec.kind, spec.requested_name);
        let readiness = self
            .await_ready(&spec.requested_name, self.config.timeouts.readiness())
            .await?;
        Ok(Some(ProvisionedResourceRecord {
            id: Uuid::new_v4(),
            resolved_name: spec.requested_name.clone(),
            parent: spec.parent.clone(),
            parent_synthetic: false,
            resource_id: readiness.resource_id,
            owner: self.config.identity.clone(),
            adopted: true,
            created_at: Utc::now(),
            spec: spec.clone(),
        }))
    }

    /// Whether the tree holds `label` as a `kind` item under `parent`.
    ///
    /// Kind and parent are read from the label's attributes. An attribute the
    /// application does not expose is not held against the item.
    async fn matches_existing(
        &self,
        label: &str,
        kind: ResourceKind,
        parent: Option<&str>,
    ) -> E2eResult<bool> {
        if !self.oracle().exists(label).await? {
            return Ok(false);
        }
        let sel = &self.config.selectors;
        let locator = sel.item_label(label);

        let found = self.driver.get_attribute(&locator, &sel.item_kind_attribute).await?;
        if let Some(found) = found {
            if found != kind.as_str() {
                debug!("'{}' exists but is a {}, not a {}", label, found, kind);
                return Ok(false);
            }
        }

        if let Some(parent) = parent {
            let expected = self
                .driver
                .get_attribute(&sel.item_label(parent), &sel.item_id_attribute)
                .await?;
            if expected.is_some() {
                let actual =
                    self.driver.get_attribute(&locator, &sel.item_parent_attribute).await?;
                if actual != expected {
                    debug!("'{}' exists but not under '{}'", label, parent);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Explicit parent must exist; a parentless leaf gets a synthetic folder.
    async fn resolve_parent(&self, spec: &ResourceSpec) -> E2eResult<(Option<String>, bool)> {
        if let Some(parent) = &spec.parent {
            if !self.oracle().exists(parent).await? {
                return Err(E2eError::UnknownParent(parent.clone()));
            }
            return Ok((Some(parent.clone()), false));
        }

        if !spec.kind.requires_container() {
            return Ok((None, false));
        }
        if !self.config.synthetic_parents {
            return Err(E2eError::ContainmentRequired(spec.kind));
        }

        let prefix = self.config.naming.synthetic_parent_prefix.clone();
        let folder_spec = ResourceSpec::folder(prefix.as_str());
        if self.config.mode == ProvisionMode::Idempotent {
            if let Some(existing) = self.find_existing(&folder_spec).await? {
                return Ok((Some(existing.resolved_name), true));
            }
        }

        let created = self.create(ResourceKind::Folder, &prefix, None).await?;
        let folder = self.remember(folder_spec, created, None, false);
        debug!(
            "Synthetic parent '{}' for {} '{}'",
            folder.resolved_name, spec.kind, spec.requested_name
        );
        Ok((Some(folder.resolved_name), true))
    }

    /// Creation with conflict retries.
    async fn create(
        &self,
        kind: ResourceKind,
        requested: &str,
        parent: Option<&str>,
    ) -> E2eResult<Created> {
        let this = self;
        let orchestrator =
            CreationOrchestrator::new(self.driver.as_ref(), &self.config, &self.diagnostics);
        let orchestrator = &orchestrator;

        let idempotent = self.config.mode == ProvisionMode::Idempotent;
        let controller = ConflictRetryController::new(RetryPolicy::from(&self.config.retry));

        let first_label = if idempotent {
            requested.to_string()
        } else {
            self.names.next(requested)
        };

        controller
            .run(
                requested,
                first_label,
                || self.names.next(requested),
                move |label| async move {
                    match orchestrator.attempt(kind, &label, parent).await? {
                        CreationOutcome::ConflictDetected { label } if idempotent => {
                            // Someone created it between our check and submit.
                            if !this.matches_existing(&label, kind, parent).await? {
                                return Err(E2eError::ValidationConflict { label });
                            }
                            let sel = &this.config.selectors;
                            let resource_id = this
                                .driver
                                .get_attribute(&sel.item_label(&label), &sel.item_id_attribute)
                                .await?;
                            Ok(CreationOutcome::Succeeded(Created {
                                label,
                                resource_id,
                                adopted: true,
                            }))
                        }
                        other => Ok(other),
                    }
                },
            )
            .await
    }

    /// Build the record for `created`. Only items this engine created go
    /// into the ledger.
    fn remember(
        &self,
        spec: ResourceSpec,
        created: Created,
        parent: Option<String>,
        parent_synthetic: bool,
    ) -> ProvisionedResourceRecord {
        let record = ProvisionedResourceRecord {
            id: Uuid::new_v4(),
            spec,
            resolved_name: created.label,
            parent,
            parent_synthetic,
            resource_id: created.resource_id,
            owner: self.config.identity.clone(),
            adopted: created.adopted,
            created_at: Utc::now(),
        };
        if record.adopted {
            info!("Adopted existing {} '{}'", record.kind(), record.resolved_name);
        } else {
            self.ledger.lock().push(record.clone());
        }
        record
    }

    fn oracle(&self) -> ExistenceOracle<'_, D> {
        ExistenceOracle::new(self.driver.as_ref(), &self.config.selectors)
    }
}
