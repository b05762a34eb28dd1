//! Per-call creation state machine
//!
//! `Idle → MenuOpen → DialogOpen → Submitted → {Succeeded | ConflictDetected | Failed}`
//!
//! One call drives one attempt with one candidate label. Retrying on a
//! conflict is the caller's business (see [`crate::retry`]).

use std::fmt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::E2eConfig;
use crate::diagnostics::DiagnosticsCollector;
use crate::driver::{UiDriver, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::model::ResourceKind;
use crate::poll::{poll_until, Polled};
use crate::readiness::ReadinessPoller;
use crate::surface::SurfaceGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPhase {
    Idle,
    MenuOpen,
    DialogOpen,
    Submitted,
    Succeeded,
    ConflictDetected,
    Failed,
}

impl CreationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CreationPhase::Succeeded | CreationPhase::ConflictDetected | CreationPhase::Failed
        )
    }

    /// What the flow was doing when it sat in this phase.
    fn activity(&self) -> &'static str {
        match self {
            CreationPhase::Idle => "opening the creation menu",
            CreationPhase::MenuOpen => "opening the creation dialog",
            CreationPhase::DialogOpen => "submitting the name",
            CreationPhase::Submitted => "waiting for the dialog to resolve",
            CreationPhase::Succeeded => "succeeded",
            CreationPhase::ConflictDetected => "dismissing a conflicting dialog",
            CreationPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for CreationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.activity())
    }
}

/// Item confirmed present and visible
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub label: String,
    pub resource_id: Option<String>,
    /// The item already existed and was taken over rather than created
    pub adopted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreationOutcome {
    Succeeded(Created),
    ConflictDetected { label: String },
}

/// How the dialog resolved after submit
enum Resolution {
    Closed,
    Conflict,
}

struct Flow<'l> {
    kind: ResourceKind,
    label: &'l str,
    phase: CreationPhase,
}

impl Flow<'_> {
    fn enter(&mut self, next: CreationPhase) {
        debug!("create {} '{}': {:?} -> {:?}", self.kind, self.label, self.phase, next);
        self.phase = next;
    }
}

pub struct CreationOrchestrator<'a, D: UiDriver + ?Sized> {
    driver: &'a D,
    config: &'a E2eConfig,
    diagnostics: &'a DiagnosticsCollector,
}

impl<'a, D: UiDriver + ?Sized> CreationOrchestrator<'a, D> {
    pub fn new(
        driver: &'a D,
        config: &'a E2eConfig,
        diagnostics: &'a DiagnosticsCollector,
    ) -> Self {
        Self {
            driver,
            config,
            diagnostics,
        }
    }

    /// Create one `kind` item labelled `label`, at the root or under the
    /// existing folder `parent`.
    pub async fn attempt(
        &self,
        kind: ResourceKind,
        label: &str,
        parent: Option<&str>,
    ) -> E2eResult<CreationOutcome> {
        let mut flow = Flow {
            kind,
            label,
            phase: CreationPhase::Idle,
        };

        match self.drive(&mut flow, parent).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(&mut flow, e).await),
        }
    }

    async fn drive(&self, flow: &mut Flow<'_>, parent: Option<&str>) -> E2eResult<CreationOutcome> {
        let sel = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        self.surface().ensure_closed().await?;

        match parent {
            None => self.driver.click(&sel.root_add).await?,
            Some(parent) => self.driver.click(&sel.item_menu(parent)).await?,
        }
        self.driver
            .wait_for(&sel.create_menu, WaitState::Visible, timeouts.action())
            .await?;
        flow.enter(CreationPhase::MenuOpen);

        self.driver.click(sel.create_action(flow.kind)).await?;
        self.driver
            .wait_for(&sel.dialog, WaitState::Visible, timeouts.action())
            .await?;
        self.driver
            .wait_for(&sel.name_input, WaitState::Visible, timeouts.action())
            .await?;
        flow.enter(CreationPhase::DialogOpen);

        self.driver.fill(&sel.name_input, flow.label).await?;
        self.driver.click(&sel.submit).await?;
        flow.enter(CreationPhase::Submitted);

        match self.resolve_submission(flow.label).await? {
            Resolution::Conflict => {
                warn!("{} '{}' rejected: name already in use", flow.kind, flow.label);
                flow.enter(CreationPhase::ConflictDetected);
                self.surface().ensure_closed().await?;
                Ok(CreationOutcome::ConflictDetected {
                    label: flow.label.to_string(),
                })
            }
            Resolution::Closed => {
                let interval = timeouts.poll_interval();
                let poller = ReadinessPoller::new(self.driver, sel, self.diagnostics, interval);

                let readiness = poller.await_ready(flow.label, timeouts.readiness()).await?;
                flow.enter(CreationPhase::Succeeded);
                info!("Created {} '{}'", flow.kind, flow.label);
                Ok(CreationOutcome::Succeeded(Created {
                    label: flow.label.to_string(),
                    resource_id: readiness.resource_id,
                    adopted: false,
                }))
            }
        }
    }

    /// Watch the dialog after submit: a validation indicator inside the
    /// conflict window means a name collision; the dialog closing means the
    /// application accepted the name; an error toast is a backend failure.
    async fn resolve_submission(&self, label: &str) -> E2eResult<Resolution> {
        let driver = self.driver;
        let sel = &self.config.selectors;
        let timeouts = &self.config.timeouts;
        let conflict_window = timeouts.conflict_window();
        let submitted_at = Instant::now();

        let check = move || async move {
            if driver.is_visible(&sel.error_toast).await? {
                let message = driver
                    .get_text(&sel.error_toast)
                    .await?
                    .unwrap_or_else(|| "backend error".to_string());
                return Err(E2eError::network(message.trim()));
            }
            let in_window = submitted_at.elapsed() <= conflict_window;
            if in_window && driver.is_visible(&sel.validation_error).await? {
                return Ok(Some(Resolution::Conflict));
            }
            if !driver.is_visible(&sel.dialog).await? {
                return Ok(Some(Resolution::Closed));
            }
            Ok(None)
        };
        let polled = poll_until(timeouts.dialog_close(), timeouts.poll_interval(), check).await?;

        match polled {
            Polled::Ready { value, .. } => Ok(value),
            Polled::TimedOut { .. } => Err(E2eError::timeout(
                format!("dialog to close or report a conflict for '{}'", label),
                timeouts.dialog_close(),
            )),
        }
    }

    /// Turn an error into the hard failure of this call, with diagnostics.
    async fn fail(&self, flow: &mut Flow<'_>, err: E2eError) -> E2eError {
        let during = flow.phase;
        flow.enter(CreationPhase::Failed);
        error!("Creating {} '{}' failed while {}: {}", flow.kind, flow.label, during, err);

        if err.diagnostics().is_some() {
            return err;
        }
        let bundle = self.diagnostics.capture(self.driver, flow.label, &err.to_string()).await;
        match err {
            E2eError::Timeout { .. }
            | E2eError::NetworkFailure { .. }
            | E2eError::AssertionFailed { .. } => err.with_diagnostics(bundle),

            other => E2eError::CreationFailed {
                kind: flow.kind,
                label: flow.label.to_string(),
                phase: during.to_string(),
                reason: other.to_string(),
                diagnostics: Some(Box::new(bundle)),
            },
        }
    }

    fn surface(&self) -> SurfaceGuard<'_, D> {
        let timeouts = &self.config.timeouts;
        SurfaceGuard::new(
            self.driver,
            &self.config.selectors,
            timeouts.conflict_window(),
            timeouts.poll_interval(),
        )
    }
}
