//! Notes E2E fixture engine
//!
//! Turns the notes application's asynchronous, stateful creation UI into a
//! retryable provisioning API for test preconditions, and tears everything
//! down again at the end of a run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Provisioner (one per UI session, calls serialized)         │
//! │    provision_folder / provision_note / provision_task       │
//! │      └── ConflictRetryController (bounded, backoff)         │
//! │            └── CreationOrchestrator (per-call state machine)│
//! │                  ├── SurfaceGuard (close leftover dialogs)  │
//! │                  ├── NameGenerator                          │
//! │                  ├── ExistenceOracle                        │
//! │                  └── ReadinessPoller ── poll::poll_until    │
//! │      └── ContentPopulator (waits for the editor's save)     │
//! │    cleanup_all ── CleanupCoordinator (bulk, then per-id)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UiDriver trait ── PlaywrightDriver (node bridge, JSON)     │
//! │  AdminApi trait ── HttpAdminApi (reqwest)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FixturePlan (YAML) ── FixtureRunner ── results JSON        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod cleanup;
pub mod config;
pub mod content;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod model;
pub mod naming;
pub mod oracle;
pub mod orchestrator;
pub mod plan;
pub mod playwright;
pub mod poll;
pub mod provisioner;
pub mod readiness;
pub mod retry;
pub mod runner;
pub mod selectors;
pub mod server;
pub mod surface;

pub use admin::{AdminApi, HttpAdminApi};
pub use cleanup::{CleanupReport, CleanupTier};
pub use config::{E2eConfig, ProvisionMode};
pub use driver::UiDriver;
pub use error::{E2eError, E2eResult};
pub use model::{ProvisionedResourceRecord, ResourceKind, ResourceSpec, TreeItem};
pub use plan::FixturePlan;
pub use provisioner::Provisioner;
pub use runner::FixtureRunner;
