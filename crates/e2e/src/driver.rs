//! UI driver abstraction
//!
//! The engine only ever talks to the application through this trait. The
//! Playwright-backed implementation lives in [`crate::playwright`]; tests
//! plug in an in-memory application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Layout box of an element, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// What to do with native `confirm`/`alert`/`prompt` dialogs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogPolicy {
    #[default]
    Accept,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub url: String,
    pub status: u16,
    pub method: String,
}

impl NetworkResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Stream of responses whose URL matched the subscription pattern.
///
/// Subscribe before triggering the action that causes the request, or the
/// response may be missed.
pub struct ResponseSubscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<NetworkResponse>,
}

impl ResponseSubscription {
    pub fn new(pattern: impl Into<String>, rx: mpsc::UnboundedReceiver<NetworkResponse>) -> Self {
        Self {
            pattern: pattern.into(),
            rx,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next matching response, or a timeout error.
    pub async fn next(&mut self, timeout: Duration) -> E2eResult<NetworkResponse> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(E2eError::Driver(format!(
                "response stream for '{}' closed",
                self.pattern
            ))),
            Err(_) => Err(E2eError::timeout(
                format!("network response matching '{}'", self.pattern),
                timeout,
            )),
        }
    }
}

/// Browser capability consumed by the engine
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    async fn click(&self, locator: &str) -> E2eResult<()>;

    async fn fill(&self, locator: &str, text: &str) -> E2eResult<()>;

    async fn press_key(&self, key: &str) -> E2eResult<()>;

    /// Fails with [`E2eError::Timeout`] if `state` is not reached in time.
    async fn wait_for(&self, locator: &str, state: WaitState, timeout: Duration) -> E2eResult<()>;

    /// Text content of the first match, `None` if nothing matches.
    async fn get_text(&self, locator: &str) -> E2eResult<Option<String>>;

    /// Text content of every match, in document order.
    async fn all_texts(&self, locator: &str) -> E2eResult<Vec<String>>;

    async fn is_visible(&self, locator: &str) -> E2eResult<bool>;

    async fn bounding_box(&self, locator: &str) -> E2eResult<Option<BoundingBox>>;

    async fn get_attribute(&self, locator: &str, name: &str) -> E2eResult<Option<String>>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    async fn on_native_dialog(&self, policy: DialogPolicy) -> E2eResult<()>;

    async fn on_network_response(&self, url_pattern: &str) -> E2eResult<ResponseSubscription>;
}
