//! Failure diagnostics: tree-state dump plus a screenshot
//!
//! Capture is best-effort. A failure while capturing is logged and never
//! replaces the error being reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::driver::UiDriver;
use crate::error::E2eResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticBundle {
    pub captured_at: DateTime<Utc>,
    pub reason: String,
    /// Every tree label at capture time, one per line
    pub tree_dump: Option<String>,
    pub screenshot_path: Option<PathBuf>,
    pub screenshot_sha256: Option<String>,
}

pub struct DiagnosticsCollector {
    dir: PathBuf,
    tree_item_label: String,
}

impl DiagnosticsCollector {
    pub fn new(dir: impl Into<PathBuf>, tree_item_label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tree_item_label: tree_item_label.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn capture<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        subject: &str,
        reason: &str,
    ) -> DiagnosticBundle {
        let captured_at = Utc::now();

        let tree_dump = match driver.all_texts(&self.tree_item_label).await {
            Ok(labels) => Some(labels.iter().map(|l| l.trim()).collect::<Vec<_>>().join("\n")),
            Err(e) => {
                warn!("Could not dump tree state for '{}': {}", subject, e);
                None
            }
        };

        let screenshot = self.screenshot(driver, subject, captured_at).await;
        let (screenshot_path, screenshot_sha256) = match screenshot {

            Ok((path, hash)) => (Some(path), Some(hash)),
            Err(e) => {
                warn!("Could not capture screenshot for '{}': {}", subject, e);
                (None, None)
            }
        };

        info!(
            "Captured diagnostics for '{}' ({}){}",
            subject,
            reason,
            screenshot_path
                .as_ref()
                .map(|p| format!(": {}", p.display()))
                .unwrap_or_default()
        );

        DiagnosticBundle {
            captured_at,
            reason: reason.to_string(),
            tree_dump,
            screenshot_path,
            screenshot_sha256,
        }
    }

    async fn screenshot<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        subject: &str,
        at: DateTime<Utc>,
    ) -> E2eResult<(PathBuf, String)> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{}-{}.png", file_stem(subject), at.format("%Y%m%dT%H%M%S%3f")));
        driver.screenshot(&path).await?;
        let data = tokio::fs::read(&path).await?;
        Ok((path, hash_bytes(&data)))
    }
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Filesystem-safe version of a label.
fn file_stem(subject: &str) -> String {
    let stem: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if stem.is_empty() {
        "item".to_string()
    } else {
        stem
    }
}
