//! Readiness polling: an item counts as ready only when it is in the tree
//! *and* laid out with a visible, non-empty box.

use std::time::Duration;
use tracing::debug;

use crate::diagnostics::DiagnosticsCollector;
use crate::driver::UiDriver;
use crate::error::{E2eError, E2eResult};
use crate::oracle::ExistenceOracle;
use crate::poll::{poll_until, Polled};
use crate::selectors::Selectors;

#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub attempts: u32,
    pub elapsed: Duration,
    /// Application-side id, read once the item is ready
    pub resource_id: Option<String>,
}

pub struct ReadinessPoller<'a, D: UiDriver + ?Sized> {
    driver: &'a D,
    selectors: &'a Selectors,
    diagnostics: &'a DiagnosticsCollector,
    interval: Duration,
}

impl<'a, D: UiDriver + ?Sized> ReadinessPoller<'a, D> {
    pub fn new(
        driver: &'a D,
        selectors: &'a Selectors,
        diagnostics: &'a DiagnosticsCollector,
        interval: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            diagnostics,
            interval,
        }
    }

    /// Block until `label` is ready or fail with a timeout carrying diagnostics.
    pub async fn await_ready(&self, label: &str, timeout: Duration) -> E2eResult<Readiness> {
        let polled = poll_until(timeout, self.interval, move || async move {
            Ok(self.is_ready(label).await?.then_some(()))
        })
        .await?;

        match polled {
            Polled::Ready { attempts, elapsed, .. } => {
                debug!("'{}' ready after {} check(s) in {:?}", label, attempts, elapsed);
                let locator = self.selectors.item_label(label);
                let resource_id = self
                    .driver
                    .get_attribute(&locator, &self.selectors.item_id_attribute)
                    .await?;
                Ok(Readiness {
                    attempts,
                    elapsed,
                    resource_id,
                })
            }
            Polled::TimedOut { attempts, .. } => {
                let reason = format!("not ready after {} check(s)", attempts);
                let bundle = self.diagnostics.capture(self.driver, label, &reason).await;
                let err = E2eError::timeout(format!("readiness of '{}'", label), timeout);
                Err(err.with_diagnostics(bundle))

            }
        }
    }

    /// Present in the tree, visible, and with a non-zero box.
    pub async fn is_ready(&self, label: &str) -> E2eResult<bool> {
        if !ExistenceOracle::new(self.driver, self.selectors).exists(label).await? {
            return Ok(false);
        }
        let locator = self.selectors.item_label(label);
        if !self.driver.is_visible(&locator).await? {
            return Ok(false);
        }
        Ok(self
            .driver
            .bounding_box(&locator)
            .await?
            .map(|b| b.has_area())
            .unwrap_or(false))
    }
}
