//! The creation menu and dialog are a single shared surface. Before a new
//! creation flow starts, anything left open by a previous call is closed
//! with an ordered fallback: cancel, then Escape, then a click outside.

use std::time::Duration;
use tracing::{debug, warn};

use crate::driver::UiDriver;
use crate::error::{E2eError, E2eResult};
use crate::poll::wait_until;
use crate::selectors::Selectors;

/// Which step of the fallback chain closed the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissStep {
    AlreadyClosed,
    Cancel,
    Escape,
    ClickOutside,
}

pub struct SurfaceGuard<'a, D: UiDriver + ?Sized> {
    driver: &'a D,
    selectors: &'a Selectors,
    settle: Duration,
    interval: Duration,
}

impl<'a, D: UiDriver + ?Sized> SurfaceGuard<'a, D> {
    pub fn new(
        driver: &'a D,
        selectors: &'a Selectors,
        settle: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            settle,
            interval,
        }
    }

    pub async fn is_open(&self) -> E2eResult<bool> {
        Ok(self.driver.is_visible(&self.selectors.dialog).await?
            || self.driver.is_visible(&self.selectors.create_menu).await?)
    }

    /// Close any leftover menu or dialog. Fails only if all three steps leave
    /// something open.
    pub async fn ensure_closed(&self) -> E2eResult<DismissStep> {
        if !self.is_open().await? {
            return Ok(DismissStep::AlreadyClosed);
        }
        debug!("Creation surface left open, dismissing");

        if self.driver.is_visible(&self.selectors.cancel).await? {
            if let Err(e) = self.driver.click(&self.selectors.cancel).await {
                debug!("cancel click failed: {}", e);
            }
            if self.settled().await? {
                return Ok(DismissStep::Cancel);
            }
        }

        if let Err(e) = self.driver.press_key("Escape").await {
            debug!("escape failed: {}", e);
        }
        if self.settled().await? {
            return Ok(DismissStep::Escape);
        }

        if let Err(e) = self.driver.click(&self.selectors.outside).await {
            debug!("outside click failed: {}", e);
        }
        if self.settled().await? {
            return Ok(DismissStep::ClickOutside);
        }

        warn!("Creation surface still open after cancel, escape and outside click");
        Err(E2eError::Driver(
            "creation surface could not be closed (cancel, escape, outside click)".to_string(),
        ))
    }

    async fn settled(&self) -> E2eResult<bool> {
        let polled = wait_until(self.settle, self.interval, move || async move {
            Ok(!self.is_open().await?)
        })
        .await?;

        Ok(polled.is_ready())
    }
}
