//! Note body population
//!
//! The editor saves on a debounce, so returning right after typing would let
//! the next assertion race the save. The populator waits for the save to be
//! acknowledged, either by a matching network response or a fixed delay.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{E2eConfig, SaveAck};
use crate::diagnostics::DiagnosticsCollector;
use crate::driver::{ResponseSubscription, UiDriver, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::model::{ProvisionedResourceRecord, ResourceKind};

/// Delay used when a network acknowledgement is configured but the note's
/// id is unknown, so no response can be matched.
pub const FALLBACK_SAVE_DELAY: Duration = Duration::from_millis(1500);

pub struct ContentPopulator<'a, D: UiDriver + ?Sized> {
    driver: &'a D,
    config: &'a E2eConfig,
    diagnostics: &'a DiagnosticsCollector,
}

enum SaveWait {
    Response(ResponseSubscription),
    Delay(Duration),
}

impl<'a, D: UiDriver + ?Sized> ContentPopulator<'a, D> {
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

    /// Open `record` in the editor, replace its body with `content` and wait
    /// for the save to land.
    pub async fn populate(
        &self,
        record: &ProvisionedResourceRecord,
        content: &str,
    ) -> E2eResult<()> {
        if record.kind() != ResourceKind::Note {
            return Err(E2eError::InvalidRequest(format!(
                "content can only be set on notes, '{}' is a {}",
                record.resolved_name,
                record.kind()
            )));
        }

        let sel = &self.config.selectors;
        let timeouts = &self.config.timeouts;
        let label = record.resolved_name.as_str();

        // Subscribe before typing so the save response cannot slip past.
        let wait = self.save_wait(record).await?;

        self.driver.click(&sel.item_label(label)).await?;
        self.driver
            .wait_for(&sel.editor_body, WaitState::Visible, timeouts.action())
            .await?;
        self.driver.fill(&sel.editor_body, content).await?;
        debug!("Typed {} byte(s) into '{}'", content.len(), label);

        match wait {
            SaveWait::Response(mut subscription) => {
                let response = match subscription.next(timeouts.save_ack()).await {
                    Ok(response) => response,
                    Err(e) => {
                        let bundle = self
                            .diagnostics
                            .capture(self.driver, label, "save not acknowledged")
                            .await;
                        return Err(e.with_diagnostics(bundle));
                    }
                };
                if !response.is_success() {
                    let err = E2eError::network(format!(
                        "saving '{}' returned {} from {} {}",
                        label, response.status, response.method, response.url
                    ));
                    let bundle =
                        self.diagnostics.capture(self.driver, label, &err.to_string()).await;

                    return Err(err.with_diagnostics(bundle));
                }
                info!("Content saved for '{}' ({} {})", label, response.method, response.status);
            }
            SaveWait::Delay(delay) => {
                tokio::time::sleep(delay).await;
                info!("Content for '{}' assumed saved after {:?}", label, delay);
            }
        }
        Ok(())
    }

    async fn save_wait(&self, record: &ProvisionedResourceRecord) -> E2eResult<SaveWait> {
        match (&self.config.save_ack, record.resource_id.as_deref()) {
            (SaveAck::FixedDelay { ms }, _) => Ok(SaveWait::Delay(Duration::from_millis(*ms))),
            (SaveAck::Network { url_pattern }, Some(id)) => {
                let pattern = url_pattern.replace("{id}", &regex::escape(id));
                Ok(SaveWait::Response(self.driver.on_network_response(&pattern).await?))
            }
            (SaveAck::Network { .. }, None) => {
                warn!(
                    "No resource id for '{}'; waiting {:?} instead of a save response",
                    record.resolved_name, FALLBACK_SAVE_DELAY
                );
                Ok(SaveWait::Delay(FALLBACK_SAVE_DELAY))
            }
        }
    }
}
