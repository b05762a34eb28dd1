//! Administrative calls used by cleanup
//!
//! These go through the application's own HTTP API, never the store
//! behind it.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{E2eConfig, SeedIdentity};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    Deleted(usize),
    /// The deployment does not expose the bulk endpoint
    Unavailable,
}

/// An authenticated session for one seed identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub identity: String,
    pub token: String,
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Delete everything owned by the test run in one call.
    async fn bulk_delete_run(&self, run_id: &str) -> E2eResult<BulkOutcome>;

    async fn authenticate(&self, identity: &SeedIdentity) -> E2eResult<AdminSession>;

    async fn delete_resource(&self, session: &AdminSession, resource_id: &str) -> E2eResult<()>;

    /// Delete every item owned by the session's identity. Returns how many went.
    async fn delete_identity_resources(&self, session: &AdminSession) -> E2eResult<usize>;
}

#[derive(Deserialize)]
struct DeletedCount {
    #[serde(default)]
    deleted: usize,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

pub struct HttpAdminApi {
    client: reqwest::Client,
    base_url: String,
    admin_token: Option<String>,
}

impl HttpAdminApi {
    pub fn new(
        base_url: impl Into<String>,
        admin_token: Option<String>,
        timeout: Duration,
    ) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_token,
        })
    }

    pub fn from_config(config: &E2eConfig) -> E2eResult<Self> {
        Self::new(
            config.admin_base_url(),
            config.cleanup.admin_token.clone(),
            Duration::from_millis(config.cleanup.request_timeout_ms),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, what: &str) -> E2eResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(E2eError::Admin(format!("{} returned {}: {}", what, status, body.trim())))
    }
}

#[async_trait]
impl AdminApi for HttpAdminApi {
    async fn bulk_delete_run(&self, run_id: &str) -> E2eResult<BulkOutcome> {
        let Some(token) = &self.admin_token else {
            debug!("No admin token configured; bulk cleanup unavailable");
            return Ok(BulkOutcome::Unavailable);
        };

        let response = self
            .client
            .post(self.url(&format!("/api/admin/test-runs/{}/purge", run_id)))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND
            | StatusCode::METHOD_NOT_ALLOWED
            | StatusCode::NOT_IMPLEMENTED => {
                Ok(BulkOutcome::Unavailable)
            }
            _ => {
                let response = Self::check(response, "bulk purge").await?;
                let count: DeletedCount = response.json().await?;
                Ok(BulkOutcome::Deleted(count.deleted))
            }
        }
    }

    async fn authenticate(&self, identity: &SeedIdentity) -> E2eResult<AdminSession> {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({
                "login": identity.login,
                "password": identity.password,
            }))
            .send()
            .await?;
        let response = Self::check(response, &format!("login as {}", identity.login)).await?;
        let login: LoginResponse = response.json().await?;
        Ok(AdminSession {
            identity: identity.login.clone(),
            token: login.token,
        })
    }

    async fn delete_resource(&self, session: &AdminSession, resource_id: &str) -> E2eResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/items/{}", resource_id)))
            .bearer_auth(&session.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Already gone counts as deleted.
            return Ok(());
        }
        Self::check(response, &format!("delete item {}", resource_id)).await?;
        Ok(())
    }

    async fn delete_identity_resources(&self, session: &AdminSession) -> E2eResult<usize> {
        let response = self
            .client
            .delete(self.url("/api/me/items"))
            .bearer_auth(&session.token)
            .send()
            .await?;
        let response =
            Self::check(response, &format!("delete items of {}", session.identity)).await?;
        let count: DeletedCount = response.json().await.unwrap_or(DeletedCount { deleted: 0 });
        Ok(count.deleted)
    }
}
