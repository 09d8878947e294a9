use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::domain::granularity::HistoryLevel;
use crate::domain::models::{AllocationsPayload, HistoryPayload, HistorySnapshot};
use crate::error::DashboardError;

#[async_trait]
pub trait AllocationsApi: Send + Sync {
    async fn fetch_allocations(&self) -> Result<AllocationsPayload, DashboardError>;
    async fn fetch_history(&self, level: HistoryLevel) -> Result<HistoryPayload, DashboardError>;
}

/// Client for the allocations backend (`/api/allocations`, `/api/history`).
pub struct ReqwestAllocationsApi {
    client: Client,
    base_url: String,
}

impl ReqwestAllocationsApi {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DashboardError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Body text is best effort; the status alone is still reported.
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Allocations API returned an error status");
            return Err(DashboardError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response.json::<T>().await?;
        debug!(url = %url, "Fetched allocations API payload");
        Ok(parsed)
    }
}

#[async_trait]
impl AllocationsApi for ReqwestAllocationsApi {
    async fn fetch_allocations(&self) -> Result<AllocationsPayload, DashboardError> {
        self.get_json("/api/allocations", &[]).await
    }

    async fn fetch_history(&self, level: HistoryLevel) -> Result<HistoryPayload, DashboardError> {
        self.get_json("/api/history", &[("level", level.as_str())]).await
    }
}

// Canned provider for tests and local handler checks
pub struct MockAllocationsApi {
    pub allocations: Mutex<Result<AllocationsPayload, (u16, String)>>,
    pub history: Vec<HistorySnapshot>,
}

impl MockAllocationsApi {
    pub fn new(allocations: AllocationsPayload, history: Vec<HistorySnapshot>) -> Self {
        Self {
            allocations: Mutex::new(Ok(allocations)),
            history,
        }
    }

    /// Make the next allocation fetches fail with the given HTTP status.
    pub fn fail_with(&self, status: u16, body: &str) {
        if let Ok(mut slot) = self.allocations.lock() {
            *slot = Err((status, body.to_string()));
        }
    }

    pub fn succeed_with(&self, allocations: AllocationsPayload) {
        if let Ok(mut slot) = self.allocations.lock() {
            *slot = Ok(allocations);
        }
    }
}

#[async_trait]
impl AllocationsApi for MockAllocationsApi {
    async fn fetch_allocations(&self) -> Result<AllocationsPayload, DashboardError> {
        let slot = self
            .allocations
            .lock()
            .map_err(|e| DashboardError::Network(e.to_string()))?;
        match &*slot {
            Ok(payload) => Ok(payload.clone()),
            Err((status, body)) => Err(DashboardError::Http {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    async fn fetch_history(&self, level: HistoryLevel) -> Result<HistoryPayload, DashboardError> {
        Ok(HistoryPayload {
            level: Some(level.to_string()),
            rows: self.history.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slashes_from_base_url() {
        let api = ReqwestAllocationsApi::new(Client::new(), "http://localhost:3001//");
        assert_eq!(api.base_url(), "http://localhost:3001");
    }

    #[tokio::test]
    async fn mock_reports_configured_failure() {
        let mock = MockAllocationsApi::new(AllocationsPayload::default(), vec![]);
        assert!(mock.fetch_allocations().await.is_ok());

        mock.fail_with(500, "boom");
        let err = mock.fetch_allocations().await.unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 500: boom");
    }
}
