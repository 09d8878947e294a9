use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Caller or operator mistakes: bad environment values and unknown
/// granularity/level/sort names. These never come from upstream data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidEnv {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("Unknown granularity '{0}'")]
    UnknownGranularity(String),
    #[error("Unknown history level '{0}'")]
    UnknownLevel(String),
    #[error("Unknown sort column '{0}'")]
    UnknownSortKey(String),
    #[error("Unknown sort direction '{0}'")]
    UnknownSortDirection(String),
    #[error("{name} must be a whole number, got '{value}'")]
    InvalidQueryNumber { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Request failed with status {status}{}", body_suffix(.body))]
    Http { status: u16, body: String },
    #[error("Failed to contact allocations API: {0}")]
    Network(String),
    #[error("Failed to decode allocations API response: {0}")]
    Decode(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn body_suffix(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

impl DashboardError {
    pub fn status(&self) -> StatusCode {
        match self {
            DashboardError::Config(_) => StatusCode::BAD_REQUEST,
            DashboardError::Http { .. }
            | DashboardError::Network(_)
            | DashboardError::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DashboardError::Decode(e.to_string())
        } else {
            DashboardError::Network(e.to_string())
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
