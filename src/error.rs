use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Market index unavailable on chain {chain_id}: {reason}")]
    IndexUnavailable { chain_id: u64, reason: String },

    #[error("Subgraph error: {0}")]
    Subgraph(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("ABI decode error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("Malformed market {id}: {reason}")]
    MalformedMarket { id: String, reason: String },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("Enrichment store unavailable")]
    EnrichmentUnavailable,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn malformed(id: &str, reason: impl Into<String>) -> Self {
        AppError::MalformedMarket { id: id.to_string(), reason: reason.into() }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "market not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedChain(id) => {
                (StatusCode::BAD_REQUEST, format!("unsupported chain {id}"))
            }
            _ => {
                error!("Request failed: {self}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_category() {
        let cases = [
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::BadRequest("missing id".into()), StatusCode::BAD_REQUEST),
            (AppError::UnsupportedChain(5), StatusCode::BAD_REQUEST),
            (
                AppError::IndexUnavailable { chain_id: 100, reason: "timeout".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::EnrichmentUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
