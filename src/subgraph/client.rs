use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// GraphQL transport for one subgraph endpoint. Timeouts come from the shared
/// `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST a query and decode its `data` payload. A non-empty `errors` array is an
    /// error even when partial data came back.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let resp: GraphQlResponse<T> = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.errors.is_empty() {
            let messages: Vec<String> = resp.errors.into_iter().map(|e| e.message).collect();
            return Err(AppError::Subgraph(messages.join("; ")));
        }

        resp.data
            .ok_or_else(|| AppError::Subgraph("response carried no data".to_string()))
    }
}
