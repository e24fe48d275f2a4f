//! GraphQL transport
//!
//! The façade depends on the `GraphqlTransport` trait so the HTTP client can
//! be swapped for a scripted one in tests.

use crate::auth::ApiCredential;
use crate::error::{LinearError, LinearResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One GraphQL document with its variables
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    pub operation_name: String,
    pub query: String,
    pub variables: Value,
}

impl GraphqlRequest {
    pub fn new(operation_name: &str, query: impl Into<String>, variables: Value) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            query: query.into(),
            variables,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

/// Sends GraphQL documents to the tracker
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    /// Execute one request and return its `data` object
    ///
    /// Any GraphQL `errors` entry fails the whole request.
    async fn execute(
        &self,
        credential: &ApiCredential,
        request: GraphqlRequest,
    ) -> LinearResult<Value>;
}

/// reqwest-backed transport for the Linear GraphQL endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    async fn execute(
        &self,
        credential: &ApiCredential,
        request: GraphqlRequest,
    ) -> LinearResult<Value> {
        tracing::debug!(operation = %request.operation_name, "Sending GraphQL request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", credential.authorization_header())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LinearError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(operation = %request.operation_name, %status, "GraphQL request failed");
            return Err(LinearError::from_http_status(status, body));
        }

        let body: GraphqlResponse = response
            .json()
            .await
            .map_err(LinearError::from_network_error)?;
        into_data(&request.operation_name, body)
    }
}

fn into_data(operation: &str, response: GraphqlResponse) -> LinearResult<Value> {
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(LinearError::RemoteOperation(format!(
            "{} failed: {}",
            operation,
            messages.join("; ")
        )));
    }
    match response.data {
        Some(Value::Null) | None => Err(LinearError::RemoteOperation(format!(
            "{} returned no data",
            operation
        ))),
        Some(data) => Ok(data),
    }
}
