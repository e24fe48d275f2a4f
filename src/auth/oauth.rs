//! OAuth2 authorization-code flow against Linear
//!
//! Builds the authorization URL and talks to the token endpoint for the
//! code exchange and refresh grants. Holds no session state of its own.

use super::credential::OAuthClientParams;
use crate::config::OAuthConfig;
use crate::error::{LinearError, LinearResult};
use serde::{Deserialize, Serialize};

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error body returned by the token endpoint on rejection
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 endpoints and scopes for one provider
pub struct OAuthHandler {
    authorize_url: String,
    token_url: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl OAuthHandler {
    pub fn new(
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            scopes,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(
            config.authorize_url.clone(),
            config.token_url.clone(),
            config.scopes.clone(),
        )
    }

    /// Build the authorization URL the user must visit
    ///
    /// Deterministic for a given client: no random state is mixed in.
    pub fn authorization_url(&self, client: &OAuthClientParams) -> LinearResult<String> {
        let scope = self.scopes.join(",");
        let params = [
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("prompt", "consent"),
        ];

        let url = url::Url::parse_with_params(&self.authorize_url, params).map_err(|e| {
            LinearError::Configuration(format!(
                "Invalid authorization endpoint {}: {}",
                self.authorize_url, e
            ))
        })?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        client: &OAuthClientParams,
        code: &str,
    ) -> LinearResult<TokenResponse> {
        tracing::debug!("Exchanging authorization code for tokens");

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];
        self.request_token(&params).await
    }

    /// Refresh an expired token using refresh_token
    pub async fn refresh_token(
        &self,
        client: &OAuthClientParams,
        refresh_token: &str,
    ) -> LinearResult<TokenResponse> {
        tracing::debug!("Refreshing OAuth token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];
        self.request_token(&params).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> LinearResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| LinearError::AuthExchange(format!("Failed to reach token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LinearError::AuthExchange(describe_rejection(status, &body)));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            LinearError::AuthExchange(format!("Failed to parse token response: {}", e))
        })?;

        if token_response.access_token.is_empty() {
            return Err(LinearError::AuthExchange(
                "Token endpoint returned an empty access token".to_string(),
            ));
        }
        Ok(token_response)
    }
}

fn describe_rejection(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(TokenErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{} ({}): {}", error, status, description),
        Ok(TokenErrorBody { error, .. }) => format!("{} ({})", error, status),
        Err(_) if body.trim().is_empty() => format!("Token request failed ({})", status),
        Err(_) => format!("Token request failed ({}): {}", status, body.trim()),
    }
}
