//! Credential material held by the auth session
//!
//! The credential is a closed union: a personal access token, or an OAuth
//! client whose token set only exists once the callback exchange succeeded.

use super::oauth::TokenResponse;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication mode of a configured session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    PersonalToken,
    OAuth,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::PersonalToken => write!(f, "personal token"),
            AuthMode::OAuth => write!(f, "OAuth"),
        }
    }
}

/// OAuth application settings supplied when starting the flow
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClientParams {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthClientParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientParams")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Parameters for `AuthSession::initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthParams {
    PersonalToken { token: String },
    OAuth(OAuthClientParams),
}

impl AuthParams {
    pub fn mode(&self) -> AuthMode {
        match self {
            AuthParams::PersonalToken { .. } => AuthMode::PersonalToken,
            AuthParams::OAuth(_) => AuthMode::OAuth,
        }
    }

    /// Names of required fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |s: &str| s.trim().is_empty();
        match self {
            AuthParams::PersonalToken { token } => {
                if blank(token) {
                    vec!["token"]
                } else {
                    vec![]
                }
            }
            AuthParams::OAuth(client) => [
                ("clientId", client.client_id.as_str()),
                ("clientSecret", client.client_secret.as_str()),
                ("redirectUri", client.redirect_uri.as_str()),
            ]
            .into_iter()
            .filter(|(_, value)| blank(value))
            .map(|(name, _)| name)
            .collect(),
        }
    }
}

/// Access/refresh token pair obtained from the OAuth token endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted. `None` means no expiry was reported.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `now`
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        let scopes = response
            .scope
            .map(|s| {
                s.split([',', ' '])
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            scopes,
        }
    }

    /// True if the access token expires at or before `now + margin`
    ///
    /// A window reaching past the representable date range covers every expiry.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now.checked_add_signed(margin).map_or(true, |limit| at <= limit))
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// The credential currently held by a session
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    PersonalToken {
        token: String,
    },
    OAuth {
        client: OAuthClientParams,
        /// Populated only after a successful code exchange
        tokens: Option<TokenSet>,
    },
}

impl Credential {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credential::PersonalToken { .. } => AuthMode::PersonalToken,
            Credential::OAuth { .. } => AuthMode::OAuth,
        }
    }

    /// True iff the credential can authorize API requests
    pub fn is_usable(&self) -> bool {
        match self {
            Credential::PersonalToken { token } => !token.is_empty(),
            Credential::OAuth { tokens, .. } => tokens.is_some(),
        }
    }

    /// Header carrier for the current credential, if usable
    pub fn api_credential(&self) -> Option<ApiCredential> {
        match self {
            Credential::PersonalToken { token } if !token.is_empty() => {
                Some(ApiCredential::PersonalToken(token.clone()))
            }
            Credential::OAuth {
                tokens: Some(tokens),
                ..
            } => Some(ApiCredential::Bearer(tokens.access_token.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::PersonalToken { .. } => f
                .debug_struct("PersonalToken")
                .field("token", &"<redacted>")
                .finish(),
            Credential::OAuth { client, tokens } => f
                .debug_struct("OAuth")
                .field("client", client)
                .field("tokens", tokens)
                .finish(),
        }
    }
}

/// Credential carrier handed to the operation façade for one request
#[derive(Clone, PartialEq, Eq)]
pub enum ApiCredential {
    /// Personal API keys are sent verbatim
    PersonalToken(String),
    /// OAuth access tokens are sent with the `Bearer` scheme
    Bearer(String),
}

impl ApiCredential {
    /// Value of the `Authorization` header
    pub fn authorization_header(&self) -> String {
        match self {
            ApiCredential::PersonalToken(token) => token.clone(),
            ApiCredential::Bearer(token) => format!("Bearer {}", token),
        }
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCredential::PersonalToken(_) => write!(f, "ApiCredential::PersonalToken(<redacted>)"),
            ApiCredential::Bearer(_) => write!(f, "ApiCredential::Bearer(<redacted>)"),
        }
    }
}
