//! Auth session lifecycle
//!
//! ```text
//! Unconfigured --initialize(PAT)--> Authenticated(PAT)
//! Unconfigured --initialize(OAuth)--> AwaitingCode --handle_callback--> Authenticated(OAuth)
//! Authenticated(OAuth) --refresh ok--> Authenticated(OAuth)
//! Authenticated(OAuth) --refresh failed--> AwaitingCode
//! ```
//!
//! A failed callback leaves the session untouched. Only `initialize`,
//! `handle_callback`, `refresh_access_token` and `restore_tokens` mutate the
//! credential, and each finishes before the next caller can borrow it.

use super::credential::{
    ApiCredential, AuthMode, AuthParams, Credential, OAuthClientParams, TokenSet,
};
use super::oauth::OAuthHandler;
use super::token_store::TokenStore;
use crate::config::Config;
use crate::error::{LinearError, LinearResult};
use chrono::{DateTime, Duration, Utc};

/// Default window before expiry in which an OAuth token is refreshed
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    AwaitingCode,
    Authenticated(AuthMode),
}

/// Owns the credential and enforces the auth state machine
pub struct AuthSession {
    credential: Option<Credential>,
    oauth: OAuthHandler,
    refresh_margin: Duration,
    token_store: Option<TokenStore>,
}

impl AuthSession {
    /// Create an unconfigured session
    pub fn new(oauth: OAuthHandler) -> Self {
        Self {
            credential: None,
            oauth,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            token_store: None,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Persist OAuth tokens through `store` after each successful exchange
    pub fn with_token_store(mut self, store: TokenStore) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Build the startup session from configuration
    ///
    /// A personal access token wins over OAuth settings. With complete OAuth
    /// client settings the session starts awaiting a code, or authenticated
    /// if tokens for that client were persisted by an earlier run.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let margin = i64::try_from(config.oauth.refresh_margin_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                LinearError::Configuration(format!(
                    "oauth.refresh_margin_secs is out of range: {}",
                    config.oauth.refresh_margin_secs
                ))
            })?;
        let mut session =
            Self::new(OAuthHandler::from_config(&config.oauth)).with_refresh_margin(margin);

        if config.oauth.persist_tokens {
            match TokenStore::new() {
                Ok(store) => session = session.with_token_store(store),
                Err(e) => tracing::warn!("OAuth tokens will not be persisted: {}", e),
            }
        }

        if let Some(token) = &config.access_token {
            session.initialize(AuthParams::PersonalToken {
                token: token.clone(),
            })?;
            return Ok(session);
        }

        if config.oauth.has_client() {
            let client = OAuthClientParams {
                client_id: config.oauth.client_id.clone().unwrap_or_default(),
                client_secret: config.oauth.client_secret.clone().unwrap_or_default(),
                redirect_uri: config.oauth.redirect_uri.clone().unwrap_or_default(),
            };
            let client_id = client.client_id.clone();
            session.initialize(AuthParams::OAuth(client))?;

            let stored = match &session.token_store {
                Some(store) => store.load(&client_id).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring unreadable token file: {}", e);
                    None
                }),
                None => None,
            };
            if let Some(tokens) = stored {
                session.restore_tokens(tokens)?;
            }
        }

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        match &self.credential {
            None => SessionState::Unconfigured,
            Some(credential) if credential.is_usable() => {
                SessionState::Authenticated(credential.mode())
            }
            Some(_) => SessionState::AwaitingCode,
        }
    }

    /// Configure the session for a personal token or an OAuth flow
    pub fn initialize(&mut self, params: AuthParams) -> LinearResult<()> {
        let missing = params.missing_fields();
        if !missing.is_empty() {
            return Err(LinearError::Configuration(format!(
                "Missing required {} parameter(s): {}",
                params.mode(),
                missing.join(", ")
            )));
        }

        if let SessionState::Authenticated(current) = self.state() {
            // Restarting an OAuth flow is the only re-initialization allowed
            // once authenticated
            if !(current == AuthMode::OAuth && params.mode() == AuthMode::OAuth) {
                return Err(LinearError::Configuration(format!(
                    "Session is already authenticated with a {}; cannot switch to {}",
                    current,
                    params.mode()
                )));
            }
            self.forget_stored_tokens();
        }

        self.credential = Some(match params {
            AuthParams::PersonalToken { token } => {
                tracing::info!("Authenticated with personal access token");
                Credential::PersonalToken {
                    token: token.trim().to_string(),
                }
            }
            AuthParams::OAuth(client) => {
                tracing::info!(client_id = %client.client_id, "OAuth flow initialized");
                Credential::OAuth {
                    client,
                    tokens: None,
                }
            }
        });
        Ok(())
    }

    /// URL the user visits to grant access
    pub fn authorization_url(&self) -> LinearResult<String> {
        let client = self.pending_client("build an authorization URL")?;
        self.oauth.authorization_url(client)
    }

    /// Exchange the authorization code delivered to the redirect URI
    pub async fn handle_callback(&mut self, code: &str) -> LinearResult<()> {
        if code.trim().is_empty() {
            return Err(LinearError::Configuration(
                "Authorization code is empty".to_string(),
            ));
        }
        let client = self.pending_client("handle an OAuth callback")?.clone();

        let response = match self.oauth.exchange_code(&client, code.trim()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Authorization code exchange failed: {}", e);
                return Err(e);
            }
        };
        let tokens = TokenSet::from_response(response, Utc::now());

        self.persist(&client.client_id, &tokens);
        self.credential = Some(Credential::OAuth {
            client,
            tokens: Some(tokens),
        });
        tracing::info!("OAuth session authenticated");
        Ok(())
    }

    /// Adopt tokens persisted by an earlier run
    pub fn restore_tokens(&mut self, tokens: TokenSet) -> LinearResult<()> {
        if tokens.access_token.is_empty() {
            return Err(LinearError::Configuration(
                "Stored access token is empty".to_string(),
            ));
        }
        let client = self.pending_client("restore stored tokens")?.clone();
        tracing::debug!("Restored persisted OAuth tokens");
        self.credential = Some(Credential::OAuth {
            client,
            tokens: Some(tokens),
        });
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.as_ref().is_some_and(Credential::is_usable)
    }

    pub fn needs_token_refresh(&self) -> bool {
        self.needs_token_refresh_at(Utc::now())
    }

    /// `needs_token_refresh` evaluated against an explicit clock
    pub fn needs_token_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match &self.credential {
            Some(Credential::OAuth {
                tokens: Some(tokens),
                ..
            }) => tokens.expires_within(self.refresh_margin, now),
            _ => false,
        }
    }

    /// Obtain a new access token with the stored refresh token
    ///
    /// On any failure the tokens are dropped and the session returns to
    /// awaiting an authorization code.
    pub async fn refresh_access_token(&mut self) -> LinearResult<()> {
        let (client, refresh_token) = match &self.credential {
            Some(Credential::OAuth {
                client,
                tokens: Some(tokens),
            }) => (client.clone(), tokens.refresh_token.clone()),
            Some(Credential::OAuth { tokens: None, .. }) => {
                return Err(LinearError::State(
                    "Cannot refresh before the OAuth callback has completed".to_string(),
                ))
            }
            Some(Credential::PersonalToken { .. }) => {
                return Err(LinearError::State(
                    "Personal access tokens do not expire and cannot be refreshed".to_string(),
                ))
            }
            None => {
                return Err(LinearError::State(
                    "Session is not configured".to_string(),
                ))
            }
        };

        let result = match refresh_token {
            Some(refresh_token) => self.oauth.refresh_token(&client, &refresh_token).await,
            None => Err(LinearError::AuthExchange(
                "No refresh token available; re-authorization required".to_string(),
            )),
        };

        match result {
            Ok(response) => {
                let previous_refresh = self.current_tokens().and_then(|t| t.refresh_token.clone());
                let mut tokens = TokenSet::from_response(response, Utc::now());
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = previous_refresh;
                }
                self.persist(&client.client_id, &tokens);
                self.credential = Some(Credential::OAuth {
                    client,
                    tokens: Some(tokens),
                });
                tracing::info!("OAuth access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, session requires re-authorization: {}", e);
                self.forget_stored_tokens();
                self.credential = Some(Credential::OAuth {
                    client,
                    tokens: None,
                });
                Err(e)
            }
        }
    }

    /// Credential carrier for the next API request
    pub fn client(&self) -> LinearResult<ApiCredential> {
        self.credential
            .as_ref()
            .and_then(Credential::api_credential)
            .ok_or_else(|| match self.state() {
                SessionState::AwaitingCode => LinearError::State(
                    "OAuth flow has not completed; visit the authorization URL first".to_string(),
                ),
                _ => LinearError::State(
                    "Not authenticated; set LINEAR_ACCESS_TOKEN or start the OAuth flow"
                        .to_string(),
                ),
            })
    }

    /// OAuth client of a session that is waiting for its code
    fn pending_client(&self, action: &str) -> LinearResult<&OAuthClientParams> {
        match &self.credential {
            Some(Credential::OAuth {
                client,
                tokens: None,
            }) => Ok(client),
            Some(Credential::OAuth { tokens: Some(_), .. }) => Err(LinearError::State(format!(
                "Cannot {}: OAuth session is already authenticated",
                action
            ))),
            Some(Credential::PersonalToken { .. }) => Err(LinearError::State(format!(
                "Cannot {}: session uses a personal access token",
                action
            ))),
            None => Err(LinearError::State(format!(
                "Cannot {}: OAuth has not been initialized",
                action
            ))),
        }
    }

    fn current_tokens(&self) -> Option<&TokenSet> {
        match &self.credential {
            Some(Credential::OAuth { tokens, .. }) => tokens.as_ref(),
            _ => None,
        }
    }

    fn forget_stored_tokens(&self) {
        if let Some(store) = &self.token_store {
            if let Err(e) = store.delete() {
                tracing::warn!("Failed to delete stored tokens: {}", e);
            }
        }
    }

        fn persist(&self, client_id: &str, tokens: &TokenSet) {
        if let Some(store) = &self.token_store {
            if let Err(e) = store.save(client_id, tokens) {
                tracing::warn!("Failed to persist OAuth tokens: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;

    fn session() -> AuthSession {
        AuthSession::new(OAuthHandler::from_config(&OAuthConfig::default()))
    }

    fn oauth_params() -> AuthParams {
        AuthParams::OAuth(OAuthClientParams {
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            redirect_uri: "https://cb".to_string(),
        })
    }

    fn pat(token: &str) -> AuthParams {
        AuthParams::PersonalToken {
            token: token.to_string(),
        }
    }

    fn tokens_expiring_in(secs: i64) -> TokenSet {
        TokenSet {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: Some(Utc::now() + Duration::seconds(secs)),
            scopes: vec![],
        }
    }

    #[test]
    fn test_unconfigured_session() {
        let session = session();
        assert_eq!(session.state(), SessionState::Unconfigured);
        assert!(!session.is_authenticated());
        assert!(!session.needs_token_refresh());
        assert!(matches!(session.client(), Err(LinearError::State(_))));
        assert!(matches!(
            session.authorization_url(),
            Err(LinearError::State(_))
        ));
    }

    #[test]
    fn test_personal_token_authenticates_immediately() {
        let mut session = session();
        session.initialize(pat("pat_123")).unwrap();

        assert!(session.is_authenticated());
        assert_eq!(
            session.state(),
            SessionState::Authenticated(AuthMode::PersonalToken)
        );
        assert!(!session.needs_token_refresh());
        assert_eq!(session.client().unwrap().authorization_header(), "pat_123");
        assert!(matches!(
            session.authorization_url(),
            Err(LinearError::State(_))
        ));
    }

    #[test]
    fn test_missing_parameters() {
        let mut session = session();
        let err = session.initialize(pat("")).unwrap_err();
        assert!(matches!(err, LinearError::Configuration(_)));

        let err = session
            .initialize(AuthParams::OAuth(OAuthClientParams {
                client_id: "c".to_string(),
                client_secret: String::new(),
                redirect_uri: "https://cb".to_string(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("clientSecret"));
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn test_cannot_switch_away_from_personal_token() {
        let mut session = session();
        session.initialize(pat("pat_123")).unwrap();

        let err = session.initialize(oauth_params()).unwrap_err();
        assert!(matches!(err, LinearError::Configuration(_)));
        assert_eq!(session.client().unwrap().authorization_header(), "pat_123");
    }

    #[test]
    fn test_oauth_awaits_code() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();

        assert_eq!(session.state(), SessionState::AwaitingCode);
        assert!(!session.is_authenticated());
        assert!(!session.needs_token_refresh());
        assert!(matches!(session.client(), Err(LinearError::State(_))));

        let url = session.authorization_url().unwrap();
        assert!(url.contains("client_id=c"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fcb"));
    }

    #[test]
    fn test_pending_oauth_can_switch_to_personal_token() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();
        session.initialize(pat("pat_123")).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Authenticated(AuthMode::PersonalToken)
        );
    }

    #[test]
    fn test_restored_oauth_session() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();
        session.restore_tokens(tokens_expiring_in(3600)).unwrap();

        assert_eq!(session.state(), SessionState::Authenticated(AuthMode::OAuth));
        assert!(!session.needs_token_refresh());
        assert_eq!(session.client().unwrap().authorization_header(), "Bearer at");
        assert!(matches!(
            session.authorization_url(),
            Err(LinearError::State(_))
        ));

        // Authenticated OAuth sessions refuse a switch to a personal token
        assert!(session.initialize(pat("pat_123")).is_err());

        // ...but may restart the OAuth flow
        session.initialize(oauth_params()).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCode);
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();
        session.restore_tokens(tokens_expiring_in(120)).unwrap();
        assert!(session.needs_token_refresh());

        let later = Utc::now() + Duration::hours(2);
        let mut session = self::session().with_refresh_margin(Duration::zero());
        session.initialize(oauth_params()).unwrap();
        session.restore_tokens(tokens_expiring_in(3600)).unwrap();
        assert!(!session.needs_token_refresh());
        assert!(session.needs_token_refresh_at(later));
    }

    #[test]
    fn test_restore_requires_pending_oauth() {
        let mut session = session();
        assert!(matches!(
            session.restore_tokens(tokens_expiring_in(60)),
            Err(LinearError::State(_))
        ));
        session.initialize(pat("pat_123")).unwrap();
        assert!(matches!(
            session.restore_tokens(tokens_expiring_in(60)),
            Err(LinearError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejected_for_personal_token() {
        let mut session = session();
        session.initialize(pat("pat_123")).unwrap();
        let err = session.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, LinearError::State(_)));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_downgrades() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();
        let mut tokens = tokens_expiring_in(10);
        tokens.refresh_token = None;
        session.restore_tokens(tokens).unwrap();

        let err = session.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, LinearError::AuthExchange(_)));
        assert_eq!(session.state(), SessionState::AwaitingCode);
        assert!(!session.is_authenticated());
        assert!(session.client().is_err());
        // A fresh authorization can start right away
        assert!(session.authorization_url().is_ok());
    }

    #[tokio::test]
    async fn test_callback_rejected_outside_awaiting_state() {
        let mut session = session();
        assert!(matches!(
            session.handle_callback("code").await,
            Err(LinearError::State(_))
        ));

        session.initialize(pat("pat_123")).unwrap();
        assert!(matches!(
            session.handle_callback("code").await,
            Err(LinearError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_with_empty_code() {
        let mut session = session();
        session.initialize(oauth_params()).unwrap();
        assert!(matches!(
            session.handle_callback("  ").await,
            Err(LinearError::Configuration(_))
        ));
        assert_eq!(session.state(), SessionState::AwaitingCode);
    }

    #[test]
    fn test_from_config_prefers_personal_token() {
        let mut config = Config::default();
        config.oauth.persist_tokens = false;
        config.access_token = Some("pat_123".to_string());
        config.oauth.client_id = Some("c".to_string());
        config.oauth.client_secret = Some("s".to_string());
        config.oauth.redirect_uri = Some("https://cb".to_string());

        let session = AuthSession::from_config(&config).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Authenticated(AuthMode::PersonalToken)
        );

        config.access_token = None;
        let session = AuthSession::from_config(&config).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCode);

        config.oauth.client_secret = None;
        let session = AuthSession::from_config(&config).unwrap();
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn test_restarting_oauth_clears_stored_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path().join("oauth.json"));
        let mut session = session().with_token_store(store.clone());

        session.initialize(oauth_params()).unwrap();
        let tokens = tokens_expiring_in(3600);
        store.save("c", &tokens).unwrap();
        session.restore_tokens(tokens).unwrap();
        assert!(session.is_authenticated());

        session.initialize(oauth_params()).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCode);
        assert!(store.load("c").unwrap().is_none());
    }

    #[test]
    fn test_from_config_rejects_out_of_range_margin() {
        let mut config = Config::default();
        config.oauth.persist_tokens = false;

        for margin in [10_000_000_000_000_000, u64::MAX] {
            config.oauth.refresh_margin_secs = margin;
            let err = AuthSession::from_config(&config).err().unwrap();
            assert!(err.to_string().contains("refresh_margin_secs"));
        }
    }

    #[test]
    fn test_margin_past_date_range_always_refreshes() {
        let mut config = Config::default();
        config.oauth.persist_tokens = false;
        config.oauth.refresh_margin_secs = 100_000_000_000_000;
        config.oauth.client_id = Some("c".to_string());
        config.oauth.client_secret = Some("s".to_string());
        config.oauth.redirect_uri = Some("https://cb".to_string());

        let mut session = AuthSession::from_config(&config).unwrap();
        session.restore_tokens(tokens_expiring_in(3600)).unwrap();
        assert!(session.is_authenticated());
        assert!(session.needs_token_refresh());
    }

    proptest::proptest! {
        #[test]
        fn prop_personal_token_never_needs_refresh(token in "[a-z0-9_]{1,32}", offset in -100_000i64..100_000) {
            let mut session = session();
            session.initialize(pat(&token)).unwrap();
            let now = Utc::now() + Duration::seconds(offset);
            proptest::prop_assert!(!session.needs_token_refresh_at(now));
        }

        #[test]
        fn prop_refresh_window_matches_margin(lifetime in -10_000i64..10_000, margin in 0i64..3_600) {
            let now = Utc::now();
            let mut session = session().with_refresh_margin(Duration::seconds(margin));
            session.initialize(oauth_params()).unwrap();
            let mut tokens = tokens_expiring_in(0);
            tokens.expires_at = Some(now + Duration::seconds(lifetime));
            session.restore_tokens(tokens).unwrap();
            proptest::prop_assert_eq!(session.needs_token_refresh_at(now), lifetime <= margin);
        }
    }
}
