//! Authentication for the Linear API
//!
//! A session is either a personal access token or an OAuth2
//! authorization-code flow with refreshable tokens.

pub mod callback;
mod credential;
mod oauth;
mod session;
mod token_store;

pub use credential::{ApiCredential, AuthMode, AuthParams, Credential, OAuthClientParams, TokenSet};
pub use oauth::{OAuthHandler, TokenResponse};
pub use session::{AuthSession, SessionState, DEFAULT_REFRESH_MARGIN_SECS};
pub use token_store::TokenStore;
