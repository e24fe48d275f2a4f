//! linear-tools: Linear issue-tracker operations as callable tools
//!
//! This library provides:
//! - An auth session for personal access tokens and OAuth2 with refresh
//! - An operation façade translating issue/project/team/user operations into
//!   GraphQL requests
//! - A tool catalogue and dispatcher tying the two together

pub mod auth;
pub mod config;
pub mod error;
pub mod linear;
pub mod tools;

pub use auth::{AuthSession, SessionState};
pub use config::Config;
pub use error::{LinearError, LinearResult};
pub use linear::LinearFacade;
pub use tools::{DispatchError, Dispatcher};
