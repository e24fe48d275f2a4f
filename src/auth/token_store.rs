//! Secure token storage with file permissions and versioning
//!
//! OAuth tokens are stored in ~/.local/share/linear-tools/tokens/oauth.json
//! with 0600 permissions (owner read/write only).

use super::credential::TokenSet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token storage format with version for future migrations
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    version: u32,
    /// OAuth client the tokens were issued to
    client_id: String,
    #[serde(flatten)]
    tokens: TokenSet,
    stored_at: chrono::DateTime<chrono::Utc>,
}

/// Persists the OAuth token set between runs
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Current storage schema version
    const VERSION: u32 = 1;

    /// Store at the default per-user location
    pub fn new() -> Result<Self> {
        let tokens_dir = Self::tokens_dir()?;
        Ok(Self::at(tokens_dir.join("oauth.json")))
    }

    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tokens_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .context("Failed to determine data directory")?;

        Ok(data_dir.join("linear-tools").join("tokens"))
    }

    /// Load tokens issued to `client_id`, if any were stored
    ///
    /// Tokens stored for a different client are ignored.
    pub fn load(&self, client_id: &str) -> Result<Option<TokenSet>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).context("Failed to read token file")?;
        let stored: StoredToken =
            serde_json::from_str(&content).context("Failed to parse token file")?;

        if stored.version > Self::VERSION {
            anyhow::bail!(
                "Token file version {} is newer than supported version {}",
                stored.version,
                Self::VERSION
            );
        }

        if stored.client_id != client_id {
            tracing::debug!("Ignoring stored tokens issued to a different client");
            return Ok(None);
        }

        Ok(Some(stored.tokens))
    }

    /// Save tokens with secure permissions
    pub fn save(&self, client_id: &str, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let stored = StoredToken {
            version: Self::VERSION,
            client_id: client_id.to_string(),
            tokens: tokens.clone(),
            stored_at: chrono::Utc::now(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp token file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)
                .context("Failed to set token file permissions")?;
        }

        std::fs::rename(&temp_path, &self.path).context("Failed to save token file")?;

        tracing::debug!("Saved OAuth tokens to {:?}", self.path);
        Ok(())
    }

    /// Delete stored tokens
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to delete token file")?;
            tracing::info!("Deleted stored OAuth tokens from {:?}", self.path);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
