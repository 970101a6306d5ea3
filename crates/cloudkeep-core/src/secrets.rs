//! OAuth secrets store.
//!
//! Tokens never enter the catalog. They live in a JSON file keyed by
//! `provider:email`, with a reserved `oauth_clients` key holding per-provider
//! client credentials. The file is created with mode 0600 and every write is
//! atomic (temp file in the same directory, chmod, rename), so concurrent
//! writers cannot leave a torn file — last writer wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::Account;

/// Reserved top-level key for OAuth client configuration.
const OAUTH_CLIENTS_KEY: &str = "oauth_clients";

/// Errors from secrets file operations.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Failed to read secrets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write secrets file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid secrets file format: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}

/// One account's stored OAuth tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` when the provider did not report an expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Whether the access token expires within `buffer` from now.
    /// Tokens without an expiry are treated as still valid.
    pub fn expires_within(&self, buffer: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() + buffer >= expiry,
            None => false,
        }
    }
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OauthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// On-disk shape: account keys at the top level plus the reserved
/// `oauth_clients` object.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    oauth_clients: BTreeMap<String, OauthClientConfig>,
    #[serde(flatten)]
    accounts: BTreeMap<String, TokenRecord>,
}

/// Handle to the secrets file.
#[derive(Debug, Clone)]
pub struct SecretsStore {
    path: PathBuf,
}

impl SecretsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tokens for an account, or `None` if absent.
    pub fn get_tokens(&self, account: &Account) -> Result<Option<TokenRecord>, SecretsError> {
        Ok(self.load()?.accounts.remove(&account.secrets_key()))
    }

    /// Store tokens for an account, replacing any existing record.
    pub fn set_tokens(&self, account: &Account, tokens: TokenRecord) -> Result<(), SecretsError> {
        let mut file = self.load()?;
        file.accounts.insert(account.secrets_key(), tokens);
        self.save(&file)?;
        info!(account = %account.secrets_key(), "Saved tokens");
        Ok(())
    }

    /// Delete an account's tokens. Returns whether a record existed.
    pub fn delete_tokens(&self, account: &Account) -> Result<bool, SecretsError> {
        let mut file = self.load()?;
        let removed = file.accounts.remove(&account.secrets_key()).is_some();
        if removed {
            self.save(&file)?;
            info!(account = %account.secrets_key(), "Deleted tokens");
        }
        Ok(removed)
    }

    pub fn has_tokens(&self, account: &Account) -> Result<bool, SecretsError> {
        Ok(self.load()?.accounts.contains_key(&account.secrets_key()))
    }

    /// All account keys (`provider:email`) present in the file.
    pub fn list_account_keys(&self) -> Result<Vec<String>, SecretsError> {
        Ok(self.load()?.accounts.into_keys().collect())
    }

    /// OAuth client configuration for a provider tag, if configured.
    pub fn oauth_client_config(
        &self,
        provider: &str,
    ) -> Result<Option<OauthClientConfig>, SecretsError> {
        Ok(self.load()?.oauth_clients.remove(provider))
    }

    /// Store OAuth client configuration for a provider tag.
    pub fn set_oauth_client_config(
        &self,
        provider: &str,
        config: OauthClientConfig,
    ) -> Result<(), SecretsError> {
        let mut file = self.load()?;
        file.oauth_clients.insert(provider.to_string(), config);
        self.save(&file)?;
        info!(provider, "Saved OAuth client config");
        Ok(())
    }

    fn load(&self) -> Result<SecretsFile, SecretsError> {
        if !self.path.exists() {
            return Ok(SecretsFile::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| SecretsError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, file: &SecretsFile) -> Result<(), SecretsError> {
        let write_err = |source| SecretsError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(write_err)?;

        let tmp_path = parent.join(format!(".secrets_{}.tmp", uuid::Uuid::new_v4().simple()));
        let result = (|| {
            let mut f = fs::File::create(&tmp_path).map_err(write_err)?;
            let json = serde_json::to_string_pretty(file)?;
            f.write_all(json.as_bytes()).map_err(write_err)?;
            f.sync_all().map_err(write_err)?;
            // Restrict permissions before the record becomes visible.
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
            fs::rename(&tmp_path, &self.path).map_err(write_err)?;
            debug!(path = %self.path.display(), "Secrets file written");
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}
