//! Drive API client.

use chrono::{Duration, Utc};
use reqwest::{Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cloudkeep_core::domain::Account;
use cloudkeep_core::ports::{ChangesPage, ProviderClient, ProviderError, RemoteFile};
use cloudkeep_core::secrets::{SecretsStore, TokenRecord};

use crate::types::{
    export_mime_type, is_downloadable, ApiChangesPage, ApiFile, StartPageTokenResponse,
    TokenResponse,
};

/// Drive v3 REST base URL.
const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Google OAuth token endpoint.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh the access token when it expires within this window.
const REFRESH_BUFFER_MINUTES: i64 = 5;

/// File metadata fields requested from the API.
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,md5Checksum,parents,trashed";

/// Client for Google Drive API operations for one account.
///
/// Holds the account's token record behind a mutex so that a refresh racing
/// another request settles on the newer token; the secrets store write is
/// atomic, last writer wins.
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    account: Account,
    secrets: SecretsStore,
    tokens: Mutex<Option<TokenRecord>>,
}

impl DriveClient {
    pub fn new(account: Account, secrets: SecretsStore) -> Self {
        Self::with_endpoints(account, secrets, API_BASE_URL, TOKEN_URL)
    }

    /// Construct against custom endpoints (used by tests to point at a mock
    /// server).
    pub fn with_endpoints(
        account: Account,
        secrets: SecretsStore,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            token_url: token_url.into(),
            account,
            secrets,
            tokens: Mutex::new(None),
        }
    }

    /// Current access token, loading from the secrets store on first use.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.tokens.lock().await;
        if guard.is_none() {
            *guard = self
                .secrets
                .get_tokens(&self.account)
                .map_err(|e| ProviderError::TokenExpired(e.to_string()))?;
        }
        guard
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| {
                ProviderError::TokenExpired(format!(
                    "No tokens found for account {}",
                    self.account.secrets_key()
                ))
            })
    }

    async fn get(&self, path_and_query: &str) -> Result<Response, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, path_and_query);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request to {url} failed: {e}")))?;
        map_status(response)
    }

    async fn fetch_metadata(&self, file_id: &str) -> Result<ApiFile, ProviderError> {
        let response = self
            .get(&format!(
                "/files/{file_id}?fields={FILE_FIELDS}&supportsAllDrives=true"
            ))
            .await?;
        response
            .json::<ApiFile>()
            .await
            .map_err(|e| anyhow::anyhow!("malformed file metadata: {e}").into())
    }
}

/// Map non-success HTTP statuses onto the provider error taxonomy.
fn map_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    match status {
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound(url.path().to_string())),
        StatusCode::UNAUTHORIZED => Err(ProviderError::TokenExpired(format!(
            "unauthorized response from {url}"
        ))),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(ProviderError::Transient(format!("rate limited by {url}")))
        }
        s if s.is_server_error() => Err(ProviderError::Transient(format!(
            "server error {s} from {url}"
        ))),
        s => Err(anyhow::anyhow!("unexpected status {s} from {url}").into()),
    }
}

#[async_trait::async_trait]
impl ProviderClient for DriveClient {
    async fn refresh_tokens_if_needed(&self) -> Result<bool, ProviderError> {
        let mut guard = self.tokens.lock().await;
        if guard.is_none() {
            *guard = self
                .secrets
                .get_tokens(&self.account)
                .map_err(|e| ProviderError::TokenExpired(e.to_string()))?;
        }
        let Some(current) = guard.as_ref() else {
            return Err(ProviderError::TokenExpired(format!(
                "No tokens found for account {}",
                self.account.secrets_key()
            )));
        };

        if !current.expires_within(Duration::minutes(REFRESH_BUFFER_MINUTES)) {
            return Ok(false);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(ProviderError::TokenExpired(
                "No refresh token available".to_string(),
            ));
        };

        let client_config = self
            .secrets
            .oauth_client_config(self.account.provider.as_str())
            .map_err(|e| ProviderError::TokenExpired(e.to_string()))?
            .ok_or_else(|| {
                ProviderError::TokenExpired(format!(
                    "No OAuth client config for provider {}",
                    self.account.provider
                ))
            })?;

        debug!(account = %self.account.secrets_key(), "Refreshing access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", client_config.client_id.as_str()),
                ("client_secret", client_config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::TokenExpired(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::TokenExpired(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::TokenExpired(format!("malformed token response: {e}")))?;

        let record = TokenRecord {
            access_token: token_response.access_token,
            // Google omits the refresh token on refresh; keep the old one.
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
            expires_at: token_response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        };

        self.secrets
            .set_tokens(&self.account, record.clone())
            .map_err(|e| ProviderError::TokenExpired(format!("failed to persist tokens: {e}")))?;
        *guard = Some(record);

        info!(account = %self.account.secrets_key(), "Access token refreshed");
        Ok(true)
    }

    async fn get_start_page_token(&self) -> Result<String, ProviderError> {
        let response = self.get("/changes/startPageToken").await?;
        let parsed: StartPageTokenResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed startPageToken response: {e}"))?;
        Ok(parsed.start_page_token)
    }

    async fn list_changes(
        &self,
        page_token: &str,
        page_size: u32,
    ) -> Result<ChangesPage, ProviderError> {
        let fields = format!(
            "nextPageToken,newStartPageToken,\
             changes(fileId,removed,changeType,time,file({FILE_FIELDS}))"
        );
        let response = self
            .get(&format!(
                "/changes?pageToken={page_token}&pageSize={page_size}&fields={fields}\
                 &includeItemsFromAllDrives=true&supportsAllDrives=true"
            ))
            .await?;
        let parsed: ApiChangesPage = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed changes response: {e}"))?;
        debug!(
            changes = parsed.changes.len(),
            has_next = parsed.next_page_token.is_some(),
            "Changes page fetched"
        );
        Ok(parsed.into())
    }

    async fn get_file_metadata(&self, file_id: &str) -> Result<RemoteFile, ProviderError> {
        Ok(self.fetch_metadata(file_id).await?.into())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        let meta = self.fetch_metadata(file_id).await?;
        if !is_downloadable(&meta.mime_type) {
            return Err(ProviderError::NotDownloadable(meta.mime_type));
        }

        let response = match export_mime_type(&meta.mime_type) {
            Some(export_mime) => {
                debug!(file_id, export_mime, "Exporting Google Docs file");
                self.get(&format!("/files/{file_id}/export?mimeType={export_mime}"))
                    .await?
            }
            None => self.get(&format!("/files/{file_id}?alt=media")).await?,
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(format!("download of {file_id} failed: {e}")))?;

        if let Some(expected) = meta.size {
            if expected != bytes.len() as u64 {
                warn!(
                    file_id,
                    expected,
                    actual = bytes.len(),
                    "Downloaded size differs from reported size"
                );
            }
        }

        Ok(bytes.to_vec())
    }

    fn is_folder(&self, mime_type: &str) -> bool {
        mime_type == crate::types::FOLDER_MIME_TYPE
    }

    fn is_downloadable(&self, mime_type: &str) -> bool {
        is_downloadable(mime_type)
    }

    fn export_extension(&self, mime_type: &str) -> Option<&'static str> {
        crate::types::export_extension(mime_type)
    }
}
