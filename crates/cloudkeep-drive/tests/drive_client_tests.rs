//! Integration tests for the Drive client against a mock HTTP server.

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cloudkeep_core::domain::{Account, AccountId, ProviderKind};
use cloudkeep_core::ports::{ProviderClient, ProviderError};
use cloudkeep_core::secrets::{OauthClientConfig, SecretsStore, TokenRecord};
use cloudkeep_drive::DriveClient;

const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,md5Checksum,parents,trashed";

fn account() -> Account {
    Account {
        id: AccountId(1),
        provider: ProviderKind::GoogleDrive,
        name: "Test".into(),
        email: "user@example.com".into(),
        is_active: true,
        sync_interval_minutes: 360,
        next_sync_at: None,
        created_at: Utc::now(),
    }
}

/// Secrets store seeded with a token valid for one hour.
fn secrets_with_fresh_token(dir: &tempfile::TempDir) -> SecretsStore {
    let store = SecretsStore::new(dir.path().join("secrets.json"));
    store
        .set_tokens(
            &account(),
            TokenRecord {
                access_token: "test-access-token".into(),
                refresh_token: Some("test-refresh-token".into()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            },
        )
        .unwrap();
    store
}

async fn client(server: &MockServer, secrets: SecretsStore) -> DriveClient {
    DriveClient::with_endpoints(
        account(),
        secrets,
        server.uri(),
        format!("{}/token", server.uri()),
    )
}

#[tokio::test]
async fn get_start_page_token_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "startPageToken": "1042"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert_eq!(client.get_start_page_token().await.unwrap(), "1042");
}

#[tokio::test]
async fn list_changes_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "newStartPageToken": "1042",
            "changes": [
                {
                    "fileId": "A",
                    "removed": false,
                    "changeType": "file",
                    "time": "2024-01-15T10:30:00Z",
                    "file": {
                        "id": "A",
                        "name": "r.pdf",
                        "mimeType": "application/pdf",
                        "size": "12",
                        "modifiedTime": "2024-01-15T10:30:00Z",
                        "parents": ["F"],
                        "trashed": false
                    }
                },
                {"fileId": "B", "removed": true, "changeType": "file"}
            ]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    let page = client.list_changes("1", 1000).await.unwrap();

    assert_eq!(page.changes.len(), 2);
    assert_eq!(page.new_start_page_token.as_deref(), Some("1042"));
    assert!(!page.has_more());

    let added = &page.changes[0];
    assert!(!added.is_deletion());
    let file = added.file.as_ref().unwrap();
    assert_eq!(file.size, Some(12));
    assert_eq!(file.parents, vec!["F".to_string()]);

    assert!(page.changes[1].is_deletion());
}

#[tokio::test]
async fn list_changes_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "page-2",
            "changes": [{"fileId": "A", "removed": false, "changeType": "file"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "newStartPageToken": "1042",
            "changes": []
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;

    let first = client.list_changes("1", 100).await.unwrap();
    assert!(first.has_more());
    assert_eq!(first.next_page_token.as_deref(), Some("page-2"));

    let second = client
        .list_changes(first.next_page_token.as_deref().unwrap(), 100)
        .await
        .unwrap();
    assert!(!second.has_more());
    assert_eq!(second.new_start_page_token.as_deref(), Some("1042"));
}

#[tokio::test]
async fn download_regular_file_uses_media_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/A"))
        .and(query_param("fields", FILE_FIELDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "A",
            "name": "r.pdf",
            "mimeType": "application/pdf",
            "size": "12",
            "modifiedTime": "2024-01-15T10:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/A"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world\n".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert_eq!(client.download("A").await.unwrap(), b"hello world\n");
}

#[tokio::test]
async fn download_google_doc_routes_through_export() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/D"))
        .and(query_param("fields", FILE_FIELDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "D",
            "name": "Notes",
            "mimeType": "application/vnd.google-apps.document",
            "modifiedTime": "2024-01-15T10:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/D/export"))
        .and(query_param(
            "mimeType",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"exported-docx".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert_eq!(client.download("D").await.unwrap(), b"exported-docx");
    assert_eq!(
        client.export_extension("application/vnd.google-apps.document"),
        Some(".docx")
    );
}

#[tokio::test]
async fn download_shortcut_is_not_downloadable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/S"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "S",
            "name": "Shortcut",
            "mimeType": "application/vnd.google-apps.shortcut"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert!(matches!(
        client.download("S").await.unwrap_err(),
        ProviderError::NotDownloadable(_)
    ));
}

#[tokio::test]
async fn missing_file_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert!(matches!(
        client.get_file_metadata("missing").await.unwrap_err(),
        ProviderError::NotFound(_)
    ));
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    let err = client.get_start_page_token().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn refresh_skipped_while_token_is_fresh() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(&server, secrets_with_fresh_token(&dir)).await;
    assert!(!client.refresh_tokens_if_needed().await.unwrap());
}

#[tokio::test]
async fn refresh_posts_to_token_endpoint_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=test-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = SecretsStore::new(dir.path().join("secrets.json"));
    store
        .set_tokens(
            &account(),
            TokenRecord {
                access_token: "stale-access-token".into(),
                refresh_token: Some("test-refresh-token".into()),
                expires_at: Some(Utc::now() - Duration::minutes(1)),
            },
        )
        .unwrap();
    store
        .set_oauth_client_config(
            "google_drive",
            OauthClientConfig {
                client_id: "cid".into(),
                client_secret: "cs".into(),
                redirect_uri: None,
            },
        )
        .unwrap();

    let client = client(&server, store.clone()).await;
    assert!(client.refresh_tokens_if_needed().await.unwrap());

    let persisted = store.get_tokens(&account()).unwrap().unwrap();
    assert_eq!(persisted.access_token, "new-access-token");
    // The refresh token survives even though Google omitted it.
    assert_eq!(persisted.refresh_token.as_deref(), Some("test-refresh-token"));
    assert!(persisted.expires_at.unwrap() > Utc::now());

    // A second call sees the fresh token and does nothing.
    assert!(!client.refresh_tokens_if_needed().await.unwrap());
}

#[tokio::test]
async fn refresh_without_stored_tokens_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = SecretsStore::new(dir.path().join("secrets.json"));
    let client = client(&server, store).await;
    assert!(matches!(
        client.refresh_tokens_if_needed().await.unwrap_err(),
        ProviderError::TokenExpired(_)
    ));
}

#[tokio::test]
async fn refresh_without_refresh_token_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = SecretsStore::new(dir.path().join("secrets.json"));
    store
        .set_tokens(
            &account(),
            TokenRecord {
                access_token: "stale".into(),
                refresh_token: None,
                expires_at: Some(Utc::now() - Duration::minutes(1)),
            },
        )
        .unwrap();
    let client = client(&server, store).await;
    assert!(matches!(
        client.refresh_tokens_if_needed().await.unwrap_err(),
        ProviderError::TokenExpired(_)
    ));
}
