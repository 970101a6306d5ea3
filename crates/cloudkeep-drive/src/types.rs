//! Drive API wire types and MIME classification.
//!
//! The structs here mirror the JSON shapes of the Drive v3 API and convert
//! into the port-level DTOs. Cloud-native Google Docs have no byte
//! representation of their own; they are exported through a fixed MIME
//! mapping and stored as ordinary blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use cloudkeep_core::ports::{ChangeRecord, ChangesPage, RemoteFile};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google Docs MIME types with their export MIME type and filename extension.
const GOOGLE_DOC_EXPORTS: &[(&str, &str, &str)] = &[
    (
        "application/vnd.google-apps.document",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    (
        "application/vnd.google-apps.spreadsheet",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    (
        "application/vnd.google-apps.presentation",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("application/vnd.google-apps.drawing", "application/pdf", ".pdf"),
    ("application/vnd.google-apps.form", "application/pdf", ".pdf"),
    (
        "application/vnd.google-apps.script",
        "application/vnd.google-apps.script+json",
        ".json",
    ),
];

/// MIME types with no downloadable or exportable content.
const NON_DOWNLOADABLE_TYPES: &[&str] = &[
    FOLDER_MIME_TYPE,
    "application/vnd.google-apps.shortcut",
    "application/vnd.google-apps.map",
    "application/vnd.google-apps.site",
    "application/vnd.google-apps.fusiontable",
];

/// Whether files of this MIME type carry fetchable bytes.
pub fn is_downloadable(mime_type: &str) -> bool {
    !NON_DOWNLOADABLE_TYPES.contains(&mime_type)
}

/// Export MIME type for a Google Docs type, `None` for ordinary files.
pub fn export_mime_type(mime_type: &str) -> Option<&'static str> {
    GOOGLE_DOC_EXPORTS
        .iter()
        .find(|(m, _, _)| *m == mime_type)
        .map(|(_, export, _)| *export)
}

/// Filename extension used when exporting a Google Docs type.
pub fn export_extension(mime_type: &str) -> Option<&'static str> {
    GOOGLE_DOC_EXPORTS
        .iter()
        .find(|(m, _, _)| *m == mime_type)
        .map(|(_, _, ext)| *ext)
}

// ============================================================================
// Wire structs
// ============================================================================

/// Drive serializes 64-bit integers as JSON strings; accept both.
fn de_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, deserialize_with = "de_size")]
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
    pub etag: Option<String>,
}

impl From<ApiFile> for RemoteFile {
    fn from(file: ApiFile) -> Self {
        RemoteFile {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            modified_time: file.modified_time,
            checksum: file.md5_checksum,
            parents: file.parents,
            trashed: file.trashed,
            etag: file.etag,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiChange {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default = "default_change_type")]
    pub change_type: String,
    pub time: Option<DateTime<Utc>>,
    pub file: Option<ApiFile>,
}

fn default_change_type() -> String {
    "file".to_string()
}

impl From<ApiChange> for ChangeRecord {
    fn from(change: ApiChange) -> Self {
        ChangeRecord {
            file_id: change.file_id,
            removed: change.removed,
            file: change.file.map(RemoteFile::from),
            change_type: change.change_type,
            time: change.time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiChangesPage {
    #[serde(default)]
    pub changes: Vec<ApiChange>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

impl From<ApiChangesPage> for ChangesPage {
    fn from(page: ApiChangesPage) -> Self {
        ChangesPage {
            changes: page.changes.into_iter().map(ChangeRecord::from).collect(),
            new_start_page_token: page.new_start_page_token,
            next_page_token: page.next_page_token,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartPageTokenResponse {
    pub start_page_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_and_shortcuts_are_not_downloadable() {
        assert!(!is_downloadable(FOLDER_MIME_TYPE));
        assert!(!is_downloadable("application/vnd.google-apps.shortcut"));
        assert!(is_downloadable("application/pdf"));
        assert!(is_downloadable("application/vnd.google-apps.document"));
    }

    #[test]
    fn export_mapping_for_google_docs() {
        assert_eq!(
            export_extension("application/vnd.google-apps.document"),
            Some(".docx")
        );
        assert_eq!(
            export_extension("application/vnd.google-apps.spreadsheet"),
            Some(".xlsx")
        );
        assert_eq!(export_extension("application/vnd.google-apps.form"), Some(".pdf"));
        assert_eq!(export_extension("application/pdf"), None);
        assert_eq!(
            export_mime_type("application/vnd.google-apps.presentation"),
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        );
    }

    #[test]
    fn api_file_parses_string_size() {
        let json = serde_json::json!({
            "id": "A",
            "name": "r.pdf",
            "mimeType": "application/pdf",
            "size": "12",
            "modifiedTime": "2024-01-15T10:30:00Z",
            "md5Checksum": "abc",
            "parents": ["F"],
        });
        let file: ApiFile = serde_json::from_value(json).unwrap();
        assert_eq!(file.size, Some(12));
        assert!(!file.trashed);

        let remote = RemoteFile::from(file);
        assert_eq!(remote.parents, vec!["F".to_string()]);
        assert_eq!(remote.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn api_file_parses_numeric_size() {
        let json = serde_json::json!({"id": "A", "size": 42});
        let file: ApiFile = serde_json::from_value(json).unwrap();
        assert_eq!(file.size, Some(42));
    }

    #[test]
    fn removed_change_has_no_file() {
        let json = serde_json::json!({
            "fileId": "A",
            "removed": true,
            "changeType": "file",
            "time": "2024-02-01T00:00:00Z"
        });
        let change: ApiChange = serde_json::from_value(json).unwrap();
        let record = ChangeRecord::from(change);
        assert!(record.removed);
        assert!(record.file.is_none());
        assert!(record.is_deletion());
    }
}
