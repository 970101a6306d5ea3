//! Google Drive provider client.
//!
//! Implements [`cloudkeep_core::ports::ProviderClient`] against the Drive v3
//! REST API: the Changes API for delta enumeration, media download and
//! export endpoints for content, and the OAuth token endpoint for refresh.
//! Tokens are read from and written back to the secrets store; the
//! interactive authorization flow lives outside this crate.

mod client;
mod types;

pub use client::DriveClient;
pub use types::{export_extension, export_mime_type, is_downloadable, FOLDER_MIME_TYPE};
