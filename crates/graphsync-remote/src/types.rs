//! JSON bodies exchanged with the sync backend
//!
//! Keys are PascalCase on the wire; the graph id travels as `GraphUUID`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GraphRequest {
    #[serde(rename = "GraphUUID")]
    pub graph_uuid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesRequest {
    #[serde(rename = "GraphUUID")]
    pub graph_uuid: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionFileRef {
    pub key: String,
    pub version_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionFilesRequest {
    #[serde(rename = "GraphUUID")]
    pub graph_uuid: String,
    pub files: Vec<VersionFileRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateEntry {
    pub temp_key: String,
    pub checksum: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateFilesRequest {
    #[serde(rename = "GraphUUID")]
    pub graph_uuid: String,
    pub files: HashMap<String, UpdateEntry>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub version: u64,
    pub checksum: String,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListFilesResponse {
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileDescriptorEntry {
    pub url: String,
    pub size: u64,
    pub version: u64,
    pub checksum: String,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesResponse {
    #[serde(default)]
    pub files: HashMap<String, FileDescriptorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TempFileResponse {
    pub temp_key: String,
}

/// Per-key rejection inside a batch response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailureEntry {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub current_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateFilesResponse {
    #[serde(default)]
    pub updated: HashMap<String, u64>,
    #[serde(default)]
    pub failed: HashMap<String, FailureEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteFilesResponse {
    #[serde(default)]
    pub deleted: Vec<String>,
    #[serde(default)]
    pub failed: HashMap<String, FailureEntry>,
}

/// Body of a 409 for a single-file commit
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConflictBody {
    #[serde(default)]
    pub current_version: Option<u64>,
}
