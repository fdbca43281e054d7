//! Sync backend HTTP client
//!
//! A typed client over the backend's JSON endpoints. Handles bearer
//! authentication, status mapping, retries, streaming bodies and
//! cancellation. Callers deal in [`EncodedPath`] keys and ciphertext only.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use graphsync_core::config::{Environment, RemoteConfig};
//! use graphsync_core::domain::{AuthToken, GraphId};
//! use graphsync_remote::client::RemoteClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = RemoteClient::new(&RemoteConfig::default(), Environment::Prod, None)?;
//! let files = client
//!     .list_files(&GraphId::new(), &AuthToken::new("token"), &CancellationToken::new())
//!     .await?;
//! println!("{} files on the server", files.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use graphsync_core::config::{Environment, RemoteConfig};
use graphsync_core::domain::{
    AuthToken, ContentDigest, EncodedPath, GraphId, RemoteFileRecord, RemoteVersion,
};
use graphsync_core::ports::{ByteProgress, RemoteDescriptor};
use reqwest::{header, Body, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::retry::{parse_retry_after, with_retry, RetryClass, RetryPolicy};
use crate::types::{
    ConflictBody, DeleteFilesResponse, FailureEntry, FileDescriptorEntry, FilesRequest,
    FilesResponse, GraphRequest, ListFilesResponse, TempFileResponse, UpdateEntry,
    UpdateFilesRequest, UpdateFilesResponse, VersionFileRef, VersionFilesRequest,
};
use crate::RemoteError;

/// Default retry-after duration when header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Size of each chunk fed to the upload body stream
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Per-key outcome of a batch write
pub type KeyResults<T> = HashMap<EncodedPath, Result<T, RemoteError>>;

/// Validate a proxy URL the way the client will use it
///
/// # Errors
/// Returns an error if `reqwest` rejects the URL as an HTTPS proxy
pub fn validate_proxy(url: &str) -> anyhow::Result<()> {
    reqwest::Proxy::https(url).with_context(|| format!("Invalid proxy URL: {url}"))?;
    Ok(())
}

/// HTTP client for the sync backend
pub struct RemoteClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    policy: RetryPolicy,
}

impl RemoteClient {
    /// Build a client for `env`, optionally routed through an HTTPS proxy
    ///
    /// # Errors
    /// Returns an error for an invalid proxy URL or TLS backend failure
    pub fn new(cfg: &RemoteConfig, env: Environment, proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs));

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            builder = builder.proxy(
                reqwest::Proxy::https(proxy)
                    .with_context(|| format!("Invalid proxy URL: {proxy}"))?,
            );
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        debug!(env = %env, base_url = cfg.base_url(env), "Created remote client");

        Ok(Self {
            client,
            base_url: cfg.base_url(env).trim_end_matches('/').to_string(),
            policy: RetryPolicy::from(cfg),
        })
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    pub fn request(&self, method: Method, path: &str, token: &AuthToken) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(token.expose())
    }

    async fn post_json<B, T>(&self, path: &str, token: &AuthToken, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, path, token)
            .json(body)
            .send()
            .await?;
        parse_json(check_status(response).await?).await
    }

    // ========================================================================
    // Read endpoints
    // ========================================================================

    /// Full listing of the graph
    #[instrument(skip(self, token, cancel), fields(graph_id = %graph_id))]
    pub async fn list_files(
        &self,
        graph_id: &GraphId,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteFileRecord>, RemoteError> {
        let body = GraphRequest {
            graph_uuid: graph_id.to_string(),
        };
        let resp: ListFilesResponse = with_retry(
            &self.policy,
            "get_all_files",
            RetryClass::ReadOnly,
            cancel,
            || self.post_json("/get_all_files", token, &body),
        )
        .await?;

        let mut records = Vec::with_capacity(resp.objects.len());
        for obj in resp.objects {
            let Ok(encoded_path) = EncodedPath::new(obj.key.clone()) else {
                debug!(key = %obj.key, "Skipping object with non-encrypted key");
                continue;
            };
            records.push(RemoteFileRecord {
                encoded_path,
                size: obj.size,
                version: RemoteVersion::new(obj.version),
                checksum: parse_checksum(&obj.key, &obj.checksum)?,
                last_modified: obj.last_modified,
            });
        }
        debug!(count = records.len(), "Listed remote files");
        Ok(records)
    }

    /// Download descriptors for the given keys; unknown keys are omitted
    #[instrument(skip(self, token, keys, cancel), fields(graph_id = %graph_id, count = keys.len()))]
    pub async fn get_files(
        &self,
        graph_id: &GraphId,
        token: &AuthToken,
        keys: &[EncodedPath],
        cancel: &CancellationToken,
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, RemoteError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let body = FilesRequest {
            graph_uuid: graph_id.to_string(),
            files: keys.iter().map(|k| k.to_string()).collect(),
        };
        let resp: FilesResponse = with_retry(
            &self.policy,
            "get_files",
            RetryClass::ReadOnly,
            cancel,
            || self.post_json("/get_files", token, &body),
        )
        .await?;
        descriptors(resp.files)
    }

    /// Download descriptors for historical versions
    #[instrument(skip(self, token, keys, cancel), fields(graph_id = %graph_id, count = keys.len()))]
    pub async fn get_version_files(
        &self,
        graph_id: &GraphId,
        token: &AuthToken,
        keys: &[(EncodedPath, String)],
        cancel: &CancellationToken,
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, RemoteError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let body = VersionFilesRequest {
            graph_uuid: graph_id.to_string(),
            files: keys
                .iter()
                .map(|(k, v)| VersionFileRef {
                    key: k.to_string(),
                    version_id: v.clone(),
                })
                .collect(),
        };
        let resp: FilesResponse = with_retry(
            &self.policy,
            "get_version_files",
            RetryClass::ReadOnly,
            cancel,
            || self.post_json("/get_version_files", token, &body),
        )
        .await?;
        descriptors(resp.files)
    }

    /// Stream a body from a presigned URL
    ///
    /// Checks the cancellation token between chunks and verifies the body
    /// length against `Content-Length`.
    #[instrument(skip(self, url, progress, cancel), fields(expected_size))]
    pub async fn download(
        &self,
        url: &str,
        expected_size: u64,
        progress: ByteProgress,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError> {
        with_retry(
            &self.policy,
            "download",
            RetryClass::ReadOnly,
            cancel,
            || self.download_once(url, expected_size, progress.clone(), cancel),
        )
        .await
    }

    async fn download_once(
        &self,
        url: &str,
        expected_size: u64,
        progress: ByteProgress,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError> {
        let response = check_status(self.client.get(url).send().await?).await?;
        let advertised = response.content_length();
        let total = advertised.unwrap_or(expected_size);

        let mut buf = Vec::with_capacity(total.min(64 * 1024 * 1024) as usize);
        let mut stream = response.bytes_stream();
        progress(0, total);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    buf.extend_from_slice(&chunk);
                    progress(buf.len() as u64, total);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        if let Some(expected) = advertised {
            if buf.len() as u64 != expected {
                return Err(RemoteError::Incomplete {
                    received: buf.len() as u64,
                    expected,
                });
            }
        }
        Ok(buf)
    }

    // ========================================================================
    // Write endpoints
    // ========================================================================

    /// Upload a body to temporary storage, returning its temp key
    ///
    /// Nothing is visible under a file name until [`RemoteClient::update_files`]
    /// commits the temp key.
    #[instrument(skip(self, token, body, progress, cancel), fields(size = body.len()))]
    pub async fn upload_temp(
        &self,
        token: &AuthToken,
        body: Arc<Vec<u8>>,
        progress: ByteProgress,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError> {
        with_retry(
            &self.policy,
            "upload_temp",
            RetryClass::Write,
            cancel,
            || self.upload_temp_once(token, body.clone(), progress.clone()),
        )
        .await
    }

    async fn upload_temp_once(
        &self,
        token: &AuthToken,
        body: Arc<Vec<u8>>,
        progress: ByteProgress,
    ) -> Result<String, RemoteError> {
        let len = body.len();
        let total = len as u64;
        let ranges: Vec<(usize, usize)> = (0..len)
            .step_by(UPLOAD_CHUNK)
            .map(|start| (start, (start + UPLOAD_CHUNK).min(len)))
            .collect();

        progress(0, total);
        let stream = futures_util::stream::iter(ranges).map(move |(start, end)| {
            let chunk = body[start..end].to_vec();
            progress(end as u64, total);
            Ok::<Vec<u8>, std::io::Error>(chunk)
        });

        let response = self
            .request(Method::PUT, "/temp_files", token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;
        let resp: TempFileResponse = parse_json(check_status(response).await?).await?;
        Ok(resp.temp_key)
    }

    /// Commit temp uploads under their file keys
    ///
    /// Entries carrying an expected version are compare-and-swap writes; a
    /// rejected precondition comes back as `RemoteError::VersionConflict` for
    /// that key and is never retried.
    #[instrument(skip(self, token, entries, cancel), fields(graph_id = %graph_id, count = entries.len()))]
    pub async fn update_files(
        &self,
        graph_id: &GraphId,
        token: &AuthToken,
        entries: HashMap<EncodedPath, UpdateEntry>,
        cancel: &CancellationToken,
    ) -> Result<KeyResults<RemoteVersion>, RemoteError> {
        let expected: HashMap<EncodedPath, Option<u64>> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.expected_version))
            .collect();
        let single_key = (entries.len() == 1)
            .then(|| entries.keys().next().cloned())
            .flatten();

        let body = UpdateFilesRequest {
            graph_uuid: graph_id.to_string(),
            files: entries
                .into_iter()
                .map(|(k, e)| (k.to_string(), e))
                .collect(),
        };

        let resp: UpdateFilesResponse = with_retry(
            &self.policy,
            "update_files",
            RetryClass::Write,
            cancel,
            || self.post_json("/update_files", token, &body),
        )
        .await
        .map_err(|err| match (err, &single_key) {
            // a whole-request 409 for a single commit belongs to that key
            (RemoteError::VersionConflict { actual, .. }, Some(key)) => {
                RemoteError::VersionConflict {
                    key: key.to_string(),
                    expected: RemoteVersion::new(expected[key].unwrap_or(0)),
                    actual,
                }
            }
            (err, _) => err,
        })?;

        let mut results = HashMap::with_capacity(expected.len());
        for (key, expected_version) in expected {
            let name = key.to_string();
            let outcome = if let Some(version) = resp.updated.get(&name) {
                Ok(RemoteVersion::new(*version))
            } else if let Some(failure) = resp.failed.get(&name) {
                Err(failure_to_error(&name, failure, expected_version))
            } else {
                Err(RemoteError::InvalidResponse(format!(
                    "no result for {name}"
                )))
            };
            results.insert(key, outcome);
        }
        Ok(results)
    }

    /// Delete files; keys the server reports as absent count as deleted
    #[instrument(skip(self, token, keys, cancel), fields(graph_id = %graph_id, count = keys.len()))]
    pub async fn delete_files(
        &self,
        graph_id: &GraphId,
        token: &AuthToken,
        keys: &[EncodedPath],
        cancel: &CancellationToken,
    ) -> Result<KeyResults<()>, RemoteError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let body = FilesRequest {
            graph_uuid: graph_id.to_string(),
            files: keys.iter().map(|k| k.to_string()).collect(),
        };
        let resp: DeleteFilesResponse = with_retry(
            &self.policy,
            "delete_files",
            RetryClass::Write,
            cancel,
            || self.post_json("/delete_files", token, &body),
        )
        .await?;

        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            let name = key.as_str();
            let outcome = match resp.failed.get(name) {
                Some(failure) if failure.code != "NotFound" => {
                    Err(failure_to_error(name, failure, None))
                }
                _ => Ok(()),
            };
            results.insert(key.clone(), outcome);
        }
        Ok(results)
    }
}

// ============================================================================
// Response handling
// ============================================================================

/// Map non-success statuses to [`RemoteError`]
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER);
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(body),
        StatusCode::FORBIDDEN => RemoteError::Forbidden(body),
        StatusCode::NOT_FOUND => RemoteError::NotFound(body),
        StatusCode::CONFLICT => {
            let actual = serde_json::from_str::<ConflictBody>(&body)
                .ok()
                .and_then(|b| b.current_version)
                .unwrap_or(0);
            RemoteError::VersionConflict {
                key: String::new(),
                expected: RemoteVersion::ABSENT,
                actual: RemoteVersion::new(actual),
            }
        }
        StatusCode::TOO_MANY_REQUESTS => RemoteError::TooManyRequests { retry_after },
        s if s.is_server_error() => RemoteError::ServerError(format!("{s}: {body}")),
        s => {
            warn!(status = %s, "Unexpected response status");
            RemoteError::BadRequest(format!("{s}: {body}"))
        }
    })
}

/// Parse a JSON body, surfacing `{"message": ...}` payloads as errors
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let text = response.text().await?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| RemoteError::InvalidResponse(format!("invalid JSON: {e}")))?;

    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return Err(if message.contains("Unauthorized") {
            RemoteError::Unauthorized(message.to_string())
        } else {
            RemoteError::Backend(message.to_string())
        });
    }

    serde_json::from_value(value).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

fn parse_checksum(key: &str, checksum: &str) -> Result<ContentDigest, RemoteError> {
    ContentDigest::new(checksum)
        .map_err(|e| RemoteError::InvalidResponse(format!("bad checksum for {key}: {e}")))
}

fn descriptors(
    files: HashMap<String, FileDescriptorEntry>,
) -> Result<HashMap<EncodedPath, RemoteDescriptor>, RemoteError> {
    files
        .into_iter()
        .map(|(key, entry)| {
            let encoded_path = EncodedPath::new(key.clone())
                .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
            let descriptor = RemoteDescriptor {
                encoded_path: encoded_path.clone(),
                url: entry.url,
                size: entry.size,
                version: RemoteVersion::new(entry.version),
                checksum: parse_checksum(&key, &entry.checksum)?,
                last_modified: entry.last_modified,
            };
            Ok((encoded_path, descriptor))
        })
        .collect()
}

fn failure_to_error(key: &str, failure: &FailureEntry, expected: Option<u64>) -> RemoteError {
    match failure.code.as_str() {
        "VersionConflict" => RemoteError::VersionConflict {
            key: key.to_string(),
            expected: RemoteVersion::new(expected.unwrap_or(0)),
            actual: RemoteVersion::new(failure.current_version.unwrap_or(0)),
        },
        "NotFound" => RemoteError::NotFound(key.to_string()),
        "Unauthorized" => RemoteError::Unauthorized(failure.message.clone()),
        "Forbidden" => RemoteError::Forbidden(failure.message.clone()),
        _ => RemoteError::Backend(format!("{}: {}", failure.code, failure.message)),
    }
}
