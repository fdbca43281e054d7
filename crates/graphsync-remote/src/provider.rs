//! IRemoteStore implementation over [`RemoteClient`]
//!
//! ## Design Notes
//!
//! - An upload is two requests: the body goes to temporary storage, then a
//!   single-entry `update_files` commits it under its key. Until the commit
//!   succeeds nothing is visible under the file name.
//! - `RemoteError` is flattened into `SyncError` here; the coordinator never
//!   sees HTTP details.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use graphsync_core::domain::{EncodedPath, RemoteFileRecord, RemoteVersion, SyncError};
use graphsync_core::ports::{
    ByteProgress, IRemoteStore, RemoteContext, RemoteDescriptor, UploadRequest,
};

use crate::client::RemoteClient;
use crate::types::UpdateEntry;
use crate::RemoteError;

#[async_trait]
impl IRemoteStore for RemoteClient {
    async fn list_files(&self, ctx: &RemoteContext) -> Result<Vec<RemoteFileRecord>, SyncError> {
        Ok(RemoteClient::list_files(self, &ctx.graph_id, &ctx.token, &ctx.cancel).await?)
    }

    async fn get_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError> {
        Ok(RemoteClient::get_files(self, &ctx.graph_id, &ctx.token, keys, &ctx.cancel).await?)
    }

    async fn get_version_files(
        &self,
        ctx: &RemoteContext,
        keys: &[(EncodedPath, String)],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError> {
        Ok(
            RemoteClient::get_version_files(self, &ctx.graph_id, &ctx.token, keys, &ctx.cancel)
                .await?,
        )
    }

    async fn download(
        &self,
        ctx: &RemoteContext,
        descriptor: &RemoteDescriptor,
        progress: ByteProgress,
    ) -> Result<Vec<u8>, SyncError> {
        ctx.check_cancelled()?;
        Ok(RemoteClient::download(self, &descriptor.url, descriptor.size, progress, &ctx.cancel).await?)
    }

    async fn upload(
        &self,
        ctx: &RemoteContext,
        request: UploadRequest,
        progress: ByteProgress,
    ) -> Result<RemoteVersion, SyncError> {
        ctx.check_cancelled()?;
        let size = request.body.len() as u64;
        let temp_key =
            RemoteClient::upload_temp(self, &ctx.token, Arc::new(request.body), progress, &ctx.cancel)
                .await?;
        debug!(key = %request.encoded_path, temp_key, "Uploaded body to temp storage");

        // last chance to abandon before anything becomes visible
        ctx.check_cancelled()?;

        let mut entries = HashMap::with_capacity(1);
        entries.insert(
            request.encoded_path.clone(),
            UpdateEntry {
                temp_key,
                checksum: request.checksum.to_string(),
                size,
                expected_version: request.expected_version.map(|v| v.value()),
            },
        );

        let mut results = self
            .update_files(&ctx.graph_id, &ctx.token, entries, &ctx.cancel)
            .await?;
        let outcome = results.remove(&request.encoded_path).unwrap_or_else(|| {
            Err(RemoteError::InvalidResponse(format!(
                "no commit result for {}",
                request.encoded_path
            )))
        });
        Ok(outcome?)
    }

    async fn delete_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, Result<(), SyncError>>, SyncError> {
        let results =
            RemoteClient::delete_files(self, &ctx.graph_id, &ctx.token, keys, &ctx.cancel).await?;
        Ok(results
            .into_iter()
            .map(|(key, result)| (key, result.map_err(SyncError::from)))
            .collect())
    }
}
