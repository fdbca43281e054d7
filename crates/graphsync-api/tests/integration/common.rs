//! Shared fixtures: an in-memory remote with compare-and-swap commits and a
//! context wired to it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graphsync_api::{keygen, KeypairText, SyncContext};
use graphsync_core::config::{Config, Environment, RemoteConfig};
use graphsync_core::domain::{
    ContentDigest, EncodedPath, GraphId, RelativePath, RemoteFileRecord, RemoteVersion, SyncError,
};
use graphsync_core::ports::{ByteProgress, IRemoteStore, RemoteContext, RemoteDescriptor, UploadRequest};
use graphsync_crypto::EncryptionContext;
use graphsync_sync::digest_bytes;
use tempfile::TempDir;

pub const TOKEN: &str = "test-token";

type Object = (Vec<u8>, RemoteVersion, ContentDigest);

#[derive(Default)]
pub struct MemoryRemote {
    pub objects: Mutex<HashMap<EncodedPath, Object>>,
    pub history: Mutex<HashMap<(EncodedPath, String), Object>>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl MemoryRemote {
    fn descriptor(key: &EncodedPath, url: String, object: &Object) -> RemoteDescriptor {
        RemoteDescriptor {
            encoded_path: key.clone(),
            url,
            size: object.0.len() as u64,
            version: object.1,
            checksum: object.2.clone(),
            last_modified: None,
        }
    }

    fn seen(&self, ctx: &RemoteContext) {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(ctx.token.expose().to_string());
    }
}

#[async_trait]
impl IRemoteStore for MemoryRemote {
    async fn list_files(&self, ctx: &RemoteContext) -> Result<Vec<RemoteFileRecord>, SyncError> {
        self.seen(ctx);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, object)| Self::descriptor(key, key.to_string(), object).record())
            .collect())
    }

    async fn get_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError> {
        self.seen(ctx);
        let objects = self.objects.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| {
                objects
                    .get(k)
                    .map(|o| (k.clone(), Self::descriptor(k, k.to_string(), o)))
            })
            .collect())
    }

    async fn get_version_files(
        &self,
        ctx: &RemoteContext,
        keys: &[(EncodedPath, String)],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError> {
        self.seen(ctx);
        let history = self.history.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|(k, id)| {
                history
                    .get(&(k.clone(), id.clone()))
                    .map(|o| (k.clone(), Self::descriptor(k, format!("{k}@{id}"), o)))
            })
            .collect())
    }

    async fn download(
        &self,
        ctx: &RemoteContext,
        descriptor: &RemoteDescriptor,
        progress: ByteProgress,
    ) -> Result<Vec<u8>, SyncError> {
        ctx.check_cancelled()?;
        let body = match descriptor.url.split_once('@') {
            Some((key, id)) => {
                let key = EncodedPath::new(key).unwrap();
                self.history.lock().unwrap()[&(key, id.to_string())].0.clone()
            }
            None => self
                .objects
                .lock()
                .unwrap()
                .get(&descriptor.encoded_path)
                .map(|o| o.0.clone())
                .ok_or_else(|| SyncError::NotFound(descriptor.encoded_path.to_string()))?,
        };
        progress(body.len() as u64, body.len() as u64);
        Ok(body)
    }

    async fn upload(
        &self,
        ctx: &RemoteContext,
        request: UploadRequest,
        progress: ByteProgress,
    ) -> Result<RemoteVersion, SyncError> {
        self.seen(ctx);
        ctx.check_cancelled()?;
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&request.encoded_path)
            .map_or(RemoteVersion::ABSENT, |o| o.1);
        if let Some(expected) = request.expected_version {
            if expected != current {
                return Err(SyncError::VersionConflict {
                    path: request.encoded_path.to_string(),
                    expected,
                    actual: current,
                });
            }
        }
        let next = current.next();
        let len = request.body.len() as u64;
        objects.insert(request.encoded_path, (request.body, next, request.checksum));
        progress(len, len);
        Ok(next)
    }

    async fn delete_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, Result<(), SyncError>>, SyncError> {
        self.seen(ctx);
        let mut objects = self.objects.lock().unwrap();
        Ok(keys
            .iter()
            .map(|k| {
                objects.remove(k);
                (k.clone(), Ok(()))
            })
            .collect())
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub ctx: SyncContext,
    pub remote: Arc<MemoryRemote>,
    /// Every (environment, proxy) the context asked the factory for
    pub builds: Arc<Mutex<Vec<(Environment, Option<String>)>>>,
    pub graph_id: String,
    pub keys: KeypairText,
    pub crypto: EncryptionContext,
}

pub fn rel(s: &str) -> RelativePath {
    RelativePath::new(s).unwrap()
}

/// Context over an in-memory remote with keys installed for one graph
pub fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let builds = Arc::new(Mutex::new(Vec::new()));

    let factory_remote = remote.clone();
    let factory_builds = builds.clone();
    let ctx = SyncContext::with_remote_factory(
        Config::default(),
        Arc::new(
            move |_cfg: &RemoteConfig,
                  env: Environment,
                  proxy: Option<&str>|
                  -> anyhow::Result<Arc<dyn IRemoteStore>> {
                factory_builds
                    .lock()
                    .unwrap()
                    .push((env, proxy.map(str::to_string)));
                Ok(factory_remote.clone())
            },
        ),
    )
    .unwrap();

    let graph_id = GraphId::new().to_string();
    let keys = keygen().unwrap();
    ctx.set_env(&graph_id, "dev", &keys.secret_key, &keys.public_key)
        .unwrap();
    let crypto = EncryptionContext::from_text(&keys.secret_key, &keys.public_key).unwrap();

    Fixture {
        dir,
        ctx,
        remote,
        builds,
        graph_id,
        keys,
        crypto,
    }
}

impl Fixture {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, path: &str) -> PathBuf {
        self.dir.path().join(path)
    }

    pub fn write(&self, path: &str, data: &[u8]) {
        let p = self.file(path);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, data).unwrap();
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.file(path)).ok()
    }

    pub fn key(&self, path: &str) -> EncodedPath {
        self.crypto.encode_path(&rel(path)).unwrap()
    }

    /// Store `data` on the fake server as if another device uploaded it
    pub fn seed_remote(&self, path: &str, data: &[u8], version: u64) {
        let body = self.crypto.seal_content(data).unwrap();
        self.remote.objects.lock().unwrap().insert(
            self.key(path),
            (body, RemoteVersion::new(version), digest_bytes(data)),
        );
    }

    pub fn seed_history(&self, path: &str, version_id: &str, data: &[u8]) {
        let body = self.crypto.seal_content(data).unwrap();
        self.remote.history.lock().unwrap().insert(
            (self.key(path), version_id.to_string()),
            (body, RemoteVersion::new(1), digest_bytes(data)),
        );
    }

    pub fn remote_version(&self, path: &str) -> Option<RemoteVersion> {
        self.remote
            .objects
            .lock()
            .unwrap()
            .get(&self.key(path))
            .map(|o| o.1)
    }

    /// Plaintext the server currently holds for `path`
    pub fn remote_content(&self, path: &str) -> Option<Vec<u8>> {
        let body = self
            .remote
            .objects
            .lock()
            .unwrap()
            .get(&self.key(path))
            .map(|o| o.0.clone())?;
        Some(self.crypto.open_content(&body).unwrap())
    }
}
