//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers, paths, digests and versions.
//! Each newtype guarantees its invariants at construction time.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier of a graph, the unit of synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(Uuid);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("{s}: {e}")))
    }
}

impl From<Uuid> for GraphId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identity of one sync operation, used to tag progress events so that
/// interleaved batches stay distinguishable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Path types
// ============================================================================

/// A root-relative path inside a graph
///
/// Always NFC-normalized and forward-slash separated, with no leading or
/// trailing slash, no empty segments and no `.`/`..` segments. Two files
/// whose names differ only in Unicode normalization form map to the same
/// `RelativePath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a relative path, normalizing to NFC
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` for empty, absolute or traversing paths
    pub fn new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = path.as_ref();
        if raw.is_empty() {
            return Err(DomainError::InvalidPath("Path cannot be empty".to_string()));
        }
        if raw.contains('\0') {
            return Err(DomainError::InvalidPath(format!(
                "Path contains NUL byte: {raw:?}"
            )));
        }
        if raw.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Path must be relative: {raw}"
            )));
        }

        let normalized: String = raw.nfc().collect();
        for segment in normalized.split('/') {
            match segment {
                "" => {
                    return Err(DomainError::InvalidPath(format!(
                        "Path has an empty segment: {raw}"
                    )))
                }
                "." | ".." => {
                    return Err(DomainError::InvalidPath(format!(
                        "Path must not contain '.' or '..' segments: {raw}"
                    )))
                }
                _ => {}
            }
        }

        Ok(Self(normalized))
    }

    /// Build a relative path from a filesystem path below `root`
    ///
    /// # Errors
    /// Returns error if `path` is not inside `root` or is not valid UTF-8
    pub fn from_fs_path(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let stripped = path.strip_prefix(root).map_err(|_| {
            DomainError::InvalidPath(format!(
                "{} is not within {}",
                path.display(),
                root.display()
            ))
        })?;

        let mut segments = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(c) => segments.push(c.to_str().ok_or_else(|| {
                    DomainError::InvalidPath(format!("Non UTF-8 path: {}", stripped.display()))
                })?),
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "Unexpected component in {}",
                        stripped.display()
                    )))
                }
            }
        }
        Self::new(segments.join("/"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment of the path
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent directory, `None` for top-level entries
    #[must_use]
    pub fn parent(&self) -> Option<RelativePath> {
        self.0
            .rfind('/')
            .map(|idx| RelativePath(self.0[..idx].to_string()))
    }

    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Append a single segment
    ///
    /// # Errors
    /// Returns error if the resulting path is invalid
    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        Self::new(format!("{}/{}", self.0, segment))
    }

    /// Resolve against a filesystem root
    #[must_use]
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |acc, s| acc.join(s))
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An absolute filesystem path with symlinks resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Wrap a path that has already been resolved by the canonicalizer
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is not absolute
    pub fn from_canonical(path: PathBuf) -> Result<Self, DomainError> {
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }
        Ok(Self(path))
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Resolve a graph-relative path below this root
    #[must_use]
    pub fn join(&self, rel: &RelativePath) -> PathBuf {
        rel.to_fs_path(&self.0)
    }
}

impl Display for CanonicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Server-side encrypted filename: `e.` followed by lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedPath(String);

impl EncodedPath {
    pub const PREFIX: &'static str = "e.";

    /// # Errors
    /// Returns error if the prefix is missing or the body is not even-length hex
    pub fn new(encoded: impl Into<String>) -> Result<Self, DomainError> {
        let encoded = encoded.into();
        let body = encoded.strip_prefix(Self::PREFIX).ok_or_else(|| {
            DomainError::InvalidEncodedPath(format!("missing '{}' prefix: {encoded}", Self::PREFIX))
        })?;
        if body.is_empty()
            || body.len() % 2 != 0
            || !body
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(DomainError::InvalidEncodedPath(format!(
                "body is not lowercase hex: {encoded}"
            )));
        }
        Ok(Self(encoded))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex body without the prefix
    #[must_use]
    pub fn body(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }
}

impl Display for EncodedPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EncodedPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EncodedPath> for String {
    fn from(path: EncodedPath) -> Self {
        path.0
    }
}

// ============================================================================
// Content identity and versions
// ============================================================================

/// SHA-256 of plaintext file content, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    const HEX_LEN: usize = 64;

    /// # Errors
    /// Returns `DomainError::InvalidDigest` unless the input is 64 hex characters
    pub fn new(digest: impl Into<String>) -> Result<Self, DomainError> {
        let digest = digest.into().to_ascii_lowercase();
        if digest.len() != Self::HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidDigest(format!(
                "expected {} hex characters, got {digest:?}",
                Self::HEX_LEN
            )));
        }
        Ok(Self(digest))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentDigest {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

/// Server-assigned per-file version, strictly increasing with every accepted write
///
/// Version `0` is reserved: as a compare-and-swap precondition it means
/// "the file must not exist yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RemoteVersion(u64);

impl RemoteVersion {
    pub const ABSENT: RemoteVersion = RemoteVersion(0);

    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_absent(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for RemoteVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RemoteVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Opaque bearer credential, passed per call and never persisted
///
/// `Debug` and `Display` redact the value so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

impl Display for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
