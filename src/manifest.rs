//! The deployment manifest: relative path -> {size, hash}.
//!
//! One JSON document living under the remote root. Loaded once per run,
//! updated in memory as files upload, written back once at the end. A
//! missing or corrupt manifest is never fatal: content hashing is the
//! comparison of record, and losing the manifest only costs one full
//! re-upload of unchanged files.

use crate::error::Result;
use crate::sync::uploader::{self, UploadOptions};
use crate::transport::{join_remote, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub size: u64,
    pub hash: String,
}

/// Keys are relative POSIX-style paths. The map is ordered so the
/// serialized document is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tolerant parse: anything that is not a well-formed mapping yields an
    /// empty manifest.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(entries) => Self { entries },
            Err(e) => {
                warn!(error = %e, "manifest unparseable, starting from empty");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Fetches the manifest from the remote root. Every failure mode
    /// (absent, zero-length, transport error, bad JSON) degrades to an
    /// empty manifest.
    pub async fn load<T: Transport + ?Sized>(
        transport: &mut T,
        remote_root: &str,
        name: &str,
    ) -> Self {
        let remote_path = join_remote(remote_root, name);

        match transport.size(&remote_path).await {
            Ok(Some(n)) if n > 0 => {}
            Ok(_) => {
                debug!(path = remote_path.as_str(), "no manifest on the server");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "manifest size check failed, starting from empty");
                return Self::default();
            }
        }

        let staging = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "cannot stage manifest download, starting from empty");
                return Self::default();
            }
        };
        let local = staging.path().join("manifest.json");

        if let Err(e) = transport.download(&remote_path, &local).await {
            warn!(error = %e, "manifest download failed, starting from empty");
            return Self::default();
        }
        match std::fs::read_to_string(&local) {
            Ok(text) => Self::from_json(&text),
            Err(e) => {
                warn!(error = %e, "manifest unreadable, starting from empty");
                Self::default()
            }
        }
    }

    /// Writes the manifest back to the remote root with the same atomic
    /// upload files get. Does nothing under dry-run.
    pub async fn save<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        remote_root: &str,
        name: &str,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            return Ok(());
        }

        let remote_path = join_remote(remote_root, name);
        let staging = tempfile::tempdir()?;
        let local = staging.path().join("manifest.json");
        std::fs::write(&local, self.to_json()?)?;

        let opts = UploadOptions {
            dry_run: false,
            set_mtime: false,
        };
        let mut noop = |_: u64, _: u64| {};
        uploader::upload_file_atomic(transport, &local, &remote_path, &opts, &mut noop).await
    }
}
