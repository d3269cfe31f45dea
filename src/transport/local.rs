//! Directory-backed [`Transport`].
//!
//! Treats a local directory as the remote root. This is what the
//! integration tests sync against, and it doubles as a plain local mirror
//! target. Failure-injection counters let tests exercise the retry path
//! without a real flaky server.

use crate::error::{Result, SyncError};
use crate::transport::{RemoteEntry, Transport};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct LocalTransport {
    root: PathBuf,
    connected: bool,
    fail_uploads: u32,
    fail_renames: u32,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
            fail_uploads: 0,
            fail_renames: 0,
        }
    }

    /// The next `n` uploads fail with a closed-connection error.
    pub fn inject_upload_failures(&mut self, n: u32) {
        self.fail_uploads = n;
    }

    /// The next `n` renames fail as a server rejection.
    pub fn inject_rename_failures(&mut self, n: u32) {
        self.fail_renames = n;
    }

    fn resolve(&self, remote: &str) -> PathBuf {
        let rel = remote.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        !self.connected
    }

    async fn size(&mut self, remote: &str) -> Result<Option<u64>> {
        match tokio::fs::metadata(self.resolve(remote)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn modified(&mut self, remote: &str) -> Result<Option<SystemTime>> {
        match tokio::fs::metadata(self.resolve(remote)).await {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(self.resolve(remote_dir)).await?;
        while let Some(entry) = rd.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.is_file().then(|| meta.len()),
                modified: meta.modified().ok(),
                is_dir: meta.is_dir(),
            });
        }
        Ok(entries)
    }

    async fn upload(
        &mut self,
        local: &Path,
        remote: &str,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<()> {
        if self.fail_uploads > 0 {
            self.fail_uploads -= 1;
            self.connected = false;
            return Err(SyncError::ConnectionClosed);
        }
        let written = tokio::fs::copy(local, self.resolve(remote)).await?;
        progress(written, written);
        Ok(())
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<()> {
        tokio::fs::copy(self.resolve(remote), local).await?;
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if self.fail_renames > 0 {
            self.fail_renames -= 1;
            return Err(SyncError::Remote {
                code: 550,
                message: "rename rejected".to_string(),
            });
        }
        tokio::fs::rename(self.resolve(from), self.resolve(to)).await?;
        Ok(())
    }

    async fn remove(&mut self, remote: &str) -> Result<()> {
        tokio::fs::remove_file(self.resolve(remote)).await?;
        Ok(())
    }

    async fn ensure_dir(&mut self, remote_dir: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.resolve(remote_dir)).await?;
        Ok(())
    }

    async fn set_modified(&mut self, remote: &str, mtime: SystemTime) -> Result<()> {
        filetime::set_file_mtime(
            self.resolve(remote),
            filetime::FileTime::from_system_time(mtime),
        )?;
        Ok(())
    }
}
