//! FTP-backed [`Transport`].

use crate::error::{Result, SyncError};
use crate::ftp::{FtpClient, FtpConfig};
use crate::transport::{RemoteEntry, Transport};
use async_trait::async_trait;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

pub struct FtpTransport {
    client: FtpClient,
}

impl FtpTransport {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            client: FtpClient::new(config),
        }
    }
}

#[async_trait]
impl Transport for FtpTransport {
    async fn connect(&mut self) -> Result<()> {
        self.client.connect().await
    }

    async fn close(&mut self) -> Result<()> {
        self.client.quit().await
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn size(&mut self, remote: &str) -> Result<Option<u64>> {
        self.client.size(remote).await
    }

    async fn modified(&mut self, remote: &str) -> Result<Option<SystemTime>> {
        self.client.mdtm(remote).await
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteEntry>> {
        self.client.list(remote_dir).await
    }

    async fn upload(
        &mut self,
        local: &Path,
        remote: &str,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<()> {
        self.client.stor(local, remote, progress).await
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<()> {
        self.client.retr(remote, local).await
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.client.rename(from, to).await
    }

    async fn remove(&mut self, remote: &str) -> Result<()> {
        self.client.delete(remote).await
    }

    async fn ensure_dir(&mut self, remote_dir: &str) -> Result<()> {
        // MKD one component at a time; "already exists" comes back as a
        // server rejection and is indistinguishable from "not permitted",
        // so rejections are ignored and a real problem surfaces on the
        // transfer that follows.
        let absolute = remote_dir.starts_with('/');
        let mut prefix = String::new();
        for comp in remote_dir.split('/').filter(|c| !c.is_empty()) {
            if prefix.is_empty() && absolute {
                prefix = format!("/{comp}");
            } else if prefix.is_empty() {
                prefix = comp.to_string();
            } else {
                prefix = format!("{prefix}/{comp}");
            }
            match self.client.mkdir(&prefix).await {
                Ok(()) => {}
                Err(SyncError::Remote { code, .. }) => {
                    debug!(dir = prefix.as_str(), code, "mkdir rejected, assuming it exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn set_modified(&mut self, remote: &str, mtime: SystemTime) -> Result<()> {
        if !self.client.mfmt(remote, mtime).await? {
            debug!(path = remote, "server does not support MFMT");
        }
        Ok(())
    }
}
