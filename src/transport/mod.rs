//! Remote-side abstraction and the session that owns it.
//!
//! [`Transport`] is the seam between the sync engine and a concrete
//! remote: FTP in production, a local directory in tests. [`Session`]
//! wraps one transport handle with the reconnect-and-retry policy every
//! remote operation shares.

pub mod ftp;
pub mod local;

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Base delay for retry backoff; attempt N waits N times this.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Attempts per retried operation.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// One entry of a remote directory listing. `None` fields mean the server
/// gave no usable value, not that the value is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

/// Operations the sync engine needs from a remote.
///
/// `size` and `modified` return `Ok(None)` when the object is absent or
/// the server lacks the command; `Err` is reserved for transport failure.
/// Change detection degrades tier by tier on `None` instead of aborting.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Derived state: true when the underlying connection is absent or
    /// known-dead.
    fn is_closed(&self) -> bool;

    async fn size(&mut self, remote: &str) -> Result<Option<u64>>;

    async fn modified(&mut self, remote: &str) -> Result<Option<SystemTime>>;

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteEntry>>;

    async fn upload(
        &mut self,
        local: &Path,
        remote: &str,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<()>;

    async fn download(&mut self, remote: &str, local: &Path) -> Result<()>;

    async fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    async fn remove(&mut self, remote: &str) -> Result<()>;

    /// Create-if-absent, idempotent, including intermediate components.
    async fn ensure_dir(&mut self, remote_dir: &str) -> Result<()>;

    async fn set_modified(&mut self, remote: &str, mtime: SystemTime) -> Result<()>;
}

/// Joins a remote directory and entry name with POSIX separators.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Splits a remote path into (directory, basename).
pub fn split_remote(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (".", path),
    }
}

/// The one connection handle of a run.
///
/// There is no pool: a single session, reconnected on demand. All
/// reconnect logic outside startup goes through [`with_retries`].
///
/// [`with_retries`]: Session::with_retries
pub struct Session<T: Transport> {
    inner: T,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self { inner: transport }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    /// Best-effort close; errors are logged, not propagated, because this
    /// runs on failure paths too.
    pub async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            debug!(error = %e, "close failed");
        }
    }

    /// Re-establishes the connection when the derived state says it is
    /// gone. A stale handle is closed first so the transport starts clean.
    pub async fn reconnect_if_closed(&mut self) -> Result<()> {
        if self.inner.is_closed() {
            let _ = self.inner.close().await;
            self.inner.connect().await?;
        }
        Ok(())
    }

    /// Runs `op` with up to `attempts` tries, reconnecting between tries
    /// when the failure points at a dead connection, and backing off
    /// `RETRY_BASE_DELAY * attempt` before each retry. The last error is
    /// returned once attempts are exhausted.
    pub async fn with_retries<R, F>(&mut self, label: &str, attempts: u32, mut op: F) -> Result<R>
    where
        F: for<'a> FnMut(&'a mut T) -> BoxFuture<'a, Result<R>>,
    {
        let attempts = attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.reconnect_if_closed().await {
                Err(e) => {
                    warn!(label = label, attempt, attempts, error = %e, "reconnect failed");
                    last = Some(e);
                }
                Ok(()) => match op(&mut self.inner).await {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        warn!(label = label, attempt, attempts, error = %e, "operation failed");
                        if e.indicates_closed() || self.inner.is_closed() {
                            let _ = self.inner.close().await;
                            if let Err(re) = self.inner.connect().await {
                                warn!(label = label, error = %re, "reconnect failed");
                            }
                        }
                        last = Some(e);
                    }
                },
            }

            if attempt < attempts {
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            }
        }

        Err(last.expect("at least one attempt runs"))
    }
}
