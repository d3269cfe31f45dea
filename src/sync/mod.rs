//! The deployment run: walk the local tree, upload what changed, keep the
//! manifest complete.
//!
//! Strictly sequential: one file in flight at a time keeps the
//! retry/reconnect reasoning simple. The walk uses an explicit stack
//! rather than recursion, so swapping in a parallel dispatcher later
//! would not disturb the decision contract.

pub mod decision;
pub mod uploader;

use crate::config::Config;
use crate::hash;
use crate::ignore::is_ignored;
use crate::manifest::{Manifest, ManifestEntry};
use crate::progress::Reporter;
use crate::transport::{join_remote, Session, Transport, DEFAULT_ATTEMPTS};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;
use uploader::UploadOptions;

#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub files_uploaded: usize,
    pub files_skipped: usize,
    pub dirs_visited: usize,
    pub bytes_uploaded: u64,
    pub duration: Duration,
}

/// Owns the configuration, the one transport session, and the manifest
/// for a single run.
pub struct Syncer<T: Transport> {
    config: Config,
    session: Session<T>,
    manifest: Manifest,
    reporter: Reporter,
    stats: SyncStats,
}

impl<T: Transport> Syncer<T> {
    pub fn new(config: Config, transport: T) -> Self {
        let reporter = Reporter::new(config.quiet);
        Self {
            config,
            session: Session::new(transport),
            manifest: Manifest::new(),
            reporter,
            stats: SyncStats::default(),
        }
    }

    /// Runs the full deployment. The session is closed on every exit path.
    pub async fn run(mut self) -> Result<SyncStats> {
        let started = Instant::now();
        self.config.validate()?;

        let local_root = self.config.local_dir.clone();
        if !local_root.is_dir() {
            anyhow::bail!("local directory not found: {}", local_root.display());
        }
        let remote_root = self.config.remote_root();

        self.session
            .connect()
            .await
            .with_context(|| format!("cannot connect to {}", self.config.host.as_deref().unwrap_or("?")))?;
        self.reporter
            .connected(self.config.host.as_deref().unwrap_or("?"));

        let outcome = self.execute(&local_root, &remote_root).await;
        self.session.close().await;

        outcome?;
        self.stats.duration = started.elapsed();
        self.reporter.finished(&self.stats);
        Ok(self.stats)
    }

    async fn execute(&mut self, local_root: &Path, remote_root: &str) -> Result<()> {
        if !self.config.dry_run {
            self.session
                .transport_mut()
                .ensure_dir(remote_root)
                .await
                .context("cannot create remote root")?;
        }
        self.reporter.start(
            &local_root.display().to_string(),
            remote_root,
            self.config.dry_run,
        );

        if self.config.check_hash {
            self.manifest = Manifest::load(
                self.session.transport_mut(),
                remote_root,
                &self.config.manifest_name,
            )
            .await;
            info!(entries = self.manifest.len(), "manifest loaded");
        }

        self.walk(local_root, remote_root).await?;

        if self.config.check_hash {
            self.manifest
                .save(
                    self.session.transport_mut(),
                    remote_root,
                    &self.config.manifest_name,
                    self.config.dry_run,
                )
                .await
                .context("cannot save manifest")?;
        }
        Ok(())
    }

    /// Iterative depth-first walk in filesystem enumeration order. Sibling
    /// order is whatever the OS hands back; nothing downstream depends on
    /// it.
    async fn walk(&mut self, local_root: &Path, remote_root: &str) -> Result<()> {
        let mut pending = vec![(local_root.to_path_buf(), remote_root.to_string())];

        while let Some((local_dir, remote_dir)) = pending.pop() {
            self.stats.dirs_visited += 1;
            let mut entries = tokio::fs::read_dir(&local_dir)
                .await
                .with_context(|| format!("cannot read {}", local_dir.display()))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("cannot read {}", local_dir.display()))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_ignored(&name) {
                    continue;
                }

                let local_path = entry.path();
                let remote_path = join_remote(&remote_dir, &name);
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if !self.config.dry_run {
                        self.session
                            .transport_mut()
                            .ensure_dir(&remote_path)
                            .await
                            .with_context(|| format!("cannot create {remote_path}"))?;
                    }
                    self.reporter.enter_dir(&remote_path);
                    pending.push((local_path, remote_path));
                } else {
                    self.sync_file(local_root, &local_path, &remote_path, &name)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn sync_file(
        &mut self,
        local_root: &Path,
        local_path: &Path,
        remote_path: &str,
        name: &str,
    ) -> Result<()> {
        let rel_key = relative_key(local_root, local_path);

        let upload = decision::should_upload(
            self.session.transport_mut(),
            &self.config,
            &self.manifest,
            local_path,
            remote_path,
            &rel_key,
        )
        .await
        .with_context(|| format!("cannot compare {rel_key}"))?;

        if upload {
            self.upload_file(local_path, remote_path, name).await?;
            self.stats.files_uploaded += 1;
            if self.config.check_hash {
                self.record(&rel_key, local_path).await?;
            }
        } else {
            self.reporter.skipping(name);
            self.stats.files_skipped += 1;
            // Keep the manifest complete even for files that never needed
            // an upload under this manifest's lifetime.
            if self.config.check_hash && !self.manifest.contains(&rel_key) {
                self.record(&rel_key, local_path).await?;
            }
        }
        Ok(())
    }

    async fn upload_file(&mut self, local_path: &Path, remote_path: &str, name: &str) -> Result<()> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let opts = UploadOptions {
            dry_run: self.config.dry_run,
            set_mtime: self.config.check_mtime,
        };

        if self.config.dry_run {
            self.reporter
                .would_upload(&local_path.display().to_string(), remote_path);
        }
        let bar = self.reporter.upload_bar(name, size);
        let retry_bar = bar.clone();

        let local = local_path.to_path_buf();
        let remote = remote_path.to_string();
        let attempt = self
            .session
            .with_retries(name, DEFAULT_ATTEMPTS, move |transport| {
                let local = local.clone();
                let remote = remote.clone();
                let opts = opts.clone();
                let bar = retry_bar.clone();
                Box::pin(async move {
                    let mut progress = move |sent: u64, _total: u64| bar.set_position(sent);
                    uploader::upload_file_atomic(transport, &local, &remote, &opts, &mut progress)
                        .await
                })
            })
            .await;
        bar.finish_and_clear();
        attempt.with_context(|| format!("upload failed: {remote_path}"))?;

        if !self.config.dry_run {
            self.reporter.uploaded(name);
        }
        self.stats.bytes_uploaded += size;
        Ok(())
    }

    /// Refreshes the manifest entry for `rel_key` from the local file.
    async fn record(&mut self, rel_key: &str, local_path: &Path) -> Result<()> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let digest = hash::compute_hash(local_path, self.config.hash_algo)
            .await
            .with_context(|| format!("cannot hash {}", local_path.display()))?;
        self.manifest.insert(rel_key, ManifestEntry { size, hash: digest });
        Ok(())
    }
}

/// Relative POSIX-style key for a file under the sync root.
fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}
