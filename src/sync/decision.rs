//! Change detection: does this local file need to go up?
//!
//! Evidence tiers, strongest first: manifest hashes, then remote
//! size/mtime queries, then a directory listing. Transport trouble during
//! remote inspection resolves toward "upload"; a redundant transfer is
//! recoverable, a silently skipped change is not.

use crate::config::Config;
use crate::error::Result;
use crate::hash;
use crate::manifest::Manifest;
use crate::transport::{split_remote, Transport};
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// Absolute difference between two timestamps, in milliseconds.
fn mtime_diff_ms(a: SystemTime, b: SystemTime) -> u128 {
    match a.duration_since(b) {
        Ok(d) => d.as_millis(),
        Err(e) => e.duration().as_millis(),
    }
}

/// Decides whether `local_path` must be uploaded to `remote_path`.
///
/// Symlinks never upload. Local I/O errors (stat, hash read) propagate:
/// a file we cannot read here cannot be uploaded either.
pub async fn should_upload<T: Transport + ?Sized>(
    transport: &mut T,
    config: &Config,
    manifest: &Manifest,
    local_path: &Path,
    remote_path: &str,
    rel_key: &str,
) -> Result<bool> {
    let meta = tokio::fs::symlink_metadata(local_path).await?;
    if meta.file_type().is_symlink() {
        return Ok(false);
    }
    let local_size = meta.len();
    let local_mtime = meta.modified()?;

    if config.check_hash {
        return match manifest.get(rel_key) {
            // Not in the manifest yet: new file, or the manifest was lost.
            None => Ok(true),
            Some(entry) if entry.size != local_size => Ok(true),
            Some(entry) => {
                // Same size proves nothing; only the digest does.
                let digest = hash::compute_hash(local_path, config.hash_algo).await?;
                Ok(digest != entry.hash)
            }
        };
    }

    match remote_evidence(transport, config, local_size, local_mtime, remote_path).await {
        Ok(upload) => Ok(upload),
        Err(e) => {
            debug!(path = remote_path, error = %e, "remote inspection failed, uploading");
            Ok(true)
        }
    }
}

/// Fallback comparison against live remote state, used when hash checking
/// is off.
async fn remote_evidence<T: Transport + ?Sized>(
    transport: &mut T,
    config: &Config,
    local_size: u64,
    local_mtime: SystemTime,
    remote_path: &str,
) -> Result<bool> {
    let tolerance = config.mtime_tolerance_ms as u128;

    let remote_size = transport.size(remote_path).await.unwrap_or(None);
    let remote_mtime = if config.check_mtime {
        transport.modified(remote_path).await.unwrap_or(None)
    } else {
        None
    };

    if remote_size.is_none() && remote_mtime.is_none() {
        // Neither query produced evidence; fall back to a listing.
        let (dir, base) = split_remote(remote_path);
        let listing = transport.list(dir).await?;
        let Some(entry) = listing.into_iter().find(|e| e.name == base) else {
            return Ok(true);
        };
        if let Some(size) = entry.size {
            if size != local_size {
                return Ok(true);
            }
        }
        if config.check_mtime {
            if let Some(mtime) = entry.modified {
                return Ok(mtime_diff_ms(local_mtime, mtime) > tolerance);
            }
        }
        return Ok(config.upload_when_equal_and_no_mtime);
    }

    if let Some(size) = remote_size {
        if size != local_size {
            return Ok(true);
        }
        if !config.check_mtime {
            return Ok(false);
        }
    }

    if config.check_mtime {
        if let Some(mtime) = remote_mtime {
            if mtime_diff_ms(local_mtime, mtime) > tolerance {
                return Ok(true);
            }
        }
    }

    // Sizes equal and mtime inconclusive: leave it alone.
    Ok(false)
}
