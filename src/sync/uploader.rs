//! Atomic uploads.
//!
//! Content goes to a uniquely-named temporary object first and is renamed
//! into place afterwards, so the final path never holds a partial file.

use crate::error::Result;
use crate::transport::{split_remote, Transport};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub dry_run: bool,
    /// Mirror the local mtime onto the uploaded object (best-effort).
    pub set_mtime: bool,
}

fn temp_name(remote: &str) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{remote}.uploading-{stamp}")
}

/// Uploads `local` to `remote` in two phases: STOR to a temporary name,
/// then rename into place. A rename collision (servers that refuse
/// overwrite-by-rename) is handled by removing the destination and
/// renaming once more.
pub async fn upload_file_atomic<T: Transport + ?Sized>(
    transport: &mut T,
    local: &Path,
    remote: &str,
    opts: &UploadOptions,
    progress: &mut (dyn FnMut(u64, u64) + Send),
) -> Result<()> {
    if opts.dry_run {
        debug!(local = %local.display(), remote, "dry run, skipping upload");
        return Ok(());
    }

    let (parent, _) = split_remote(remote);
    transport.ensure_dir(parent).await?;

    let tmp = temp_name(remote);
    transport.upload(local, &tmp, progress).await?;

    if let Err(first) = transport.rename(&tmp, remote).await {
        debug!(remote, error = %first, "rename failed, removing destination and retrying");
        let _ = transport.remove(remote).await;
        transport.rename(&tmp, remote).await?;
    }

    if opts.set_mtime {
        if let Ok(meta) = std::fs::metadata(local) {
            if let Ok(mtime) = meta.modified() {
                if let Err(e) = transport.set_modified(remote, mtime).await {
                    debug!(remote, error = %e, "could not set remote mtime");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalTransport;

    fn noop() -> impl FnMut(u64, u64) + Send {
        |_, _| {}
    }

    async fn setup() -> (tempfile::TempDir, LocalTransport, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"payload bytes").unwrap();
        let mut transport = LocalTransport::new(dir.path().join("remote"));
        transport.connect().await.unwrap();
        (dir, transport, src)
    }

    fn no_temp_residue(dir: &Path) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(
                !name.contains(".uploading-"),
                "temporary object left behind: {name}"
            );
            if entry.path().is_dir() {
                no_temp_residue(&entry.path());
            }
        }
    }

    #[tokio::test]
    async fn test_upload_round_trip() {
        let (dir, mut transport, src) = setup().await;
        let opts = UploadOptions {
            dry_run: false,
            set_mtime: true,
        };

        upload_file_atomic(&mut transport, &src, "/site/a.txt", &opts, &mut noop())
            .await
            .unwrap();

        let uploaded = dir.path().join("remote/site/a.txt");
        assert_eq!(std::fs::read(&uploaded).unwrap(), b"payload bytes");
        no_temp_residue(&dir.path().join("remote"));

        // mtime mirrored from the source
        let src_mtime = std::fs::metadata(&src).unwrap().modified().unwrap();
        let dst_mtime = std::fs::metadata(&uploaded).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[tokio::test]
    async fn test_rename_collision_falls_back_to_remove() {
        let (dir, mut transport, src) = setup().await;
        transport.inject_rename_failures(1);
        let opts = UploadOptions {
            dry_run: false,
            set_mtime: false,
        };

        upload_file_atomic(&mut transport, &src, "/a.txt", &opts, &mut noop())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("remote/a.txt")).unwrap(),
            b"payload bytes"
        );
        no_temp_residue(&dir.path().join("remote"));
    }

    #[tokio::test]
    async fn test_dry_run_is_a_no_op() {
        let (dir, mut transport, src) = setup().await;
        let opts = UploadOptions {
            dry_run: true,
            set_mtime: true,
        };

        upload_file_atomic(&mut transport, &src, "/site/a.txt", &opts, &mut noop())
            .await
            .unwrap();

        assert!(!dir.path().join("remote/site").exists());
    }

    #[tokio::test]
    async fn test_progress_reports_bytes() {
        let (_dir, mut transport, src) = setup().await;
        let opts = UploadOptions {
            dry_run: false,
            set_mtime: false,
        };

        let mut last = (0u64, 0u64);
        let mut progress = |sent, total| last = (sent, total);
        upload_file_atomic(&mut transport, &src, "/a.txt", &opts, &mut progress)
            .await
            .unwrap();

        assert_eq!(last, (13, 13));
    }
}
