//! End-to-end deployment runs against a directory-backed remote.
//!
//! These exercise the full walk -> decide -> upload -> manifest pipeline,
//! not just individual pieces.

use ftpsync::config::Config;
use ftpsync::hash::HashAlgo;
use ftpsync::manifest::{Manifest, ManifestEntry};
use ftpsync::sync::Syncer;
use ftpsync::transport::local::LocalTransport;
use ftpsync::transport::Transport;
use std::path::Path;
use tempfile::TempDir;

fn config(local: &Path) -> Config {
    Config {
        host: Some("localhost".into()),
        user: Some("deploy".into()),
        password: Some("secret".into()),
        port: 21,
        secure: false,
        tls_reject_unauthorized: true,
        local_dir: local.to_path_buf(),
        remote_path: "/site".into(),
        check_hash: true,
        hash_algo: HashAlgo::Blake3,
        manifest_name: ".deploy-manifest.json".into(),
        check_mtime: true,
        mtime_tolerance_ms: 60_000,
        dry_run: false,
        upload_when_equal_and_no_mtime: false,
        quiet: true,
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel)).unwrap()
}

fn remote_manifest(remote: &Path) -> Manifest {
    Manifest::from_json(&read(remote, "site/.deploy-manifest.json"))
}

fn assert_no_temp_residue(dir: &Path) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(
            !name.contains(".uploading-"),
            "temporary object left behind: {name}"
        );
        if entry.path().is_dir() {
            assert_no_temp_residue(&entry.path());
        }
    }
}

#[tokio::test]
async fn test_fresh_tree_uploads_everything() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");
    write(local.path(), "assets/app.js", "console.log(1)");
    write(local.path(), "assets/logo.svg", "<svg/>");

    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 3);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(read(remote.path(), "site/index.html"), "<html>");
    assert_eq!(read(remote.path(), "site/assets/app.js"), "console.log(1)");
    assert_eq!(read(remote.path(), "site/assets/logo.svg"), "<svg/>");
    assert_no_temp_residue(remote.path());

    let manifest = remote_manifest(remote.path());
    assert_eq!(manifest.len(), 3);
    let entry = manifest.get("index.html").unwrap();
    assert_eq!(entry.size, 6);
    assert_eq!(entry.hash, hex::encode(blake3::hash(b"<html>").as_bytes()));
    assert!(manifest.contains("assets/app.js"));
}

#[tokio::test]
async fn test_second_run_uploads_nothing() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");
    write(local.path(), "assets/app.js", "console.log(1)");

    Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();
    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 0);
    assert_eq!(stats.files_skipped, 2);
    assert_eq!(remote_manifest(remote.path()).len(), 2);
}

#[tokio::test]
async fn test_content_change_at_equal_size_reuploads() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "app.js", "console.log(1)");

    Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    // Same byte length, different content.
    write(local.path(), "app.js", "console.log(2)");
    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(read(remote.path(), "site/app.js"), "console.log(2)");
}

#[tokio::test]
async fn test_dry_run_touches_nothing_remote() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");
    write(local.path(), "assets/app.js", "console.log(1)");

    let mut cfg = config(local.path());
    cfg.dry_run = true;
    let stats = Syncer::new(cfg, LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    // Decisions still ran...
    assert_eq!(stats.files_uploaded, 2);
    // ...but the remote saw no directory, file, or manifest writes.
    assert!(!remote.path().join("site").exists());
    assert_eq!(std::fs::read_dir(remote.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ignored_entries_never_reach_the_remote() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");
    write(local.path(), ".git/config", "[core]");
    write(local.path(), "node_modules/pkg/index.js", "x");
    write(local.path(), "app.js.map", "{}");
    write(local.path(), "debug.log", "log");
    write(local.path(), ".env", "SECRET=1");
    write(local.path(), ".well-known/keys.txt", "key");

    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 2);
    let site = remote.path().join("site");
    assert!(site.join("index.html").exists());
    assert!(site.join(".well-known/keys.txt").exists());
    assert!(!site.join(".git").exists());
    assert!(!site.join("node_modules").exists());
    assert!(!site.join("app.js.map").exists());
    assert!(!site.join("debug.log").exists());
    assert!(!site.join(".env").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_never_uploaded() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "real.txt", "content");
    std::os::unix::fs::symlink(local.path().join("real.txt"), local.path().join("link.txt"))
        .unwrap();

    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(stats.files_skipped, 1);
    assert!(remote.path().join("site/real.txt").exists());
    assert!(!remote.path().join("site/link.txt").exists());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");

    let mut transport = LocalTransport::new(remote.path());
    transport.inject_upload_failures(2);

    let stats = Syncer::new(config(local.path()), transport)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(read(remote.path(), "site/index.html"), "<html>");
}

#[tokio::test]
async fn test_exhausted_retries_abort_the_run() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "index.html", "<html>");

    let mut transport = LocalTransport::new(remote.path());
    transport.inject_upload_failures(3);

    let result = Syncer::new(config(local.path()), transport).run().await;
    assert!(result.is_err());
    assert!(!remote.path().join("site/index.html").exists());
}

#[tokio::test]
async fn test_manifest_backfills_for_skipped_files() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "a.txt", "aaaa");
    write(local.path(), "b.txt", "bbbb");

    Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    // Drop one entry from the stored manifest, keeping the other, then add
    // nothing locally: the next run re-uploads the dropped file and the
    // manifest ends complete again.
    let kept = remote_manifest(remote.path());
    let mut pruned = Manifest::new();
    if let Some(entry) = kept.get("a.txt") {
        pruned.insert("a.txt", entry.clone());
    }
    std::fs::write(
        remote.path().join("site/.deploy-manifest.json"),
        pruned.to_json().unwrap(),
    )
    .unwrap();

    let stats = Syncer::new(config(local.path()), LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 1); // b.txt came back
    assert_eq!(stats.files_skipped, 1);
    let final_manifest = remote_manifest(remote.path());
    assert_eq!(final_manifest.len(), 2);
    assert!(final_manifest.contains("a.txt"));
    assert!(final_manifest.contains("b.txt"));
}

#[tokio::test]
async fn test_manifest_save_load_round_trip() {
    let remote = TempDir::new().unwrap();
    let mut transport = LocalTransport::new(remote.path());
    transport.connect().await.unwrap();

    let mut manifest = Manifest::new();
    manifest.insert(
        "a.txt",
        ManifestEntry {
            size: 10,
            hash: "abc".into(),
        },
    );
    manifest.insert(
        "sub/b.txt",
        ManifestEntry {
            size: 20,
            hash: "def".into(),
        },
    );

    manifest
        .save(&mut transport, "/", "manifest.json", false)
        .await
        .unwrap();
    let loaded = Manifest::load(&mut transport, "/", "manifest.json").await;
    assert_eq!(loaded, manifest);

    let empty = Manifest::new();
    empty
        .save(&mut transport, "/", "empty.json", false)
        .await
        .unwrap();
    let loaded = Manifest::load(&mut transport, "/", "empty.json").await;
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn test_missing_or_corrupt_manifest_degrades_to_empty() {
    let remote = TempDir::new().unwrap();
    let mut transport = LocalTransport::new(remote.path());
    transport.connect().await.unwrap();

    let loaded = Manifest::load(&mut transport, "/", "missing.json").await;
    assert!(loaded.is_empty());

    std::fs::write(remote.path().join("broken.json"), "{{{not json").unwrap();
    let loaded = Manifest::load(&mut transport, "/", "broken.json").await;
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn test_manifest_save_is_skipped_under_dry_run() {
    let remote = TempDir::new().unwrap();
    let mut transport = LocalTransport::new(remote.path());
    transport.connect().await.unwrap();

    let mut manifest = Manifest::new();
    manifest.insert(
        "a.txt",
        ManifestEntry {
            size: 1,
            hash: "x".into(),
        },
    );
    manifest
        .save(&mut transport, "/", "manifest.json", true)
        .await
        .unwrap();

    assert!(!remote.path().join("manifest.json").exists());
}

#[tokio::test]
async fn test_size_mismatch_without_hashing_uploads() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "b.txt", "7 bytes");
    write(remote.path(), "site/b.txt", "5 byt");

    let mut cfg = config(local.path());
    cfg.check_hash = false;
    let stats = Syncer::new(cfg, LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(read(remote.path(), "site/b.txt"), "7 bytes");
}

#[tokio::test]
async fn test_equal_remote_with_matching_mtime_skips_without_hashing() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write(local.path(), "b.txt", "same bytes");
    write(remote.path(), "site/b.txt", "same bytes");

    let mtime = std::fs::metadata(local.path().join("b.txt"))
        .unwrap()
        .modified()
        .unwrap();
    filetime::set_file_mtime(
        remote.path().join("site/b.txt"),
        filetime::FileTime::from_system_time(mtime),
    )
    .unwrap();

    let mut cfg = config(local.path());
    cfg.check_hash = false;
    let stats = Syncer::new(cfg, LocalTransport::new(remote.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(stats.files_uploaded, 0);
    assert_eq!(stats.files_skipped, 1);
}

#[tokio::test]
async fn test_missing_local_root_fails_before_connecting() {
    let remote = TempDir::new().unwrap();
    let cfg = config(Path::new("/definitely/not/here"));

    let result = Syncer::new(cfg, LocalTransport::new(remote.path()))
        .run()
        .await;
    assert!(result.is_err());
}
