//! ftpsync - mirror a local directory tree to an FTP/FTPS server.
//!
//! Uploads are driven by a manifest of content hashes persisted on the
//! remote, so unchanged files never transfer twice. Remote writes are
//! atomic (upload to a temporary name, then rename) and transient
//! transport failures are retried with reconnect.
//!
//! # Architecture
//!
//! ```text
//! Syncer (walk) -> decision (should this file upload?)
//!               -> uploader (atomic STOR + rename), via Session retries
//!               -> Manifest (loaded at start, saved at end)
//! Session owns one Transport: FtpTransport or LocalTransport.
//! ```

pub mod config;
pub mod error;
pub mod ftp;
pub mod hash;
pub mod ignore;
pub mod manifest;
pub mod progress;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use error::{Result, SyncError};
pub use hash::HashAlgo;
pub use manifest::{Manifest, ManifestEntry};
pub use sync::{SyncStats, Syncer};
pub use transport::{RemoteEntry, Session, Transport};
