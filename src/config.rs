//! Configuration, read once at startup and immutable afterwards.
//!
//! Every knob is both a CLI flag and an environment variable, with the
//! environment being the usual way to drive deployments from CI. Toggles
//! keep shell-friendly semantics: default-on toggles accept anything but
//! `"0"`, default-off toggles require exactly `"1"`.

use crate::error::{Result, SyncError};
use crate::ftp::FtpConfig;
use crate::hash::HashAlgo;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Default-on toggle: enabled unless the value is literally "0".
fn enabled_unless_zero(s: &str) -> std::result::Result<bool, String> {
    Ok(s.trim() != "0")
}

/// Default-off toggle: enabled only when the value is literally "1".
fn enabled_if_one(s: &str) -> std::result::Result<bool, String> {
    Ok(s.trim() == "1")
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ftpsync",
    version,
    about = "Mirror a local directory tree to an FTP/FTPS server, uploading only what changed"
)]
pub struct Config {
    /// Server hostname
    #[arg(long, env = "FTP_HOST")]
    pub host: Option<String>,

    /// Login user
    #[arg(long, env = "FTP_USER")]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = "FTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Server port
    #[arg(long, env = "FTP_PORT", default_value_t = 21)]
    pub port: u16,

    /// Upgrade the control connection with explicit TLS (FTPS)
    #[arg(long, env = "FTP_SECURE", default_value = "0",
          value_parser = enabled_if_one, action = ArgAction::Set)]
    pub secure: bool,

    /// Validate the server certificate (set to 0 for self-signed setups)
    #[arg(long = "tls-reject-unauthorized", env = "FTP_TLS_REJECT_UNAUTH",
          default_value = "1", value_parser = enabled_unless_zero, action = ArgAction::Set)]
    pub tls_reject_unauthorized: bool,

    /// Local directory to mirror
    #[arg(long, env = "LOCAL_DIR", default_value = "src")]
    pub local_dir: PathBuf,

    /// Remote root directory
    #[arg(long = "remote-path", env = "FTP_REMOTE_PATH", default_value = "/src")]
    pub remote_path: String,

    /// Compare files against a manifest of content hashes
    #[arg(long = "check-hash", env = "CHECK_HASH", default_value = "1",
          value_parser = enabled_unless_zero, action = ArgAction::Set)]
    pub check_hash: bool,

    /// Digest algorithm for the manifest
    #[arg(long = "hash-algo", env = "HASH_ALGO", default_value = "blake3", value_enum)]
    pub hash_algo: HashAlgo,

    /// Name of the manifest object under the remote root
    #[arg(long = "manifest", env = "FTP_MANIFEST", default_value = ".deploy-manifest.json")]
    pub manifest_name: String,

    /// Use modification times as change evidence when hashing is off
    #[arg(long = "check-mtime", env = "CHECK_MTIME", default_value = "1",
          value_parser = enabled_unless_zero, action = ArgAction::Set)]
    pub check_mtime: bool,

    /// Allowed local/remote mtime drift in milliseconds
    #[arg(long = "mtime-tolerance-ms", env = "MTIME_TOLERANCE_MS", default_value_t = 60_000)]
    pub mtime_tolerance_ms: u64,

    /// Decide and report, but perform no remote mutation
    #[arg(long = "dry-run", env = "DRY_RUN", default_value = "0",
          value_parser = enabled_if_one, action = ArgAction::Set)]
    pub dry_run: bool,

    /// When sizes match but no mtime evidence exists, upload anyway
    #[arg(long = "upload-when-equal-and-no-mtime", env = "UPLOAD_WHEN_EQUAL_AND_NO_MTIME",
          default_value = "0", value_parser = enabled_if_one, action = ArgAction::Set)]
    pub upload_when_equal_and_no_mtime: bool,

    /// Suppress per-file output
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl Config {
    /// Checks that the connection credentials are present. Reported before
    /// anything touches the network, with exit code 1.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.host.is_none() {
            missing.push("FTP_HOST");
        }
        if self.user.is_none() {
            missing.push("FTP_USER");
        }
        if self.password.is_none() {
            missing.push("FTP_PASSWORD");
        }
        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Remote root with any trailing slashes trimmed ("/" stays "/").
    pub fn remote_root(&self) -> String {
        let trimmed = self.remote_path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Connection parameters for the FTP client. Fails like [`validate`]
    /// when credentials are missing.
    ///
    /// [`validate`]: Config::validate
    pub fn ftp_config(&self) -> Result<FtpConfig> {
        self.validate()?;
        Ok(FtpConfig {
            host: self.host.clone().unwrap_or_default(),
            port: self.port,
            user: self.user.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            secure: self.secure,
            reject_unauthorized: self.tls_reject_unauthorized,
        })
    }
}
