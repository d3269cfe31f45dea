//! FTP/FTPS client.
//!
//! One control connection, passive-mode data connections opened per
//! transfer. Explicit TLS (`AUTH TLS`) upgrades the control channel and
//! protects data channels with `PROT P`. The client never retries by
//! itself; recovery policy lives in [`Session`](crate::transport::Session).

pub mod protocol;

use crate::error::{Result, SyncError};
use crate::transport::RemoteEntry;
use protocol::Reply;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tracing::debug;

/// Applied to TCP establishment, the greeting, and data-connection dials.
/// Individual transfers have no deadline of their own.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

const TRANSFER_CHUNK: usize = 64 * 1024;

/// Connection parameters, fixed for the life of the client.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub secure: bool,
    pub reject_unauthorized: bool,
}

/// A socket that may or may not have been upgraded to TLS.
enum NetStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl tokio::io::AsyncRead for NetStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for NetStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_flush(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

pub struct FtpClient {
    config: FtpConfig,
    stream: Option<BufReader<NetStream>>,
    closed: bool,
}

impl FtpClient {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            stream: None,
            closed: true,
        }
    }

    /// No connection, or a fatal I/O error left the socket in an unknown
    /// state. Derived, never set by a dedicated transition.
    pub fn is_closed(&self) -> bool {
        self.closed || self.stream.is_none()
    }

    // =========================================================================
    // Control channel
    // =========================================================================

    async fn read_control_line(&mut self) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(SyncError::ConnectionClosed)?;
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) => {
                self.closed = true;
                Err(SyncError::ConnectionClosed)
            }
            Ok(_) => Ok(line),
            Err(e) => {
                self.closed = true;
                Err(e.into())
            }
        }
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let first = self.read_control_line().await?;
        let (code, sep, mut text) = protocol::parse_reply_line(&first).ok_or_else(|| {
            SyncError::Protocol(format!("malformed reply: {}", first.trim_end()))
        })?;

        if sep == '-' {
            loop {
                let line = self.read_control_line().await?;
                match protocol::parse_reply_line(&line) {
                    Some((c, ' ', t)) if c == code => {
                        text.push('\n');
                        text.push_str(&t);
                        break;
                    }
                    _ => {
                        text.push('\n');
                        text.push_str(line.trim_end());
                    }
                }
            }
        }

        debug!(code, message = %text, "ftp reply");
        Ok(Reply { code, message: text })
    }

    async fn send_command(&mut self, cmd: &str) -> Result<()> {
        let redacted = if cmd.starts_with("PASS ") { "PASS ****" } else { cmd };
        debug!(command = redacted, "ftp send");

        let stream = self.stream.as_mut().ok_or(SyncError::ConnectionClosed)?;
        let framed = format!("{cmd}\r\n");
        let io = async {
            stream.write_all(framed.as_bytes()).await?;
            stream.flush().await
        };
        if let Err(e) = io.await {
            self.closed = true;
            return Err(e.into());
        }
        Ok(())
    }

    async fn command(&mut self, cmd: &str) -> Result<Reply> {
        self.send_command(cmd).await?;
        self.read_reply().await
    }

    // =========================================================================
    // Session establishment
    // =========================================================================

    fn tls_connector(&self) -> Result<tokio_native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();
        if !self.config.reject_unauthorized {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        Ok(tokio_native_tls::TlsConnector::from(builder.build()?))
    }

    async fn dial(&self, port: u16) -> Result<TcpStream> {
        let stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.config.host.as_str(), port)),
        )
        .await
        .map_err(|_| SyncError::ConnectTimeout(CONNECT_TIMEOUT))??;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    /// Establishes the control connection: greeting, optional TLS upgrade,
    /// login, binary mode.
    pub async fn connect(&mut self) -> Result<()> {
        let tcp = self.dial(self.config.port).await?;
        self.stream = Some(BufReader::new(NetStream::Plain(tcp)));
        self.closed = false;

        tokio::time::timeout(CONNECT_TIMEOUT, self.read_reply())
            .await
            .map_err(|_| SyncError::ConnectTimeout(CONNECT_TIMEOUT))??
            .completion_or_err("greeting")?;

        if self.config.secure {
            let reply = self.command("AUTH TLS").await?;
            if reply.code != 234 {
                return Err(SyncError::Remote {
                    code: reply.code,
                    message: format!("server refused TLS upgrade: {}", reply.message),
                });
            }
            let plain = match self.stream.take().map(BufReader::into_inner) {
                Some(NetStream::Plain(s)) => s,
                _ => return Err(SyncError::ConnectionClosed),
            };
            self.closed = true; // until the handshake completes
            let tls = self
                .tls_connector()?
                .connect(&self.config.host, plain)
                .await?;
            self.stream = Some(BufReader::new(NetStream::Tls(Box::new(tls))));
            self.closed = false;

            self.command("PBSZ 0").await?.completion_or_err("PBSZ")?;
            self.command("PROT P").await?.completion_or_err("PROT")?;
        }

        let user = format!("USER {}", self.config.user);
        let reply = self.command(&user).await?;
        if reply.is_intermediate() {
            let pass = format!("PASS {}", self.config.password);
            self.command(&pass).await?.completion_or_err("login")?;
        } else {
            reply.completion_or_err("login")?;
        }

        self.command("TYPE I").await?.completion_or_err("TYPE I")?;
        Ok(())
    }

    /// Sends QUIT if the connection is still up and drops the socket.
    pub async fn quit(&mut self) -> Result<()> {
        if self.stream.is_some() && !self.closed {
            let _ = self.command("QUIT").await;
        }
        self.stream = None;
        self.closed = true;
        Ok(())
    }

    // =========================================================================
    // Data connections
    // =========================================================================

    /// Negotiates a passive data connection (EPSV, falling back to PASV).
    async fn open_data_stream(&mut self) -> Result<NetStream> {
        let reply = self.command("EPSV").await?;
        let port = if reply.code == 229 {
            protocol::parse_epsv(&reply.message)?
        } else {
            let reply = self.command("PASV").await?;
            if reply.code != 227 {
                return Err(SyncError::Remote {
                    code: reply.code,
                    message: format!("passive mode refused: {}", reply.message),
                });
            }
            let (_ip, port) = protocol::parse_pasv(&reply.message)?;
            // Dial the control-channel host rather than the advertised
            // address; servers behind NAT routinely report internal IPs.
            port
        };

        let tcp = self.dial(port).await?;
        if self.config.secure {
            let tls = self.tls_connector()?.connect(&self.config.host, tcp).await?;
            Ok(NetStream::Tls(Box::new(tls)))
        } else {
            Ok(NetStream::Plain(tcp))
        }
    }

    fn expect_transfer_start(reply: Reply, what: &str) -> Result<()> {
        if reply.is_preliminary() || reply.is_completion() {
            Ok(())
        } else {
            Err(SyncError::Remote {
                code: reply.code,
                message: format!("{what}: {}", reply.message),
            })
        }
    }

    /// Uploads a local file to `remote` (STOR), reporting
    /// `(bytes_sent, total)` after every chunk.
    pub async fn stor(
        &mut self,
        local: &Path,
        remote: &str,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<()> {
        let total = tokio::fs::metadata(local).await?.len();
        let mut file = tokio::fs::File::open(local).await?;

        let mut data = self.open_data_stream().await?;
        let reply = self.command(&format!("STOR {remote}")).await?;
        Self::expect_transfer_start(reply, "upload refused")?;

        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut sent = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            data.write_all(&buf[..n]).await?;
            sent += n as u64;
            progress(sent, total);
        }
        data.shutdown().await?;
        drop(data);

        self.read_reply().await?.completion_or_err("upload")?;
        Ok(())
    }

    /// Downloads `remote` into a local file (RETR).
    pub async fn retr(&mut self, remote: &str, local: &Path) -> Result<()> {
        let mut data = self.open_data_stream().await?;
        let reply = self.command(&format!("RETR {remote}")).await?;
        Self::expect_transfer_start(reply, "download refused")?;

        let mut file = tokio::fs::File::create(local).await?;
        tokio::io::copy(&mut data, &mut file).await?;
        file.flush().await?;
        drop(data);

        self.read_reply().await?.completion_or_err("download")?;
        Ok(())
    }

    /// Directory listing; MLSD when the server offers it, LIST otherwise.
    pub async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        match self.list_with("MLSD", dir, protocol::parse_mlsd_line).await {
            Err(SyncError::Remote { code, .. }) if matches!(code, 500 | 502 | 504) => {
                self.list_with("LIST", dir, protocol::parse_list_line).await
            }
            other => other,
        }
    }

    async fn list_with(
        &mut self,
        verb: &str,
        dir: &str,
        parse: fn(&str) -> Option<RemoteEntry>,
    ) -> Result<Vec<RemoteEntry>> {
        let mut data = self.open_data_stream().await?;
        let reply = self.command(&format!("{verb} {dir}")).await?;
        Self::expect_transfer_start(reply, "listing refused")?;

        let mut raw = Vec::new();
        data.read_to_end(&mut raw).await?;
        drop(data);

        self.read_reply().await?.completion_or_err("listing")?;
        let text = String::from_utf8_lossy(&raw);
        Ok(text.lines().filter_map(parse).collect())
    }

    // =========================================================================
    // Single-object commands
    // =========================================================================

    /// Remote size in bytes; `None` when the object is absent or the server
    /// does not support SIZE.
    pub async fn size(&mut self, path: &str) -> Result<Option<u64>> {
        let reply = self.command(&format!("SIZE {path}")).await?;
        if reply.code != 213 {
            return Ok(None);
        }
        reply
            .message
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::Protocol(format!("bad SIZE reply: {}", reply.message)))
    }

    /// Remote modification time (MDTM); `None` when unavailable.
    pub async fn mdtm(&mut self, path: &str) -> Result<Option<SystemTime>> {
        let reply = self.command(&format!("MDTM {path}")).await?;
        if reply.code != 213 {
            return Ok(None);
        }
        Ok(protocol::parse_mdtm(&reply.message))
    }

    /// Sets the remote modification time (MFMT). Returns whether the server
    /// accepted the command; plenty of servers never will.
    pub async fn mfmt(&mut self, path: &str, mtime: SystemTime) -> Result<bool> {
        let stamp = protocol::format_mdtm(mtime);
        let reply = self.command(&format!("MFMT {stamp} {path}")).await?;
        Ok(reply.is_completion())
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let reply = self.command(&format!("RNFR {from}")).await?;
        if !reply.is_intermediate() {
            return Err(SyncError::Remote {
                code: reply.code,
                message: format!("rename source rejected: {}", reply.message),
            });
        }
        self.command(&format!("RNTO {to}"))
            .await?
            .completion_or_err("rename")?;
        Ok(())
    }

    pub async fn delete(&mut self, path: &str) -> Result<()> {
        self.command(&format!("DELE {path}"))
            .await?
            .completion_or_err("delete")?;
        Ok(())
    }

    pub async fn mkdir(&mut self, path: &str) -> Result<()> {
        self.command(&format!("MKD {path}"))
            .await?
            .completion_or_err("mkdir")?;
        Ok(())
    }
}
