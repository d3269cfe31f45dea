//! Wire-level codecs for the FTP control channel.
//!
//! Pure parsing and formatting: reply lines, passive-mode addresses,
//! MDTM/MFMT timestamps, and the MLSD/LIST listing formats. Everything
//! stateful lives in [`FtpClient`](super::FtpClient).

use crate::error::{Result, SyncError};
use crate::transport::RemoteEntry;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::net::Ipv4Addr;
use std::time::SystemTime;

// =============================================================================
// Replies
// =============================================================================

/// A parsed server reply: three-digit code plus text (multiline replies
/// are joined with newlines).
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    /// 1xx: transfer about to start.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx: command completed.
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx: command accepted, more input expected (RNFR, USER).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// 4xx: transient failure.
    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx: permanent failure.
    pub fn is_permanent(&self) -> bool {
        self.code >= 500
    }

    /// Converts a non-completion reply into a typed error.
    pub fn completion_or_err(self, what: &str) -> Result<Reply> {
        if self.is_completion() {
            Ok(self)
        } else {
            Err(SyncError::Remote {
                code: self.code,
                message: format!("{what}: {}", self.message),
            })
        }
    }
}

/// Splits one control line into (code, separator, text).
///
/// The separator is `' '` for a final line and `'-'` for the first line of
/// a multiline reply. Returns `None` for continuation lines that carry no
/// code prefix.
pub fn parse_reply_line(line: &str) -> Option<(u16, char, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let code: u16 = line.get(0..3)?.parse().ok()?;
    let sep = line.chars().nth(3).unwrap_or(' ');
    if sep != ' ' && sep != '-' {
        return None;
    }
    let text = line.get(4..).unwrap_or("").to_string();
    Some((code, sep, text))
}

// =============================================================================
// Passive mode
// =============================================================================

/// Parses a 227 reply, e.g. `Entering Passive Mode (10,0,0,1,19,78)`.
///
/// Takes the last six numeric groups so stray digits in the prose don't
/// confuse it.
pub fn parse_pasv(message: &str) -> Result<(Ipv4Addr, u16)> {
    let groups: Vec<u32> = message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if groups.len() < 6 {
        return Err(SyncError::Protocol(format!("bad PASV reply: {message}")));
    }
    let g = &groups[groups.len() - 6..];
    if g.iter().any(|&n| n > 255) {
        return Err(SyncError::Protocol(format!("bad PASV reply: {message}")));
    }
    let ip = Ipv4Addr::new(g[0] as u8, g[1] as u8, g[2] as u8, g[3] as u8);
    let port = (g[4] as u16) << 8 | g[5] as u16;
    Ok((ip, port))
}

/// Parses a 229 reply, e.g. `Entering Extended Passive Mode (|||6446|)`.
pub fn parse_epsv(message: &str) -> Result<u16> {
    let open = message.find('(');
    let close = message.rfind(')');
    let inner = match (open, close) {
        (Some(a), Some(b)) if a < b => &message[a + 1..b],
        _ => message,
    };
    inner
        .split('|')
        .find(|tok| !tok.is_empty() && tok.chars().all(|c| c.is_ascii_digit()))
        .and_then(|tok| tok.parse().ok())
        .ok_or_else(|| SyncError::Protocol(format!("bad EPSV reply: {message}")))
}

// =============================================================================
// Timestamps (MDTM / MFMT, RFC 3659)
// =============================================================================

const MDTM_FORMAT: &str = "%Y%m%d%H%M%S";

/// Formats a timestamp as the UTC `YYYYMMDDHHMMSS` stamp MFMT expects.
pub fn format_mdtm(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format(MDTM_FORMAT).to_string()
}

/// Parses an MDTM reply body, tolerating a fractional-seconds suffix.
pub fn parse_mdtm(text: &str) -> Option<SystemTime> {
    let stamp = text.trim();
    let stamp = stamp.split('.').next().unwrap_or(stamp);
    let naive = NaiveDateTime::parse_from_str(stamp, MDTM_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive).into())
}

// =============================================================================
// Listings
// =============================================================================

/// Parses one MLSD fact line: `type=file;size=10;modify=20240101120000; a.txt`.
///
/// Returns `None` for lines describing the listed directory itself
/// (`cdir`/`pdir`) or lines without a pathname.
pub fn parse_mlsd_line(line: &str) -> Option<RemoteEntry> {
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut size = None;
    let mut modified = None;
    let mut is_dir = false;
    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let (key, value) = fact.split_once('=')?;
        match key.to_ascii_lowercase().as_str() {
            "type" => match value.to_ascii_lowercase().as_str() {
                "dir" => is_dir = true,
                "cdir" | "pdir" => return None,
                _ => {}
            },
            "size" => size = value.parse().ok(),
            "modify" => modified = parse_mdtm(value),
            _ => {}
        }
    }

    Some(RemoteEntry {
        name: name.to_string(),
        size,
        modified,
        is_dir,
    })
}

/// Best-effort parser for Unix-style `LIST` lines:
/// `-rw-r--r-- 1 owner group 1234 Jan  1 12:34 name`.
///
/// Size is usually recoverable; the timestamp only when the token shape
/// allows (time-form lines are assumed to be from the current year).
/// Unparseable lines yield `None`, which downstream treats as "no
/// evidence".
pub fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let mut tokens = line.split_whitespace();
    let mode = tokens.next()?;
    let kind = mode.chars().next()?;
    if !matches!(kind, '-' | 'd' | 'l') {
        return None; // "total 12" and friends
    }

    let _links = tokens.next()?;
    let _owner = tokens.next()?;
    let _group = tokens.next()?;
    let size_tok = tokens.next()?;
    let month_tok = tokens.next()?;
    let day_tok = tokens.next()?;
    let time_or_year = tokens.next()?;
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        return None;
    }

    let mut name = rest.join(" ");
    if kind == 'l' {
        if let Some(idx) = name.find(" -> ") {
            name.truncate(idx);
        }
    }

    Some(RemoteEntry {
        name,
        size: size_tok.parse().ok(),
        modified: parse_list_timestamp(month_tok, day_tok, time_or_year),
        is_dir: kind == 'd',
    })
}

fn parse_list_timestamp(month: &str, day: &str, time_or_year: &str) -> Option<SystemTime> {
    let month = match month.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    let day: u32 = day.parse().ok()?;

    let (year, hour, minute) = if let Some((h, m)) = time_or_year.split_once(':') {
        (Utc::now().year(), h.parse().ok()?, m.parse().ok()?)
    } else {
        (time_or_year.parse().ok()?, 0, 0)
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive).into())
}
