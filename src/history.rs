//! Ordered in-memory message log backed by an append-only on-disk ledger.
//!
//! The ledger is one CSV row per packet: `unix_timestamp,frequency_hz,raw`.
//! The raw packet text is the final field and is never split, so embedded
//! commas survive a round trip. Recovery reads only a bounded tail of the
//! file so startup latency is independent of ledger size.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use log::{debug, error, warn};

use crate::telemetry::{self, Message};

/// Most recent ledger records re-decoded at startup. Warm-starting the
/// kinematics needs only the last one or two own-station fixes.
pub const RECOVERY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchSite {
    pub latitude_d: f64,
    pub longitude_d: f64,
}

pub struct History {
    messages: Vec<Message>,
    own_call_sign: String,
    /// None in simulation mode; nothing is persisted.
    ledger: Option<PathBuf>,
    launch_site: Option<LaunchSite>,
}

impl History {
    pub fn new(own_call_sign: String, ledger: Option<PathBuf>, launch_site: Option<LaunchSite>) -> Self {
        Self {
            messages: Vec::new(),
            own_call_sign,
            ledger,
            launch_site,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn own_call_sign(&self) -> &str {
        &self.own_call_sign
    }

    pub fn is_own(&self, message: &Message) -> bool {
        message.is_from(&self.own_call_sign)
    }

    /// Append to the in-memory log and, when a ledger is configured, to the
    /// on-disk ledger. The file is opened, written and closed per call so
    /// every record is durable before this returns; at a few packets per
    /// second that costs nothing.
    pub fn append(&mut self, message: Message) -> io::Result<()> {
        let row = format!(
            "{},{},{}",
            message.timestamp.timestamp(),
            message.frequency_hz,
            message.raw
        );
        self.messages.push(message);

        if let Some(path) = &self.ledger {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", row)?;
            file.sync_data()?;
        }
        Ok(())
    }

    /// Recover the most recent ledger records without reading the whole
    /// file. Any failure degrades to whatever was recovered so far; the
    /// monitor starts with an empty history rather than aborting.
    pub fn recover(&mut self) {
        let Some(path) = self.ledger.clone() else {
            return;
        };
        let tail = match read_tail(&path, RECOVERY_LIMIT) {
            Ok(tail) => tail,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No ledger at {} yet", path.display());
                return;
            }
            Err(e) => {
                error!("Unable to read the ledger {}: {}", path.display(), e);
                return;
            }
        };

        let mut recovered = 0;
        for line in tail.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.splitn(3, ',');
            let (Some(unix), Some(frequency), Some(raw)) =
                (fields.next(), fields.next(), fields.next())
            else {
                warn!("Skipping short ledger row {:?}", line);
                continue;
            };
            let (Ok(unix), Ok(frequency_hz)) = (unix.parse::<i64>(), frequency.parse::<u32>())
            else {
                warn!("Skipping unparseable ledger row {:?}", line);
                continue;
            };
            let Some(timestamp) = DateTime::from_timestamp(unix, 0) else {
                warn!("Skipping ledger row with timestamp {} out of range", unix);
                continue;
            };
            match telemetry::decode(raw, frequency_hz, timestamp) {
                Ok(message) => {
                    self.messages.push(message);
                    recovered += 1;
                }
                Err(e) => error!("Recovered packet failed to decode: {} ({:?})", e, raw),
            }
        }
        debug!("Recovered {} messages from {}", recovered, path.display());
    }

    /// First-ever own-station fix, memoized. May be pre-seeded with an
    /// explicit coordinate at construction, in which case the search is
    /// skipped entirely.
    pub fn launch_site(&mut self) -> Option<LaunchSite> {
        if self.launch_site.is_none() {
            self.launch_site = self
                .messages
                .iter()
                .find(|m| m.is_from(&self.own_call_sign))
                .map(|m| LaunchSite {
                    latitude_d: m.latitude_d,
                    longitude_d: m.longitude_d,
                });
        }
        self.launch_site
    }

    pub fn own_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.is_from(&self.own_call_sign))
    }

    /// Latest and next-to-latest own-station fixes.
    pub fn recent_own(&self) -> (Option<&Message>, Option<&Message>) {
        let mut own = self.messages.iter().rev().filter(|m| self.is_own(m));
        (own.next(), own.next())
    }
}

/// Read at most the last `max_lines` lines of a file, seeking backward from
/// the end across newline boundaries instead of reading the whole thing.
fn read_tail(path: &Path, max_lines: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut pos = len;
    let mut newlines = 0;
    let mut start = 0u64;
    let mut chunk = [0u8; 4096];

    'scan: while pos > 0 {
        let take = chunk.len().min(pos as usize);
        pos -= take as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut chunk[..take])?;

        for i in (0..take).rev() {
            if chunk[i] != b'\n' {
                continue;
            }
            // The terminating newline of the final record does not count.
            if pos + i as u64 + 1 == len {
                continue;
            }
            newlines += 1;
            if newlines == max_lines {
                start = pos + i as u64 + 1;
                break 'scan;
            }
        }
    }

    file.seek(SeekFrom::Start(start))?;
    let mut tail = String::new();
    file.read_to_string(&mut tail)?;
    Ok(tail)
}
