//! Write-ahead log for accumulator transitions.
//!
//! The log is the sole durable authority on `(sequence, value)`: the
//! accumulator's in-memory state is a cache of the log's tail and is rebuilt
//! from it on startup.  The format is UTF-8 text, one record per line,
//! with `#`-prefixed header/comment lines that parsers always skip:
//!
//! ```text
//! # SCAR ACCUMULATOR WAL
//! # seq:operation:value:timestamp:scar_id
//! 1:ADD:53face9720…:2026-08-25T09:14:02.113+00:00:ab12cd34
//! ```
//!
//! The file is append-only; no line is ever rewritten in place.  A crash can
//! leave a partial trailing line, so recovery trusts only the last record
//! whose every field parses, discarding a corrupt tail rather than failing.

use chrono::{DateTime, FixedOffset, Utc};
use num_bigint::BigUint;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// First header line identifying the file format.
pub const WAL_HEADER: &str = "# SCAR ACCUMULATOR WAL";
/// Second header line documenting the record columns.
pub const WAL_COLUMNS: &str = "# seq:operation:value:timestamp:scar_id";

/// Length of the short hex element identifier stored in each record.
pub(crate) const SCAR_ID_LEN: usize = 8;

/// Errors raised by the write-ahead log.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying filesystem failure, including a failed durability sync.
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    /// The tail lock was poisoned by a panicking writer.
    #[error("wal tail lock poisoned")]
    LockPoisoned,
}

/// Operation tag of a logged transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOperation {
    /// An element was folded into the accumulator.
    Add,
    /// An element's contribution was discarded from the accumulator.
    Remove,
}

impl WalOperation {
    /// Wire spelling of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            WalOperation::Add => "ADD",
            WalOperation::Remove => "REMOVE",
        }
    }

    fn parse(input: &str) -> Option<Self> {
        match input {
            "ADD" => Some(WalOperation::Add),
            "REMOVE" => Some(WalOperation::Remove),
            _ => None,
        }
    }
}

/// A fully parsed data record.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// Monotonic transition number, starting at 1.
    pub sequence: u64,
    /// Whether the transition was an add or a remove.
    pub operation: WalOperation,
    /// Accumulator value after the transition, decimal-encoded on disk.
    pub value: BigUint,
    /// RFC 3339 timestamp recorded when the transition was appended.
    pub timestamp: DateTime<FixedOffset>,
    /// Short hex identifier of the element involved.
    pub scar_id: String,
}

struct WalTail {
    sequence: u64,
    value: Option<BigUint>,
}

/// Durable, append-only log of accumulator transitions.
///
/// `append` holds an exclusive lock across the write, the flush and the
/// fsync, so concurrent writers serialize into a strict total order matching
/// the sequence numbers and partial writes never interleave.  `recover` reads
/// without the lock and is intended as a startup-time operation, not a
/// steady-state concurrent read path.
pub struct AccumulatorWal {
    path: PathBuf,
    tail: Mutex<WalTail>,
}

impl AccumulatorWal {
    /// Opens the log at `path`, creating it with header lines if absent.
    ///
    /// The tail cache is seeded from the durable records before the handle
    /// is returned, so the next append continues the existing sequence.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut file = File::create(&path)?;
            writeln!(file, "{WAL_HEADER}")?;
            writeln!(file, "{WAL_COLUMNS}")?;
            file.sync_all()?;
        }
        let wal = Self {
            path,
            tail: Mutex::new(WalTail {
                sequence: 0,
                value: None,
            }),
        };
        wal.initialize_cache()?;
        Ok(wal)
    }

    /// Runs [`AccumulatorWal::recover`] and seeds the tail cache from the
    /// result.
    ///
    /// [`AccumulatorWal::open`] already does this; calling it again only
    /// matters if the file was replaced behind the handle.
    pub fn initialize_cache(&self) -> Result<(), WalError> {
        let recovered = self.recover()?;
        let mut tail = self.tail.lock().map_err(|_| WalError::LockPoisoned)?;
        match recovered {
            Some(record) => {
                tail.sequence = record.sequence;
                tail.value = Some(record.value);
            }
            None => {
                tail.sequence = 0;
                tail.value = None;
            }
        }
        Ok(())
    }

    /// Durably appends one transition record and returns its sequence number.
    ///
    /// The record is written, flushed and fsynced before the tail cache is
    /// advanced and the lock released; a failed sync leaves the cache exactly
    /// as it was, so callers observe either a durable transition or none.
    pub fn append(
        &self,
        operation: WalOperation,
        value: &BigUint,
        scar_id: &str,
    ) -> Result<u64, WalError> {
        let mut tail = self.tail.lock().map_err(|_| WalError::LockPoisoned)?;
        let sequence = tail.sequence + 1;
        let line = format!(
            "{}:{}:{}:{}:{}\n",
            sequence,
            operation.as_str(),
            value.to_str_radix(10),
            Utc::now().to_rfc3339(),
            scar_id,
        );
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        tail.sequence = sequence;
        tail.value = Some(value.clone());
        Ok(sequence)
    }

    /// Reads the whole log and returns the last well-formed record.
    ///
    /// Header and comment lines are skipped.  Records whose fields do not
    /// fully parse — typically a trailing line truncated mid-write by a
    /// crash — are discarded, never trusted.  An empty log yields `Ok(None)`.
    pub fn recover(&self) -> Result<Option<WalRecord>, WalError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let mut last = None;
        for raw in contents.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(record) = parse_record(line) {
                last = Some(record);
            }
        }
        Ok(last)
    }

    /// Cached `(sequence, value)` of the tail, as of the last append or
    /// cache initialization.
    pub fn cached_state(&self) -> Result<(u64, Option<BigUint>), WalError> {
        let tail = self.tail.lock().map_err(|_| WalError::LockPoisoned)?;
        Ok((tail.sequence, tail.value.clone()))
    }

    /// Filesystem path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses one data line, returning `None` unless every field is well formed.
///
/// The timestamp field contains colons, so the line is split head-first for
/// `seq:op:value` and tail-last for the scar id; whatever remains in the
/// middle must parse as an RFC 3339 timestamp.
fn parse_record(line: &str) -> Option<WalRecord> {
    let (head, scar_id) = line.rsplit_once(':')?;
    if scar_id.len() != SCAR_ID_LEN || !scar_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut fields = head.splitn(4, ':');
    let sequence = fields.next()?.parse::<u64>().ok()?;
    let operation = WalOperation::parse(fields.next()?)?;
    let value_field = fields.next()?;
    let value = BigUint::parse_bytes(value_field.as_bytes(), 10)?;
    let timestamp = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
    Some(WalRecord {
        sequence,
        operation,
        value,
        timestamp,
        scar_id: scar_id.to_string(),
    })
}
