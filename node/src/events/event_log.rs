// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-Only Knowledge Log
//!
//! This is the CANONICAL durability layer.
//! - Events are written to disk BEFORE memory application
//! - Every append is fsync'd before it is acknowledged
//! - Bytes are never rewritten in place; compaction replaces the whole file
//!
//! # File Format
//! ```text
//! LORELOG:v1
//! ---
//! op: item.create
//! item:
//!   id: L-01J...
//!   ...
//! crc: 1c291ca3
//! ---
//! op: item.delete
//! id: L-01J...
//! crc: 5e0f2a17
//! ```
//!
//! Each record is a delimiter line followed by a YAML payload. The payload's
//! last line is a CRC-32 of the bytes before it, so a record cut short by a
//! crash can never pass for a shorter valid record.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use lore_kernel::{Entry, Event, LogPointer};

use crate::errors::{Result, StoreError};
use crate::fileio::{parent_dir, sync_dir};

pub const MAGIC_HEADER: &str = "LORELOG:v1";
pub const EVENT_DELIM: &str = "---";
pub const LOG_FILE: &str = "knowledge.lore";

const DELIM_LINE: &[u8] = b"---\n";
const CRC_PREFIX: &[u8] = b"crc: ";
const MAX_HEADER_LEN: u64 = 256;

/// Where an appended record landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Appended {
    pub pointer: LogPointer,
    pub seq: u64,
    /// Log length after the append.
    pub end: u64,
}

/// Append handle over one knowledge log file.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: File,
    header_len: u64,
    last_seq: u64,
}

impl EventLog {
    /// Creates a new log holding only the header. Fails if `path` exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&path)?;

        let header = format!("{MAGIC_HEADER}\n");
        file.write_all(header.as_bytes())?;
        file.sync_all()?;
        sync_dir(&parent_dir(&path))?;

        tracing::debug!(path = %path.display(), "knowledge log created");
        Ok(Self {
            path,
            file,
            header_len: header.len() as u64,
            last_seq: 0,
        })
    }

    /// Opens an existing log for read + append and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).append(true).open(&path)?;

        let mut line = Vec::new();
        BufReader::new((&file).take(MAX_HEADER_LEN)).read_until(b'\n', &mut line)?;
        let expected = format!("{MAGIC_HEADER}\n");
        if line != expected.as_bytes() {
            return Err(StoreError::HeaderInvalid {
                found: String::from_utf8_lossy(&line).trim_end().to_string(),
                path,
            });
        }

        Ok(Self {
            path,
            file,
            header_len: line.len() as u64,
            last_seq: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length of the header line; the first record starts here.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Current length of the file on disk.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? <= self.header_len)
    }

    /// Sequence number of the last record appended or replayed.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub(crate) fn set_last_seq(&mut self, seq: u64) {
        self.last_seq = seq;
    }

    /// Appends one record and fsyncs before returning.
    pub fn append(&mut self, event: &Event) -> Result<Appended> {
        let appended = self.write_record(event)?;
        self.file.sync_all()?;
        metrics::counter!("lore_events_appended_total", 1, "op" => event.op());
        tracing::debug!(op = event.op(), seq = appended.seq, offset = appended.pointer.offset, "event appended");
        Ok(appended)
    }

    /// Appends without fsync. The caller must [`sync`](Self::sync) before
    /// relying on the records.
    pub(crate) fn append_unsynced(&mut self, event: &Event) -> Result<Appended> {
        self.write_record(event)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn write_record(&mut self, event: &Event) -> Result<Appended> {
        let payload = encode_payload(event)?;
        let start = self.len()?;

        let mut record = Vec::with_capacity(DELIM_LINE.len() + payload.len());
        record.extend_from_slice(DELIM_LINE);
        record.extend_from_slice(&payload);

        if let Err(e) = self.file.write_all(&record) {
            // Drop whatever part of the record made it out.
            let _ = self.file.set_len(start);
            return Err(e.into());
        }

        self.last_seq += 1;
        let offset = start + DELIM_LINE.len() as u64;
        Ok(Appended {
            pointer: LogPointer::new(offset, payload.len() as u64),
            seq: self.last_seq,
            end: offset + payload.len() as u64,
        })
    }

    /// Reads exactly the payload bytes `ptr` addresses.
    pub fn read_payload(&self, ptr: LogPointer) -> Result<Vec<u8>> {
        let len = self.len()?;
        if ptr.offset < self.header_len || ptr.end() > len {
            return Err(StoreError::corrupt(
                ptr.offset,
                format!("payload range {}..{} outside log of {} bytes", ptr.offset, ptr.end(), len),
            ));
        }
        let mut buf = vec![0u8; ptr.len as usize];
        let mut reader = &self.file;
        reader.seek(SeekFrom::Start(ptr.offset))?;
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads and decodes the item stored at `ptr`.
    pub fn read_entry(&self, ptr: LogPointer) -> Result<Entry> {
        let payload = self.read_payload(ptr)?;
        match decode_payload(&payload).map_err(|reason| StoreError::corrupt(ptr.offset, reason))? {
            Event::ItemCreate { item } | Event::ItemUpdate { item } => Ok(item),
            other => Err(StoreError::corrupt(
                ptr.offset,
                format!("expected item payload, found {}", other.op()),
            )),
        }
    }

    /// Everything from `offset` to the end of the file.
    pub fn read_from(&self, offset: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut reader = &self.file;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

// --- Record codec ---

/// Serializes an event into a payload block ending in its checksum line.
pub fn encode_payload(event: &Event) -> Result<Vec<u8>> {
    let mut body = serde_yaml::to_string(event)?.into_bytes();
    if body.last() != Some(&b'\n') {
        body.push(b'\n');
    }
    let crc = crc32fast::hash(&body);
    body.extend_from_slice(CRC_PREFIX);
    body.extend_from_slice(format!("{crc:08x}\n").as_bytes());
    Ok(body)
}

/// Verifies the checksum line and decodes the event. Errors are human
/// readable reasons; callers attach the offset.
pub fn decode_payload(payload: &[u8]) -> std::result::Result<Event, String> {
    let body = verify_trailer(payload)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err("empty event payload".to_string());
    }
    serde_yaml::from_slice(body).map_err(|e| format!("invalid event yaml: {e}"))
}

fn verify_trailer(payload: &[u8]) -> std::result::Result<&[u8], String> {
    let Some(trimmed) = payload.strip_suffix(b"\n") else {
        return Err("truncated payload: missing final newline".to_string());
    };
    let line_start = trimmed.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let (body, trailer) = (&payload[..line_start], &trimmed[line_start..]);

    let Some(digits) = trailer.strip_prefix(CRC_PREFIX) else {
        return Err("truncated payload: missing checksum line".to_string());
    };
    let stored = std::str::from_utf8(digits)
        .ok()
        .filter(|d| d.len() == 8)
        .and_then(|d| u32::from_str_radix(d, 16).ok())
        .ok_or_else(|| format!("malformed checksum line {:?}", String::from_utf8_lossy(trailer)))?;

    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(format!("checksum mismatch: stored {stored:08x}, computed {actual:08x}"));
    }
    Ok(body)
}

/// One delimiter-framed record as found in the log.
#[derive(Debug, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub pointer: LogPointer,
    pub payload: &'a [u8],
}

/// Splits a byte range of the log into records.
///
/// Stops at the first framing problem and yields it as `CorruptLog`; nothing
/// after a bad record is ever produced.
pub struct RecordScanner<'a> {
    buf: &'a [u8],
    base: u64,
    pos: usize,
    failed: bool,
}

impl<'a> RecordScanner<'a> {
    /// `base` is the file offset of `buf[0]`.
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        Self {
            buf,
            base,
            pos: 0,
            failed: false,
        }
    }

    fn fail(&mut self, at: usize, reason: String) -> Option<Result<RawRecord<'a>>> {
        self.failed = true;
        Some(Err(StoreError::corrupt(self.base + at as u64, reason)))
    }
}

impl<'a> Iterator for RecordScanner<'a> {
    type Item = Result<RawRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        // Blank lines between records are tolerated.
        let (line_start, line) = loop {
            if self.pos >= self.buf.len() {
                return None;
            }
            let start = self.pos;
            let line = line_at(self.buf, start);
            self.pos += line.len();
            if !line.iter().all(u8::is_ascii_whitespace) {
                break (start, line);
            }
        };

        if line == EVENT_DELIM.as_bytes() {
            return self.fail(line_start, "truncated delimiter line".to_string());
        }
        if !is_delimiter(line) {
            let shown = String::from_utf8_lossy(line).trim_end().chars().take(40).collect::<String>();
            return self.fail(line_start, format!("expected delimiter {EVENT_DELIM:?}, got {shown:?}"));
        }

        let payload_start = self.pos;
        while self.pos < self.buf.len() {
            let line = line_at(self.buf, self.pos);
            if is_delimiter(line) {
                break;
            }
            self.pos += line.len();
        }
        let payload = &self.buf[payload_start..self.pos];
        if payload.iter().all(u8::is_ascii_whitespace) {
            return self.fail(payload_start, "empty event payload".to_string());
        }

        Some(Ok(RawRecord {
            pointer: LogPointer::new(self.base + payload_start as u64, payload.len() as u64),
            payload,
        }))
    }
}

// The line starting at `start`, including its newline when present.
fn line_at(buf: &[u8], start: usize) -> &[u8] {
    match buf[start..].iter().position(|&b| b == b'\n') {
        Some(i) => &buf[start..start + i + 1],
        None => &buf[start..],
    }
}

// Exact match only: an indented "---" inside a body is payload.
fn is_delimiter(line: &[u8]) -> bool {
    line == DELIM_LINE || line == b"---\r\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn entry(id: &str, body: &str) -> Entry {
        Entry {
            id: id.to_string(),
            item_type: "pattern".to_string(),
            topic: None,
            domain: Some("io".to_string()),
            severity: None,
            oneliner: "atomic rename".to_string(),
            created: Utc.with_ymd_and_hms(2025, 5, 5, 5, 5, 5).unwrap(),
            refs: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_create_writes_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let log = EventLog::create(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "LORELOG:v1\n");
        assert_eq!(log.header_len(), 11);
        assert!(log.is_empty().unwrap());
        assert!(EventLog::create(&path).is_err());
    }

    #[test]
    fn test_open_rejects_foreign_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        std::fs::write(&path, "DORYFILE:v1\n---\n").unwrap();

        match EventLog::open(&path).unwrap_err() {
            StoreError::HeaderInvalid { found, .. } => assert_eq!(found, "DORYFILE:v1"),
            other => panic!("expected header error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_rejects_header_without_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        std::fs::write(&path, "LORELOG:v1").unwrap();
        assert!(matches!(EventLog::open(&path), Err(StoreError::HeaderInvalid { .. })));
    }

    #[test]
    fn test_append_reports_payload_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let mut log = EventLog::create(&path).unwrap();

        let first = log.append(&Event::create(entry("P-1", "one"))).unwrap();
        let second = log.append(&Event::delete("P-1")).unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.pointer.offset, 11 + 4);
        assert_eq!(second.pointer.offset, first.end + 4);
        assert_eq!(second.end, log.len().unwrap());

        let raw = log.read_payload(first.pointer).unwrap();
        assert!(raw.starts_with(b"op: item.create\n"));
        assert_eq!(log.read_entry(first.pointer).unwrap(), entry("P-1", "one"));
        assert!(log.read_entry(second.pointer).is_err());
    }

    #[test]
    fn test_body_lines_that_look_like_framing_stay_in_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let mut log = EventLog::create(&path).unwrap();

        let tricky = "---\nLORELOG:v1\ncrc: 00000000\n---";
        let at = log.append(&Event::create(entry("P-2", tricky))).unwrap();

        let buf = log.read_from(log.header_len()).unwrap();
        let records: Vec<_> = RecordScanner::new(&buf, log.header_len()).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pointer, at.pointer);
        assert_eq!(log.read_entry(at.pointer).unwrap().body, tricky);
    }

    #[test]
    fn test_trailer_detects_tampering() {
        let payload = encode_payload(&Event::delete("L-1")).unwrap();
        assert!(decode_payload(&payload).is_ok());

        let mut flipped = payload.clone();
        let i = flipped.iter().position(|&b| b == b'L').unwrap();
        flipped[i] = b'D';
        assert!(decode_payload(&flipped).unwrap_err().contains("checksum mismatch"));

        for cut in 1..payload.len() {
            assert!(decode_payload(&payload[..cut]).is_err(), "cut at {cut} accepted");
        }
    }

    #[test]
    fn test_scanner_flags_empty_payload() {
        let buf = b"---\n---\nop: compact\n";
        let mut scanner = RecordScanner::new(buf, 100);
        match scanner.next().unwrap() {
            Err(StoreError::CorruptLog { offset, reason }) => {
                assert_eq!(offset, 104);
                assert_eq!(reason, "empty event payload");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_scanner_requires_leading_delimiter() {
        let mut buf = b"op: compact\n---\n".to_vec();
        buf.extend(encode_payload(&Event::Compact).unwrap());

        let mut scanner = RecordScanner::new(&buf, 11);
        match scanner.next().unwrap() {
            Err(StoreError::CorruptLog { offset, reason }) => {
                assert_eq!(offset, 11);
                assert!(reason.starts_with("expected delimiter"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_trailing_text_is_absorbed_then_rejected_by_checksum() {
        let mut buf = b"---\n".to_vec();
        buf.extend(encode_payload(&Event::Compact).unwrap());
        buf.extend_from_slice(b"--");

        let records: Vec<_> = RecordScanner::new(&buf, 0).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert!(decode_payload(records[0].payload).is_err());
    }
}
