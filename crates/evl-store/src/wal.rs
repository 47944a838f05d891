use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::StoredEvent;

/// WAL entry: one commit batch, framed with length and CRC.
///
/// On-disk format:
/// ```text
/// [4 bytes: entry length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-serialized WalEntry)]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Events of the batch, in id order.
    pub events: Vec<StoredEvent>,
}

/// Flush/sync strategy for the WAL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every write.
    EveryWrite,
    /// Flush to the OS and rely on page-cache writeback.
    #[default]
    OsDefault,
}

/// Configuration for the Write-Ahead Log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// What recovery found on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Intact entries recovered.
    pub entries: usize,
    /// Length of the intact prefix.
    pub valid_bytes: u64,
    /// Bytes after the intact prefix that were cut off.
    pub discarded_bytes: u64,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct WalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the segment file.
    offset: u64,
    /// Set when a failed append could not be rolled back.
    broken: Option<String>,
}

/// Crash-recoverable Write-Ahead Log.
///
/// Entries are serialized as JSON, framed with a length prefix and a CRC32
/// checksum, and written to a single segment file. On recovery the file is
/// read front-to-back up to the first frame that is short, fails its CRC, or
/// does not decode; that frame and everything after it is discarded.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    config: WalConfig,
}

impl WriteAheadLog {
    /// Open (or create) a WAL segment file at the given path.
    pub fn open(path: &Path, config: WalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                offset,
                broken: None,
            }),
            config,
        })
    }

    /// Append a single entry. Returns the byte offset of the entry.
    ///
    /// If the write fails, the segment is cut back to where the entry began
    /// and nothing of it stays buffered.
    pub fn append(&self, entry: &WalEntry) -> StoreResult<u64> {
        self.append_with(entry, |writer, payload| write_frame(writer, payload))
    }

    fn append_with<F>(&self, entry: &WalEntry, write: F) -> StoreResult<u64>
    where
        F: FnOnce(&mut BufWriter<File>, &[u8]) -> io::Result<()>,
    {
        let payload = encode(entry)?;
        let mut w = self.lock()?;
        if let Some(reason) = &w.broken {
            return Err(StoreError::Corrupt(format!(
                "WAL unusable after a failed rollback: {reason}"
            )));
        }
        let entry_offset = w.offset;

        let written = write(&mut w.writer, &payload).and_then(|()| self.finish_write(&mut w.writer));
        if let Err(e) = written {
            warn!(offset = entry_offset, error = %e, "WAL append failed; rolling back");
            if let Err(rollback) = self.discard_from(&mut w, entry_offset) {
                warn!(offset = entry_offset, error = %rollback, "WAL rollback failed");
                w.broken = Some(rollback.to_string());
            }
            return Err(e.into());
        }
        w.offset += (HEADER_SIZE + payload.len()) as u64;

        debug!(offset = entry_offset, len = payload.len(), "WAL append");
        Ok(entry_offset)
    }

    fn finish_write(&self, writer: &mut BufWriter<File>) -> io::Result<()> {
        writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Drop buffered bytes and cut the segment back to `offset`.
    fn discard_from(&self, w: &mut WalWriter, offset: u64) -> io::Result<()> {
        let fresh = BufWriter::new(open_append(&self.path)?);
        let (file, _unwritten) = std::mem::replace(&mut w.writer, fresh).into_parts();
        file.set_len(offset)?;
        file.sync_all()?;
        w.offset = offset;
        Ok(())
    }

    /// Recover every intact entry and cut off any torn or corrupt tail.
    pub fn recover(&self) -> StoreResult<(Vec<WalEntry>, RecoveryReport)> {
        let mut w = self.lock()?;
        w.writer.flush()?;

        let mut reader = BufReader::new(File::open(&self.path)?);
        let file_len = reader.get_ref().metadata()?.len();
        let scan = scan_frames(&mut reader, 0, file_len)?;
        if let Some(reason) = &scan.stopped {
            warn!(offset = scan.end, reason = %reason, "stopping WAL recovery");
        }
        let (entries, offset) = (scan.entries, scan.end);

        let report = RecoveryReport {
            entries: entries.len(),
            valid_bytes: offset,
            discarded_bytes: file_len - offset,
        };
        if report.discarded_bytes > 0 {
            warn!(
                valid_bytes = offset,
                discarded_bytes = report.discarded_bytes,
                "discarding WAL tail"
            );
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            w.writer = BufWriter::new(open_append(&self.path)?);
        }
        w.offset = offset;
        w.broken = None;

        debug!(recovered = report.entries, "WAL recovery complete");
        Ok((entries, report))
    }

    /// Atomically replace the whole log with `entries`.
    ///
    /// The new contents are written to a sibling file, synced, and renamed
    /// over the segment, so a crash leaves either the old or the new log.
    pub fn rewrite(&self, entries: &[WalEntry]) -> StoreResult<()> {
        let mut w = self.lock()?;
        let tmp_path = self.path.with_extension("wal.tmp");

        let mut tmp = BufWriter::new(File::create(&tmp_path)?);
        let mut offset = 0u64;
        for entry in entries {
            let payload = encode(entry)?;
            write_frame(&mut tmp, &payload)?;
            offset += (HEADER_SIZE + payload.len()) as u64;
        }
        tmp.flush()?;
        tmp.get_ref().sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        w.writer = BufWriter::new(open_append(&self.path)?);
        w.offset = offset;
        w.broken = None;

        debug!(entries = entries.len(), bytes = offset, "WAL rewritten");
        Ok(())
    }

    /// Remove all data.
    pub fn truncate(&self) -> StoreResult<()> {
        self.rewrite(&[])
    }

    /// Current write offset.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.lock()?.offset)
    }

    /// Path to the WAL segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, WalWriter>> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// What changed in a followed log since the previous poll.
#[derive(Debug, PartialEq)]
pub enum TailUpdate {
    /// Entries appended after the previous poll.
    Appended(Vec<WalEntry>),
    /// The log was rewritten; these are its full contents.
    Reloaded(Vec<WalEntry>),
}

/// Read-only follower of a log that another handle writes.
///
/// Each poll reads the intact frames appended since the last one. A frame
/// still being written is left for the next poll and never cut off. A
/// rewrite (the segment renamed over, or shrunk) is detected and the log is
/// read again from the start.
pub struct WalTail {
    path: PathBuf,
    file: Option<File>,
    offset: u64,
}

impl WalTail {
    /// Follow the log at `path` and return its current contents. The file
    /// need not exist yet.
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<WalEntry>)> {
        let mut tail = Self {
            path: path.to_path_buf(),
            file: None,
            offset: 0,
        };
        let entries = match tail.poll()? {
            TailUpdate::Appended(entries) | TailUpdate::Reloaded(entries) => entries,
        };
        Ok((tail, entries))
    }

    pub fn poll(&mut self) -> StoreResult<TailUpdate> {
        let current = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let had_data = self.file.take().is_some() && self.offset > 0;
                self.offset = 0;
                return Ok(if had_data {
                    TailUpdate::Reloaded(Vec::new())
                } else {
                    TailUpdate::Appended(Vec::new())
                });
            }
            Err(e) => return Err(e.into()),
        };

        let replaced = match &self.file {
            Some(file) => !same_file(&file.metadata()?, &current) || current.len() < self.offset,
            None => true,
        };
        if replaced {
            self.file = Some(File::open(&self.path)?);
            self.offset = 0;
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(TailUpdate::Appended(Vec::new()));
        };

        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(self.offset))?;
        let scan = scan_frames(&mut BufReader::new(&mut *file), self.offset, file_len)?;
        if scan.end > self.offset {
            debug!(from = self.offset, to = scan.end, entries = scan.entries.len(), "WAL tail advanced");
        }
        self.offset = scan.end;

        Ok(if replaced {
            TailUpdate::Reloaded(scan.entries)
        } else {
            TailUpdate::Appended(scan.entries)
        })
    }

    /// Forget the position; the next poll reads the whole log again.
    pub fn reset(&mut self) {
        self.file = None;
        self.offset = 0;
    }

    /// End of the last intact frame read.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(unix)]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    a.created().ok() == b.created().ok()
}

struct Scan {
    entries: Vec<WalEntry>,
    /// End of the last intact frame.
    end: u64,
    /// Why scanning stopped before `file_len`, if it did.
    stopped: Option<String>,
}

/// Read intact frames from `reader`, positioned at `start`, up to `file_len`.
fn scan_frames<R: Read>(reader: &mut R, start: u64, file_len: u64) -> StoreResult<Scan> {
    let mut entries = Vec::new();
    let mut offset = start;
    let mut stopped = None;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let end = offset + HEADER_SIZE as u64 + length as u64;
        if length == 0 || end > file_len {
            stopped = Some(format!("entry length {length} runs past end of file ({file_len})"));
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                stopped = Some("truncated entry".into());
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            stopped = Some(format!("CRC mismatch: expected {expected_crc:#010x}, found {actual_crc:#010x}"));
            break;
        }

        match serde_json::from_slice::<WalEntry>(&payload) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                stopped = Some(format!("undecodable entry: {e}"));
                break;
            }
        }
        offset = end;
    }
    if stopped.is_none() && offset < file_len {
        stopped = Some("partial header".into());
    }

    Ok(Scan {
        entries,
        end: offset,
        stopped,
    })
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

fn encode(entry: &WalEntry) -> StoreResult<Vec<u8>> {
    let payload = serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if payload.len() > u32::MAX as usize {
        return Err(StoreError::Serialization(format!(
            "WAL entry of {} bytes exceeds frame limit",
            payload.len()
        )));
    }
    Ok(payload)
}

fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    writer.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::chained;
    use std::io::{Seek, SeekFrom};

    fn entries(count: u64, per_batch: usize) -> Vec<WalEntry> {
        chained(count)
            .chunks(per_batch)
            .map(|chunk| WalEntry {
                events: chunk.to_vec(),
            })
            .collect()
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("test.wal"), WalConfig::default()).unwrap();

        let written = entries(5, 2);
        for entry in &written {
            wal.append(entry).unwrap();
        }

        let (recovered, report) = wal.recover().unwrap();
        assert_eq!(recovered, written);
        assert_eq!(report.entries, 3);
        assert_eq!(report.discarded_bytes, 0);
    }

    #[test]
    fn recover_empty_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("empty.wal"), WalConfig::default()).unwrap();
        let (recovered, report) = wal.recover().unwrap();
        assert!(recovered.is_empty());
        assert_eq!(report, RecoveryReport::default());
    }

    #[test]
    fn corruption_stops_recovery_and_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let written = entries(3, 1);
        wal.append(&written[0]).unwrap();
        let second = wal.append(&written[1]).unwrap();
        wal.append(&written[2]).unwrap();
        drop(wal);

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            let at = second + HEADER_SIZE as u64 + 3;
            file.seek(SeekFrom::Start(at)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(at)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let (recovered, report) = wal.recover().unwrap();
        assert_eq!(recovered, vec![written[0].clone()]);
        assert_eq!(report.valid_bytes, second);
        assert!(report.discarded_bytes > 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), second);
        assert_eq!(wal.offset().unwrap(), second);
    }

    #[test]
    fn recovery_survives_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let written = entries(2, 1);
        wal.append(&written[0]).unwrap();
        wal.append(&written[1]).unwrap();
        let total_len = wal.offset().unwrap();
        drop(wal);

        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 4).unwrap();
        }

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let (recovered, _) = wal.recover().unwrap();
        assert_eq!(recovered, vec![written[0].clone()]);

        wal.append(&written[1]).unwrap();
        let (recovered, report) = wal.recover().unwrap();
        assert_eq!(recovered, written);
        assert_eq!(report.discarded_bytes, 0);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewrite.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        for entry in entries(4, 1) {
            wal.append(&entry).unwrap();
        }

        let replacement = entries(2, 2);
        wal.rewrite(&replacement).unwrap();
        assert!(!path.with_extension("wal.tmp").exists());

        let (recovered, _) = wal.recover().unwrap();
        assert_eq!(recovered, replacement);
        assert_eq!(wal.offset().unwrap(), fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn truncate_clears_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("trunc.wal"), WalConfig::default()).unwrap();
        wal.append(&entries(1, 1)[0]).unwrap();
        assert!(wal.offset().unwrap() > 0);

        wal.truncate().unwrap();
        assert_eq!(wal.offset().unwrap(), 0);
        assert!(wal.recover().unwrap().0.is_empty());
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("offsets.wal"), WalConfig::default()).unwrap();
        let written = entries(3, 1);
        let off1 = wal.append(&written[0]).unwrap();
        let off2 = wal.append(&written[1]).unwrap();
        let off3 = wal.append(&written[2]).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);
        assert!(off3 > off2);
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let wal = WriteAheadLog::open(&dir.path().join("sync.wal"), config).unwrap();
        wal.append(&entries(1, 1)[0]).unwrap();
        assert_eq!(wal.recover().unwrap().0.len(), 1);
    }

    #[test]
    fn sync_mode_config_names() {
        let config: WalConfig = serde_json::from_str(r#"{"sync_mode":"every_write"}"#).unwrap();
        assert_eq!(config.sync_mode, SyncMode::EveryWrite);
        let config: WalConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sync_mode, SyncMode::OsDefault);
    }

    fn disk_full() -> io::Error {
        io::Error::other("no space left on device")
    }

    #[test]
    fn failed_append_cuts_partial_frame_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let written = entries(3, 1);
        wal.append(&written[0]).unwrap();
        let good_end = wal.offset().unwrap();

        let err = wal
            .append_with(&written[1], |writer, payload| {
                let mut frame = Vec::new();
                write_frame(&mut frame, payload)?;
                writer.get_mut().write_all(&frame[..frame.len() / 2])?;
                Err(disk_full())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(wal.offset().unwrap(), good_end);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_end);

        wal.append(&written[2]).unwrap();
        let (recovered, report) = wal.recover().unwrap();
        assert_eq!(recovered, vec![written[0].clone(), written[2].clone()]);
        assert_eq!(report.discarded_bytes, 0);
    }

    #[test]
    fn failed_append_drops_buffered_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffered.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let written = entries(2, 1);

        wal.append_with(&written[0], |writer, payload| {
            writer.write_all(&payload[..payload.len() / 2])?;
            Err(disk_full())
        })
        .unwrap_err();
        wal.append(&written[1]).unwrap();
        drop(wal);

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let (recovered, report) = wal.recover().unwrap();
        assert_eq!(recovered, vec![written[1].clone()]);
        assert_eq!(report.discarded_bytes, 0);
    }

    #[test]
    fn tail_follows_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("follow.wal");
        let (mut tail, initial) = WalTail::open(&path).unwrap();
        assert!(initial.is_empty());

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let written = entries(3, 1);
        wal.append(&written[0]).unwrap();
        wal.append(&written[1]).unwrap();
        assert_eq!(tail.poll().unwrap(), TailUpdate::Reloaded(written[..2].to_vec()));

        wal.append(&written[2]).unwrap();
        assert_eq!(tail.poll().unwrap(), TailUpdate::Appended(written[2..].to_vec()));
        assert_eq!(tail.poll().unwrap(), TailUpdate::Appended(Vec::new()));
        assert_eq!(tail.offset(), wal.offset().unwrap());
    }

    #[test]
    fn tail_waits_for_incomplete_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incomplete.wal");
        let written = entries(2, 1);
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        wal.append(&written[0]).unwrap();
        let (mut tail, initial) = WalTail::open(&path).unwrap();
        assert_eq!(initial, written[..1].to_vec());

        let mut frame = Vec::new();
        write_frame(&mut frame, &encode(&written[1]).unwrap()).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&frame[..10]).unwrap();
        assert_eq!(tail.poll().unwrap(), TailUpdate::Appended(Vec::new()));
        assert!(fs::metadata(&path).unwrap().len() > tail.offset());

        file.write_all(&frame[10..]).unwrap();
        assert_eq!(tail.poll().unwrap(), TailUpdate::Appended(written[1..].to_vec()));
    }

    #[test]
    fn tail_reloads_after_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewritten.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        for entry in entries(3, 1) {
            wal.append(&entry).unwrap();
        }
        let (mut tail, _) = WalTail::open(&path).unwrap();

        let replacement = entries(4, 4);
        wal.rewrite(&replacement).unwrap();
        assert_eq!(tail.poll().unwrap(), TailUpdate::Reloaded(replacement));
    }
}
