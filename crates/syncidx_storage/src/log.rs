//! Persistent ordered key-value store backed by a redo log.

use crate::batch::{Batch, BatchOp};
use crate::error::{StorageError, StorageResult};
use crate::memory::MemorySnapshot;
use crate::store::{KvIter, KvSnapshot, KvStore};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a SyncIdx log file.
pub const LOG_MAGIC: [u8; 4] = *b"SXKV";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_LEN: u64 = 6;

/// Frames larger than this are rejected as corrupt rather than allocated.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// A persistent [`KvStore`].
///
/// The full keyspace is held in memory; every committed batch is appended
/// to a redo log as one length-and-checksum framed record and replayed on
/// open. A torn trailing write is detected and truncated at recovery; a
/// checksum mismatch before the tail is reported as corruption.
///
/// Batch commits are durable: the frame is synced to disk before the
/// operations become visible to readers.
///
/// # Example
///
/// ```no_run
/// use syncidx_storage::{KvStore, LogKv};
/// use std::path::Path;
///
/// let store = LogKv::open(Path::new("index.sxkv")).unwrap();
/// store.put(b"key", b"value").unwrap();
/// ```
#[derive(Debug)]
pub struct LogKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    log: Mutex<LogFile>,
}

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl LogKv {
    /// Opens or creates a log-backed store at `path`, replaying any
    /// existing log into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, carries a foreign
    /// header, or contains a corrupt frame before the tail.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut map = BTreeMap::new();
        let valid_len = if data.is_empty() {
            file.write_all(&LOG_MAGIC)?;
            file.write_all(&LOG_VERSION.to_le_bytes())?;
            file.sync_all()?;
            HEADER_LEN
        } else {
            let valid_len = replay(&data, &mut map)?;
            if valid_len < data.len() as u64 {
                // Torn tail from an interrupted append; cut it off.
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            valid_len
        };

        Ok(Self {
            map: RwLock::new(map),
            log: Mutex::new(LogFile {
                path: path.to_path_buf(),
                file,
                len: valid_len,
            }),
        })
    }

    /// Returns the path of the backing log file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.log.lock().path.clone()
    }

    /// Rewrites the log so it contains only the live keyspace.
    ///
    /// The new log is written to a sibling temp file and atomically
    /// renamed over the old one.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite or rename fails; the old log is
    /// left in place in that case.
    pub fn compact(&self) -> StorageResult<()> {
        let mut log = self.log.lock();
        let map = self.map.read();

        let mut batch = Batch::with_capacity(map.len());
        for (key, value) in map.iter() {
            batch.put(key.clone(), value.clone());
        }
        let frame = encode_frame(&batch);

        let tmp_path = log.path.with_extension("compact");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&LOG_MAGIC)?;
        tmp.write_all(&LOG_VERSION.to_le_bytes())?;
        if !batch.is_empty() {
            tmp.write_all(&frame)?;
        }
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &log.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&log.path)?;
        log.len = file.metadata()?.len();
        log.file = file;
        Ok(())
    }

    fn append(&self, batch: &Batch) -> StorageResult<()> {
        let mut log = self.log.lock();
        let frame = encode_frame(batch);
        let offset = log.len;

        let written = log
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| log.file.write_all(&frame))
            .and_then(|()| log.file.sync_data());
        if let Err(err) = written {
            // Drop whatever partial frame made it out so the next append
            // starts at a clean offset.
            let _ = log.file.set_len(offset);
            return Err(err.into());
        }
        log.len = offset + frame.len() as u64;
        Ok(())
    }
}

impl KvStore for LogKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = Batch::with_capacity(1);
        batch.put(key.to_vec(), value.to_vec());
        self.write(batch)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut batch = Batch::with_capacity(1);
        batch.delete(key.to_vec());
        self.write(batch)
    }

    fn write(&self, batch: Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.append(&batch)?;

        let mut map = self.map.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> StorageResult<KvIter<'static>> {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .map
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(pairs.into_iter()))
    }

    fn snapshot(&self) -> StorageResult<Box<dyn KvSnapshot>> {
        Ok(Box::new(MemorySnapshot::from_map(self.map.read().clone())))
    }
}

fn encode_frame(batch: &Batch) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(batch.len() as u32).to_le_bytes());
    for op in batch.ops() {
        match op {
            BatchOp::Put { key, value } => {
                payload.push(1);
                payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                payload.extend_from_slice(key);
                payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
                payload.extend_from_slice(value);
            }
            BatchOp::Delete { key } => {
                payload.push(2);
                payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                payload.extend_from_slice(key);
            }
        }
    }

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Replays log `data` into `map`, returning the offset up to which the
/// log is valid. Data past the returned offset is an incomplete frame.
fn replay(data: &[u8], map: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> StorageResult<u64> {
    if data.len() < HEADER_LEN as usize || data[..4] != LOG_MAGIC {
        return Err(StorageError::invalid_format("missing log header"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != LOG_VERSION {
        return Err(StorageError::invalid_format(format!(
            "unsupported log version {version}"
        )));
    }

    let mut pos = HEADER_LEN as usize;
    loop {
        if pos + 8 > data.len() {
            return Ok(pos as u64);
        }
        let len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        if len > MAX_FRAME_LEN {
            return Err(StorageError::corrupted(pos as u64, "oversized frame"));
        }
        let expected =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);
        let body_start = pos + 8;
        let body_end = body_start + len as usize;
        if body_end > data.len() {
            // Incomplete trailing frame.
            return Ok(pos as u64);
        }
        let payload = &data[body_start..body_end];
        let actual = crc32(payload);
        if actual != expected {
            if body_end == data.len() {
                // Torn final frame; recoverable by truncation.
                return Ok(pos as u64);
            }
            return Err(StorageError::ChecksumMismatch {
                offset: pos as u64,
                expected,
                actual,
            });
        }
        apply_payload(payload, map, pos as u64)?;
        pos = body_end;
    }
}

fn apply_payload(
    payload: &[u8],
    map: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    offset: u64,
) -> StorageResult<()> {
    let corrupt = || StorageError::corrupted(offset, "truncated frame payload");

    let mut pos = 0usize;
    let read_u32 = |pos: &mut usize| -> StorageResult<u32> {
        let end = *pos + 4;
        if end > payload.len() {
            return Err(corrupt());
        }
        let value = u32::from_le_bytes([
            payload[*pos],
            payload[*pos + 1],
            payload[*pos + 2],
            payload[*pos + 3],
        ]);
        *pos = end;
        Ok(value)
    };
    let read_bytes = |pos: &mut usize, len: usize| -> StorageResult<Vec<u8>> {
        let end = *pos + len;
        if end > payload.len() {
            return Err(corrupt());
        }
        let bytes = payload[*pos..end].to_vec();
        *pos = end;
        Ok(bytes)
    };

    let count = read_u32(&mut pos)?;
    for _ in 0..count {
        if pos >= payload.len() {
            return Err(corrupt());
        }
        let tag = payload[pos];
        pos += 1;
        match tag {
            1 => {
                let klen = read_u32(&mut pos)? as usize;
                let key = read_bytes(&mut pos, klen)?;
                let vlen = read_u32(&mut pos)? as usize;
                let value = read_bytes(&mut pos, vlen)?;
                map.insert(key, value);
            }
            2 => {
                let klen = read_u32(&mut pos)? as usize;
                let key = read_bytes(&mut pos, klen)?;
                map.remove(&key);
            }
            other => {
                return Err(StorageError::corrupted(
                    offset,
                    format!("unknown op tag {other}"),
                ));
            }
        }
    }
    if pos != payload.len() {
        return Err(StorageError::corrupted(offset, "trailing bytes in frame"));
    }
    Ok(())
}

/// CRC32 (IEEE polynomial) over `data`.
fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = u32::MAX;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
