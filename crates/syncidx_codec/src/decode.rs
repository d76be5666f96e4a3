//! Decoding of stored record bytes.

use crate::error::{CodecError, CodecResult};
use crate::model::{BlockInfo, DeviceId, FileRecord, Flags};

/// Maximum accepted name length.
///
/// Paths of at least 8 KiB must round-trip; this cap only guards against
/// allocating for garbage length fields read from a damaged store.
const MAX_NAME_LEN: u64 = 16 * 1024 * 1024;

/// Maximum accepted block count per record.
const MAX_BLOCK_COUNT: u64 = 16 * 1024 * 1024;

/// Maximum accepted hash length per block.
const MAX_HASH_LEN: u64 = 1024 * 1024;

/// Maximum accepted device count in a global entry.
const MAX_DEVICE_COUNT: u64 = 1024 * 1024;

/// Decodes a file record, rejecting trailing bytes.
///
/// # Errors
///
/// Returns an error if the bytes are truncated, carry oversized length
/// fields, hold non-UTF-8 names, or extend past one record.
pub fn decode_record(bytes: &[u8]) -> CodecResult<FileRecord> {
    let mut cursor = Cursor::new(bytes);
    let record = read_record(&mut cursor)?;
    cursor.finish()?;
    Ok(record)
}

/// Decodes a global entry into the winning record and the availability
/// device list.
///
/// # Errors
///
/// Returns an error under the same conditions as [`decode_record`].
pub fn decode_global(bytes: &[u8]) -> CodecResult<(FileRecord, Vec<DeviceId>)> {
    let mut cursor = Cursor::new(bytes);
    let record = read_record(&mut cursor)?;

    let count = u64::from(cursor.read_u32()?);
    if count > MAX_DEVICE_COUNT {
        return Err(CodecError::oversized("device list", count, MAX_DEVICE_COUNT));
    }
    let mut devices = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bytes = cursor.read_bytes(DeviceId::LEN)?;
        // from_slice cannot fail here: read_bytes returned exactly LEN bytes.
        devices.extend(DeviceId::from_slice(bytes));
    }
    cursor.finish()?;
    Ok((record, devices))
}

fn read_record(cursor: &mut Cursor<'_>) -> CodecResult<FileRecord> {
    let version = cursor.read_u64()?;
    let local_version = cursor.read_u64()?;
    let flags = Flags::new(cursor.read_u32()?);
    let size = cursor.read_u64()?;

    let name_len = u64::from(cursor.read_u32()?);
    if name_len > MAX_NAME_LEN {
        return Err(CodecError::oversized("name", name_len, MAX_NAME_LEN));
    }
    let name = std::str::from_utf8(cursor.read_bytes(name_len as usize)?)
        .map_err(|_| CodecError::InvalidUtf8)?
        .to_string();

    let block_count = u64::from(cursor.read_u32()?);
    if block_count > MAX_BLOCK_COUNT {
        return Err(CodecError::oversized(
            "block list",
            block_count,
            MAX_BLOCK_COUNT,
        ));
    }
    let mut blocks = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        let size = cursor.read_u32()?;
        let hash_len = u64::from(cursor.read_u32()?);
        if hash_len > MAX_HASH_LEN {
            return Err(CodecError::oversized("block hash", hash_len, MAX_HASH_LEN));
        }
        let hash = cursor.read_bytes(hash_len as usize)?.to_vec();
        blocks.push(BlockInfo { size, hash });
    }

    Ok(FileRecord {
        name,
        version,
        local_version,
        flags,
        size,
        blocks,
    })
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| CodecError::eof(self.pos))?;
        if end > self.data.len() {
            return Err(CodecError::eof(self.pos));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> CodecResult<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    fn finish(&self) -> CodecResult<()> {
        let left = self.data.len() - self.pos;
        if left != 0 {
            return Err(CodecError::TrailingBytes { count: left });
        }
        Ok(())
    }
}
