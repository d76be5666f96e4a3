//! The KV key layout.
//!
//! All keys share a one-byte type prefix. The layout is chosen so that
//! plain lexicographic ordering supports every iteration the engine
//! needs: a device's have set and the folder's global set both come out
//! in path order from a single forward range scan.
//!
//! ```text
//! DEVICE     0x00 | folder_id u32 BE | device_id [32] | name...
//! GLOBAL     0x01 | folder_id u32 BE | name...
//! FOLDER_IDX 0x02 | folder_id u32 BE
//! DEVICE_IDX 0x03 | device_id [32]
//! ```

use std::fmt;
use syncidx_codec::DeviceId;

/// Type byte of the DEVICE (have entry) key family.
pub const KEY_TYPE_DEVICE: u8 = 0x00;
/// Type byte of the GLOBAL key family.
pub const KEY_TYPE_GLOBAL: u8 = 0x01;
/// Type byte of the FOLDER_IDX key family.
pub const KEY_TYPE_FOLDER_IDX: u8 = 0x02;
/// Type byte of the DEVICE_IDX key family.
pub const KEY_TYPE_DEVICE_IDX: u8 = 0x03;

const FOLDER_ID_LEN: usize = 4;
const DEVICE_KEY_NAME_OFFSET: usize = 1 + FOLDER_ID_LEN + DeviceId::LEN;
const GLOBAL_KEY_NAME_OFFSET: usize = 1 + FOLDER_ID_LEN;

/// Identifier a folder is interned to the first time it is seen.
///
/// Ids are allocated monotonically, so FOLDER_IDX key order is folder
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(u32);

impl FolderId {
    /// Creates a folder id from its raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "folder:{}", self.0)
    }
}

/// Builds the DEVICE key for one have entry.
#[must_use]
pub fn device_key(folder: FolderId, device: DeviceId, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(DEVICE_KEY_NAME_OFFSET + name.len());
    key.push(KEY_TYPE_DEVICE);
    key.extend_from_slice(&folder.as_u32().to_be_bytes());
    key.extend_from_slice(device.as_bytes());
    key.extend_from_slice(name);
    key
}

/// Prefix of all DEVICE keys for one `(folder, device)`.
#[must_use]
pub fn device_prefix(folder: FolderId, device: DeviceId) -> Vec<u8> {
    device_key(folder, device, &[])
}

/// Prefix of all DEVICE keys for one folder, any device.
#[must_use]
pub fn device_folder_prefix(folder: FolderId) -> Vec<u8> {
    let mut key = Vec::with_capacity(GLOBAL_KEY_NAME_OFFSET);
    key.push(KEY_TYPE_DEVICE);
    key.extend_from_slice(&folder.as_u32().to_be_bytes());
    key
}

/// Builds the GLOBAL key for one path.
#[must_use]
pub fn global_key(folder: FolderId, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(GLOBAL_KEY_NAME_OFFSET + name.len());
    key.push(KEY_TYPE_GLOBAL);
    key.extend_from_slice(&folder.as_u32().to_be_bytes());
    key.extend_from_slice(name);
    key
}

/// Prefix of all GLOBAL keys for one folder.
#[must_use]
pub fn global_prefix(folder: FolderId) -> Vec<u8> {
    global_key(folder, &[])
}

/// Builds the FOLDER_IDX key for a folder id.
#[must_use]
pub fn folder_idx_key(folder: FolderId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + FOLDER_ID_LEN);
    key.push(KEY_TYPE_FOLDER_IDX);
    key.extend_from_slice(&folder.as_u32().to_be_bytes());
    key
}

/// Prefix of the whole FOLDER_IDX family.
#[must_use]
pub fn folder_idx_prefix() -> Vec<u8> {
    vec![KEY_TYPE_FOLDER_IDX]
}

/// Builds the DEVICE_IDX key for a device id.
#[must_use]
pub fn device_idx_key(device: DeviceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + DeviceId::LEN);
    key.push(KEY_TYPE_DEVICE_IDX);
    key.extend_from_slice(device.as_bytes());
    key
}

/// Prefix of the whole DEVICE_IDX family.
#[must_use]
pub fn device_idx_prefix() -> Vec<u8> {
    vec![KEY_TYPE_DEVICE_IDX]
}

/// Extracts the name from a DEVICE key, or `None` for a key too short to
/// be one.
#[must_use]
pub fn device_key_name(key: &[u8]) -> Option<&[u8]> {
    key.get(DEVICE_KEY_NAME_OFFSET..)
}

/// Extracts the device id from a DEVICE key.
#[must_use]
pub fn device_key_device(key: &[u8]) -> Option<DeviceId> {
    DeviceId::from_slice(key.get(1 + FOLDER_ID_LEN..DEVICE_KEY_NAME_OFFSET)?)
}

/// Extracts the name from a GLOBAL key, or `None` for a key too short to
/// be one.
#[must_use]
pub fn global_key_name(key: &[u8]) -> Option<&[u8]> {
    key.get(GLOBAL_KEY_NAME_OFFSET..)
}

/// Extracts the folder id from a FOLDER_IDX key.
#[must_use]
pub fn folder_idx_key_id(key: &[u8]) -> Option<FolderId> {
    let bytes: [u8; FOLDER_ID_LEN] = key.get(1..1 + FOLDER_ID_LEN)?.try_into().ok()?;
    if key.len() != 1 + FOLDER_ID_LEN {
        return None;
    }
    Some(FolderId::new(u32::from_be_bytes(bytes)))
}

/// Returns the smallest key strictly greater than every key starting
/// with `prefix`, for use as an exclusive range end.
///
/// All engine prefixes start with a type byte below `0xFF`, so a
/// successor always exists.
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return end;
        }
        end.pop();
    }
    end
}
