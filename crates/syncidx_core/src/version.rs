//! The version-comparison rule.
//!
//! Tombstones participate like live records: a deletion at a higher
//! version beats an older live copy. `Invalid` records can only win a
//! path when every copy of it is invalid; with any valid copy present
//! they are ignored for winner selection.

use syncidx_codec::{DeviceId, FileRecord};

/// Returns true when `a` is strictly newer than `b`.
///
/// Higher version wins. At equal versions a valid record beats an
/// invalid one; otherwise the two are equivalent and neither is newer.
#[must_use]
pub fn strictly_newer(a: &FileRecord, b: &FileRecord) -> bool {
    if a.version != b.version {
        return a.version > b.version;
    }
    b.is_invalid() && !a.is_invalid()
}

/// Selects the winning record among all candidates for one path.
///
/// Candidates are `(device, record)` pairs; the returned reference
/// points into `candidates`. Returns `None` when there are no
/// candidates.
///
/// Invalid records are eligible only when every candidate is invalid.
/// Within the eligible pool the highest version wins and ties break
/// toward the smallest device id, so the choice is deterministic.
#[must_use]
pub fn select_winner(candidates: &[(DeviceId, FileRecord)]) -> Option<&(DeviceId, FileRecord)> {
    let any_valid = candidates.iter().any(|(_, r)| !r.is_invalid());

    candidates
        .iter()
        .filter(|(_, r)| !any_valid || !r.is_invalid())
        .min_by(|(da, ra), (db, rb)| {
            // Highest version first, then smallest device id.
            rb.version.cmp(&ra.version).then(da.cmp(db))
        })
}

/// Returns true when a device whose have entry is `have` needs the
/// global winner `global`.
///
/// A device does not need a winner it cannot fetch (all copies invalid),
/// and does not need a tombstone for a path it never had. Otherwise it
/// needs the winner when its own copy is missing or strictly older.
#[must_use]
pub fn needs(global: &FileRecord, have: Option<&FileRecord>) -> bool {
    if global.is_invalid() {
        return false;
    }
    match have {
        None => !global.is_deleted(),
        Some(have) => strictly_newer(global, have),
    }
}
