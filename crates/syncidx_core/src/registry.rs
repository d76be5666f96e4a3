//! Folder registry: interning, listing, dropping, and the process-wide
//! shared per-folder state.

use crate::error::{IndexError, IndexResult};
use crate::keys::{self, FolderId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use syncidx_codec::DeviceId;
use syncidx_storage::{Batch, KvSnapshot, KvStore};
use tracing::info;

/// State shared by every FileSet bound to the same `(store, folder)`.
///
/// Mutators for a folder serialize on `write_lock`; the local-version
/// counters and the folder's known-device set live here so that all
/// FileSet instances observe the same values.
#[derive(Debug, Default)]
pub(crate) struct FolderState {
    pub(crate) write_lock: Mutex<()>,
    pub(crate) counters: RwLock<HashMap<DeviceId, u64>>,
    pub(crate) devices: RwLock<BTreeSet<DeviceId>>,
    pub(crate) loaded: AtomicBool,
}

type RegistryKey = (usize, String);

static REGISTRY: Mutex<BTreeMap<RegistryKey, Weak<FolderState>>> = Mutex::new(BTreeMap::new());

static INTERN_LOCK: Mutex<()> = Mutex::new(());

fn store_token(store: &Arc<dyn KvStore>) -> usize {
    Arc::as_ptr(store).cast::<()>() as usize
}

/// Returns the shared state for `(store, folder)`, creating it on first
/// use. Identity is the store allocation, so distinct stores that happen
/// to use the same folder name do not share locks or counters.
pub(crate) fn folder_state(store: &Arc<dyn KvStore>, folder: &str) -> Arc<FolderState> {
    let key = (store_token(store), folder.to_owned());
    let mut registry = REGISTRY.lock();
    registry.retain(|_, state| state.strong_count() > 0);
    if let Some(state) = registry.get(&key).and_then(Weak::upgrade) {
        return state;
    }
    let state = Arc::new(FolderState::default());
    registry.insert(key, Arc::downgrade(&state));
    state
}

/// Finds the interned id of `folder`, if any.
pub(crate) fn lookup_folder(
    snapshot: &dyn KvSnapshot,
    folder: &str,
) -> IndexResult<Option<FolderId>> {
    let prefix = keys::folder_idx_prefix();
    let end = keys::prefix_end(&prefix);
    for (key, value) in snapshot.range(&prefix, &end)? {
        if value == folder.as_bytes() {
            return Ok(keys::folder_idx_key_id(&key));
        }
    }
    Ok(None)
}

/// Returns the id of `folder`, interning it on first sight.
///
/// Ids are allocated as max-existing + 1 under a process-wide lock, so
/// FOLDER_IDX key order is folder insertion order.
pub(crate) fn intern_folder(store: &dyn KvStore, folder: &str) -> IndexResult<FolderId> {
    let _guard = INTERN_LOCK.lock();

    let snapshot = store.snapshot()?;
    let prefix = keys::folder_idx_prefix();
    let end = keys::prefix_end(&prefix);
    let mut max_id = None;
    for (key, value) in snapshot.range(&prefix, &end)? {
        if value == folder.as_bytes() {
            return keys::folder_idx_key_id(&key)
                .ok_or_else(|| IndexError::folder_not_found(folder));
        }
        max_id = keys::folder_idx_key_id(&key).or(max_id);
    }

    let id = max_id.map_or(FolderId::new(0), FolderId::next);
    store.put(&keys::folder_idx_key(id), folder.as_bytes())?;
    Ok(id)
}

/// Returns the names of all folders present in `store`, in insertion
/// order.
///
/// # Errors
///
/// Returns an error if the store fails or a stored name is not UTF-8.
pub fn list_folders(store: &dyn KvStore) -> IndexResult<Vec<String>> {
    let snapshot = store.snapshot()?;
    let prefix = keys::folder_idx_prefix();
    let end = keys::prefix_end(&prefix);

    let mut folders = Vec::new();
    for (_, value) in snapshot.range(&prefix, &end)? {
        folders.push(String::from_utf8(value).map_err(|_| IndexError::FolderNameNotUtf8)?);
    }
    Ok(folders)
}

/// Atomically removes every key belonging to `folder`: its have entries,
/// its global entries, and its FOLDER_IDX registration.
///
/// Live FileSets bound to the folder see an empty index afterwards;
/// their in-memory local-version counters are intentionally left alone.
///
/// # Errors
///
/// Returns [`IndexError::FolderNotFound`] for a folder the store does
/// not know, or a storage error if the scan or commit fails.
pub fn drop_folder(store: &Arc<dyn KvStore>, folder: &str) -> IndexResult<()> {
    let state = folder_state(store, folder);
    let _guard = state.write_lock.lock();

    let snapshot = store.snapshot()?;
    let id = lookup_folder(snapshot.as_ref(), folder)?
        .ok_or_else(|| IndexError::folder_not_found(folder))?;

    let mut batch = Batch::new();
    for prefix in [keys::device_folder_prefix(id), keys::global_prefix(id)] {
        let end = keys::prefix_end(&prefix);
        for (key, _) in snapshot.range(&prefix, &end)? {
            batch.delete(key);
        }
    }
    batch.delete(keys::folder_idx_key(id));

    let removed = batch.len();
    store.write(batch)?;
    info!(folder, keys = removed, "dropped folder");
    Ok(())
}
