//! The per-folder file index.

use crate::clock::LogicalClock;
use crate::config::{CorruptionPolicy, IndexConfig};
use crate::error::IndexResult;
use crate::keys::{self, FolderId};
use crate::registry::{self, FolderState};
use crate::version;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use syncidx_codec::{
    decode_global, decode_record, encode_global, encode_record, CodecError, CodecResult, DeviceId,
    FileRecord, Flags,
};
use syncidx_storage::{Batch, KvSnapshot, KvStore};
use tracing::{debug, warn};

/// The index of one folder across all known devices.
///
/// A FileSet stores the **have** set each device advertises for the
/// folder and maintains the derived **global** entry per path: the
/// winning record under the version rule plus the list of devices
/// holding a usable copy of it. The **need** view for any device is
/// computed on the fly from the two.
///
/// Multiple FileSet values may be open for the same `(store, folder)`;
/// they share one write lock and one set of local-version counters, so
/// mutators serialize while readers run concurrently against snapshots.
///
/// Visitors passed to the iteration methods must not call mutators of
/// the same folder.
pub struct FileSet {
    folder: String,
    folder_id: FolderId,
    store: Arc<dyn KvStore>,
    clock: Arc<LogicalClock>,
    config: IndexConfig,
    state: Arc<FolderState>,
}

impl FileSet {
    /// Opens the index of `folder` within `store`, using the
    /// process-global logical clock and the default configuration.
    ///
    /// The folder is interned on first sight. Opening loads the
    /// folder's device set and local-version high-water marks, so
    /// counters survive restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or existing entries cannot
    /// be decoded under the configured corruption policy.
    pub fn open(store: Arc<dyn KvStore>, folder: &str) -> IndexResult<Self> {
        Self::open_with(store, folder, LogicalClock::global(), IndexConfig::default())
    }

    /// Opens the index with an explicit clock and configuration.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with(
        store: Arc<dyn KvStore>,
        folder: &str,
        clock: Arc<LogicalClock>,
        config: IndexConfig,
    ) -> IndexResult<Self> {
        let state = registry::folder_state(&store, folder);
        let guard = state.write_lock.lock();
        let folder_id = registry::intern_folder(store.as_ref(), folder)?;

        let set = Self {
            folder: folder.to_owned(),
            folder_id,
            store,
            clock,
            config,
            state: Arc::clone(&state),
        };
        if !state.loaded.load(AtomicOrdering::Acquire) {
            set.load_state()?;
            state.loaded.store(true, AtomicOrdering::Release);
        }
        drop(guard);
        Ok(set)
    }

    /// Returns the folder this index is bound to.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Installs `records` as the complete have set of `device`.
    ///
    /// Paths absent from `records` lose their have entry without a
    /// tombstone; this is "the device just told us its whole set".
    /// Every added, changed, or removed path has its global entry
    /// recomputed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; the commit is atomic, so a
    /// failed call leaves the index in its pre-call state.
    pub fn replace(&self, device: DeviceId, records: &[FileRecord]) -> IndexResult<()> {
        self.replace_inner(device, records, false)
    }

    /// Installs `records` as the complete have set of `device`,
    /// synthesizing tombstones for paths that disappeared.
    ///
    /// For every path present before and absent now whose record is not
    /// already a tombstone, a record with `DELETED` set, the next
    /// logical-clock tick as version, empty blocks, and a preserved
    /// `DIRECTORY` flag is written in its place. Used when the caller
    /// has authoritative knowledge the path is gone, typically after
    /// scanning the local filesystem.
    ///
    /// Calling this twice with the same input is a no-op the second
    /// time: nothing is written and the local-version counter does not
    /// advance.
    ///
    /// # Errors
    ///
    /// See [`replace`](Self::replace).
    pub fn replace_with_delete(&self, device: DeviceId, records: &[FileRecord]) -> IndexResult<()> {
        self.replace_inner(device, records, true)
    }

    /// Merges `records` into the have set of `device`.
    ///
    /// Paths in `records` are upserted; paths absent from it are left
    /// untouched. A record whose contents equal the stored one is
    /// skipped entirely and keeps its stored local version.
    ///
    /// # Errors
    ///
    /// See [`replace`](Self::replace).
    pub fn update(&self, device: DeviceId, records: &[FileRecord]) -> IndexResult<()> {
        let _guard = self.state.write_lock.lock();
        let snapshot = self.store.snapshot()?;
        let incoming = self.normalize(records);

        let start = self.counter(device);
        let mut counter = start;
        let mut batch = Batch::new();

        for (name, mut record) in incoming {
            let key = keys::device_key(self.folder_id, device, name.as_bytes());
            let old = match snapshot.get(&key)? {
                Some(value) => self.decode_lenient(decode_record(&value), "have")?,
                None => None,
            };
            if old.as_ref().is_some_and(|o| o.same_contents(&record)) {
                continue;
            }
            counter += 1;
            record.local_version = counter;
            batch.put(key, encode_record(&record));
            self.refresh_global(snapshot.as_ref(), &mut batch, name.as_bytes(), device, Some(&record))?;
        }

        self.commit(snapshot.as_ref(), batch, device, start, counter, "update")
    }

    /// Returns the record `device` advertises for `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the entry is corrupt.
    pub fn get(&self, device: DeviceId, name: &str) -> IndexResult<Option<FileRecord>> {
        let key = keys::device_key(self.folder_id, device, name.as_bytes());
        match self.store.get(&key)? {
            Some(value) => Ok(Some(decode_record(&value)?)),
            None => Ok(None),
        }
    }

    /// Returns the winning record for `name` across all devices, if any
    /// device has it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the entry is corrupt.
    pub fn get_global(&self, name: &str) -> IndexResult<Option<FileRecord>> {
        match self.store.get(&keys::global_key(self.folder_id, name.as_bytes()))? {
            Some(value) => {
                let (winner, _) = decode_global(&value)?;
                Ok(Some(winner))
            }
            None => Ok(None),
        }
    }

    /// Returns the devices holding a usable copy of the winning record
    /// for `name`: those whose record equals the winner and is not
    /// flagged `INVALID`. Empty when no device has the path or every
    /// copy is invalid.
    ///
    /// The list is sorted by device id; treat it as a set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the entry is corrupt.
    pub fn availability(&self, name: &str) -> IndexResult<Vec<DeviceId>> {
        match self.store.get(&keys::global_key(self.folder_id, name.as_bytes()))? {
            Some(value) => Ok(decode_global(&value)?.1),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the current local-version counter of `device`: the value
    /// assigned to its most recent observable mutation, or zero if the
    /// device has never mutated this folder.
    #[must_use]
    pub fn local_version(&self, device: DeviceId) -> u64 {
        self.counter(device)
    }

    /// Invokes `visitor` for every have entry of `device` in path
    /// order. Iteration stops early when the visitor returns `false`.
    ///
    /// Each call reads from a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, or on the first corrupt
    /// entry under [`CorruptionPolicy::Abort`].
    pub fn with_have<F>(&self, device: DeviceId, mut visitor: F) -> IndexResult<()>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let snapshot = self.store.snapshot()?;
        let prefix = keys::device_prefix(self.folder_id, device);
        let end = keys::prefix_end(&prefix);

        for (_, value) in snapshot.range(&prefix, &end)? {
            let Some(record) = self.decode_lenient(decode_record(&value), "have")? else {
                continue;
            };
            if !visitor(&record) {
                break;
            }
        }
        Ok(())
    }

    /// Invokes `visitor` for every global entry in path order.
    /// Iteration stops early when the visitor returns `false`.
    ///
    /// # Errors
    ///
    /// See [`with_have`](Self::with_have).
    pub fn with_global<F>(&self, mut visitor: F) -> IndexResult<()>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let snapshot = self.store.snapshot()?;
        let prefix = keys::global_prefix(self.folder_id);
        let end = keys::prefix_end(&prefix);

        for (_, value) in snapshot.range(&prefix, &end)? {
            let Some((winner, _)) = self.decode_lenient(decode_global(&value), "global")? else {
                continue;
            };
            if !visitor(&winner) {
                break;
            }
        }
        Ok(())
    }

    /// Invokes `visitor`, in path order, for every global entry that
    /// `device` needs: entries whose winner is strictly newer than the
    /// device's own record or missing from it.
    ///
    /// A device does not need a tombstone for a path it has no record
    /// of, and does not need an entry whose winner is invalid (no
    /// usable source exists).
    ///
    /// This merges the global range with the device's have range; the
    /// need list is never materialized.
    ///
    /// # Errors
    ///
    /// See [`with_have`](Self::with_have).
    pub fn with_need<F>(&self, device: DeviceId, mut visitor: F) -> IndexResult<()>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let snapshot = self.store.snapshot()?;
        let gprefix = keys::global_prefix(self.folder_id);
        let gend = keys::prefix_end(&gprefix);
        let hprefix = keys::device_prefix(self.folder_id, device);
        let hend = keys::prefix_end(&hprefix);

        let mut have = snapshot.range(&hprefix, &hend)?.peekable();
        for (gkey, gvalue) in snapshot.range(&gprefix, &gend)? {
            let Some(name) = keys::global_key_name(&gkey) else {
                continue;
            };

            // Advance the have side to the first entry at or past name.
            loop {
                let behind = match have.peek() {
                    Some((hkey, _)) => keys::device_key_name(hkey).unwrap_or(&[]) < name,
                    None => false,
                };
                if !behind {
                    break;
                }
                have.next();
            }

            let at_name = match have.peek() {
                Some((hkey, _)) => keys::device_key_name(hkey).unwrap_or(&[]) == name,
                None => false,
            };
            let mut have_record = None;
            if at_name {
                if let Some((_, hvalue)) = have.next() {
                    have_record = self.decode_lenient(decode_record(&hvalue), "have")?;
                }
            }

            let Some((winner, _)) = self.decode_lenient(decode_global(&gvalue), "global")? else {
                continue;
            };
            if version::needs(&winner, have_record.as_ref()) && !visitor(&winner) {
                break;
            }
        }
        Ok(())
    }

    fn replace_inner(
        &self,
        device: DeviceId,
        records: &[FileRecord],
        tombstones: bool,
    ) -> IndexResult<()> {
        let _guard = self.state.write_lock.lock();
        let snapshot = self.store.snapshot()?;
        let incoming = self.normalize(records);

        let start = self.counter(device);
        let mut counter = start;
        let mut batch = Batch::new();

        let prefix = keys::device_prefix(self.folder_id, device);
        let end = keys::prefix_end(&prefix);
        let mut existing = snapshot.range(&prefix, &end)?.peekable();
        let mut incoming = incoming.into_iter().peekable();

        enum Step {
            Removed,
            Added,
            Matched,
        }

        loop {
            let step = match (existing.peek(), incoming.peek()) {
                (None, None) => break,
                (Some(_), None) => Step::Removed,
                (None, Some(_)) => Step::Added,
                (Some((key, _)), Some((name, _))) => {
                    match keys::device_key_name(key).unwrap_or(&[]).cmp(name.as_bytes()) {
                        Ordering::Less => Step::Removed,
                        Ordering::Greater => Step::Added,
                        Ordering::Equal => Step::Matched,
                    }
                }
            };

            match step {
                Step::Removed => {
                    let Some((key, value)) = existing.next() else {
                        break;
                    };
                    let name = keys::device_key_name(&key).unwrap_or(&[]).to_vec();
                    if tombstones {
                        let old = self.decode_lenient(decode_record(&value), "have")?;
                        if old.as_ref().is_some_and(FileRecord::is_deleted) {
                            // Already tombstoned; keep its version stable.
                            continue;
                        }
                        let tomb_name = match &old {
                            Some(old) => old.name.clone(),
                            None => String::from_utf8(name.clone())
                                .map_err(|_| CodecError::InvalidUtf8)?,
                        };
                        let dir_flag = old
                            .as_ref()
                            .map_or(Flags::new(0), |old| old.flags & Flags::DIRECTORY);

                        counter += 1;
                        let mut tomb = FileRecord::new(tomb_name, self.clock.tick());
                        tomb.flags = Flags::DELETED | dir_flag;
                        tomb.local_version = counter;
                        batch.put(key, encode_record(&tomb));
                        self.refresh_global(snapshot.as_ref(), &mut batch, &name, device, Some(&tomb))?;
                    } else {
                        counter += 1;
                        batch.delete(key);
                        self.refresh_global(snapshot.as_ref(), &mut batch, &name, device, None)?;
                    }
                }
                Step::Added => {
                    let Some((name, mut record)) = incoming.next() else {
                        break;
                    };
                    counter += 1;
                    record.local_version = counter;
                    batch.put(
                        keys::device_key(self.folder_id, device, name.as_bytes()),
                        encode_record(&record),
                    );
                    self.refresh_global(snapshot.as_ref(), &mut batch, name.as_bytes(), device, Some(&record))?;
                }
                Step::Matched => {
                    let (Some((key, value)), Some((name, mut record))) =
                        (existing.next(), incoming.next())
                    else {
                        break;
                    };
                    let old = self.decode_lenient(decode_record(&value), "have")?;
                    if old.as_ref().is_some_and(|old| old.same_contents(&record)) {
                        // Unchanged; the stored record keeps its local version.
                        continue;
                    }
                    counter += 1;
                    record.local_version = counter;
                    batch.put(key, encode_record(&record));
                    self.refresh_global(snapshot.as_ref(), &mut batch, name.as_bytes(), device, Some(&record))?;
                }
            }
        }

        let op = if tombstones { "replace_with_delete" } else { "replace" };
        self.commit(snapshot.as_ref(), batch, device, start, counter, op)
    }

    /// Recomputes the global entry for `name` after `mutated`'s have
    /// entry became `replacement` (or was removed, for `None`).
    ///
    /// All other devices are read from the mutator's snapshot; since a
    /// mutator touches exactly one device, the combination is the
    /// post-mutation candidate set.
    fn refresh_global(
        &self,
        snapshot: &dyn KvSnapshot,
        batch: &mut Batch,
        name: &[u8],
        mutated: DeviceId,
        replacement: Option<&FileRecord>,
    ) -> IndexResult<()> {
        let mut candidates: Vec<(DeviceId, FileRecord)> = Vec::new();
        for device in self.state.devices.read().iter() {
            if *device == mutated {
                continue;
            }
            let key = keys::device_key(self.folder_id, *device, name);
            if let Some(value) = snapshot.get(&key)? {
                if let Some(record) = self.decode_lenient(decode_record(&value), "have")? {
                    candidates.push((*device, record));
                }
            }
        }
        if let Some(record) = replacement {
            candidates.push((mutated, record.clone()));
        }

        let key = keys::global_key(self.folder_id, name);
        match version::select_winner(&candidates) {
            None => batch.delete(key),
            Some((_, winner)) => {
                let mut availability: Vec<DeviceId> = candidates
                    .iter()
                    .filter(|(_, record)| !record.is_invalid() && record.same_contents(winner))
                    .map(|(device, _)| *device)
                    .collect();
                availability.sort_unstable();
                batch.put(key, encode_global(winner, &availability));
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        snapshot: &dyn KvSnapshot,
        mut batch: Batch,
        device: DeviceId,
        start: u64,
        counter: u64,
        op: &str,
    ) -> IndexResult<()> {
        if batch.is_empty() && counter == start {
            debug!(folder = %self.folder, device = %device, op, "no changes");
            return Ok(());
        }

        self.register_device(snapshot, &mut batch, device)?;
        self.store.write(batch)?;

        // Counters and the device set only advance once the batch is
        // durably committed; a failed write leaves both untouched.
        if counter != start {
            self.state.counters.write().insert(device, counter);
        }
        self.state.devices.write().insert(device);

        debug!(
            folder = %self.folder,
            device = %device,
            op,
            changes = counter - start,
            local_version = counter,
            "committed"
        );
        Ok(())
    }

    /// Stages a DEVICE_IDX registration for a device the store has not
    /// seen before.
    fn register_device(
        &self,
        snapshot: &dyn KvSnapshot,
        batch: &mut Batch,
        device: DeviceId,
    ) -> IndexResult<()> {
        if self.state.devices.read().contains(&device) {
            return Ok(());
        }
        let key = keys::device_idx_key(device);
        if snapshot.get(&key)?.is_some() {
            return Ok(());
        }
        let prefix = keys::device_idx_prefix();
        let end = keys::prefix_end(&prefix);
        let sequence = snapshot.range(&prefix, &end)?.count() as u64 + 1;
        batch.put(key, sequence.to_be_bytes().to_vec());
        Ok(())
    }

    /// Deduplicates input records by name (later entries win), drops
    /// reserved version-zero records, and advances the clock past every
    /// ingested version.
    fn normalize(&self, records: &[FileRecord]) -> BTreeMap<String, FileRecord> {
        let mut map = BTreeMap::new();
        for record in records {
            self.clock.observe(record.version);
            if record.version == 0 {
                continue;
            }
            map.insert(record.name.clone(), record.clone());
        }
        map
    }

    fn counter(&self, device: DeviceId) -> u64 {
        self.state.counters.read().get(&device).copied().unwrap_or(0)
    }

    /// Applies the corruption policy to a decode result: `Abort`
    /// surfaces the error, `Skip` logs and drops the entry.
    fn decode_lenient<T>(&self, result: CodecResult<T>, entry: &str) -> IndexResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => match self.config.corruption {
                CorruptionPolicy::Abort => Err(err.into()),
                CorruptionPolicy::Skip => {
                    warn!(folder = %self.folder, entry, error = %err, "skipping corrupt entry");
                    Ok(None)
                }
            },
        }
    }

    /// Loads the folder's device set and per-device local-version
    /// high-water marks from the store, and re-observes every stored
    /// version into the clock.
    fn load_state(&self) -> IndexResult<()> {
        let snapshot = self.store.snapshot()?;
        let prefix = keys::device_folder_prefix(self.folder_id);
        let end = keys::prefix_end(&prefix);

        let mut devices = self.state.devices.write();
        let mut counters = self.state.counters.write();
        for (key, value) in snapshot.range(&prefix, &end)? {
            let Some(device) = keys::device_key_device(&key) else {
                continue;
            };
            devices.insert(device);
            if let Some(record) = self.decode_lenient(decode_record(&value), "have")? {
                self.clock.observe(record.version);
                let counter = counters.entry(device).or_insert(0);
                if record.local_version > *counter {
                    *counter = record.local_version;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSet")
            .field("folder", &self.folder)
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}
