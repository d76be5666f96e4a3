//! # SyncIdx Core
//!
//! Per-folder, multi-device file-index engine for a peer-to-peer file
//! synchronizer.
//!
//! For every synchronized folder the engine stores the **have** set each
//! known device advertises, and derives from the union of those sets:
//!
//! - the **global** view: the winning version of every path across all
//!   devices, with the list of devices holding a usable copy
//! - the **need** view: relative to a device, the paths whose winning
//!   version that device is missing or behind on
//!
//! State lives in an ordered key-value store behind the
//! [`KvStore`](syncidx_storage::KvStore) contract; every mutator commits
//! one atomic batch, so readers racing a writer see a previous
//! consistent state, never a torn one.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use syncidx_core::{DeviceId, FileRecord, FileSet};
//! use syncidx_storage::{KvStore, MemoryKv};
//!
//! let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
//! let set = FileSet::open(Arc::clone(&store), "photos").unwrap();
//!
//! set.replace_with_delete(DeviceId::LOCAL, &[FileRecord::new("camera/img1.jpg", 1000)])
//!     .unwrap();
//!
//! let global = set.get_global("camera/img1.jpg").unwrap().unwrap();
//! assert_eq!(global.version, 1000);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod fileset;
mod keys;
mod registry;
pub mod version;

pub use clock::LogicalClock;
pub use config::{CorruptionPolicy, IndexConfig};
pub use error::{IndexError, IndexResult};
pub use fileset::FileSet;
pub use registry::{drop_folder, list_folders};

pub use syncidx_codec::{BlockInfo, DeviceId, FileRecord, Flags};
