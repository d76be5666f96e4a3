//! End-to-end scenarios for the file index.

use std::sync::Arc;
use syncidx_core::{
    drop_folder, list_folders, BlockInfo, DeviceId, FileRecord, FileSet, Flags, IndexConfig,
    LogicalClock,
};
use syncidx_storage::{KvStore, LogKv, MemoryKv};

const R0: DeviceId = DeviceId::new([1; 32]);
const R1: DeviceId = DeviceId::new([2; 32]);
const LOCAL: DeviceId = DeviceId::LOCAL;

fn new_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryKv::new())
}

fn open(store: &Arc<dyn KvStore>, folder: &str, clock: &Arc<LogicalClock>) -> FileSet {
    FileSet::open_with(
        Arc::clone(store),
        folder,
        Arc::clone(clock),
        IndexConfig::default(),
    )
    .unwrap()
}

fn gen_blocks(n: usize) -> Vec<BlockInfo> {
    (0..n)
        .map(|i| BlockInfo {
            size: i as u32,
            hash: (0..32).map(|j| (i + j) as u8).collect(),
        })
        .collect()
}

fn file(name: &str, version: u64, blocks: usize) -> FileRecord {
    FileRecord::new(name, version).with_blocks(gen_blocks(blocks))
}

fn invalid(name: &str, version: u64, blocks: usize) -> FileRecord {
    file(name, version, blocks).with_flags(Flags::INVALID)
}

fn global_list(set: &FileSet) -> Vec<FileRecord> {
    let mut records = Vec::new();
    set.with_global(|record| {
        records.push(record.clone());
        true
    })
    .unwrap();
    records
}

fn have_list(set: &FileSet, device: DeviceId) -> Vec<FileRecord> {
    let mut records = Vec::new();
    set.with_have(device, |record| {
        records.push(record.clone());
        true
    })
    .unwrap();
    records
}

fn need_list(set: &FileSet, device: DeviceId) -> Vec<FileRecord> {
    let mut records = Vec::new();
    set.with_need(device, |record| {
        records.push(record.clone());
        true
    })
    .unwrap();
    records
}

/// `(name, version, deleted)` triples, for compact comparisons.
fn summarize(records: &[FileRecord]) -> Vec<(String, u64, bool)> {
    records
        .iter()
        .map(|r| (r.name.clone(), r.version, r.is_deleted()))
        .collect()
}

#[test]
fn global_merge() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    let local0 = vec![
        file("a", 1000, 1),
        file("b", 1000, 2),
        file("c", 1000, 3),
        file("d", 1000, 4),
        file("z", 1000, 8),
    ];
    let local1 = local0[..4].to_vec();
    let remote0 = vec![file("a", 1000, 1), file("b", 1000, 2), file("c", 1002, 5)];
    let remote1 = vec![file("b", 1001, 6), file("e", 1000, 7)];

    set.replace_with_delete(LOCAL, &local0).unwrap();
    set.replace_with_delete(LOCAL, &local1).unwrap();
    set.replace(R0, &remote0).unwrap();
    set.update(R0, &remote1).unwrap();

    assert_eq!(
        summarize(&global_list(&set)),
        vec![
            ("a".into(), 1000, false),
            ("b".into(), 1001, false),
            ("c".into(), 1002, false),
            ("d".into(), 1000, false),
            ("e".into(), 1000, false),
            ("z".into(), 1001, true),
        ]
    );

    // The local have set is local1 plus the synthesized tombstone for z.
    let local_have = have_list(&set, LOCAL);
    assert_eq!(
        summarize(&local_have),
        vec![
            ("a".into(), 1000, false),
            ("b".into(), 1000, false),
            ("c".into(), 1000, false),
            ("d".into(), 1000, false),
            ("z".into(), 1001, true),
        ]
    );
    let z = &local_have[4];
    assert!(z.blocks.is_empty());
    assert!(!z.is_directory());

    // The remote have set is the union of both announcements.
    assert_eq!(
        summarize(&have_list(&set, R0)),
        vec![
            ("a".into(), 1000, false),
            ("b".into(), 1001, false),
            ("c".into(), 1002, false),
            ("e".into(), 1000, false),
        ]
    );

    assert_eq!(
        summarize(&need_list(&set, LOCAL)),
        vec![
            ("b".into(), 1001, false),
            ("c".into(), 1002, false),
            ("e".into(), 1000, false),
        ]
    );
    assert_eq!(summarize(&need_list(&set, R0)), vec![("d".into(), 1000, false)]);

    // Point lookups pick the device's own copy vs the winner.
    let b_local = set.get(LOCAL, "b").unwrap().unwrap();
    assert_eq!(b_local.version, 1000);
    assert_eq!(b_local.blocks, gen_blocks(2));

    let b_remote = set.get(R0, "b").unwrap().unwrap();
    assert_eq!(b_remote.version, 1001);
    assert_eq!(b_remote.blocks, gen_blocks(6));

    let b_global = set.get_global("b").unwrap().unwrap();
    assert_eq!(b_global.version, 1001);
    assert_eq!(b_global.blocks, gen_blocks(6));

    assert!(set.get(LOCAL, "zz").unwrap().is_none());
    assert!(set.get_global("zz").unwrap().is_none());

    assert_eq!(set.availability("a").unwrap(), vec![R0, LOCAL]);
    assert_eq!(set.availability("b").unwrap(), vec![R0]);
    assert_eq!(set.availability("d").unwrap(), vec![LOCAL]);
}

#[test]
fn invalid_availability() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    set.replace(
        R0,
        &[
            file("both", 1001, 2),
            invalid("r1only", 1002, 5),
            file("r0only", 1003, 7),
            invalid("none", 1004, 5),
        ],
    )
    .unwrap();
    set.replace(
        R1,
        &[
            file("both", 1001, 2),
            file("r1only", 1002, 7),
            invalid("r0only", 1003, 5),
            invalid("none", 1004, 5),
        ],
    )
    .unwrap();

    assert_eq!(set.availability("both").unwrap(), vec![R0, R1]);
    assert_eq!(set.availability("r0only").unwrap(), vec![R0]);
    assert_eq!(set.availability("r1only").unwrap(), vec![R1]);
    assert_eq!(set.availability("none").unwrap(), Vec::new());
}

#[test]
fn tombstone_generation() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    let a = FileRecord::new("a", 1000);
    let b = FileRecord::new("b", 1000);
    let c = FileRecord::new("c", 1000);
    let d = FileRecord::new("d", 1000);
    let z = FileRecord::new("z", 1000).with_flags(Flags::DIRECTORY);

    set.replace_with_delete(
        LOCAL,
        &[a.clone(), b.clone(), c.clone(), d.clone(), z.clone()],
    )
    .unwrap();
    set.replace_with_delete(LOCAL, &[a.clone(), c.clone(), d.clone(), z.clone()])
        .unwrap();
    set.replace_with_delete(LOCAL, &[a.clone(), c.clone(), z.clone()])
        .unwrap();
    set.replace_with_delete(LOCAL, &[a.clone(), c.clone()]).unwrap();
    set.replace_with_delete(LOCAL, &[a.clone()]).unwrap();

    // Tombstone versions reflect removal order: b, d, z, then c.
    assert_eq!(
        summarize(&global_list(&set)),
        vec![
            ("a".into(), 1000, false),
            ("b".into(), 1001, true),
            ("c".into(), 1004, true),
            ("d".into(), 1002, true),
            ("z".into(), 1003, true),
        ]
    );

    // The directory flag survives deletion; blocks do not.
    let z_tomb = set.get(LOCAL, "z").unwrap().unwrap();
    assert!(z_tomb.is_deleted());
    assert!(z_tomb.is_directory());
    assert!(z_tomb.blocks.is_empty());
}

#[test]
fn local_version_monotonic() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    let local1 = vec![
        FileRecord::new("a", 1000),
        FileRecord::new("b", 1000),
        FileRecord::new("c", 1000),
        FileRecord::new("d", 1000),
    ];
    let local2 = vec![
        local1[0].clone(),
        local1[2].clone(),
        FileRecord::new("d", 1002),
        FileRecord::new("e", 1000),
    ];

    set.replace_with_delete(LOCAL, &local1).unwrap();
    let c0 = set.local_version(LOCAL);
    assert!(c0 > 0);

    set.replace_with_delete(LOCAL, &local2).unwrap();
    let c1 = set.local_version(LOCAL);
    assert!(c1 > c0);

    // An identical announcement changes nothing.
    set.replace_with_delete(LOCAL, &local2).unwrap();
    assert_eq!(set.local_version(LOCAL), c1);
}

#[test]
fn drop_folder_isolation() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());

    let s0 = open(&store, "test0", &clock);
    s0.replace(
        LOCAL,
        &[
            FileRecord::new("a", 1000),
            FileRecord::new("b", 1000),
            FileRecord::new("c", 1000),
        ],
    )
    .unwrap();

    let s1 = open(&store, "test1", &clock);
    s1.replace(
        R0,
        &[
            FileRecord::new("d", 1002),
            FileRecord::new("e", 1002),
            FileRecord::new("f", 1002),
        ],
    )
    .unwrap();

    assert_eq!(list_folders(store.as_ref()).unwrap(), vec!["test0", "test1"]);
    assert_eq!(global_list(&s0).len(), 3);
    assert_eq!(global_list(&s1).len(), 3);

    drop_folder(&store, "test1").unwrap();

    assert_eq!(list_folders(store.as_ref()).unwrap(), vec!["test0"]);
    assert_eq!(global_list(&s0).len(), 3);
    assert_eq!(global_list(&s1).len(), 0);
    assert_eq!(have_list(&s1, R0).len(), 0);
    assert!(s1.get(R0, "d").unwrap().is_none());
    assert!(s1.get_global("d").unwrap().is_none());
    assert!(s0.get(LOCAL, "a").unwrap().is_some());
}

#[test]
fn global_need_with_per_file_invalid() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    set.replace(
        R0,
        &[file("a", 1002, 4), invalid("b", 1002, 0), file("c", 1002, 4)],
    )
    .unwrap();
    set.replace(
        R1,
        &[file("a", 1002, 4), file("b", 1002, 4), invalid("c", 1002, 0)],
    )
    .unwrap();

    // A valid copy of every file exists, so the local device needs all
    // three, each from its valid holder.
    assert_eq!(
        summarize(&need_list(&set, LOCAL)),
        vec![
            ("a".into(), 1002, false),
            ("b".into(), 1002, false),
            ("c".into(), 1002, false),
        ]
    );
    for record in global_list(&set) {
        assert!(!record.is_invalid());
        assert_eq!(record.blocks, gen_blocks(4));
    }

    assert_eq!(set.availability("b").unwrap(), vec![R1]);
    assert_eq!(set.availability("c").unwrap(), vec![R0]);
}

#[test]
fn need_prefers_valid_copies() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    set.replace_with_delete(LOCAL, &[file("a", 1000, 1)]).unwrap();
    set.replace(
        R0,
        &[file("b", 1001, 2), invalid("c", 1002, 5), file("d", 1003, 7)],
    )
    .unwrap();
    set.replace(
        R1,
        &[file("c", 1002, 7), invalid("d", 1003, 5), invalid("e", 1004, 5)],
    )
    .unwrap();

    let need = need_list(&set, LOCAL);
    assert_eq!(
        summarize(&need),
        vec![
            ("b".into(), 1001, false),
            ("c".into(), 1002, false),
            ("d".into(), 1003, false),
        ]
    );
    // The winners are the valid copies: c from R1, d from R0.
    assert_eq!(need[1].blocks, gen_blocks(7));
    assert_eq!(need[2].blocks, gen_blocks(7));
    // e exists only as invalid copies and is not needed by anyone.
    assert!(need.iter().all(|r| r.name != "e"));
}

#[test]
fn update_to_invalid() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    set.replace_with_delete(
        LOCAL,
        &[
            file("a", 1000, 1),
            file("b", 1001, 2),
            invalid("c", 1002, 5),
            file("d", 1003, 7),
        ],
    )
    .unwrap();

    let marked = FileRecord::new("b", 1001).with_flags(Flags::INVALID);
    set.update(LOCAL, std::slice::from_ref(&marked)).unwrap();

    let have = have_list(&set, LOCAL);
    assert_eq!(have.len(), 4);
    assert!(have[1].is_invalid());
    assert!(have[1].blocks.is_empty());
    assert!(!have[0].is_invalid());
}

#[test]
fn replace_reset_restores_remaining_devices() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    let local = vec![
        FileRecord::new("a", 1000),
        FileRecord::new("b", 1000),
        FileRecord::new("c", 1000),
        FileRecord::new("d", 1000),
    ];
    let remote = vec![
        FileRecord::new("a", 1000),
        FileRecord::new("b", 1001),
        FileRecord::new("c", 1002),
        FileRecord::new("e", 1000),
    ];

    set.replace_with_delete(LOCAL, &local).unwrap();
    assert_eq!(summarize(&global_list(&set)), summarize(&local));

    set.replace(R0, &remote).unwrap();
    assert_eq!(set.get_global("b").unwrap().unwrap().version, 1001);

    // Forgetting the remote restores the local view; paths only the
    // remote had disappear without tombstones.
    set.replace(R0, &[]).unwrap();
    assert_eq!(summarize(&global_list(&set)), summarize(&local));
    assert!(set.get_global("e").unwrap().is_none());
    assert!(set.availability("e").unwrap().is_empty());
}

#[test]
fn long_paths_round_trip() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    let name = "0123456789abcdef".repeat(512); // 8 KiB
    set.replace_with_delete(LOCAL, &[FileRecord::new(name.clone(), 1000)])
        .unwrap();

    let global = global_list(&set);
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].name, name);
    assert_eq!(
        set.get(LOCAL, &name).unwrap().unwrap().version,
        1000
    );
}

#[test]
fn index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sxkv");

    {
        let store: Arc<dyn KvStore> = Arc::new(LogKv::open(&path).unwrap());
        let clock = Arc::new(LogicalClock::new());
        let set = open(&store, "folder1", &clock);
        set.replace_with_delete(LOCAL, &[file("a", 1000, 2), file("b", 1000, 3)])
            .unwrap();
        set.replace(R0, &[file("b", 1005, 4)]).unwrap();
        assert_eq!(set.local_version(LOCAL), 2);
    }

    let store: Arc<dyn KvStore> = Arc::new(LogKv::open(&path).unwrap());
    let clock = Arc::new(LogicalClock::new());
    let set = open(&store, "folder1", &clock);

    assert_eq!(list_folders(store.as_ref()).unwrap(), vec!["folder1"]);
    assert_eq!(set.local_version(LOCAL), 2);
    assert_eq!(
        summarize(&have_list(&set, LOCAL)),
        vec![("a".into(), 1000, false), ("b".into(), 1000, false)]
    );
    assert_eq!(set.get_global("b").unwrap().unwrap().version, 1005);

    // Reopening re-observed stored versions, so a tombstone synthesized
    // now still dominates everything previously seen.
    set.replace_with_delete(LOCAL, &[file("b", 1000, 3)]).unwrap();
    let tomb = set.get(LOCAL, "a").unwrap().unwrap();
    assert!(tomb.is_deleted());
    assert!(tomb.version > 1005);
}

#[test]
fn readers_race_single_writer() {
    let store = new_store();
    let clock = Arc::new(LogicalClock::new());
    let set = Arc::new(open(&store, "folder1", &clock));

    let writer = {
        let set = Arc::clone(&set);
        std::thread::spawn(move || {
            for round in 1u64..50 {
                let records: Vec<FileRecord> = (0..20)
                    .map(|i| file(&format!("file{i:02}"), 1000 + round, 1))
                    .collect();
                set.replace_with_delete(LOCAL, &records).unwrap();
            }
        })
    };

    let reader = {
        let set = Arc::clone(&set);
        std::thread::spawn(move || {
            for _ in 0..200 {
                // Every observed view must be internally consistent: the
                // global winner for a path never lags a have entry.
                let mut version = None;
                set.with_global(|record| {
                    let v = *version.get_or_insert(record.version);
                    assert_eq!(v, record.version);
                    true
                })
                .unwrap();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(global_list(&set).len(), 20);
}
