use std::sync::Arc;

use proptest::prelude::*;

mod common;

use common::{IO_SIZE, RamDisk};
use tauon::{Error, FileSystem, FileType};

const MIB: usize = 1 << 20;

fn remount(disk: &Arc<RamDisk>) -> FileSystem<RamDisk> {
    FileSystem::mount(Arc::clone(disk)).unwrap()
}

fn read_all(fs: &mut FileSystem<RamDisk>, path: &str) -> Vec<u8> {
    let size = fs.stat(path).unwrap().size as usize;
    let mut buf = vec![0u8; size];
    assert_eq!(fs.read(path, &mut buf, 0).unwrap(), size);
    buf
}

#[test]
fn test_hello_survives_remount() {
    let disk = Arc::new(RamDisk::new(4 * MIB, IO_SIZE));
    let mut fs = remount(&disk);
    fs.mknod("/a.txt", FileType::Regular).unwrap();
    fs.write("/a.txt", b"hello", 0).unwrap();
    fs.unmount().unwrap();

    let mut fs = remount(&disk);
    let mut buf = [0u8; 5];
    assert_eq!(fs.read("/a.txt", &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn test_tree_survives_remount() {
    let disk = Arc::new(RamDisk::new(MIB, IO_SIZE));
    let mut fs = remount(&disk);
    fs.mkdir("/docs").unwrap();
    fs.mkdir("/docs/old").unwrap();
    for i in 0..20 {
        let path = format!("/docs/n{i}");
        fs.mknod(&path, FileType::Regular).unwrap();
        fs.write(&path, format!("note {i}").as_bytes(), 0).unwrap();
    }
    fs.symlink("/docs/n1", "/latest").unwrap();
    fs.rename("/docs/n0", "/docs/old/n0").unwrap();
    fs.unlink("/docs/n2").unwrap();
    let listing = fs.read_dir("/docs").unwrap();
    let stats = fs.statfs();
    fs.unmount().unwrap();

    let mut fs = remount(&disk);
    assert_eq!(fs.read_dir("/docs").unwrap(), listing);
    assert_eq!(fs.statfs(), stats);
    assert_eq!(read_all(&mut fs, "/docs/old/n0"), b"note 0");
    assert_eq!(read_all(&mut fs, "/docs/n19"), b"note 19");
    assert!(!fs.lookup("/docs/n2").unwrap().found);
    assert_eq!(fs.readlink("/latest").unwrap(), "/docs/n1");

    // Load every entry so the whole tree can be checked against the bitmaps.
    for entry in &listing {
        fs.lookup(&format!("/docs/{}", entry.name)).unwrap();
    }
    fs.lookup("/docs/old/n0").unwrap();
    fs.lookup("/latest").unwrap();
    fs.check_consistency().unwrap();
}

#[test]
fn test_unloaded_subtree_is_released() {
    let disk = Arc::new(RamDisk::new(MIB, IO_SIZE));
    let mut fs = remount(&disk);
    fs.mkdir("/d").unwrap();
    fs.mkdir("/d/e").unwrap();
    fs.mknod("/d/e/f", FileType::Regular).unwrap();
    fs.write("/d/e/f", &[3u8; 2048], 0).unwrap();
    fs.unmount().unwrap();

    let mut fs = remount(&disk);
    // Only /d is read by the lookup; its children are read while dropping.
    fs.rmdir("/d").unwrap();
    let sb = fs.superblock();
    assert_eq!(sb.inode_map.count_set(), 1);
    // The root's entry block is all that is left.
    assert_eq!(sb.data_map.count_set(), 1);
    fs.check_consistency().unwrap();
    fs.unmount().unwrap();

    let mut fs = remount(&disk);
    assert_eq!(fs.readdir("/", 0).unwrap(), None);
}

#[test]
fn test_mismatched_geometry_is_rejected() {
    let disk = Arc::new(RamDisk::new(MIB, IO_SIZE));
    remount(&disk).unmount().unwrap();

    let foreign = Arc::new(RamDisk::from_bytes(disk.snapshot(), 2 * IO_SIZE));
    assert!(matches!(FileSystem::mount(foreign), Err(Error::Corruption(_))));
}

#[test]
fn test_oversized_file_record_is_rejected() {
    let disk = Arc::new(RamDisk::new(MIB, IO_SIZE));
    let mut fs = remount(&disk);
    let ino = fs.mknod("/full", FileType::Regular).unwrap();
    let limit = 6 * fs.superblock().blk_size as usize;
    fs.write("/full", &vec![7u8; limit], 0).unwrap();
    let size_at = fs.superblock().inode_offset(ino) as usize + 4;
    fs.unmount().unwrap();

    let mut image = disk.snapshot();
    image[size_at..size_at + 4].copy_from_slice(&(limit as u32 + 1).to_le_bytes());
    let mut fs = FileSystem::mount(Arc::new(RamDisk::from_bytes(image, IO_SIZE))).unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(fs.read("/full", &mut buf, 0), Err(Error::Corruption(_))));
}

#[test]
fn test_flush_without_unmount() {
    let disk = Arc::new(RamDisk::new(MIB, IO_SIZE));
    let mut fs = remount(&disk);
    fs.mkdir("/kept").unwrap();
    fs.flush().unwrap();

    // A second session over a copy of the flushed image sees the directory.
    let copy = Arc::new(RamDisk::from_bytes(disk.snapshot(), IO_SIZE));
    let mut other = FileSystem::mount(copy).unwrap();
    assert_eq!(other.stat("/kept").unwrap().ftype, FileType::Directory);
}

#[derive(Debug, Clone)]
enum Op {
    Write { at: usize, data: Vec<u8> },
    Truncate(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), prop::collection::vec(any::<u8>(), 1..1500))
            .prop_map(|(at, data)| Op::Write { at, data }),
        1 => (0usize..6144).prop_map(Op::Truncate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_contents_survive_remount(ops in prop::collection::vec(op(), 1..12)) {
        let disk = Arc::new(RamDisk::new(256 * 1024, IO_SIZE));
        let mut fs = remount(&disk);
        fs.mknod("/f", FileType::Regular).unwrap();
        let limit = 6 * fs.superblock().blk_size as usize;
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::Write { at, data } => {
                    let at = at % (model.len() + 1);
                    let result = fs.write("/f", &data, at as u64);
                    if at + data.len() > limit {
                        prop_assert!(matches!(result, Err(Error::FileTooLarge)));
                        continue;
                    }
                    prop_assert_eq!(result.unwrap(), data.len());
                    if model.len() < at + data.len() {
                        model.resize(at + data.len(), 0);
                    }
                    model[at..at + data.len()].copy_from_slice(&data);
                }
                Op::Truncate(size) => {
                    fs.truncate("/f", size as u64).unwrap();
                    model.resize(size, 0);
                }
            }
        }
        fs.check_consistency().unwrap();
        fs.unmount().unwrap();

        let mut fs = remount(&disk);
        prop_assert_eq!(read_all(&mut fs, "/f"), model);
        fs.check_consistency().unwrap();
    }
}
