use std::sync::Arc;

mod common;

use common::IO_SIZE;
use tauon::{BlockDevice, Error, FileDisk, FileSystem, FileType};

#[test]
fn test_image_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("tauon.img");

    let disk = Arc::new(FileDisk::create(&image, 1 << 20, IO_SIZE).unwrap());
    assert_eq!(disk.device_size(), 1 << 20);
    let mut fs = FileSystem::mount(disk).unwrap();
    fs.mkdir("/etc").unwrap();
    fs.mknod("/etc/motd", FileType::Regular).unwrap();
    fs.write("/etc/motd", b"welcome aboard", 0).unwrap();
    fs.unmount().unwrap();

    let disk = Arc::new(FileDisk::open(&image, IO_SIZE).unwrap());
    let mut fs = FileSystem::mount(disk).unwrap();
    let mut buf = [0u8; 14];
    assert_eq!(fs.read("/etc/motd", &mut buf, 0).unwrap(), 14);
    assert_eq!(&buf, b"welcome aboard");
    log!("image at {} mounted twice", image.display());
}

#[test]
fn test_unaligned_image_is_rejected() {
    let file = tempfile::NamedTempFile::new().unwrap();
    file.as_file().set_len(1000).unwrap();
    assert!(matches!(
        FileDisk::open(file.path(), IO_SIZE),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_unit_bounds() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let disk = FileDisk::create(file.path(), 4 * IO_SIZE as u64, IO_SIZE).unwrap();
    let mut unit = vec![0u8; IO_SIZE];
    disk.write_unit(3, &vec![0xAB; IO_SIZE]).unwrap();
    disk.read_unit(3, &mut unit).unwrap();
    assert!(unit.iter().all(|&b| b == 0xAB));
    assert!(matches!(disk.read_unit(4, &mut unit), Err(Error::InvalidArgument(_))));
    assert!(matches!(disk.write_unit(0, &[0u8; 3]), Err(Error::InvalidArgument(_))));
}
