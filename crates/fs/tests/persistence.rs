// SPDX-License-Identifier: Apache-2.0

//! End-to-end persistence: everything written through the file system
//! must survive unmounting and remounting the disk image.

use minos_fs::{Error, FileSystem, ImageDisk};

#[test]
fn test_image_survives_remount() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nachos.img");

    let payload: Vec<u8> = (0..6000u32).map(|i| (i * 7 % 256) as u8).collect();

    {
        let disk = ImageDisk::create(&path).unwrap();
        let mut fs = FileSystem::format(disk).unwrap();
        fs.create_dir("/home").unwrap();
        fs.create_dir("/home/user").unwrap();
        fs.create("/home/user/data.bin", payload.len() as u32)
            .unwrap();

        let id = fs.open_id("/home/user/data.bin").unwrap();
        assert_eq!(fs.write_id(id, &payload).unwrap(), payload.len());
        fs.close_id(id).unwrap();
    }

    // Reopen the image cold and read everything back.
    let disk = ImageDisk::open(&path).unwrap();
    let mut fs = FileSystem::mount(disk).unwrap();

    let listing = fs.list("/", true).unwrap();
    let shape: Vec<(&str, usize)> = listing
        .iter()
        .map(|e| (e.name.as_str(), e.depth))
        .collect();
    assert_eq!(
        shape,
        vec![("home", 0), ("user", 1), ("data.bin", 2)]
    );

    let id = fs.open_id("/home/user/data.bin").unwrap();
    let mut out = vec![0u8; payload.len()];
    assert_eq!(fs.read_id(id, &mut out).unwrap(), payload.len());
    assert_eq!(out, payload);
    fs.close_id(id).unwrap();
}

#[test]
fn test_free_sectors_conserved_across_create_remove_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycle.img");
    let disk = ImageDisk::create(&path).unwrap();
    let mut fs = FileSystem::format(disk).unwrap();

    let baseline = fs.free_sectors().unwrap();
    for round in 0..3 {
        let name = format!("/scratch-{round}");
        fs.create(&name, 4500).unwrap();
        fs.remove(&name).unwrap();
        assert_eq!(fs.free_sectors().unwrap(), baseline, "round {round}");
    }
}

#[test]
fn test_remove_then_open_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.img");
    let disk = ImageDisk::create(&path).unwrap();
    let mut fs = FileSystem::format(disk).unwrap();

    fs.create("/fleeting", 64).unwrap();
    fs.remove("/fleeting").unwrap();
    assert!(matches!(fs.open("/fleeting"), Err(Error::NotFound { .. })));
}
