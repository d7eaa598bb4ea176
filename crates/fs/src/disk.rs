// SPDX-License-Identifier: Apache-2.0

//! The sector-disk seam.
//!
//! The real machine's physical-disk simulator is outside this crate; what
//! the file system needs from it is sector-granular atomic reads and
//! writes. [`ImageDisk`] backs the sectors with a host file so images
//! persist across runs; [`MemDisk`] keeps them in memory for tests.

use crate::error::Error;
use crate::{NUM_SECTORS, SECTOR_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Sector-granular disk access. Each operation transfers exactly one
/// sector and is atomic at that granularity.
pub trait SectorDisk {
    /// Reads sector `sector` into `buf`.
    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Error>;

    /// Writes `buf` to sector `sector`.
    fn write_sector(&mut self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Error>;
}

fn check_sector(sector: u32) {
    assert!(
        sector < NUM_SECTORS,
        "sector {sector} out of range (disk has {NUM_SECTORS} sectors)"
    );
}

/// A disk backed by a host file of exactly `NUM_SECTORS * SECTOR_SIZE`
/// bytes.
#[derive(Debug)]
pub struct ImageDisk {
    file: File,
}

impl ImageDisk {
    /// Creates a fresh zero-filled image at `path`, truncating anything
    /// already there.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let zeroes = vec![0u8; SECTOR_SIZE];
        for _ in 0..NUM_SECTORS {
            file.write_all(&zeroes)?;
        }
        file.flush()?;
        debug!(path = %path.as_ref().display(), "created disk image");
        Ok(ImageDisk { file })
    }

    /// Opens an existing image at `path`, validating its size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let expected = u64::from(NUM_SECTORS) * SECTOR_SIZE as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(Error::InvalidImage {
                details: format!("image is {actual} bytes, expected {expected}"),
            });
        }
        Ok(ImageDisk { file })
    }
}

impl SectorDisk for ImageDisk {
    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Error> {
        check_sector(sector);
        self.file
            .seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&mut self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Error> {
        check_sector(sector);
        self.file
            .seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

/// An in-memory disk for tests.
#[derive(Debug, Clone)]
pub struct MemDisk {
    sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl MemDisk {
    /// Creates a zero-filled in-memory disk.
    pub fn new() -> Self {
        MemDisk {
            sectors: vec![[0; SECTOR_SIZE]; NUM_SECTORS as usize],
        }
    }
}

impl Default for MemDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl SectorDisk for MemDisk {
    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Error> {
        check_sector(sector);
        *buf = self.sectors[sector as usize];
        Ok(())
    }

    fn write_sector(&mut self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Error> {
        check_sector(sector);
        self.sectors[sector as usize] = *buf;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_disk_round_trip() {
        let mut disk = MemDisk::new();
        let mut data = [0u8; SECTOR_SIZE];
        data[0] = 0xAB;
        data[SECTOR_SIZE - 1] = 0xCD;
        disk.write_sector(7, &data).unwrap();

        let mut out = [0u8; SECTOR_SIZE];
        disk.read_sector(7, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_sector_panics() {
        let mut disk = MemDisk::new();
        let mut buf = [0u8; SECTOR_SIZE];
        let _ = disk.read_sector(NUM_SECTORS, &mut buf);
    }

    #[test]
    fn test_image_disk_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        {
            let mut disk = ImageDisk::create(&path).unwrap();
            let mut data = [0u8; SECTOR_SIZE];
            data[3] = 9;
            disk.write_sector(42, &data).unwrap();
        }

        let mut disk = ImageDisk::open(&path).unwrap();
        let mut out = [0u8; SECTOR_SIZE];
        disk.read_sector(42, &mut out).unwrap();
        assert_eq!(out[3], 9);
    }

    #[test]
    fn test_image_disk_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.img");
        std::fs::write(&path, b"not a disk image").unwrap();
        assert!(matches!(
            ImageDisk::open(&path),
            Err(Error::InvalidImage { .. })
        ));
    }
}
