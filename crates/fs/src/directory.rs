// SPDX-License-Identifier: Apache-2.0

//! Directories: fixed tables of named entries stored in ordinary files.
//!
//! Each entry carries an in-use flag, a file/subdirectory flag, a bounded
//! name, and the sector of the entry's file header. In-use names are
//! unique within one directory.

use crate::disk::SectorDisk;
use crate::error::Error;
use crate::file::OpenFile;
use crate::{DIR_ENTRY_SIZE, DIRECTORY_FILE_SIZE, FILE_NAME_MAX_LEN, NUM_DIR_ENTRIES};

/// One directory entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Whether this table slot is occupied.
    pub in_use: bool,
    /// True for a regular file, false for a subdirectory.
    pub is_file: bool,
    /// The entry's name.
    pub name: String,
    /// Sector of the entry's file header.
    pub sector: u32,
}

impl DirectoryEntry {
    fn empty() -> Self {
        DirectoryEntry {
            in_use: false,
            is_file: true,
            name: String::new(),
            sector: 0,
        }
    }

    fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0] = u8::from(self.in_use);
        buf[1] = u8::from(self.is_file);
        let name = self.name.as_bytes();
        buf[2..2 + name.len()].copy_from_slice(name);
        buf[24..28].copy_from_slice(&self.sector.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let name_field = &buf[2..2 + FILE_NAME_MAX_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_NAME_MAX_LEN);
        DirectoryEntry {
            in_use: buf[0] != 0,
            is_file: buf[1] != 0,
            name: String::from_utf8_lossy(&name_field[..name_len]).into_owned(),
            sector: u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]),
        }
    }
}

/// A directory table of [`NUM_DIR_ENTRIES`] slots.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Creates an empty directory table.
    pub fn new() -> Self {
        Directory {
            entries: (0..NUM_DIR_ENTRIES).map(|_| DirectoryEntry::empty()).collect(),
        }
    }

    /// Loads the table from a directory file.
    pub fn fetch_from<D: SectorDisk>(file: &OpenFile, disk: &mut D) -> Result<Self, Error> {
        let mut raw = vec![0u8; DIRECTORY_FILE_SIZE as usize];
        let read = file.read_at(disk, &mut raw, 0)?;
        debug_assert_eq!(read, DIRECTORY_FILE_SIZE as usize);
        Ok(Directory {
            entries: raw
                .chunks_exact(DIR_ENTRY_SIZE)
                .map(DirectoryEntry::from_bytes)
                .collect(),
        })
    }

    /// Writes the table back to its directory file.
    pub fn write_back<D: SectorDisk>(&self, file: &OpenFile, disk: &mut D) -> Result<(), Error> {
        let mut raw = Vec::with_capacity(DIRECTORY_FILE_SIZE as usize);
        for entry in &self.entries {
            raw.extend_from_slice(&entry.to_bytes());
        }
        let written = file.write_at(disk, &raw, 0)?;
        debug_assert_eq!(written, DIRECTORY_FILE_SIZE as usize);
        Ok(())
    }

    /// The header sector of the in-use entry named `name`, if present.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.find_entry(name).map(|e| e.sector)
    }

    /// The in-use entry named `name`, if present.
    pub fn find_entry(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries
            .iter()
            .find(|e| e.in_use && e.name == name)
    }

    /// Adds an entry. Fails when the name is over-long, already present,
    /// or the table is full.
    pub fn add(&mut self, name: &str, sector: u32, is_file: bool) -> Result<(), Error> {
        if name.len() > FILE_NAME_MAX_LEN {
            return Err(Error::NameTooLong {
                name: name.to_string(),
            });
        }
        if self.find(name).is_some() {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }
        let Some(slot) = self.entries.iter_mut().find(|e| !e.in_use) else {
            return Err(Error::DirectoryFull {
                name: name.to_string(),
            });
        };
        *slot = DirectoryEntry {
            in_use: true,
            is_file,
            name: name.to_string(),
            sector,
        };
        Ok(())
    }

    /// Removes the entry named `name`. Returns false when absent.
    pub fn remove(&mut self, name: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.in_use && e.name == name)
        {
            Some(entry) => {
                entry.in_use = false;
                true
            }
            None => false,
        }
    }

    /// True when no entry is in use.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| !e.in_use)
    }

    /// Iterates the in-use entries in table order.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| e.in_use)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::FreeMap;
    use crate::disk::MemDisk;
    use crate::header::FileHeader;

    #[test]
    fn test_add_find_remove() {
        let mut dir = Directory::new();
        assert!(dir.is_empty());

        dir.add("alpha", 10, true).unwrap();
        dir.add("beta", 11, false).unwrap();

        assert_eq!(dir.find("alpha"), Some(10));
        assert!(dir.find_entry("beta").is_some_and(|e| !e.is_file));
        assert_eq!(dir.find("gamma"), None);

        assert!(dir.remove("alpha"));
        assert!(!dir.remove("alpha"));
        assert_eq!(dir.find("alpha"), None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut dir = Directory::new();
        dir.add("same", 1, true).unwrap();
        assert!(matches!(
            dir.add("same", 2, true),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_table_full() {
        let mut dir = Directory::new();
        for i in 0..NUM_DIR_ENTRIES {
            dir.add(&format!("f{i}"), i as u32, true).unwrap();
        }
        assert!(matches!(
            dir.add("overflow", 999, true),
            Err(Error::DirectoryFull { .. })
        ));

        // Removing one frees a slot.
        assert!(dir.remove("f0"));
        dir.add("overflow", 999, true).unwrap();
    }

    #[test]
    fn test_name_length_limit() {
        let mut dir = Directory::new();
        let long = "x".repeat(FILE_NAME_MAX_LEN + 1);
        assert!(matches!(
            dir.add(&long, 1, true),
            Err(Error::NameTooLong { .. })
        ));
        let just_fits = "y".repeat(FILE_NAME_MAX_LEN);
        dir.add(&just_fits, 1, true).unwrap();
    }

    #[test]
    fn test_persistence_round_trip() {
        let mut disk = MemDisk::new();
        let mut map = FreeMap::new();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, DIRECTORY_FILE_SIZE).unwrap();
        let file = OpenFile::from_header(header, 500);

        let mut dir = Directory::new();
        dir.add("kept", 77, true).unwrap();
        dir.add("subdir", 78, false).unwrap();
        dir.write_back(&file, &mut disk).unwrap();

        let loaded = Directory::fetch_from(&file, &mut disk).unwrap();
        assert_eq!(loaded.find("kept"), Some(77));
        let sub = loaded.find_entry("subdir").unwrap();
        assert!(!sub.is_file);
        assert_eq!(sub.sector, 78);
        assert_eq!(loaded.entries().count(), 2);
    }

    #[test]
    fn test_zero_filled_file_reads_as_empty_directory() {
        let mut disk = MemDisk::new();
        let mut map = FreeMap::new();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, DIRECTORY_FILE_SIZE).unwrap();
        let file = OpenFile::from_header(header, 500);

        let dir = Directory::fetch_from(&file, &mut disk).unwrap();
        assert!(dir.is_empty());
    }
}
