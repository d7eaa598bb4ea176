// SPDX-License-Identifier: Apache-2.0

//! The file system proper: boot layout, path resolution, and the
//! create / open / remove / list operations.
//!
//! Sector 0 holds the free-map file header and sector 1 the root
//! directory file header, so everything is reachable from a freshly
//! opened image. Both files stay open for the life of the system.
//!
//! Operations that modify metadata flush the directory and bitmap back to
//! disk only after every step has succeeded; on failure the in-memory
//! copies are dropped and the on-disk state is untouched.

use crate::bitmap::FreeMap;
use crate::directory::Directory;
use crate::disk::SectorDisk;
use crate::error::Error;
use crate::file::OpenFile;
use crate::header::FileHeader;
use crate::{
    DIRECTORY_FILE_SIZE, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, ROOT_DIRECTORY_SECTOR,
};
use tracing::debug;

/// Identifier for an entry in the open-file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFileId(
    /// Slot index in the open-file table.
    pub usize,
);

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Entry name.
    pub name: String,
    /// True for a regular file.
    pub is_file: bool,
    /// Nesting depth below the listed directory, zero for direct entries.
    pub depth: usize,
}

/// The file system over a sector disk.
#[derive(Debug)]
pub struct FileSystem<D: SectorDisk> {
    disk: D,
    free_map_file: OpenFile,
    directory_file: OpenFile,
    open_files: Vec<Option<OpenFile>>,
}

impl<D: SectorDisk> FileSystem<D> {
    /// Formats a blank disk: claims the boot sectors, allocates the
    /// free-map and root-directory files, and flushes both.
    pub fn format(mut disk: D) -> Result<Self, Error> {
        debug!("formatting the file system");
        let mut free_map = FreeMap::new();
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIRECTORY_SECTOR);

        let mut map_header = FileHeader::new();
        map_header.allocate(&mut free_map, &mut disk, FREE_MAP_FILE_SIZE)?;
        let mut dir_header = FileHeader::new();
        dir_header.allocate(&mut free_map, &mut disk, DIRECTORY_FILE_SIZE)?;

        // Headers must hit the disk before the files are usable.
        map_header.write_back(&mut disk, FREE_MAP_SECTOR)?;
        dir_header.write_back(&mut disk, ROOT_DIRECTORY_SECTOR)?;

        let free_map_file = OpenFile::from_header(map_header, FREE_MAP_SECTOR);
        let directory_file = OpenFile::from_header(dir_header, ROOT_DIRECTORY_SECTOR);

        free_map.write_back(&free_map_file, &mut disk)?;
        Directory::new().write_back(&directory_file, &mut disk)?;

        Ok(FileSystem {
            disk,
            free_map_file,
            directory_file,
            open_files: Vec::new(),
        })
    }

    /// Mounts an already-formatted disk by opening the two boot files.
    pub fn mount(mut disk: D) -> Result<Self, Error> {
        let free_map_file = OpenFile::open(&mut disk, FREE_MAP_SECTOR)?;
        let directory_file = OpenFile::open(&mut disk, ROOT_DIRECTORY_SECTOR)?;
        if free_map_file.length() != FREE_MAP_FILE_SIZE
            || directory_file.length() != DIRECTORY_FILE_SIZE
        {
            return Err(Error::InvalidImage {
                details: "boot sectors do not hold free-map and directory files".to_string(),
            });
        }
        Ok(FileSystem {
            disk,
            free_map_file,
            directory_file,
            open_files: Vec::new(),
        })
    }

    /// Gives back the underlying disk, consuming the file system.
    pub fn into_disk(self) -> D {
        self.disk
    }

    /// Splits a path into components, rejecting empty paths.
    fn components(path: &str) -> Result<Vec<&str>, Error> {
        let parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if parts.is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(parts)
    }

    /// Resolves every non-final component of `path` from the root.
    ///
    /// Returns the directory that should contain the leaf, the open file
    /// it was loaded from (needed for write-back), and the leaf name.
    /// Every traversed component must name an in-use subdirectory entry.
    fn resolve_prefix(&mut self, path: &str) -> Result<(Directory, OpenFile, String), Error> {
        let parts = Self::components(path)?;
        let mut dir_file = self.directory_file.clone();
        let mut directory = Directory::fetch_from(&dir_file, &mut self.disk)?;

        for component in &parts[..parts.len() - 1] {
            let entry = directory
                .find_entry(component)
                .ok_or_else(|| Error::NotFound {
                    name: (*component).to_string(),
                })?;
            if entry.is_file {
                return Err(Error::NotADirectory {
                    name: (*component).to_string(),
                });
            }
            dir_file = OpenFile::open(&mut self.disk, entry.sector)?;
            directory = Directory::fetch_from(&dir_file, &mut self.disk)?;
        }
        let leaf = (*parts.last().expect("components() rejects empty paths")).to_string();
        Ok((directory, dir_file, leaf))
    }

    /// Creates a file of `size` bytes at `path`.
    pub fn create(&mut self, path: &str, size: u32) -> Result<(), Error> {
        self.create_entry(path, size, true)
    }

    /// Creates an empty subdirectory at `path`.
    pub fn create_dir(&mut self, path: &str) -> Result<(), Error> {
        // A zero-filled directory file is an empty table, so allocation's
        // zero-fill doubles as initialisation.
        self.create_entry(path, DIRECTORY_FILE_SIZE, false)
    }

    fn create_entry(&mut self, path: &str, size: u32, is_file: bool) -> Result<(), Error> {
        let (mut directory, dir_file, leaf) = self.resolve_prefix(path)?;
        if directory.find(&leaf).is_some() {
            return Err(Error::AlreadyExists { name: leaf });
        }

        let mut free_map = FreeMap::fetch_from(&self.free_map_file, &mut self.disk)?;
        let sector = free_map.find_and_set().ok_or(Error::DiskFull {
            needed: 1,
            available: 0,
        })?;
        directory.add(&leaf, sector, is_file)?;

        let mut header = FileHeader::new();
        header.allocate(&mut free_map, &mut self.disk, size)?;

        // Everything worked; flush all changes back to disk.
        header.write_back(&mut self.disk, sector)?;
        directory.write_back(&dir_file, &mut self.disk)?;
        free_map.write_back(&self.free_map_file, &mut self.disk)?;
        debug!(path, sector, size, is_file, "created directory entry");
        Ok(())
    }

    /// Opens the file at `path`, returning a positioned handle.
    pub fn open(&mut self, path: &str) -> Result<OpenFile, Error> {
        let (directory, _, leaf) = self.resolve_prefix(path)?;
        let sector = directory
            .find(&leaf)
            .ok_or(Error::NotFound { name: leaf })?;
        OpenFile::open(&mut self.disk, sector)
    }

    /// Opens the file at `path` into the open-file table, returning its
    /// id.
    pub fn open_id(&mut self, path: &str) -> Result<OpenFileId, Error> {
        let file = self.open(path)?;
        let slot = self.open_files.iter().position(Option::is_none);
        let index = match slot {
            Some(index) => {
                self.open_files[index] = Some(file);
                index
            }
            None => {
                self.open_files.push(Some(file));
                self.open_files.len() - 1
            }
        };
        Ok(OpenFileId(index))
    }

    fn table_entry(&mut self, id: OpenFileId) -> Result<&mut OpenFile, Error> {
        self.open_files
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::BadFileId { id: id.0 })
    }

    /// Reads from an open file at its cursor, advancing it.
    pub fn read_id(&mut self, id: OpenFileId, buf: &mut [u8]) -> Result<usize, Error> {
        let Some(file) = self.open_files.get_mut(id.0).and_then(Option::as_mut) else {
            return Err(Error::BadFileId { id: id.0 });
        };
        file.read(&mut self.disk, buf)
    }

    /// Writes to an open file at its cursor, advancing it.
    pub fn write_id(&mut self, id: OpenFileId, buf: &[u8]) -> Result<usize, Error> {
        let Some(file) = self.open_files.get_mut(id.0).and_then(Option::as_mut) else {
            return Err(Error::BadFileId { id: id.0 });
        };
        file.write(&mut self.disk, buf)
    }

    /// Closes an open file. The id must name a live table entry.
    pub fn close_id(&mut self, id: OpenFileId) -> Result<(), Error> {
        let _ = self.table_entry(id)?;
        self.open_files[id.0] = None;
        Ok(())
    }

    /// Removes the file or empty directory at `path`, returning its
    /// sectors to the free map.
    pub fn remove(&mut self, path: &str) -> Result<(), Error> {
        let (mut directory, dir_file, leaf) = self.resolve_prefix(path)?;
        let entry = directory
            .find_entry(&leaf)
            .ok_or(Error::NotFound { name: leaf.clone() })?
            .clone();

        if !entry.is_file {
            let sub_file = OpenFile::open(&mut self.disk, entry.sector)?;
            let sub = Directory::fetch_from(&sub_file, &mut self.disk)?;
            if !sub.is_empty() {
                return Err(Error::DirectoryNotEmpty { name: leaf });
            }
        }

        let header = FileHeader::fetch_from(&mut self.disk, entry.sector)?;
        let mut free_map = FreeMap::fetch_from(&self.free_map_file, &mut self.disk)?;
        header.deallocate(&mut free_map, &mut self.disk)?;
        free_map.clear(entry.sector);
        let removed = directory.remove(&leaf);
        debug_assert!(removed, "entry vanished during remove");

        free_map.write_back(&self.free_map_file, &mut self.disk)?;
        directory.write_back(&dir_file, &mut self.disk)?;
        debug!(path, sector = entry.sector, "removed directory entry");
        Ok(())
    }

    /// Lists the directory at `path` ("/" for the root). With `recursive`
    /// set, descends into subdirectories, reporting nesting depth.
    pub fn list(&mut self, path: &str, recursive: bool) -> Result<Vec<ListEntry>, Error> {
        let mut dir_file = self.directory_file.clone();
        let mut directory = Directory::fetch_from(&dir_file, &mut self.disk)?;

        for component in path.split('/').filter(|c| !c.is_empty()) {
            let entry = directory
                .find_entry(component)
                .ok_or_else(|| Error::NotFound {
                    name: component.to_string(),
                })?;
            if entry.is_file {
                return Err(Error::NotADirectory {
                    name: component.to_string(),
                });
            }
            dir_file = OpenFile::open(&mut self.disk, entry.sector)?;
            directory = Directory::fetch_from(&dir_file, &mut self.disk)?;
        }

        let mut out = Vec::new();
        self.list_into(&directory, recursive, 0, &mut out)?;
        Ok(out)
    }

    fn list_into(
        &mut self,
        directory: &Directory,
        recursive: bool,
        depth: usize,
        out: &mut Vec<ListEntry>,
    ) -> Result<(), Error> {
        for entry in directory.entries().cloned().collect::<Vec<_>>() {
            out.push(ListEntry {
                name: entry.name.clone(),
                is_file: entry.is_file,
                depth,
            });
            if recursive && !entry.is_file {
                let sub_file = OpenFile::open(&mut self.disk, entry.sector)?;
                let sub = Directory::fetch_from(&sub_file, &mut self.disk)?;
                self.list_into(&sub, recursive, depth + 1, out)?;
            }
        }
        Ok(())
    }

    /// Free sectors remaining on the mounted disk.
    pub fn free_sectors(&mut self) -> Result<u32, Error> {
        Ok(FreeMap::fetch_from(&self.free_map_file, &mut self.disk)?.num_clear())
    }
}
