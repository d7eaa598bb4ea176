// SPDX-License-Identifier: Apache-2.0

//! Errors for the file system crate.
//!
//! Resource exhaustion and missing paths are ordinary results here;
//! precondition violations (out-of-range sectors, double-freed bits) are
//! asserted instead, matching the failure model of the disk layer.

use crate::FILE_NAME_MAX_LEN;

/// Errors that can occur operating on the file system.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An I/O error from the backing disk image.
    #[error("Disk image I/O error: {source}")]
    Io {
        /// The underlying OS error.
        #[from]
        source: std::io::Error,
    },

    /// The disk image file has the wrong shape.
    #[error("Invalid disk image: {details}")]
    InvalidImage {
        /// What was wrong with the image.
        details: String,
    },

    /// Not enough free sectors to satisfy an allocation.
    #[error("Disk is full: {needed} sectors needed, {available} free")]
    DiskFull {
        /// Sectors the allocation requires, chain overhead included.
        needed: u32,
        /// Free sectors currently available.
        available: u32,
    },

    /// The directory table has no free entry.
    #[error("Directory is full, cannot add entry '{name}'")]
    DirectoryFull {
        /// Name of the entry that did not fit.
        name: String,
    },

    /// The target name already exists in the directory.
    #[error("'{name}' already exists")]
    AlreadyExists {
        /// The conflicting name.
        name: String,
    },

    /// A path component does not exist.
    #[error("'{name}' not found")]
    NotFound {
        /// The missing component.
        name: String,
    },

    /// A path component that must be a directory names a regular file.
    #[error("'{name}' is not a directory")]
    NotADirectory {
        /// The offending component.
        name: String,
    },

    /// Refusing to remove a directory that still has entries.
    #[error("Directory '{name}' is not empty")]
    DirectoryNotEmpty {
        /// The non-empty directory.
        name: String,
    },

    /// A name exceeds the fixed directory-entry field.
    #[error("Name '{name}' exceeds the {FILE_NAME_MAX_LEN}-byte limit")]
    NameTooLong {
        /// The over-long name.
        name: String,
    },

    /// A path is empty or otherwise unusable.
    #[error("Invalid path '{path}'")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// An open-file id does not name an open file.
    #[error("File id {id} is not open")]
    BadFileId {
        /// The rejected id.
        id: usize,
    },
}
