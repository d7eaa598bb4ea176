// SPDX-License-Identifier: Apache-2.0

//! Top-level errors for the `minos` binary.

use miette::Diagnostic;
use std::path::PathBuf;

/// Errors surfaced to the command line.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum Error {
    /// A file-system operation failed.
    #[error("File system error: {0}")]
    Fs(#[from] minos_fs::Error),

    /// A pipeline run failed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] minos_pipeline::error::Error),

    /// A scheduler simulation could not be built.
    #[error("Scheduler error: {0}")]
    Sched(#[from] minos_sched::error::Error),

    /// A configuration file could not be read or parsed.
    #[error("Failed to load config '{path}': {details}")]
    Config {
        /// The config file path.
        path: PathBuf,
        /// What went wrong.
        details: String,
    },

    /// A host-side I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying OS error.
        #[from]
        source: std::io::Error,
    },
}
