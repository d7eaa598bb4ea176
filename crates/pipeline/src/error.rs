// SPDX-License-Identifier: Apache-2.0

//! Errors for the pipeline crate.

/// Errors that can occur configuring or running the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The pipeline configuration is unusable.
    #[error("Invalid pipeline configuration: {details}")]
    InvalidConfig {
        /// What was wrong.
        details: String,
    },

    /// An I/O error on the input or output file.
    #[error("Pipeline I/O error: {source}")]
    Io {
        /// The underlying OS error.
        #[from]
        source: std::io::Error,
    },

    /// An input line could not be parsed into an item.
    #[error("Input line {line}: {details}")]
    Parse {
        /// 1-based line number.
        line: u64,
        /// What was wrong with the line.
        details: String,
    },

    /// The input ran out before the requested item count.
    #[error("Input exhausted: {expected} items requested, {got} available")]
    InputExhausted {
        /// Items the run asked for.
        expected: u64,
        /// Items the input actually held.
        got: u64,
    },

    /// Failed to spawn an OS thread.
    #[error("Failed to spawn thread '{thread_name}': {source}")]
    ThreadSpawn {
        /// Name of the thread we attempted to spawn.
        thread_name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("Thread '{thread_name}' panicked: {panic_message}")]
    ThreadPanic {
        /// The thread that panicked.
        thread_name: String,
        /// Panic payload, best effort.
        panic_message: String,
    },
}
