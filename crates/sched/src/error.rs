// SPDX-License-Identifier: Apache-2.0

//! Errors for the scheduler crate.
//!
//! The scheduler core itself has no recoverable failures; its preconditions
//! (interrupts off, exactly one running thread) are asserted. These errors
//! cover thread admission, where caller input is validated.

use crate::tcb::MAX_PRIORITY;

/// Errors that can occur creating threads.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested priority is outside the valid range.
    #[error("Priority {priority} is outside the valid range [0, {MAX_PRIORITY}]")]
    InvalidPriority {
        /// The rejected priority value.
        priority: u32,
    },

    /// The burst-estimator smoothing weight is outside the open interval (0, 1).
    #[error("Smoothing weight {weight} is outside the open interval (0, 1)")]
    InvalidWeight {
        /// The rejected weight value.
        weight: f64,
    },

    /// A simulated workload has no bursts.
    #[error("Workload '{name}' has an empty burst script")]
    EmptyWorkload {
        /// Name of the offending workload.
        name: String,
    },
}
