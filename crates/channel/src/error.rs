// SPDX-License-Identifier: Apache-2.0

//! Errors for the bounded queue.

/// Errors that can occur sending items to a queue.
#[derive(thiserror::Error, Debug)]
pub enum SendError<T> {
    /// The queue is full and the item could not be sent without blocking.
    #[error("Queue is full and the item could not be sent")]
    Full(T),

    /// The queue is closed and the item could not be sent.
    #[error("Queue is closed and the item could not be sent")]
    Closed(T),
}

impl<T> SendError<T> {
    /// Returns the item that failed to send, whatever the reason.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(t) => t,
            Self::Closed(t) => t,
        }
    }
}

/// Errors that can occur receiving items from a queue.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RecvError {
    /// The queue is closed and fully drained.
    #[error("The queue is closed")]
    Closed,

    /// The queue is empty and no item could be received without blocking.
    #[error("The queue is empty")]
    Empty,
}
