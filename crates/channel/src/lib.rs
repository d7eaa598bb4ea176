// SPDX-License-Identifier: Apache-2.0

//! Bounded blocking MPMC queue.
//!
//! The queue is the only synchronisation primitive the transform pipeline
//! uses: one mutex plus two condition variables (not-full, not-empty).
//! `send` blocks while the queue is full, `recv` blocks while it is empty,
//! and items come out in strict FIFO order. Blocked operations cannot be
//! cancelled; end-of-stream is signalled in band by the callers.

pub mod error;
mod mpmc;

pub use mpmc::{Receiver, Sender, bounded};
