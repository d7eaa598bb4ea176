// SPDX-License-Identifier: Apache-2.0

//! Bounded-queue transform pipeline with an adaptive consumer pool.
//!
//! Topology: one reader thread feeds a pool of producer threads through a
//! bounded queue; producers feed a dynamically-sized pool of consumer
//! threads through a second queue; consumers feed a single writer through
//! a third. A controller thread watches the middle queue's fill fraction
//! and grows or shrinks the consumer pool between watermarks.
//!
//! End-of-stream travels the reader queue as an in-band sentinel that
//! each producer re-sows for its siblings. Downstream, the dynamic pool
//! shuts down through the queues' close semantics once the writer has
//! emitted its quota, so no stage ever waits on a peer that already left.

pub mod config;
mod controller;
mod engine;
pub mod error;
mod item;
mod stages;

pub use config::PipelineConfig;
pub use engine::{PipelineReport, run};
pub use item::{DefaultTransform, Item, Message, Transform};
