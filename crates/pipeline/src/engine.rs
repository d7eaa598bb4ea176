// SPDX-License-Identifier: Apache-2.0

//! Pipeline assembly: builds the queues, spawns every stage, and winds
//! the run down in an order that cannot deadlock.

use crate::config::PipelineConfig;
use crate::controller::spawn_controller;
use crate::error::Error;
use crate::item::{Message, Transform};
use crate::stages::{
    CompletionSignal, join_thread, spawn_producer, spawn_reader, spawn_writer,
};
use minos_channel::{Sender, bounded};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    /// Items the reader pulled from the input.
    pub items_read: u64,
    /// Items the producer pool transformed.
    pub items_produced: u64,
    /// Output lines the writer emitted.
    pub items_written: u64,
    /// Consumers spawned over the run, initial pool included.
    pub consumers_spawned: usize,
    /// Shrink signals the controller issued.
    pub consumers_cancelled: usize,
}

fn queue_capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("capacities validated non-zero")
}

/// Runs the pipeline: `n` items from `input` through both transform
/// stages into `output`.
///
/// Joins every thread before returning, whether the run succeeded or
/// failed; a reader failure terminates the run and is returned after the
/// wind-down.
pub fn run(
    n: u64,
    input: impl Into<PathBuf>,
    output: impl Into<PathBuf>,
    config: &PipelineConfig,
    transform: Arc<dyn Transform>,
) -> Result<PipelineReport, Error> {
    config.validate()?;

    let (reader_tx, reader_rx) = bounded::<Message>(queue_capacity(config.reader_queue_capacity));
    let (worker_tx, worker_rx) = bounded::<Message>(queue_capacity(config.worker_queue_capacity));
    let (writer_tx, writer_rx) = bounded::<Message>(queue_capacity(config.writer_queue_capacity));
    let completion = Arc::new(CompletionSignal::new());

    let writer_handle = spawn_writer(n, output.into(), writer_rx, completion.clone())?;

    let mut producer_handles = Vec::with_capacity(config.producers);
    for index in 0..config.producers {
        producer_handles.push(spawn_producer(
            index,
            reader_rx.clone(),
            reader_tx.clone(),
            worker_tx.clone(),
            transform.clone(),
        )?);
    }

    let controller_handle = spawn_controller(
        worker_rx,
        worker_tx,
        writer_tx.clone(),
        transform,
        completion,
        config.clone(),
    )?;

    let reader_handle = spawn_reader(n, input.into(), reader_tx)?;
    // The stages hold every handle they need; ours would only keep the
    // queues artificially open.
    drop(reader_rx);
    let shutdown_tx: Sender<Message> = writer_tx;

    let read_result = join_thread("reader", reader_handle)?;
    if read_result.is_err() {
        // Fewer than n items will ever arrive: unblock the writer so the
        // whole run can wind down.
        shutdown_tx.close();
    }
    drop(shutdown_tx);

    let mut items_produced = 0u64;
    for (index, handle) in producer_handles.into_iter().enumerate() {
        items_produced += join_thread(&format!("producer-{index}"), handle)?;
    }
    let items_written = join_thread("writer", writer_handle)??;
    let controller_report = join_thread("controller", controller_handle)??;

    let items_read = read_result?;
    let report = PipelineReport {
        items_read,
        items_produced,
        items_written,
        consumers_spawned: controller_report.spawned,
        consumers_cancelled: controller_report.cancelled,
    };
    info!(
        items = report.items_written,
        consumers_spawned = report.consumers_spawned,
        consumers_cancelled = report.consumers_cancelled,
        "pipeline run complete"
    );
    Ok(report)
}
