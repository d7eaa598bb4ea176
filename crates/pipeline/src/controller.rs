// SPDX-License-Identifier: Apache-2.0

//! The adaptive consumer-pool controller.
//!
//! A dedicated thread samples the worker queue's fill fraction every
//! `check_period`. Above the high watermark it spawns one consumer;
//! below the low watermark it signals one consumer to terminate after
//! its next item, never dropping the pool below one active consumer.
//! When the writer raises the completion signal the controller closes
//! the worker queue, drains the pool, and joins every consumer.

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::item::{Message, Transform};
use crate::stages::{CompletionSignal, ConsumerHandle, join_thread, spawn_consumer, spawn_named};
use minos_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use tracing::info;

/// What one controller evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolAction {
    /// Spawn one additional consumer.
    Grow,
    /// Signal one consumer to terminate after its next item.
    Shrink,
    /// Leave the pool alone.
    Hold,
}

/// The watermark rule: grow above `high`, shrink below `low` while at
/// least two consumers are active.
pub(crate) fn pool_action(fill: f64, active: usize, low: f64, high: f64) -> PoolAction {
    if fill > high {
        PoolAction::Grow
    } else if fill < low && active >= 2 {
        PoolAction::Shrink
    } else {
        PoolAction::Hold
    }
}

/// Controller outcome.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControllerReport {
    /// Consumers spawned over the run, initial pool included.
    pub(crate) spawned: usize,
    /// Shrink signals issued.
    pub(crate) cancelled: usize,
}

/// Spawns the controller thread, which owns the consumer pool for the
/// whole run.
pub(crate) fn spawn_controller(
    worker_rx: Receiver<Message>,
    worker_tx: Sender<Message>,
    writer_tx: Sender<Message>,
    transform: Arc<dyn Transform>,
    completion: Arc<CompletionSignal>,
    config: PipelineConfig,
) -> Result<JoinHandle<Result<ControllerReport, Error>>, Error> {
    spawn_named("controller", move || {
        let mut pool: Vec<ConsumerHandle> = Vec::new();
        let mut next_index = 0usize;
        let mut cancelled = 0usize;

        for _ in 0..config.initial_consumers {
            pool.push(spawn_consumer(
                next_index,
                worker_rx.clone(),
                writer_tx.clone(),
                transform.clone(),
            )?);
            next_index += 1;
        }

        loop {
            if completion.wait_timeout(config.check_period) {
                break;
            }
            let fill = worker_rx.len() as f64 / worker_rx.capacity() as f64;
            let active = pool
                .iter()
                .filter(|c| !c.cancel.load(Ordering::SeqCst))
                .count();
            match pool_action(fill, active, config.low_watermark, config.high_watermark) {
                PoolAction::Grow => {
                    info!(fill, active, "worker queue over high watermark, growing pool");
                    pool.push(spawn_consumer(
                        next_index,
                        worker_rx.clone(),
                        writer_tx.clone(),
                        transform.clone(),
                    )?);
                    next_index += 1;
                }
                PoolAction::Shrink => {
                    info!(fill, active, "worker queue under low watermark, shrinking pool");
                    if let Some(consumer) =
                        pool.iter().find(|c| !c.cancel.load(Ordering::SeqCst))
                    {
                        consumer.cancel.store(true, Ordering::SeqCst);
                        cancelled += 1;
                    }
                }
                PoolAction::Hold => {}
            }
        }

        // The writer is done. Close the worker queue so consumers parked
        // on an empty queue drain out, then collect the pool.
        worker_tx.close();
        for consumer in pool {
            let _ = join_thread(&consumer.name, consumer.handle)?;
        }
        Ok(ControllerReport {
            spawned: next_index,
            cancelled,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_above_high_watermark() {
        assert_eq!(pool_action(0.9, 1, 0.2, 0.8), PoolAction::Grow);
        // Exactly at the watermark holds.
        assert_eq!(pool_action(0.8, 1, 0.2, 0.8), PoolAction::Hold);
    }

    #[test]
    fn test_shrink_below_low_watermark_with_floor() {
        assert_eq!(pool_action(0.1, 3, 0.2, 0.8), PoolAction::Shrink);
        assert_eq!(pool_action(0.1, 2, 0.2, 0.8), PoolAction::Shrink);
        // The last active consumer is never cancelled.
        assert_eq!(pool_action(0.1, 1, 0.2, 0.8), PoolAction::Hold);
        // Exactly at the watermark holds.
        assert_eq!(pool_action(0.2, 5, 0.2, 0.8), PoolAction::Hold);
    }

    /// Three consecutive low-watermark checks against a pool of three:
    /// one cancel per check until the floor binds, two cancels in total.
    #[test]
    fn test_consecutive_shrinks_respect_floor() {
        let mut active = 3usize;
        let mut cancels = 0usize;
        for _ in 0..3 {
            if pool_action(0.05, active, 0.2, 0.8) == PoolAction::Shrink {
                active -= 1;
                cancels += 1;
            }
        }
        assert_eq!(cancels, 2);
        assert_eq!(active, 1);
    }

    #[test]
    fn test_mid_band_holds() {
        assert_eq!(pool_action(0.5, 4, 0.2, 0.8), PoolAction::Hold);
    }
}
