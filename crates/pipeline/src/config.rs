// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for one pipeline run.
///
/// The defaults are the classic exercise parameters: queue capacities
/// 200 / 200 / 4000, four producers, watermarks at 20% and 80%, and a
/// one-second controller period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Capacity of the reader → producer queue.
    pub reader_queue_capacity: usize,

    /// Capacity of the producer → consumer queue the controller watches.
    pub worker_queue_capacity: usize,

    /// Capacity of the consumer → writer queue.
    pub writer_queue_capacity: usize,

    /// Fixed producer-pool size.
    pub producers: usize,

    /// Consumers spawned before the controller's first evaluation.
    pub initial_consumers: usize,

    /// Worker-queue fill fraction below which the pool shrinks.
    pub low_watermark: f64,

    /// Worker-queue fill fraction above which the pool grows.
    pub high_watermark: f64,

    /// Time between controller evaluations.
    #[serde(with = "humantime_serde")]
    pub check_period: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            reader_queue_capacity: 200,
            worker_queue_capacity: 200,
            writer_queue_capacity: 4000,
            producers: 4,
            initial_consumers: 1,
            low_watermark: 0.2,
            high_watermark: 0.8,
            check_period: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration.
    ///
    /// Queue capacities must be non-zero and obey
    /// `writer >= worker >= reader`, so backlog shifting downstream can
    /// always drain; the pools must be non-empty; the watermarks must
    /// satisfy `0 <= low < high <= 1`.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |details: String| Err(Error::InvalidConfig { details });

        if self.reader_queue_capacity == 0
            || self.worker_queue_capacity == 0
            || self.writer_queue_capacity == 0
        {
            return invalid("queue capacities must be non-zero".to_string());
        }
        if self.writer_queue_capacity < self.worker_queue_capacity
            || self.worker_queue_capacity < self.reader_queue_capacity
        {
            return invalid(format!(
                "queue capacities must satisfy writer >= worker >= reader, got {} / {} / {}",
                self.writer_queue_capacity, self.worker_queue_capacity, self.reader_queue_capacity
            ));
        }
        if self.producers == 0 {
            return invalid("at least one producer is required".to_string());
        }
        if self.initial_consumers == 0 {
            return invalid("at least one initial consumer is required".to_string());
        }
        if !(0.0..1.0).contains(&self.low_watermark)
            || !(0.0..=1.0).contains(&self.high_watermark)
            || self.low_watermark >= self.high_watermark
        {
            return invalid(format!(
                "watermarks must satisfy 0 <= low < high <= 1, got {} / {}",
                self.low_watermark, self.high_watermark
            ));
        }
        Ok(())
    }
}
