// SPDX-License-Identifier: Apache-2.0

//! Multi-level feedback-queue scheduler for a uniprocessor simulation.
//!
//! Three ready levels: L1 is preemptive Shortest-Remaining-Time-First over
//! an exponentially-smoothed burst estimate, L2 is priority order, L3 is a
//! round-robin FIFO with a fixed time slice. Long-waiting ready threads are
//! periodically aged into higher levels so nothing starves.
//!
//! The scheduler assumes it runs with interrupts disabled; mutual exclusion
//! is expressed as a [`CriticalSection`] token that every operation takes,
//! produced by [`Interrupts::disable`]. No locks are used internally:
//! waiting on a lock would itself call back into the scheduler.

pub mod error;
mod interrupt;
mod queue;
mod scheduler;
pub mod sim;
mod tcb;

pub use interrupt::{CriticalSection, IntLevel, Interrupts};
pub use queue::{Discipline, ReadyQueue};
pub use scheduler::{
    AGING_BOOST, AGING_WAIT, L1_PRIORITY_FLOOR, L2_PRIORITY_FLOOR, L3_TIME_SLICE, Scheduler,
};
pub use tcb::{
    MAX_PRIORITY, MachineState, NUM_USER_REGS, QueueLevel, Status, Tcb, ThreadId, ThreadTable,
};

/// Simulation time, in ticks.
pub type Tick = u64;
