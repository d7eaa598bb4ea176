// SPDX-License-Identifier: Apache-2.0

//! Thread control blocks and the table that owns them.

use crate::Tick;
use crate::error::Error;
use std::fmt;

/// Highest valid thread priority.
pub const MAX_PRIORITY: u32 = 149;

/// Size of the saved user-mode register file.
///
/// Sized for the largest register set of the simulated architectures.
pub const NUM_USER_REGS: usize = 40;

/// User-mode machine registers, shared by whichever thread is running.
#[derive(Debug, Clone)]
pub struct MachineState {
    /// The user-level CPU register file.
    pub user_regs: [i32; NUM_USER_REGS],
}

impl MachineState {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        MachineState {
            user_regs: [0; NUM_USER_REGS],
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Allocated but never admitted to a ready queue.
    JustCreated,
    /// Currently on the CPU. Exactly one thread is in this state.
    Running,
    /// Resident in exactly one of the three ready queues.
    Ready,
    /// Waiting on an event; not schedulable.
    Blocked,
    /// Finished; carcass awaiting reclamation after the next switch.
    Zombie,
}

/// Which ready queue a thread is resident in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueLevel {
    /// Preemptive SRTF level.
    L1,
    /// Priority-ordered level.
    L2,
    /// Round-robin FIFO level.
    L3,
}

impl fmt::Display for QueueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueLevel::L1 => write!(f, "1"),
            QueueLevel::L2 => write!(f, "2"),
            QueueLevel::L3 => write!(f, "3"),
        }
    }
}

/// Stable identity of a thread, assigned at spawn and never reused.
///
/// Ids double as the tie-break key in every queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(
    /// Raw index into the thread table.
    pub usize,
);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A thread control block.
///
/// Burst accounting mirrors the estimator contract: `curr_burst` is the
/// exponentially-smoothed burst length, `total_running` the CPU ticks
/// consumed within the current burst, and `rem_burst` the cached
/// difference, recomputed only on RUNNING → READY and RUNNING → BLOCKED
/// transitions.
#[derive(Debug, Clone)]
pub struct Tcb {
    id: ThreadId,
    name: String,
    status: Status,
    /// Scheduling priority in `[0, MAX_PRIORITY]`.
    pub priority: u32,
    /// Queue of residence while READY. While RUNNING this still names the
    /// queue the thread was dispatched from, which is what the preemption
    /// checks compare against.
    pub level: Option<QueueLevel>,
    /// Smoothing weight `w` of the burst estimator, in (0, 1).
    pub weight: f64,
    /// Exponentially-smoothed estimated burst length, in ticks.
    pub curr_burst: f64,
    /// CPU ticks accumulated within the current (unfinished) burst.
    pub total_running: u64,
    /// Cached `curr_burst - total_running`.
    pub rem_burst: f64,
    /// Tick at which the thread most recently entered READY.
    pub ts_ready: Tick,
    /// Tick at which the thread most recently entered RUNNING.
    pub ts_running: Tick,
    /// Saved user-mode registers; `None` for pure kernel threads.
    user_regs: Option<[i32; NUM_USER_REGS]>,
}

impl Tcb {
    fn new(id: ThreadId, name: String, priority: u32, weight: f64) -> Self {
        Tcb {
            id,
            name,
            status: Status::JustCreated,
            priority,
            level: None,
            weight,
            curr_burst: 0.0,
            total_running: 0,
            rem_burst: 0.0,
            ts_ready: 0,
            ts_running: 0,
            user_regs: None,
        }
    }

    /// The thread's stable id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The thread's debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Sets the lifecycle status.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Attaches a user-mode register file, marking this a user thread.
    pub fn attach_user_state(&mut self) {
        self.user_regs = Some([0; NUM_USER_REGS]);
    }

    /// True when this thread carries user-mode state.
    pub fn has_user_state(&self) -> bool {
        self.user_regs.is_some()
    }

    /// Saves the machine's user registers into this thread.
    pub fn save_user_state(&mut self, machine: &MachineState) {
        if let Some(regs) = self.user_regs.as_mut() {
            *regs = machine.user_regs;
        }
    }

    /// Restores this thread's saved user registers into the machine.
    pub fn restore_user_state(&self, machine: &mut MachineState) {
        if let Some(regs) = self.user_regs.as_ref() {
            machine.user_regs = *regs;
        }
    }

    /// JUST_CREATED → READY: the estimator starts from zero.
    pub fn on_first_ready(&mut self) {
        self.curr_burst = 0.0;
        self.total_running = 0;
        self.rem_burst = 0.0;
    }

    /// Entering READY at `now`.
    pub fn on_ready(&mut self, now: Tick) {
        self.ts_ready = now;
    }

    /// Entering RUNNING at `now`.
    pub fn on_dispatched(&mut self, now: Tick) {
        self.ts_running = now;
    }

    /// RUNNING → READY (preemption) at `now`.
    ///
    /// The burst is not finished, so the smoothed estimate is left alone;
    /// only the consumed time and the cached remainder move.
    pub fn on_preempted(&mut self, now: Tick) {
        self.total_running += now - self.ts_running;
        self.rem_burst = self.curr_burst - self.total_running as f64;
    }

    /// RUNNING → BLOCKED at `now`: the burst is complete, fold it into the
    /// smoothed estimate.
    pub fn on_blocked(&mut self, now: Tick) {
        self.total_running += now - self.ts_running;
        self.curr_burst =
            self.weight * self.total_running as f64 + (1.0 - self.weight) * self.curr_burst;
        self.rem_burst = self.curr_burst;
        self.total_running = 0;
    }

    /// Remaining burst estimate of the running thread as of `now`, without
    /// committing any state transition.
    pub fn running_remainder(&self, now: Tick) -> f64 {
        self.curr_burst - ((now - self.ts_running) + self.total_running) as f64
    }
}

/// Arena of thread control blocks.
///
/// Slots are addressed by [`ThreadId`]; reclaimed slots are emptied but
/// never reused, so ids stay stable for the lifetime of the table.
#[derive(Debug, Default)]
pub struct ThreadTable {
    slots: Vec<Option<Tcb>>,
}

impl ThreadTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        ThreadTable { slots: Vec::new() }
    }

    /// Allocates a new thread in the JUST_CREATED state.
    pub fn spawn(&mut self, name: impl Into<String>, priority: u32, weight: f64) -> Result<ThreadId, Error> {
        if priority > MAX_PRIORITY {
            return Err(Error::InvalidPriority { priority });
        }
        if !(weight > 0.0 && weight < 1.0) {
            return Err(Error::InvalidWeight { weight });
        }
        let id = ThreadId(self.slots.len());
        self.slots.push(Some(Tcb::new(id, name.into(), priority, weight)));
        Ok(id)
    }

    /// Borrows a live thread. Panics if the id was reclaimed: touching a
    /// destroyed thread is a precondition violation, not a recoverable
    /// error.
    pub fn thread(&self, id: ThreadId) -> &Tcb {
        self.slots[id.0]
            .as_ref()
            .expect("thread control block already reclaimed")
    }

    /// Mutably borrows a live thread. Panics if the id was reclaimed.
    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Tcb {
        self.slots[id.0]
            .as_mut()
            .expect("thread control block already reclaimed")
    }

    /// Frees a finished thread's control block.
    pub fn reclaim(&mut self, id: ThreadId) {
        let slot = &mut self.slots[id.0];
        debug_assert!(
            slot.as_ref().is_some_and(|t| t.status() == Status::Zombie),
            "only zombie threads may be reclaimed"
        );
        *slot = None;
    }

    /// True when the id still refers to a live control block.
    pub fn is_live(&self, id: ThreadId) -> bool {
        self.slots.get(id.0).is_some_and(Option::is_some)
    }

    /// Iterates over the live control blocks.
    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
