// SPDX-License-Identifier: Apache-2.0

//! Thread dispatch: admission into the three ready levels, selection of
//! the next thread, preemption checks, priority aging, and the context
//! switch protocol with delayed destruction.
//!
//! All operations require a [`CriticalSection`] token; on the simulated
//! uniprocessor that token is the mutual exclusion.

use crate::interrupt::CriticalSection;
use crate::queue::{Discipline, ReadyQueue};
use crate::tcb::{MAX_PRIORITY, MachineState, QueueLevel, Status, ThreadId, ThreadTable};
use crate::Tick;
use tracing::debug;

/// Priority at or above which a thread is admitted to L1.
pub const L1_PRIORITY_FLOOR: u32 = 100;
/// Priority at or above which a thread is admitted to L2.
pub const L2_PRIORITY_FLOOR: u32 = 50;
/// Ready-wait after which a thread's priority is boosted.
pub const AGING_WAIT: Tick = 1500;
/// Priority boost applied by one aging sweep.
pub const AGING_BOOST: u32 = 10;
/// Time slice granted to L3 threads.
pub const L3_TIME_SLICE: Tick = 100;

/// The multi-level feedback-queue scheduler.
///
/// Owns the three ready queues and the identity of the running thread.
/// Thread control blocks themselves live in the [`ThreadTable`]; the
/// queues hold ids only.
#[derive(Debug)]
pub struct Scheduler {
    l1: ReadyQueue,
    l2: ReadyQueue,
    l3: ReadyQueue,
    current: Option<ThreadId>,
    to_be_destroyed: Option<ThreadId>,
}

impl Scheduler {
    /// Creates a scheduler with empty ready queues and no running thread.
    pub fn new() -> Self {
        Scheduler {
            l1: ReadyQueue::new(Discipline::Srtf),
            l2: ReadyQueue::new(Discipline::PriorityDesc),
            l3: ReadyQueue::new(Discipline::Fifo),
            current: None,
            to_be_destroyed: None,
        }
    }

    /// The thread currently on the CPU, if any.
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Dispatches `next` onto an idle CPU: at boot, or after
    /// [`Scheduler::park_current`] left nothing running.
    ///
    /// Reclaims any carcass left by a finishing thread before restoring
    /// the incoming thread's user state.
    pub fn dispatch_idle(
        &mut self,
        threads: &mut ThreadTable,
        machine: &mut MachineState,
        next: ThreadId,
        now: Tick,
        _cs: &CriticalSection<'_>,
    ) {
        assert!(self.current.is_none(), "a thread is already running");
        let tcb = threads.thread_mut(next);
        tcb.set_status(Status::Running);
        tcb.on_dispatched(now);
        self.current = Some(next);
        debug!(tick = now, thread = %next, "dispatched onto idle CPU");

        self.check_to_be_destroyed(threads);
        if threads.thread(next).has_user_state() {
            threads.thread(next).restore_user_state(machine);
        }
    }

    /// Takes the running thread off the CPU without dispatching a
    /// successor, leaving the CPU idle.
    ///
    /// Preconditions match [`Scheduler::run`]: the caller has already
    /// moved the thread out of RUNNING. With `finishing` set the thread is
    /// queued for destruction; it is reclaimed on the next dispatch.
    pub fn park_current(
        &mut self,
        threads: &mut ThreadTable,
        machine: &mut MachineState,
        finishing: bool,
        _cs: &CriticalSection<'_>,
    ) {
        let old = self
            .current
            .take()
            .expect("park_current() without a current thread");
        assert_ne!(
            threads.thread(old).status(),
            Status::Running,
            "outgoing thread must have left RUNNING before park_current()"
        );
        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "a previous carcass was never reclaimed"
            );
            self.to_be_destroyed = Some(old);
        }
        if threads.thread(old).has_user_state() {
            threads.thread_mut(old).save_user_state(machine);
        }
    }

    /// Marks a thread READY and inserts it into the level its priority
    /// selects.
    pub fn ready_to_run(
        &mut self,
        threads: &mut ThreadTable,
        tid: ThreadId,
        now: Tick,
        _cs: &CriticalSection<'_>,
    ) {
        let tcb = threads.thread_mut(tid);
        if tcb.status() == Status::JustCreated {
            tcb.on_first_ready();
        }
        tcb.set_status(Status::Ready);
        tcb.on_ready(now);

        let level = level_for_priority(tcb.priority);
        tcb.level = Some(level);
        match level {
            QueueLevel::L1 => self.l1.insert(tid, threads),
            QueueLevel::L2 => self.l2.insert(tid, threads),
            QueueLevel::L3 => self.l3.insert(tid, threads),
        }
        debug!(tick = now, thread = %tid, queue = %level, "thread inserted into ready queue");
    }

    /// Removes and returns the next thread to dispatch: head of L1, else
    /// L2, else L3, else none. Removal is atomic with selection.
    ///
    /// The thread's `level` field is left pointing at the queue it came
    /// from; the preemption checks compare against it while the thread
    /// runs.
    pub fn find_next_to_run(&mut self, now: Tick, _cs: &CriticalSection<'_>) -> Option<ThreadId> {
        let (tid, level) = if let Some(tid) = self.l1.pop_front() {
            (tid, QueueLevel::L1)
        } else if let Some(tid) = self.l2.pop_front() {
            (tid, QueueLevel::L2)
        } else if let Some(tid) = self.l3.pop_front() {
            (tid, QueueLevel::L3)
        } else {
            return None;
        };
        debug!(tick = now, thread = %tid, queue = %level, "thread removed from ready queue");
        Some(tid)
    }

    /// Dispatches the CPU to `next`.
    ///
    /// Preconditions: interrupts are off (the token) and the caller has
    /// already moved the outgoing thread out of RUNNING (to READY,
    /// BLOCKED, or ZOMBIE). When `finishing` is set the outgoing thread is
    /// queued for destruction, which happens only after `next` is
    /// installed: the outgoing state is in use until the switch completes.
    pub fn run(
        &mut self,
        threads: &mut ThreadTable,
        machine: &mut MachineState,
        next: ThreadId,
        finishing: bool,
        now: Tick,
        _cs: &CriticalSection<'_>,
    ) {
        let old = self
            .current
            .take()
            .expect("run() without a current thread");
        assert_ne!(
            threads.thread(old).status(),
            Status::Running,
            "outgoing thread must have left RUNNING before run()"
        );

        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "a previous carcass was never reclaimed"
            );
            self.to_be_destroyed = Some(old);
        }

        if threads.thread(old).has_user_state() {
            threads.thread_mut(old).save_user_state(machine);
        }

        self.current = Some(next);
        let tcb = threads.thread_mut(next);
        tcb.set_status(Status::Running);
        tcb.on_dispatched(now);
        debug!(
            tick = now,
            from = %old,
            to = %next,
            "context switch"
        );

        // The register swap happens here on real hardware; in the
        // simulation installing `next` above is the switch. Everything
        // below runs on the incoming thread's side of it.
        self.check_to_be_destroyed(threads);

        if threads.thread(next).has_user_state() {
            threads.thread(next).restore_user_state(machine);
        }
    }

    /// Reclaims the carcass of a thread that finished on the previous
    /// switch, if there is one.
    pub fn check_to_be_destroyed(&mut self, threads: &mut ThreadTable) {
        if let Some(tid) = self.to_be_destroyed.take() {
            threads.reclaim(tid);
        }
    }

    /// Ages every READY thread, rebuilds the queues, and reports whether
    /// the running thread should now be preempted.
    ///
    /// A thread that has waited at least [`AGING_WAIT`] ticks gains
    /// [`AGING_BOOST`] priority (capped at [`MAX_PRIORITY`]) and restarts
    /// its wait clock. The sweep covers only the ready queues; the running
    /// thread does not age. Afterwards all three queues are rebuilt from
    /// scratch: promotions can move threads across levels, and L1's sort
    /// key may have changed independently.
    pub fn aging(
        &mut self,
        threads: &mut ThreadTable,
        now: Tick,
        cs: &CriticalSection<'_>,
    ) -> bool {
        for queue in [&self.l1, &self.l2, &self.l3] {
            for tid in queue.iter() {
                let tcb = threads.thread_mut(tid);
                if now - tcb.ts_ready >= AGING_WAIT {
                    let old_priority = tcb.priority;
                    tcb.priority = (tcb.priority + AGING_BOOST).min(MAX_PRIORITY);
                    tcb.ts_ready = now;
                    debug!(
                        tick = now,
                        thread = %tid,
                        from = old_priority,
                        to = tcb.priority,
                        "aging boosted thread priority"
                    );
                }
            }
        }
        self.rebuild(threads);
        self.should_preempt(threads, now, cs)
    }

    /// Re-buckets every READY thread per the admission rule, rebuilding
    /// the sort order from scratch.
    fn rebuild(&mut self, threads: &mut ThreadTable) {
        let mut resident: Vec<ThreadId> = Vec::new();
        resident.extend(self.l1.drain());
        resident.extend(self.l2.drain());
        resident.extend(self.l3.drain());

        for tid in resident {
            let level = level_for_priority(threads.thread(tid).priority);
            threads.thread_mut(tid).level = Some(level);
            match level {
                QueueLevel::L1 => self.l1.insert(tid, threads),
                QueueLevel::L2 => self.l2.insert(tid, threads),
                QueueLevel::L3 => self.l3.insert(tid, threads),
            }
        }
    }

    /// True when the running thread must yield the CPU to a ready one.
    pub fn should_preempt(
        &self,
        threads: &ThreadTable,
        now: Tick,
        _cs: &CriticalSection<'_>,
    ) -> bool {
        self.check_preempt_between_queues(threads) || self.check_preempt_within_l1(threads, now)
    }

    /// Cross-queue preemption: a non-empty higher level always wins.
    fn check_preempt_between_queues(&self, threads: &ThreadTable) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let Some(level) = threads.thread(current).level_while_running() else {
            return false;
        };
        (!self.l1.is_empty() && level > QueueLevel::L1)
            || (!self.l2.is_empty() && level > QueueLevel::L2)
    }

    /// Intra-L1 SRTF preemption: the head of L1 wins if its cached
    /// remainder beats the running thread's live remainder, with the lower
    /// id winning an exact tie.
    fn check_preempt_within_l1(&self, threads: &ThreadTable, now: Tick) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let tcb = threads.thread(current);
        if tcb.level_while_running() != Some(QueueLevel::L1) {
            return false;
        }
        let Some(head) = self.l1.front() else {
            return false;
        };
        let c_rem = tcb.running_remainder(now);
        let h_rem = threads.thread(head).rem_burst;
        c_rem > h_rem || (c_rem == h_rem && tcb.id() > head)
    }

    /// True when the running thread must voluntarily yield: only L3
    /// threads time-slice, after [`L3_TIME_SLICE`] ticks. L1 and L2
    /// threads run until they block or a preemption check fires.
    pub fn check_yield(&self, threads: &ThreadTable, now: Tick) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let tcb = threads.thread(current);
        match tcb.level_while_running() {
            Some(QueueLevel::L3) => now - tcb.ts_running >= L3_TIME_SLICE,
            _ => false,
        }
    }

    /// Read-only view of L1, for diagnostics and tests.
    pub fn l1(&self) -> &ReadyQueue {
        &self.l1
    }

    /// Read-only view of L2, for diagnostics and tests.
    pub fn l2(&self) -> &ReadyQueue {
        &self.l2
    }

    /// Read-only view of L3, for diagnostics and tests.
    pub fn l3(&self) -> &ReadyQueue {
        &self.l3
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// The ready level a priority maps to.
fn level_for_priority(priority: u32) -> QueueLevel {
    if priority >= L1_PRIORITY_FLOOR {
        QueueLevel::L1
    } else if priority >= L2_PRIORITY_FLOOR {
        QueueLevel::L2
    } else {
        QueueLevel::L3
    }
}

impl crate::tcb::Tcb {
    /// The level a running thread was dispatched from.
    ///
    /// While RUNNING the `level` field still names the queue the thread
    /// came from, which is what the preemption checks compare against.
    fn level_while_running(&self) -> Option<QueueLevel> {
        self.level
    }
}
