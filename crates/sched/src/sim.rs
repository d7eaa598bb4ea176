// SPDX-License-Identifier: Apache-2.0

//! Deterministic workload simulation driving the scheduler.
//!
//! Stands in for the machine loop of a real kernel: a tick clock, timer
//! "interrupts" that wake sleepers, age the ready queues, and preempt,
//! and threads described as scripts of alternating CPU bursts and
//! blocking waits. When nothing is runnable the CPU is parked, exactly as
//! the real dispatcher idles until an interrupt readies a thread.

use crate::Tick;
use crate::error::Error;
use crate::interrupt::Interrupts;
use crate::scheduler::Scheduler;
use crate::tcb::{MAX_PRIORITY, MachineState, Status, ThreadId, ThreadTable};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

/// One CPU burst of a scripted workload.
#[derive(Debug, Clone)]
pub struct Burst {
    /// Ticks of CPU the burst consumes.
    pub run: Tick,
    /// Ticks the thread then blocks for. Ignored on the final burst: the
    /// thread finishes instead of blocking.
    pub block: Tick,
}

/// A scripted thread: identity, scheduling parameters, and burst script.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    /// Thread name, for traces.
    pub name: String,
    /// Admission priority.
    pub priority: u32,
    /// Burst-estimator smoothing weight.
    pub weight: f64,
    /// Tick at which the thread arrives (first becomes ready).
    pub arrival: Tick,
    /// The burst script. Must be non-empty.
    pub bursts: Vec<Burst>,
}

/// What happened to a thread at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Thread arrived and was admitted to a ready queue.
    Arrived,
    /// Thread was put on the CPU.
    Dispatched,
    /// Thread was preempted or exhausted its slice and re-queued.
    Preempted,
    /// Thread finished a burst and blocked.
    Blocked,
    /// Thread's wait expired and it re-entered a ready queue.
    Woken,
    /// Thread finished its script.
    Finished,
}

impl SimEvent {
    /// Short human-readable label for trace output.
    pub fn label(&self) -> &'static str {
        match self {
            SimEvent::Arrived => "arrived",
            SimEvent::Dispatched => "dispatched",
            SimEvent::Preempted => "preempted",
            SimEvent::Blocked => "blocked",
            SimEvent::Woken => "woken",
            SimEvent::Finished => "finished",
        }
    }
}

/// One entry of the simulation trace.
#[derive(Debug, Clone, Copy)]
pub struct TraceEntry {
    /// The tick the event happened at.
    pub tick: Tick,
    /// The thread involved.
    pub thread: ThreadId,
    /// What happened.
    pub event: SimEvent,
}

/// Result of a simulation run.
#[derive(Debug)]
pub struct SimReport {
    /// Every event, in tick order.
    pub trace: Vec<TraceEntry>,
    /// Completion tick per finished thread, in finish order.
    pub finished: Vec<(ThreadId, String, Tick)>,
    /// The tick the simulation stopped at.
    pub ticks: Tick,
    /// True when every scripted thread ran to completion.
    pub complete: bool,
}

struct Script {
    bursts: Vec<Burst>,
    index: usize,
    ran_in_burst: Tick,
}

impl Script {
    fn current_run(&self) -> Tick {
        self.bursts[self.index].run
    }

    fn is_last_burst(&self) -> bool {
        self.index + 1 == self.bursts.len()
    }
}

/// The simulated kernel: clock, thread table, scheduler, and the event
/// sources that drive them.
pub struct Simulation {
    interrupts: Interrupts,
    threads: ThreadTable,
    scheduler: Scheduler,
    machine: MachineState,
    now: Tick,
    /// Pending arrivals, latest first so due ones pop off the back.
    arrivals: Vec<(Tick, WorkloadSpec)>,
    sleepers: BinaryHeap<Reverse<(Tick, ThreadId)>>,
    scripts: HashMap<ThreadId, Script>,
    live_workers: usize,
    total_workers: usize,
    trace: Vec<TraceEntry>,
}

impl Simulation {
    /// Builds a simulation from workload specs, validating them eagerly.
    pub fn new(specs: Vec<WorkloadSpec>) -> Result<Self, Error> {
        for spec in &specs {
            if spec.priority > MAX_PRIORITY {
                return Err(Error::InvalidPriority {
                    priority: spec.priority,
                });
            }
            if !(spec.weight > 0.0 && spec.weight < 1.0) {
                return Err(Error::InvalidWeight { weight: spec.weight });
            }
            if spec.bursts.is_empty() {
                return Err(Error::EmptyWorkload {
                    name: spec.name.clone(),
                });
            }
        }

        let mut arrivals = specs
            .into_iter()
            .map(|s| (s.arrival, s))
            .collect::<Vec<_>>();
        arrivals.sort_by(|a, b| b.0.cmp(&a.0));
        let total_workers = arrivals.len();

        Ok(Simulation {
            interrupts: Interrupts::new(),
            threads: ThreadTable::new(),
            scheduler: Scheduler::new(),
            machine: MachineState::new(),
            now: 0,
            arrivals,
            sleepers: BinaryHeap::new(),
            scripts: HashMap::new(),
            live_workers: 0,
            total_workers,
            trace: Vec::new(),
        })
    }

    /// Runs until every scripted thread finishes or `max_ticks` elapses.
    pub fn run(mut self, max_ticks: Tick) -> SimReport {
        let mut finished = Vec::new();

        while self.now < max_ticks {
            if self.arrivals.is_empty() && self.live_workers == 0 {
                break;
            }
            self.now += 1;
            let now = self.now;
            let mut preempt = false;

            // Timer side: wake due sleepers, admit due arrivals, age.
            while let Some(&Reverse((due, tid))) = self.sleepers.peek() {
                if due > now {
                    break;
                }
                let _ = self.sleepers.pop();
                {
                    let cs = self.interrupts.disable();
                    self.scheduler.ready_to_run(&mut self.threads, tid, now, &cs);
                    preempt |= self.scheduler.should_preempt(&self.threads, now, &cs);
                }
                self.record(now, tid, SimEvent::Woken);
            }
            while self
                .arrivals
                .last()
                .is_some_and(|(arrival, _)| *arrival <= now)
            {
                let (_, spec) = self.arrivals.pop().expect("checked non-empty");
                let tid = self
                    .threads
                    .spawn(spec.name, spec.priority, spec.weight)
                    .expect("specs validated in new()");
                let _ = self.scripts.insert(
                    tid,
                    Script {
                        bursts: spec.bursts,
                        index: 0,
                        ran_in_burst: 0,
                    },
                );
                self.live_workers += 1;
                {
                    let cs = self.interrupts.disable();
                    self.scheduler.ready_to_run(&mut self.threads, tid, now, &cs);
                    preempt |= self.scheduler.should_preempt(&self.threads, now, &cs);
                }
                self.record(now, tid, SimEvent::Arrived);
            }
            {
                let cs = self.interrupts.disable();
                preempt |= self.scheduler.aging(&mut self.threads, now, &cs);
                preempt |= self.scheduler.check_yield(&self.threads, now);
            }

            if self.scheduler.current().is_none() {
                // CPU is parked; put the best ready thread on it, or let
                // the tick pass idle.
                if !self.try_dispatch(now) {
                    continue;
                }
            } else if preempt {
                self.preempt_current(now);
            }

            // The running thread consumes this tick.
            let current = self
                .scheduler
                .current()
                .expect("a thread was dispatched above");
            let script = self
                .scripts
                .get_mut(&current)
                .expect("every live thread has a script");
            script.ran_in_burst += 1;
            if script.ran_in_burst >= script.current_run() {
                if script.is_last_burst() {
                    self.finish_current(now, &mut finished);
                } else {
                    self.block_current(now);
                }
            }
        }

        SimReport {
            trace: std::mem::take(&mut self.trace),
            complete: finished.len() == self.total_workers,
            finished,
            ticks: self.now,
        }
    }

    /// Dispatches onto a parked CPU. Returns false when nothing is ready.
    fn try_dispatch(&mut self, now: Tick) -> bool {
        let next = {
            let cs = self.interrupts.disable();
            let Some(next) = self.scheduler.find_next_to_run(now, &cs) else {
                return false;
            };
            self.scheduler
                .dispatch_idle(&mut self.threads, &mut self.machine, next, now, &cs);
            next
        };
        self.record(now, next, SimEvent::Dispatched);
        true
    }

    /// Moves the running thread back to a ready queue and dispatches the
    /// preferred successor. The successor is chosen before the preempted
    /// thread is re-queued, so the preempted thread does not compete for
    /// its own replacement.
    fn preempt_current(&mut self, now: Tick) {
        let switched = {
            let cs = self.interrupts.disable();
            let current = self
                .scheduler
                .current()
                .expect("preempt with no current thread");
            match self.scheduler.find_next_to_run(now, &cs) {
                None => None,
                Some(next) => {
                    {
                        let tcb = self.threads.thread_mut(current);
                        tcb.on_preempted(now);
                        tcb.set_status(Status::Ready);
                        debug!(
                            tick = now,
                            thread = %next,
                            replaced = %current,
                            ran = tcb.total_running,
                            "thread selected for execution after preemption"
                        );
                    }
                    self.scheduler.ready_to_run(&mut self.threads, current, now, &cs);
                    self.scheduler
                        .run(&mut self.threads, &mut self.machine, next, false, now, &cs);
                    Some((current, next))
                }
            }
        };
        if let Some((current, next)) = switched {
            self.record(now, current, SimEvent::Preempted);
            self.record(now, next, SimEvent::Dispatched);
        }
    }

    /// Blocks the running thread until its wait expires and parks the
    /// CPU; the next loop iteration redispatches.
    fn block_current(&mut self, now: Tick) {
        let current = {
            let cs = self.interrupts.disable();
            let current = self
                .scheduler
                .current()
                .expect("block with no current thread");
            let script = self.scripts.get_mut(&current).expect("worker script");
            let wake_at = now + script.bursts[script.index].block;
            script.index += 1;
            script.ran_in_burst = 0;

            {
                let tcb = self.threads.thread_mut(current);
                tcb.on_blocked(now);
                tcb.set_status(Status::Blocked);
            }
            self.sleepers.push(Reverse((wake_at, current)));
            self.scheduler
                .park_current(&mut self.threads, &mut self.machine, false, &cs);
            current
        };
        self.record(now, current, SimEvent::Blocked);
        let _ = self.try_dispatch(now);
    }

    /// Finishes the running thread; its carcass is reclaimed on the next
    /// dispatch, after the CPU has left it.
    fn finish_current(&mut self, now: Tick, finished: &mut Vec<(ThreadId, String, Tick)>) {
        let (current, name) = {
            let cs = self.interrupts.disable();
            let current = self
                .scheduler
                .current()
                .expect("finish with no current thread");
            let name = self.threads.thread(current).name().to_string();
            self.threads.thread_mut(current).set_status(Status::Zombie);
            let _ = self.scripts.remove(&current);
            self.live_workers -= 1;
            self.scheduler
                .park_current(&mut self.threads, &mut self.machine, true, &cs);
            (current, name)
        };
        self.record(now, current, SimEvent::Finished);
        finished.push((current, name, now));
        let _ = self.try_dispatch(now);
    }

    fn record(&mut self, tick: Tick, thread: ThreadId, event: SimEvent) {
        self.trace.push(TraceEntry { tick, thread, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, priority: u32, arrival: Tick, bursts: &[(Tick, Tick)]) -> WorkloadSpec {
        WorkloadSpec {
            name: name.to_string(),
            priority,
            weight: 0.5,
            arrival,
            bursts: bursts
                .iter()
                .map(|&(run, block)| Burst { run, block })
                .collect(),
        }
    }

    #[test]
    fn test_single_thread_runs_to_completion() {
        let sim = Simulation::new(vec![spec("solo", 100, 1, &[(10, 5), (10, 0)])]).unwrap();
        let report = sim.run(10_000);
        assert!(report.complete);
        assert_eq!(report.finished.len(), 1);
        assert_eq!(report.finished[0].1, "solo");
    }

    #[test]
    fn test_higher_level_arrival_preempts_lower() {
        let sim = Simulation::new(vec![
            spec("low", 10, 1, &[(400, 0)]),
            spec("high", 120, 50, &[(40, 0)]),
        ])
        .unwrap();
        let report = sim.run(10_000);
        assert!(report.complete);
        // The L1 thread finishes first even though it arrived later.
        assert_eq!(report.finished[0].1, "high");
        assert_eq!(report.finished[1].1, "low");
    }

    #[test]
    fn test_l3_threads_round_robin_on_slice() {
        let sim = Simulation::new(vec![
            spec("a", 10, 1, &[(250, 0)]),
            spec("b", 10, 1, &[(250, 0)]),
        ])
        .unwrap();
        let report = sim.run(10_000);
        assert!(report.complete);
        // Both threads were preempted by the time slice at least once.
        let preempts = |name: &str| {
            let tid = report
                .finished
                .iter()
                .find(|(_, n, _)| n == name)
                .map(|(tid, _, _)| *tid)
                .expect("thread finished");
            report
                .trace
                .iter()
                .filter(|e| e.thread == tid && e.event == SimEvent::Preempted)
                .count()
        };
        assert!(preempts("a") >= 1);
        assert!(preempts("b") >= 1);
    }

    #[test]
    fn test_cpu_parks_while_everyone_blocks() {
        // One thread that blocks for a long stretch: the CPU idles, then
        // the wakeup redispatches it.
        let sim = Simulation::new(vec![spec("napper", 100, 1, &[(5, 200), (5, 0)])]).unwrap();
        let report = sim.run(10_000);
        assert!(report.complete);
        let woken = report
            .trace
            .iter()
            .filter(|e| e.event == SimEvent::Woken)
            .count();
        assert_eq!(woken, 1);
    }

    #[test]
    fn test_rejects_invalid_spec() {
        assert!(Simulation::new(vec![spec("bad", 200, 0, &[(1, 0)])]).is_err());
        assert!(Simulation::new(vec![spec("empty", 10, 0, &[])]).is_err());
    }

    #[test]
    fn test_stops_at_tick_cap() {
        let sim = Simulation::new(vec![spec("long", 100, 1, &[(1_000_000, 0)])]).unwrap();
        let report = sim.run(500);
        assert!(!report.complete);
        assert_eq!(report.ticks, 500);
    }
}
