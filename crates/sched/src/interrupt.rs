// SPDX-License-Identifier: Apache-2.0

//! Simulated interrupt level and the critical-section token.
//!
//! On the uniprocessor the only mutual-exclusion mechanism the scheduler
//! has is disabling interrupts. The simulation keeps the same shape: a
//! [`CriticalSection`] guard is the proof that interrupts are off, and
//! every scheduler operation demands one by reference.

use std::cell::Cell;

/// Hardware interrupt level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    /// Interrupts are disabled.
    Off,
    /// Interrupts are enabled.
    On,
}

/// Simulated interrupt state for one processor.
#[derive(Debug)]
pub struct Interrupts {
    level: Cell<IntLevel>,
}

impl Interrupts {
    /// Creates the interrupt state with interrupts enabled.
    pub fn new() -> Self {
        Interrupts {
            level: Cell::new(IntLevel::On),
        }
    }

    /// Current interrupt level.
    pub fn level(&self) -> IntLevel {
        self.level.get()
    }

    /// Disables interrupts for the lifetime of the returned guard.
    ///
    /// Nesting is fine: the guard restores whatever level was in force
    /// when it was created.
    pub fn disable(&self) -> CriticalSection<'_> {
        let prev = self.level.replace(IntLevel::Off);
        CriticalSection {
            interrupts: self,
            prev,
        }
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that interrupts are disabled.
///
/// Scheduler operations take `&CriticalSection` instead of asserting the
/// interrupt level themselves; holding one is the precondition.
#[derive(Debug)]
pub struct CriticalSection<'a> {
    interrupts: &'a Interrupts,
    prev: IntLevel,
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        self.interrupts.level.set(self.prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_restores_on_drop() {
        let ints = Interrupts::new();
        assert_eq!(ints.level(), IntLevel::On);
        {
            let _cs = ints.disable();
            assert_eq!(ints.level(), IntLevel::Off);
        }
        assert_eq!(ints.level(), IntLevel::On);
    }

    #[test]
    fn test_nested_disable() {
        let ints = Interrupts::new();
        let outer = ints.disable();
        {
            let _inner = ints.disable();
            assert_eq!(ints.level(), IntLevel::Off);
        }
        // Still off: the outer guard is alive.
        assert_eq!(ints.level(), IntLevel::Off);
        drop(outer);
        assert_eq!(ints.level(), IntLevel::On);
    }
}
