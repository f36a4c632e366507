//! Single-flight compare-and-swap guard for tick-scoped operations.
//!
//! The host's tick callback is not guaranteed non-overlapping, so every
//! stateful operation that must not overlap itself takes this gate. The
//! policy is "skip this round", never "block": a caller that loses the
//! swap bails out and relies on being invoked again on a later tick.

use std::sync::atomic::{AtomicU32, Ordering};

const IDLE: u32 = 0;
const HELD: u32 = 1;

#[derive(Debug, Default)]
pub struct TickGate {
    flag: AtomicU32,
}

impl TickGate {
    pub fn new() -> Self {
        Self {
            flag: AtomicU32::new(IDLE),
        }
    }

    /// Attempt to take the gate. Returns `false` when another invocation
    /// already holds it.
    pub fn try_enter(&self) -> bool {
        self.flag
            .compare_exchange(IDLE, HELD, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the gate. Safe to call even if the gate was never held;
    /// releasing is idempotent.
    pub fn release(&self) {
        self.flag.store(IDLE, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.flag.load(Ordering::Acquire) == HELD
    }
}
