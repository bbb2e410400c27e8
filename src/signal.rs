//! One-shot resettable latch bridging the exporter's completion callback into
//! the batch run loop.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cloneable handle to a boolean latch. One clone is handed to the external
/// notifier, the other is polled by the run loop; Release/Acquire ordering
/// makes a signal from a foreign execution context visible to the waiter.
///
/// `signal()` before `reset()` has no retroactive effect on an earlier wait
/// cycle: each reset starts an independent cycle, and duplicate signals within
/// a cycle are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    flag: Arc<AtomicBool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the latch for a new export cycle.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Raised by the external notifier when the in-flight export finishes.
    pub fn signal(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
