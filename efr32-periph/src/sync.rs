//! Clock-order serialization.
//!
//! The emulator runs CPU execution and asynchronous hardware callbacks (timer
//! compare matches, oscillator ready transitions, ...) on different host
//! contexts. Every model state change and every event dispatch goes through a
//! [`ClockOrder`] so that it is serialized against the virtual clock.
//!
//! ```
//! use efr32_periph::sync::{with_clock, CriticalSectionClock};
//!
//! let clock = CriticalSectionClock;
//! let value = with_clock(&clock, || 40 + 2);
//! assert_eq!(value, 42);
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Mutex used for model-internal state. Locking enters the global critical section.
pub(crate) type StateMutex<T> = Mutex<CriticalSectionRawMutex, T>;

/// "Execute under global ordering" primitive provided by the surrounding emulator.
///
/// Implementations must be re-entrant on the thread that holds the lock: a
/// dispatch running inside the lock may call back into models that take it again.
pub trait ClockOrder: Send + Sync {
    /// Run `f` while holding the clock-order lock.
    fn execute_in_lock(&self, f: &mut dyn FnMut());
}

/// [`ClockOrder`] backed by the process-wide `critical-section` lock.
///
/// The `std` implementation of `critical-section` nests on the owning thread,
/// which gives the re-entrancy [`ClockOrder`] requires.
#[derive(Debug, Default, Clone, Copy)]
pub struct CriticalSectionClock;

impl ClockOrder for CriticalSectionClock {
    fn execute_in_lock(&self, f: &mut dyn FnMut()) {
        critical_section::with(|_| f());
    }
}

/// Run `f` under `clock` and return its result.
pub fn with_clock<R>(clock: &dyn ClockOrder, f: impl FnOnce() -> R) -> R {
    let mut f = Some(f);
    let mut result = None;
    clock.execute_in_lock(&mut || {
        if let Some(f) = f.take() {
            result = Some(f());
        }
    });
    result.expect("clock order lock did not run the closure")
}

/// Clock for tests: counts lock entries and knows whether a caller is inside one.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CountingClock {
    entries: core::sync::atomic::AtomicUsize,
    depth: core::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CountingClock {
    pub(crate) fn entries(&self) -> usize {
        self.entries.load(core::sync::atomic::Ordering::SeqCst)
    }

    /// Whether the lock is currently held.
    pub(crate) fn held(&self) -> bool {
        self.depth.load(core::sync::atomic::Ordering::SeqCst) > 0
    }

    /// Lock entries made while running `f`.
    pub(crate) fn entries_during(&self, f: impl FnOnce()) -> usize {
        let before = self.entries();
        f();
        self.entries() - before
    }
}

#[cfg(test)]
impl ClockOrder for CountingClock {
    fn execute_in_lock(&self, f: &mut dyn FnMut()) {
        use core::sync::atomic::Ordering;

        critical_section::with(|_| {
            self.entries.fetch_add(1, Ordering::SeqCst);
            self.depth.fetch_add(1, Ordering::SeqCst);
            f();
            self.depth.fetch_sub(1, Ordering::SeqCst);
        });
    }
}
