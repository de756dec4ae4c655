//! Clock management: oscillator and DPLL models.
//!
//! HFXO, HFRCO and LFRCO share the CTRL/STATUS/IF layout below: the oscillator
//! runs while CTRL.FORCEEN is set or while a clock consumer requests it (unless
//! CTRL.DISONDEMAND blocks on-demand starts). Start-up is instantaneous; STATUS
//! and IF are updated and the producer signals fire under the clock-order lock.

pub mod dpll;
pub mod hfrco;
pub mod hfxo;
pub mod lfrco;

use core::sync::atomic::{AtomicBool, Ordering};

pub use dpll::Dpll;
pub use hfrco::{Cal, FreqRange, Hfrco};
pub use hfxo::Hfxo;
pub use lfrco::Lfrco;

use crate::utils::{fell, rose};

pub const CTRL_FORCEEN: u32 = 1 << 0;
pub const CTRL_DISONDEMAND: u32 = 1 << 1;

pub const STATUS_RDY: u32 = 1 << 0;
pub const STATUS_ENS: u32 = 1 << 16;
pub const STATUS_LOCK: u32 = 1 << 31;

pub const IF_RDY: u32 = 1 << 0;

/// What a CTRL write or a request change means for a running oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Start,
    Stop,
    None,
}

/// On-demand request bookkeeping shared by the oscillators.
#[derive(Debug, Default)]
pub(crate) struct Demand {
    requested: AtomicBool,
}

impl Demand {
    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// A consumer asks for the clock. Starts the oscillator unless DISONDEMAND is set.
    pub(crate) fn request(&self, ctrl: u32, running: bool) -> Transition {
        self.requested.store(true, Ordering::SeqCst);
        if running || ctrl & CTRL_DISONDEMAND != 0 {
            Transition::None
        } else {
            Transition::Start
        }
    }

    /// The consumer no longer needs the clock. Stops it unless FORCEEN holds it on.
    pub(crate) fn release(&self, ctrl: u32, running: bool) -> Transition {
        self.requested.store(false, Ordering::SeqCst);
        if running && ctrl & CTRL_FORCEEN == 0 {
            Transition::Stop
        } else {
            Transition::None
        }
    }

    /// Effect of a CTRL write going from `old` to `new`.
    pub(crate) fn ctrl_written(&self, old: u32, new: u32) -> Transition {
        if rose(old, new, CTRL_FORCEEN) {
            Transition::Start
        } else if fell(old, new, CTRL_FORCEEN) && !self.is_requested() {
            Transition::Stop
        } else {
            Transition::None
        }
    }

    pub(crate) fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests;
