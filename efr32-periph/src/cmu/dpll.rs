use std::sync::Arc;

use bitfield_struct::bitfield;

use super::Hfrco;
use crate::event::{EventProducer, Signal, SignalHub};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::time::Hertz;
use crate::utils::{fell, rose};

pub const IPVERSION: u32 = 0x000;
pub const EN: u32 = 0x004;
pub const CFG: u32 = 0x008;
pub const CFG1: u32 = 0x00c;
pub const IF: u32 = 0x010;
pub const IEN: u32 = 0x014;
pub const STATUS: u32 = 0x018;
pub const LOCK: u32 = 0x020;

pub const EN_EN: u32 = 1 << 0;

pub const CFG_MODE: u32 = 1 << 0;
pub const CFG_EDGESEL: u32 = 1 << 1;
pub const CFG_AUTORECOVER: u32 = 1 << 2;

pub const IF_LOCK: u32 = 1 << 0;
pub const IF_LOCKFAILLOW: u32 = 1 << 1;
pub const IF_LOCKFAILHIGH: u32 = 1 << 2;

pub const STATUS_RDY: u32 = 1 << 0;
pub const STATUS_ENS: u32 = 1 << 1;
pub const STATUS_LOCK: u32 = 1 << 31;

pub const LOCK_KEY: u32 = 0x7102;

/// Smallest N the loop can lock with.
pub const MIN_N: u16 = 300;
/// Highest output frequency the loop can lock to.
pub const MAX_OUTPUT: Hertz = Hertz::mhz(80);

const SIGNALS: &[Signal] = &[Signal::Lock, Signal::LockFail];

/// DPLL CFG1 register.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Cfg1 {
    /// [11:0] M, reference divider minus one
    #[bits(12)]
    pub m: u16,
    #[bits(4)]
    __reserved0: u8,
    /// [27:16] N, feedback divider minus one
    #[bits(12)]
    pub n: u16,
    #[bits(4)]
    __reserved1: u8,
}

/// Result of a lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockOutcome {
    Locked(Hertz),
    /// N below [`MIN_N`].
    TooLow,
    /// Output above [`MAX_OUTPUT`].
    TooHigh,
}

impl Cfg1 {
    /// `fref * (N + 1) / (M + 1)`, or `None` if it does not fit in 32 bits.
    pub fn output(&self, reference: Hertz) -> Option<Hertz> {
        reference.scale(u32::from(self.n()) + 1, u32::from(self.m()) + 1)
    }

    pub fn lock_outcome(&self, reference: Hertz) -> LockOutcome {
        if self.n() < MIN_N {
            return LockOutcome::TooLow;
        }
        match self.output(reference) {
            Some(fout) if fout.0 <= MAX_OUTPUT.0 => LockOutcome::Locked(fout),
            _ => LockOutcome::TooHigh,
        }
    }
}

/// DPLL configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Reference clock frequency (usually HFXO).
    pub reference: Hertz,
    pub ipversion: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            reference: Hertz::mhz(39),
            ipversion: 0x1,
        }
    }

    pub const fn with_reference(mut self, reference: Hertz) -> Self {
        self.reference = reference;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Digital phase-locked loop driving the HFRCO.
///
/// Setting EN attempts a lock immediately: on success the HFRCO is retuned and
/// [`Signal::Lock`] fires, otherwise [`Signal::LockFail`] fires.
pub struct Dpll {
    clock: Arc<dyn ClockOrder>,
    config: Config,
    hfrco: Arc<Hfrco>,
    hub: SignalHub,
    registers: RegisterBank<Dpll>,
}

impl Dpll {
    pub fn new(clock: Arc<dyn ClockOrder>, hfrco: Arc<Hfrco>, config: Config) -> Self {
        let registers = RegisterBank::new("dpll")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCK)
            .register(IPVERSION, Register::new("IPVERSION", config.ipversion).read_only())
            .register(
                EN,
                Register::new("EN", 0)
                    .with_mask(EN_EN)
                    .on_write(Self::write_en),
            )
            .register(
                CFG,
                Register::new("CFG", 0)
                    .with_mask(CFG_MODE | CFG_EDGESEL | CFG_AUTORECOVER)
                    .protected(),
            )
            .register(CFG1, Register::new("CFG1", 0).with_mask(0x0fff_0fff).protected())
            .register(IF, Register::new("IF", 0).with_mask(IF_LOCK | IF_LOCKFAILLOW | IF_LOCKFAILHIGH))
            .register(IEN, Register::new("IEN", 0).with_mask(IF_LOCK | IF_LOCKFAILLOW | IF_LOCKFAILHIGH))
            .register(STATUS, Register::new("STATUS", 0).read_only())
            .register(
                LOCK,
                Register::new("LOCK", LOCK_KEY)
                    .write_only()
                    .with_mask(0xffff)
                    .on_write(Self::write_lock),
            );

        Self {
            clock,
            config,
            hfrco,
            hub: SignalHub::new("dpll", SIGNALS),
            registers,
        }
    }

    pub fn cfg1(&self) -> Cfg1 {
        Cfg1::from_bits(self.registers.value(CFG1))
    }

    pub fn is_locked(&self) -> bool {
        self.registers.value(STATUS) & STATUS_RDY != 0
    }

    /// Locked output frequency.
    pub fn frequency(&self) -> Option<Hertz> {
        if self.is_locked() {
            self.cfg1().output(self.config.reference)
        } else {
            None
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        self.registers.value(IF) & self.registers.value(IEN) != 0
    }

    fn try_lock(&self) {
        self.registers.set_bits(STATUS, STATUS_ENS);
        let cfg1 = self.cfg1();
        match cfg1.lock_outcome(self.config.reference) {
            LockOutcome::Locked(fout) => {
                self.registers.set_bits(STATUS, STATUS_RDY);
                self.registers.set_bits(IF, IF_LOCK);
                info!("dpll: locked at {} (N={}, M={})", fout, cfg1.n(), cfg1.m());
                self.hfrco.lock_to(fout);
                self.hub.fire(Signal::Lock);
            }
            outcome => {
                let flag = if outcome == LockOutcome::TooLow {
                    IF_LOCKFAILLOW
                } else {
                    IF_LOCKFAILHIGH
                };
                self.registers.set_bits(IF, flag);
                warn!("dpll: lock failed {:?} (N={}, M={})", outcome, cfg1.n(), cfg1.m());
                self.hub.fire(Signal::LockFail);
            }
        }
    }

    fn disable(&self) {
        self.registers.clear_bits(STATUS, STATUS_RDY | STATUS_ENS);
        self.hfrco.unlock();
        debug!("dpll: disabled");
    }

    fn write_en(&self, _offset: u32, old: u32, new: u32) {
        if rose(old, new, EN_EN) {
            self.try_lock();
        } else if fell(old, new, EN_EN) {
            self.disable();
        }
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventProducer for Dpll {
    fn hub(&self) -> &SignalHub {
        &self.hub
    }
}

impl RegisterPeripheral for Dpll {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    fn reset(&self) {
        with_clock(&*self.clock, || {
            if self.registers.value(EN) & EN_EN != 0 {
                self.hfrco.unlock();
            }
            self.registers.reset();
        })
    }
}
