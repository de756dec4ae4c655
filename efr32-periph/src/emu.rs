//! EMU: energy management unit.
//!
//! Tracks the energy mode the CPU model is in. The CPU model reports
//! `WFI`/`WFE` through [`Emu::enter_sleep`] and [`Emu::exit_sleep`]; EM4 is
//! entered by writing the EM4ENTRY unlock sequence and halts the CPU through
//! the injected [`CpuControl`]. As a PRS consumer, a wakeup event brings the
//! CPU back from EM2/EM3.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::event::{ConsumerSelector, EventConsumer};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::utils::Field;

pub const IPVERSION: u32 = 0x000;
pub const LOCK: u32 = 0x010;
pub const EM4CTRL: u32 = 0x024;
pub const STATUS: u32 = 0x084;
pub const RSTCAUSE: u32 = 0x0a0;
pub const IF: u32 = 0x100;
pub const IEN: u32 = 0x104;

pub const STATUS_LOCK: u32 = 1 << 0;
pub const STATUS_EM: Field = Field::new(8, 3);
pub const EM4CTRL_EM4ENTRY: Field = Field::new(0, 2);
pub const IF_EM23WAKEUP: u32 = 1 << 24;

pub const LOCK_KEY: u32 = 0xade8;

/// EM4ENTRY values that must be written back to back to enter EM4.
pub const EM4_ENTRY_SEQUENCE: [u32; 9] = [2, 3, 2, 3, 2, 3, 2, 3, 2];

/// RSTCAUSE bits.
pub mod rstcause {
    pub const POR: u32 = 1 << 0;
    pub const PIN: u32 = 1 << 1;
    pub const EM4: u32 = 1 << 2;
    pub const WDOG0: u32 = 1 << 3;
    pub const LOCKUP: u32 = 1 << 5;
    pub const SYSREQ: u32 = 1 << 6;
}

/// Energy modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnergyMode {
    /// Running.
    Em0,
    /// Sleep: core clock gated.
    Em1,
    /// Deep sleep.
    Em2,
    /// Stop.
    Em3,
    /// Shutoff. Left only through reset.
    Em4,
}

impl EnergyMode {
    pub const fn to_bits(self) -> u8 {
        self as u8
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => EnergyMode::Em0,
            1 => EnergyMode::Em1,
            2 => EnergyMode::Em2,
            3 => EnergyMode::Em3,
            _ => EnergyMode::Em4,
        }
    }
}

/// CPU-side control the EMU needs. Injected by whoever wires the CPU model.
pub trait CpuControl: Send + Sync {
    /// Stop executing instructions until reset.
    fn halt(&self);

    /// Leave a `WFI`/`WFE` wait.
    fn wake(&self);
}

/// EMU configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// RSTCAUSE after construction.
    pub reset_cause: u32,
    pub ipversion: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            reset_cause: rstcause::POR,
            ipversion: 0x3,
        }
    }

    pub const fn with_reset_cause(mut self, reset_cause: u32) -> Self {
        self.reset_cause = reset_cause;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Emu {
    clock: Arc<dyn ClockOrder>,
    cpu: Arc<dyn CpuControl>,
    mode: AtomicU8,
    /// Position reached in [`EM4_ENTRY_SEQUENCE`].
    em4_progress: AtomicUsize,
    wakeup: ConsumerSelector,
    registers: RegisterBank<Emu>,
}

impl Emu {
    pub fn new(clock: Arc<dyn ClockOrder>, cpu: Arc<dyn CpuControl>, config: Config) -> Self {
        let registers = RegisterBank::new("emu")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCK)
            .register(IPVERSION, Register::new("IPVERSION", config.ipversion).read_only())
            .register(
                LOCK,
                Register::new("LOCK", LOCK_KEY)
                    .write_only()
                    .with_mask(0xffff)
                    .on_write(Self::write_lock),
            )
            .register(
                EM4CTRL,
                Register::new("EM4CTRL", 0)
                    .protected()
                    .on_write(Self::write_em4ctrl),
            )
            .register(STATUS, Register::new("STATUS", 0).read_only().on_read(Self::read_status))
            .register(RSTCAUSE, Register::new("RSTCAUSE", config.reset_cause).read_only())
            .register(IF, Register::new("IF", 0))
            .register(IEN, Register::new("IEN", 0));

        Self {
            clock,
            cpu,
            mode: AtomicU8::new(EnergyMode::Em0.to_bits()),
            em4_progress: AtomicUsize::new(0),
            wakeup: ConsumerSelector::new(),
            registers,
        }
    }

    pub fn energy_mode(&self) -> EnergyMode {
        EnergyMode::from_bits(self.mode.load(Ordering::SeqCst))
    }

    /// PRS channel selector of the wakeup consumer.
    pub fn wakeup_selector(&self) -> &ConsumerSelector {
        &self.wakeup
    }

    pub fn reset_cause(&self) -> u32 {
        self.registers.value(RSTCAUSE)
    }

    /// Record the cause of the next reset, as seen by firmware after it.
    pub fn set_reset_cause(&self, cause: u32) {
        self.registers.set_value(RSTCAUSE, cause);
    }

    pub fn interrupt_pending(&self) -> bool {
        self.registers.value(IF) & self.registers.value(IEN) != 0
    }

    /// The CPU executed `WFI`/`WFE`. `deep` is SCR.SLEEPDEEP.
    pub fn enter_sleep(&self, deep: bool) {
        with_clock(&*self.clock, || {
            let mode = if deep { EnergyMode::Em2 } else { EnergyMode::Em1 };
            self.set_mode(mode);
        })
    }

    /// The CPU resumed execution.
    pub fn exit_sleep(&self) {
        with_clock(&*self.clock, || {
            if self.energy_mode() != EnergyMode::Em4 {
                self.set_mode(EnergyMode::Em0);
            }
        })
    }

    fn set_mode(&self, mode: EnergyMode) {
        let previous = self.mode.swap(mode.to_bits(), Ordering::SeqCst);
        if previous != mode.to_bits() {
            debug!("emu: {:?} -> {:?}", EnergyMode::from_bits(previous), mode);
        }
    }

    fn wake(&self) {
        match self.energy_mode() {
            EnergyMode::Em2 | EnergyMode::Em3 => {
                self.registers.set_bits(IF, IF_EM23WAKEUP);
                self.set_mode(EnergyMode::Em0);
                self.cpu.wake();
            }
            mode => trace!("emu: wakeup ignored in {:?}", mode),
        }
    }

    fn read_status(&self, _offset: u32, stored: u32) -> u32 {
        STATUS_EM.insert(stored, u32::from(self.mode.load(Ordering::SeqCst)))
    }

    fn write_em4ctrl(&self, _offset: u32, _old: u32, new: u32) {
        let entry = EM4CTRL_EM4ENTRY.extract(new);
        let progress = self.em4_progress.load(Ordering::SeqCst);
        let progress = if EM4_ENTRY_SEQUENCE[progress] == entry {
            progress + 1
        } else if EM4_ENTRY_SEQUENCE[0] == entry {
            1
        } else {
            0
        };

        if progress == EM4_ENTRY_SEQUENCE.len() {
            self.em4_progress.store(0, Ordering::SeqCst);
            info!("emu: entering EM4");
            self.set_mode(EnergyMode::Em4);
            self.cpu.halt();
        } else {
            self.em4_progress.store(progress, Ordering::SeqCst);
        }
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventConsumer for Emu {
    fn selected_channel(&self) -> Option<usize> {
        self.wakeup.channel()
    }

    fn on_channel_event(&self) {
        self.wake()
    }
}

impl RegisterPeripheral for Emu {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    /// Returns to EM0. RSTCAUSE keeps the value set for this reset.
    fn reset(&self) {
        with_clock(&*self.clock, || {
            let cause = self.reset_cause();
            self.registers.reset();
            self.registers.set_value(RSTCAUSE, cause);
            self.mode.store(EnergyMode::Em0.to_bits(), Ordering::SeqCst);
            self.em4_progress.store(0, Ordering::SeqCst);
        })
    }
}
