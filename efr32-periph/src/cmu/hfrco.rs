use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitfield_struct::bitfield;

use super::{Demand, Transition, IF_RDY, STATUS_ENS, STATUS_LOCK, STATUS_RDY};
use crate::event::{EventProducer, Signal, SignalHub};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::time::Hertz;

pub const IPVERSION: u32 = 0x000;
pub const CTRL: u32 = 0x004;
pub const CAL: u32 = 0x008;
pub const STATUS: u32 = 0x00c;
pub const IF: u32 = 0x010;
pub const IEN: u32 = 0x014;
pub const LOCK: u32 = 0x01c;

pub const STATUS_FREQBSY: u32 = 1 << 1;

pub const LOCK_KEY: u32 = 0x8195;

const SIGNALS: &[Signal] = &[Signal::Ready];

/// HFRCO CAL register.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Cal {
    /// [6:0] TUNING
    #[bits(7)]
    pub tuning: u8,
    #[bits(1)]
    __reserved0: u8,
    /// [13:8] FINETUNING
    #[bits(6)]
    pub finetuning: u8,
    #[bits(2)]
    __reserved1: u8,
    /// [20:16] FREQRANGE
    #[bits(5)]
    pub freqrange: u8,
    #[bits(3)]
    __reserved2: u8,
    /// [25:24] CLKDIV
    #[bits(2)]
    pub clkdiv: u8,
    #[bits(6)]
    __reserved3: u8,
}

/// HFRCO frequency bands selected by CAL.FREQRANGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FreqRange {
    Mhz1,
    Mhz2,
    Mhz4,
    Mhz7,
    Mhz13,
    Mhz16,
    Mhz19,
    Mhz26,
    Mhz32,
    Mhz38,
    Mhz48,
    Mhz56,
    Mhz64,
    Mhz80,
}

impl FreqRange {
    const ALL: [FreqRange; 14] = [
        FreqRange::Mhz1,
        FreqRange::Mhz2,
        FreqRange::Mhz4,
        FreqRange::Mhz7,
        FreqRange::Mhz13,
        FreqRange::Mhz16,
        FreqRange::Mhz19,
        FreqRange::Mhz26,
        FreqRange::Mhz32,
        FreqRange::Mhz38,
        FreqRange::Mhz48,
        FreqRange::Mhz56,
        FreqRange::Mhz64,
        FreqRange::Mhz80,
    ];

    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    pub const fn to_bits(self) -> u8 {
        self as u8
    }

    pub const fn frequency(self) -> Hertz {
        match self {
            FreqRange::Mhz1 => Hertz::mhz(1),
            FreqRange::Mhz2 => Hertz::mhz(2),
            FreqRange::Mhz4 => Hertz::mhz(4),
            FreqRange::Mhz7 => Hertz::mhz(7),
            FreqRange::Mhz13 => Hertz::mhz(13),
            FreqRange::Mhz16 => Hertz::mhz(16),
            FreqRange::Mhz19 => Hertz::mhz(19),
            FreqRange::Mhz26 => Hertz::mhz(26),
            FreqRange::Mhz32 => Hertz::mhz(32),
            FreqRange::Mhz38 => Hertz::mhz(38),
            FreqRange::Mhz48 => Hertz::mhz(48),
            FreqRange::Mhz56 => Hertz::mhz(56),
            FreqRange::Mhz64 => Hertz::mhz(64),
            FreqRange::Mhz80 => Hertz::mhz(80),
        }
    }
}

impl Cal {
    /// Output frequency selected by FREQRANGE and CLKDIV.
    ///
    /// Reserved FREQRANGE values yield `None`; the reserved CLKDIV value divides by one.
    pub fn frequency(&self) -> Option<Hertz> {
        let band = FreqRange::from_bits(self.freqrange())?;
        let div: u32 = match self.clkdiv() {
            1 => 2,
            2 => 4,
            _ => 1,
        };
        Some(band.frequency() / div)
    }
}

/// HFRCO configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// CAL reset value, usually taken from DEVINFO.HFRCODPLLCAL.
    pub cal: Cal,
    pub ipversion: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            cal: Cal::new()
                .with_tuning(0x4f)
                .with_finetuning(0x1f)
                .with_freqrange(FreqRange::Mhz19.to_bits()),
            ipversion: 0x2,
        }
    }

    pub const fn with_cal(mut self, cal: Cal) -> Self {
        self.cal = cal;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// HFRCODPLL oscillator. Its frequency comes from CAL unless a locked DPLL overrides it.
pub struct Hfrco {
    clock: Arc<dyn ClockOrder>,
    demand: Demand,
    /// Frequency imposed by a locked DPLL, in Hz. Zero means none.
    dpll_override: AtomicU32,
    hub: SignalHub,
    registers: RegisterBank<Hfrco>,
}

impl Hfrco {
    pub fn new(clock: Arc<dyn ClockOrder>, config: Config) -> Self {
        let registers = RegisterBank::new("hfrco")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCK)
            .register(IPVERSION, Register::new("IPVERSION", config.ipversion).read_only())
            .register(
                CTRL,
                Register::new("CTRL", 0)
                    .with_mask(super::CTRL_FORCEEN | super::CTRL_DISONDEMAND)
                    .protected()
                    .on_write(Self::write_ctrl),
            )
            .register(
                CAL,
                Register::new("CAL", config.cal.into_bits())
                    .with_mask(0x031f_3f7f)
                    .protected()
                    .on_write(Self::write_cal),
            )
            .register(STATUS, Register::new("STATUS", 0).read_only())
            .register(IF, Register::new("IF", 0).with_mask(IF_RDY))
            .register(IEN, Register::new("IEN", 0).with_mask(IF_RDY))
            .register(
                LOCK,
                Register::new("LOCK", LOCK_KEY)
                    .write_only()
                    .with_mask(0xffff)
                    .on_write(Self::write_lock),
            );

        Self {
            clock,
            demand: Demand::default(),
            dpll_override: AtomicU32::new(0),
            hub: SignalHub::new("hfrco", SIGNALS),
            registers,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.registers.value(STATUS) & STATUS_RDY != 0
    }

    pub fn cal(&self) -> Cal {
        Cal::from_bits(self.registers.value(CAL))
    }

    /// Frequency the oscillator produces when running.
    pub fn nominal_frequency(&self) -> Option<Hertz> {
        match self.dpll_override.load(Ordering::SeqCst) {
            0 => self.cal().frequency(),
            hz => Some(Hertz(hz)),
        }
    }

    /// Output frequency, if running.
    pub fn frequency(&self) -> Option<Hertz> {
        if self.is_ready() {
            self.nominal_frequency()
        } else {
            None
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        self.registers.value(IF) & self.registers.value(IEN) != 0
    }

    pub fn request(&self) {
        with_clock(&*self.clock, || {
            let transition = self.demand.request(self.registers.value(CTRL), self.is_ready());
            self.apply(transition);
        })
    }

    pub fn release(&self) {
        with_clock(&*self.clock, || {
            let transition = self.demand.release(self.registers.value(CTRL), self.is_ready());
            self.apply(transition);
        })
    }

    /// Lock the output to `frequency` on behalf of the DPLL, starting the oscillator if needed.
    pub(crate) fn lock_to(&self, frequency: Hertz) {
        self.dpll_override.store(frequency.0, Ordering::SeqCst);
        info!("hfrco: locked to {} by dpll", frequency);
        self.start();
    }

    /// Drop the DPLL override and fall back to CAL.
    pub(crate) fn unlock(&self) {
        if self.dpll_override.swap(0, Ordering::SeqCst) != 0 {
            debug!("hfrco: dpll override released");
        }
    }

    fn apply(&self, transition: Transition) {
        match transition {
            Transition::Start => self.start(),
            Transition::Stop => self.stop(),
            Transition::None => {}
        }
    }

    fn start(&self) {
        if self.registers.value(STATUS) & STATUS_ENS != 0 {
            return;
        }
        self.registers.set_bits(STATUS, STATUS_RDY | STATUS_ENS);
        self.registers.set_bits(IF, IF_RDY);
        match self.nominal_frequency() {
            Some(frequency) => info!("hfrco: running at {}", frequency),
            None => warn!("hfrco: running with reserved FREQRANGE {}", self.cal().freqrange()),
        }
        self.hub.fire(Signal::Ready);
    }

    fn stop(&self) {
        self.registers.clear_bits(STATUS, STATUS_RDY | STATUS_ENS);
        debug!("hfrco: stopped");
    }

    fn write_ctrl(&self, _offset: u32, old: u32, new: u32) {
        let transition = self.demand.ctrl_written(old, new);
        self.apply(transition);
    }

    fn write_cal(&self, _offset: u32, _old: u32, new: u32) {
        match Cal::from_bits(new).frequency() {
            Some(frequency) => debug!("hfrco: CAL selects {}", frequency),
            None => warn!("hfrco: CAL selects reserved FREQRANGE ({:#x})", new),
        }
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventProducer for Hfrco {
    fn hub(&self) -> &SignalHub {
        &self.hub
    }
}

impl RegisterPeripheral for Hfrco {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    fn reset(&self) {
        with_clock(&*self.clock, || {
            self.demand.clear();
            self.dpll_override.store(0, Ordering::SeqCst);
            self.registers.reset();
        })
    }
}
