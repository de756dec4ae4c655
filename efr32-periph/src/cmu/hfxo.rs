use std::sync::Arc;

use super::{Demand, Transition, IF_RDY, STATUS_ENS, STATUS_LOCK, STATUS_RDY};
use crate::event::{EventProducer, Signal, SignalHub};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::time::Hertz;

pub const IPVERSION: u32 = 0x000;
pub const XTALCFG: u32 = 0x010;
pub const XTALCTRL: u32 = 0x018;
pub const CFG: u32 = 0x020;
pub const CTRL: u32 = 0x028;
pub const CMD: u32 = 0x050;
pub const STATUS: u32 = 0x058;
pub const IF: u32 = 0x070;
pub const IEN: u32 = 0x074;
pub const LOCK: u32 = 0x080;

pub const CMD_COREBIASOPT: u32 = 1 << 0;
pub const STATUS_COREBIASOPTRDY: u32 = 1 << 1;
pub const IF_COREBIASOPTRDY: u32 = 1 << 1;

pub const LOCK_KEY: u32 = 0x580e;

const SIGNALS: &[Signal] = &[Signal::Ens, Signal::Ready];

/// HFXO configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Crystal frequency.
    pub frequency: Hertz,
    pub ipversion: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            frequency: Hertz::mhz(39),
            ipversion: 0x2,
        }
    }

    pub const fn with_frequency(mut self, frequency: Hertz) -> Self {
        self.frequency = frequency;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// High-frequency crystal oscillator. Fires [`Signal::Ens`] then [`Signal::Ready`] on start-up.
pub struct Hfxo {
    clock: Arc<dyn ClockOrder>,
    config: Config,
    demand: Demand,
    hub: SignalHub,
    registers: RegisterBank<Hfxo>,
}

impl Hfxo {
    pub fn new(clock: Arc<dyn ClockOrder>, config: Config) -> Self {
        let registers = RegisterBank::new("hfxo")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCK)
            .register(IPVERSION, Register::new("IPVERSION", config.ipversion).read_only())
            .register(XTALCFG, Register::new("XTALCFG", 0x0bb0_0820).protected())
            .register(XTALCTRL, Register::new("XTALCTRL", 0x033c_3c3c).protected())
            .register(CFG, Register::new("CFG", 0x1000_0000).protected())
            .register(
                CTRL,
                Register::new("CTRL", 0x0700_0040)
                    .protected()
                    .on_write(Self::write_ctrl),
            )
            .register(CMD, Register::new("CMD", 0).write_only().on_write(Self::write_cmd))
            .register(STATUS, Register::new("STATUS", 0).read_only())
            .register(IF, Register::new("IF", 0).with_mask(IF_RDY | IF_COREBIASOPTRDY))
            .register(IEN, Register::new("IEN", 0).with_mask(IF_RDY | IF_COREBIASOPTRDY))
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
            demand: Demand::default(),
            hub: SignalHub::new("hfxo", SIGNALS),
            registers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.registers.value(STATUS) & STATUS_RDY != 0
    }

    /// Output frequency, if the crystal is running.
    pub fn frequency(&self) -> Option<Hertz> {
        self.is_ready().then_some(self.config.frequency)
    }

    /// Whether an enabled interrupt flag is set.
    pub fn interrupt_pending(&self) -> bool {
        self.registers.value(IF) & self.registers.value(IEN) != 0
    }

    /// On-demand request from a clock consumer.
    pub fn request(&self) {
        with_clock(&*self.clock, || {
            let transition = self.demand.request(self.registers.value(CTRL), self.is_ready());
            self.apply(transition);
        })
    }

    /// Drop the on-demand request.
    pub fn release(&self) {
        with_clock(&*self.clock, || {
            let transition = self.demand.release(self.registers.value(CTRL), self.is_ready());
            self.apply(transition);
        })
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
        self.registers
            .set_bits(STATUS, STATUS_RDY | STATUS_ENS | STATUS_COREBIASOPTRDY);
        self.registers.set_bits(IF, IF_RDY);
        info!("hfxo: running at {}", self.config.frequency);
        self.hub.fire(Signal::Ens);
        self.hub.fire(Signal::Ready);
    }

    fn stop(&self) {
        self.registers
            .clear_bits(STATUS, STATUS_RDY | STATUS_ENS | STATUS_COREBIASOPTRDY);
        debug!("hfxo: stopped");
    }

    fn write_ctrl(&self, _offset: u32, old: u32, new: u32) {
        let transition = self.demand.ctrl_written(old, new);
        self.apply(transition);
    }

    fn write_cmd(&self, _offset: u32, _old: u32, new: u32) {
        if new & CMD_COREBIASOPT != 0 && self.is_ready() {
            self.registers.set_bits(STATUS, STATUS_COREBIASOPTRDY);
            self.registers.set_bits(IF, IF_COREBIASOPTRDY);
        }
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventProducer for Hfxo {
    fn hub(&self) -> &SignalHub {
        &self.hub
    }
}

impl RegisterPeripheral for Hfxo {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    fn reset(&self) {
        with_clock(&*self.clock, || {
            self.demand.clear();
            self.registers.reset();
        })
    }
}
