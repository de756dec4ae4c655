use std::sync::Arc;

use super::{Demand, Transition, CTRL_DISONDEMAND, CTRL_FORCEEN, IF_RDY, STATUS_ENS, STATUS_LOCK, STATUS_RDY};
use crate::event::{EventProducer, Signal, SignalHub};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::time::Hertz;

pub const IPVERSION: u32 = 0x000;
pub const CTRL: u32 = 0x004;
pub const STATUS: u32 = 0x008;
pub const IF: u32 = 0x014;
pub const IEN: u32 = 0x018;
pub const LOCK: u32 = 0x020;
pub const CFG: u32 = 0x024;
pub const NOMCAL: u32 = 0x02c;
pub const NOMCALINV: u32 = 0x030;
pub const CMD: u32 = 0x034;

pub const CFG_HIGHPRECEN: u32 = 1 << 0;
pub const CMD_REDUCETCINT: u32 = 1 << 0;

pub const LOCK_KEY: u32 = 0xf93f;

/// LFRCO nominal frequency.
pub const FREQUENCY: Hertz = Hertz(32_768);

const NOMCAL_RESET: u32 = 0x0005_b8d8;
const NOMCALINV_RESET: u32 = 0x0000_597a;

const SIGNALS: &[Signal] = &[Signal::Ready];

/// Low-frequency RC oscillator, 32 768 Hz.
pub struct Lfrco {
    clock: Arc<dyn ClockOrder>,
    demand: Demand,
    hub: SignalHub,
    registers: RegisterBank<Lfrco>,
}

impl Lfrco {
    pub fn new(clock: Arc<dyn ClockOrder>) -> Self {
        let registers = RegisterBank::new("lfrco")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCK)
            .register(IPVERSION, Register::new("IPVERSION", 0x2).read_only())
            .register(
                CTRL,
                Register::new("CTRL", 0)
                    .with_mask(CTRL_FORCEEN | CTRL_DISONDEMAND)
                    .protected()
                    .on_write(Self::write_ctrl),
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
            )
            .register(CFG, Register::new("CFG", 0).with_mask(CFG_HIGHPRECEN).protected())
            .register(NOMCAL, Register::new("NOMCAL", NOMCAL_RESET).with_mask(0x001f_ffff).protected())
            .register(NOMCALINV, Register::new("NOMCALINV", NOMCALINV_RESET).with_mask(0x0001_ffff).protected())
            .register(CMD, Register::new("CMD", 0).write_only());

        Self {
            clock,
            demand: Demand::default(),
            hub: SignalHub::new("lfrco", SIGNALS),
            registers,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.registers.value(STATUS) & STATUS_RDY != 0
    }

    /// Whether the high-precision (calibrated) mode is selected.
    pub fn high_precision(&self) -> bool {
        self.registers.value(CFG) & CFG_HIGHPRECEN != 0
    }

    pub fn frequency(&self) -> Option<Hertz> {
        self.is_ready().then_some(FREQUENCY)
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
        info!(
            "lfrco: running ({})",
            if self.high_precision() { "high precision" } else { "normal" }
        );
        self.hub.fire(Signal::Ready);
    }

    fn stop(&self) {
        self.registers.clear_bits(STATUS, STATUS_RDY | STATUS_ENS);
        debug!("lfrco: stopped");
    }

    fn write_ctrl(&self, _offset: u32, old: u32, new: u32) {
        let transition = self.demand.ctrl_written(old, new);
        self.apply(transition);
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventProducer for Lfrco {
    fn hub(&self) -> &SignalHub {
        &self.hub
    }
}

impl RegisterPeripheral for Lfrco {
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
