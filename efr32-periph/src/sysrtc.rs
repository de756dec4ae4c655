//! SYSRTC: system real-time counter.
//!
//! The counter does not run on its own; the emulator moves it with
//! [`Sysrtc::advance`]. Each enabled compare value crossed sets its IF bit and
//! fires the matching `GroupNCompareM` signal, in the order they are reached.
//!
//! SYSRTC is also a PRS consumer with two inputs: IN0 starts the counter and
//! IN1 captures CNT into GRP0_CAP0VALUE.

use std::sync::Arc;

use crate::event::{ConsumerSelector, EventConsumer, EventProducer, Signal, SignalHub};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::utils::rose;

pub const IPVERSION: u32 = 0x000;
pub const EN: u32 = 0x004;
pub const SWRST: u32 = 0x008;
pub const CFG: u32 = 0x00c;
pub const CMD: u32 = 0x010;
pub const STATUS: u32 = 0x014;
pub const CNT: u32 = 0x018;
pub const SYNCBUSY: u32 = 0x01c;
pub const LOCK: u32 = 0x020;

pub const EN_EN: u32 = 1 << 0;
pub const SWRST_SWRST: u32 = 1 << 0;
pub const CFG_DEBUGRUN: u32 = 1 << 0;
pub const CMD_START: u32 = 1 << 0;
pub const CMD_STOP: u32 = 1 << 1;
pub const STATUS_RUNNING: u32 = 1 << 0;
pub const STATUS_LOCKSTATUS: u32 = 1 << 1;

pub const LOCK_KEY: u32 = 0x4776;

/// Number of compare/capture groups.
pub const GROUPS: usize = 2;

const GROUP_BASE: u32 = 0x044;
const GROUP_STRIDE: u32 = 0x020;

pub const GRP_IF: u32 = 0x00;
pub const GRP_IEN: u32 = 0x04;
pub const GRP_CTRL: u32 = 0x08;
pub const GRP_CMP0VALUE: u32 = 0x0c;
pub const GRP_CMP1VALUE: u32 = 0x10;
pub const GRP_CAP0VALUE: u32 = 0x14;

pub const GRP_IF_OVF: u32 = 1 << 0;
pub const GRP_IF_CMP0: u32 = 1 << 1;
pub const GRP_IF_CMP1: u32 = 1 << 2;
pub const GRP_IF_CAP0: u32 = 1 << 3;

pub const GRP_CTRL_CMP0EN: u32 = 1 << 0;
pub const GRP_CTRL_CMP1EN: u32 = 1 << 1;
pub const GRP_CTRL_CAP0EN: u32 = 1 << 2;

const GRP_IF_MASK: u32 = GRP_IF_OVF | GRP_IF_CMP0 | GRP_IF_CMP1 | GRP_IF_CAP0;

const GROUP_NAMES: [[&str; 6]; GROUPS] = [
    ["GRP0_IF", "GRP0_IEN", "GRP0_CTRL", "GRP0_CMP0VALUE", "GRP0_CMP1VALUE", "GRP0_CAP0VALUE"],
    ["GRP1_IF", "GRP1_IEN", "GRP1_CTRL", "GRP1_CMP0VALUE", "GRP1_CMP1VALUE", "GRP1_CAP0VALUE"],
];

const SIGNALS: &[Signal] = &[
    Signal::Group0Compare0,
    Signal::Group0Compare1,
    Signal::Group1Compare0,
    Signal::Group1Compare1,
];

/// Offset of register `reg` (one of the `GRP_*` offsets) in group `group`.
pub const fn group_offset(group: usize, reg: u32) -> u32 {
    GROUP_BASE + GROUP_STRIDE * group as u32 + reg
}

/// One compare channel of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Compare {
    group: usize,
    index: usize,
}

impl Compare {
    const ALL: [Compare; 4] = [
        Compare { group: 0, index: 0 },
        Compare { group: 0, index: 1 },
        Compare { group: 1, index: 0 },
        Compare { group: 1, index: 1 },
    ];

    fn signal(self) -> Signal {
        SIGNALS[self.group * 2 + self.index]
    }

    fn value_offset(self) -> u32 {
        let reg = if self.index == 0 { GRP_CMP0VALUE } else { GRP_CMP1VALUE };
        group_offset(self.group, reg)
    }

    fn enable_bit(self) -> u32 {
        if self.index == 0 {
            GRP_CTRL_CMP0EN
        } else {
            GRP_CTRL_CMP1EN
        }
    }

    fn flag(self) -> u32 {
        if self.index == 0 {
            GRP_IF_CMP0
        } else {
            GRP_IF_CMP1
        }
    }
}

/// SYSRTC PRS inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input {
    /// Start the counter.
    In0,
    /// Capture CNT into GRP0_CAP0VALUE.
    In1,
}

pub struct Sysrtc {
    clock: Arc<dyn ClockOrder>,
    hub: SignalHub,
    registers: RegisterBank<Sysrtc>,
    in0: ConsumerSelector,
    in1: ConsumerSelector,
}

impl Sysrtc {
    pub fn new(clock: Arc<dyn ClockOrder>) -> Self {
        let mut registers = RegisterBank::new("sysrtc")
            .with_aliases()
            .with_lock(STATUS, STATUS_LOCKSTATUS)
            .register(IPVERSION, Register::new("IPVERSION", 0x1).read_only())
            .register(EN, Register::new("EN", 0).with_mask(EN_EN))
            .register(
                SWRST,
                Register::new("SWRST", 0)
                    .with_mask(SWRST_SWRST)
                    .on_write(Self::write_swrst),
            )
            .register(CFG, Register::new("CFG", 0).with_mask(CFG_DEBUGRUN).protected())
            .register(
                CMD,
                Register::new("CMD", 0)
                    .write_only()
                    .with_mask(CMD_START | CMD_STOP)
                    .protected()
                    .on_write(Self::write_cmd),
            )
            .register(STATUS, Register::new("STATUS", 0).read_only())
            .register(CNT, Register::new("CNT", 0).protected())
            .register(SYNCBUSY, Register::new("SYNCBUSY", 0).read_only())
            .register(
                LOCK,
                Register::new("LOCK", LOCK_KEY)
                    .write_only()
                    .with_mask(0xffff)
                    .on_write(Self::write_lock),
            );

        for (group, names) in GROUP_NAMES.iter().enumerate() {
            registers = registers
                .register(group_offset(group, GRP_IF), Register::new(names[0], 0).with_mask(GRP_IF_MASK))
                .register(group_offset(group, GRP_IEN), Register::new(names[1], 0).with_mask(GRP_IF_MASK))
                .register(
                    group_offset(group, GRP_CTRL),
                    Register::new(names[2], 0)
                        .with_mask(GRP_CTRL_CMP0EN | GRP_CTRL_CMP1EN | GRP_CTRL_CAP0EN)
                        .protected(),
                )
                .register(group_offset(group, GRP_CMP0VALUE), Register::new(names[3], 0))
                .register(group_offset(group, GRP_CMP1VALUE), Register::new(names[4], 0))
                .register(group_offset(group, GRP_CAP0VALUE), Register::new(names[5], 0).read_only());
        }

        Self {
            clock,
            hub: SignalHub::new("sysrtc", SIGNALS),
            registers,
            in0: ConsumerSelector::new(),
            in1: ConsumerSelector::new(),
        }
    }

    pub fn counter(&self) -> u32 {
        self.registers.value(CNT)
    }

    pub fn is_running(&self) -> bool {
        self.registers.value(STATUS) & STATUS_RUNNING != 0
    }

    /// PRS channel selector of `input`.
    pub fn selector(&self, input: Input) -> &ConsumerSelector {
        match input {
            Input::In0 => &self.in0,
            Input::In1 => &self.in1,
        }
    }

    /// PRS consumer for `input`, to bind into a PRS.
    pub fn consumer(self: &Arc<Self>, input: Input) -> Arc<dyn EventConsumer> {
        Arc::new(SysrtcInput {
            sysrtc: self.clone(),
            input,
        })
    }

    /// Whether an enabled interrupt flag is set in `group`.
    pub fn interrupt_pending(&self, group: usize) -> bool {
        let flags = self.registers.value(group_offset(group, GRP_IF));
        flags & self.registers.value(group_offset(group, GRP_IEN)) != 0
    }

    /// Move the counter forward by `ticks`. Does nothing while stopped.
    pub fn advance(&self, ticks: u32) {
        with_clock(&*self.clock, || self.step(ticks))
    }

    fn step(&self, ticks: u32) {
        if ticks == 0 || !self.is_running() {
            return;
        }
        let old = self.counter();
        let (new, wrapped) = old.overflowing_add(ticks);
        self.registers.set_value(CNT, new);

        // Compare matches reached in this step, ordered by when they were reached.
        let mut matches: Vec<(u32, Compare)> = Compare::ALL
            .iter()
            .copied()
            .filter(|c| self.registers.value(group_offset(c.group, GRP_CTRL)) & c.enable_bit() != 0)
            .filter_map(|c| {
                let distance = self.registers.value(c.value_offset()).wrapping_sub(old);
                (distance != 0 && distance <= ticks).then_some((distance, c))
            })
            .collect();
        matches.sort_by_key(|(distance, _)| *distance);

        if wrapped {
            for group in 0..GROUPS {
                self.registers.set_bits(group_offset(group, GRP_IF), GRP_IF_OVF);
            }
            debug!("sysrtc: counter overflow");
        }
        for (_, compare) in matches {
            self.registers
                .set_bits(group_offset(compare.group, GRP_IF), compare.flag());
            trace!("sysrtc: {:?} at {:#x}", compare.signal(), self.registers.value(compare.value_offset()));
            self.hub.fire(compare.signal());
        }
    }

    fn start(&self) {
        if self.registers.value(EN) & EN_EN == 0 {
            warn!("sysrtc: start while disabled");
            return;
        }
        if !self.is_running() {
            self.registers.set_bits(STATUS, STATUS_RUNNING);
            debug!("sysrtc: started at {:#x}", self.counter());
        }
    }

    fn stop(&self) {
        self.registers.clear_bits(STATUS, STATUS_RUNNING);
        debug!("sysrtc: stopped at {:#x}", self.counter());
    }

    fn capture(&self) {
        if self.registers.value(group_offset(0, GRP_CTRL)) & GRP_CTRL_CAP0EN == 0 {
            return;
        }
        let count = self.counter();
        self.registers.set_value(group_offset(0, GRP_CAP0VALUE), count);
        self.registers.set_bits(group_offset(0, GRP_IF), GRP_IF_CAP0);
        trace!("sysrtc: captured {:#x}", count);
    }

    fn input_event(&self, input: Input) {
        match input {
            Input::In0 => self.start(),
            Input::In1 => self.capture(),
        }
    }

    fn write_cmd(&self, _offset: u32, _old: u32, new: u32) {
        if new & CMD_STOP != 0 {
            self.stop();
        } else if new & CMD_START != 0 {
            self.start();
        }
    }

    fn write_swrst(&self, _offset: u32, old: u32, new: u32) {
        if rose(old, new, SWRST_SWRST) {
            let en = self.registers.value(EN);
            self.registers.reset();
            self.registers.set_value(EN, en);
            debug!("sysrtc: software reset");
        }
    }

    fn write_lock(&self, _offset: u32, _old: u32, new: u32) {
        self.registers.apply_lock_key(new, LOCK_KEY);
    }
}

impl EventProducer for Sysrtc {
    fn hub(&self) -> &SignalHub {
        &self.hub
    }
}

impl RegisterPeripheral for Sysrtc {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    fn reset(&self) {
        with_clock(&*self.clock, || self.registers.reset())
    }
}

struct SysrtcInput {
    sysrtc: Arc<Sysrtc>,
    input: Input,
}

impl EventConsumer for SysrtcInput {
    fn selected_channel(&self) -> Option<usize> {
        self.sysrtc.selector(self.input).channel()
    }

    fn on_channel_event(&self) {
        self.sysrtc.input_event(self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SubscriberKey;
    use crate::sync::CriticalSectionClock;
    use std::sync::Mutex;

    fn running() -> Sysrtc {
        let rtc = Sysrtc::new(Arc::new(CriticalSectionClock));
        rtc.write_double_word(EN, EN_EN);
        rtc.write_double_word(CMD, CMD_START);
        rtc
    }

    #[test]
    fn stopped_counter_does_not_move() {
        let rtc = Sysrtc::new(Arc::new(CriticalSectionClock));
        rtc.advance(100);
        assert_eq!(rtc.counter(), 0);

        // START is ignored while EN is clear.
        rtc.write_double_word(CMD, CMD_START);
        assert!(!rtc.is_running());
    }

    #[test]
    fn compares_fire_in_order_reached() {
        let rtc = running();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (slot, signal) in SIGNALS.iter().copied().enumerate() {
            let log = log.clone();
            rtc.subscribe(
                signal,
                SubscriberKey { owner: 0, slot: slot as u32 },
                Arc::new(move || log.lock().unwrap().push(signal)),
            );
        }

        rtc.write_double_word(group_offset(0, GRP_CMP1VALUE), 30);
        rtc.write_double_word(group_offset(1, GRP_CMP0VALUE), 10);
        rtc.write_double_word(group_offset(0, GRP_CMP0VALUE), 200);
        rtc.write_double_word(group_offset(0, GRP_CTRL), GRP_CTRL_CMP0EN | GRP_CTRL_CMP1EN);
        rtc.write_double_word(group_offset(1, GRP_CTRL), GRP_CTRL_CMP0EN);

        rtc.advance(50);
        assert_eq!(rtc.counter(), 50);
        assert_eq!(*log.lock().unwrap(), vec![Signal::Group1Compare0, Signal::Group0Compare1]);
        assert_eq!(rtc.read_double_word(group_offset(0, GRP_IF)), GRP_IF_CMP1);
        assert_eq!(rtc.read_double_word(group_offset(1, GRP_IF)), GRP_IF_CMP0);

        // A compare equal to the current count is not reached again.
        rtc.write_double_word(group_offset(0, GRP_CMP1VALUE), 50);
        rtc.advance(10);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn overflow_sets_ovf_in_every_group() {
        let rtc = running();
        rtc.write_double_word(CNT, u32::MAX - 1);
        rtc.advance(3);
        assert_eq!(rtc.counter(), 1);
        for group in 0..GROUPS {
            assert_eq!(rtc.read_double_word(group_offset(group, GRP_IF)) & GRP_IF_OVF, GRP_IF_OVF);
        }
    }

    #[test]
    fn inputs_start_and_capture() {
        let rtc = Arc::new(Sysrtc::new(Arc::new(CriticalSectionClock)));
        rtc.write_double_word(EN, EN_EN);
        rtc.write_double_word(group_offset(0, GRP_CTRL), GRP_CTRL_CAP0EN);
        rtc.selector(Input::In0).select(Some(1));
        let in0 = rtc.consumer(Input::In0);
        let in1 = rtc.consumer(Input::In1);
        assert_eq!(in0.selected_channel(), Some(1));
        assert_eq!(in1.selected_channel(), None);

        in0.on_channel_event();
        assert!(rtc.is_running());
        rtc.advance(7);
        in1.on_channel_event();
        assert_eq!(rtc.read_double_word(group_offset(0, GRP_CAP0VALUE)), 7);
        assert_eq!(rtc.read_double_word(group_offset(0, GRP_IF)), GRP_IF_CAP0);
    }

    #[test]
    fn swrst_keeps_enable() {
        let rtc = running();
        rtc.advance(5);
        rtc.write_double_word(SWRST, SWRST_SWRST);
        assert_eq!(rtc.counter(), 0);
        assert!(!rtc.is_running());
        assert_eq!(rtc.read_double_word(EN), EN_EN);
    }
}
