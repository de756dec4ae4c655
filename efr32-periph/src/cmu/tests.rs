use std::sync::{Arc, Mutex};

use super::*;
use crate::event::{EventProducer, Signal, SubscriberKey};
use crate::register::RegisterPeripheral;
use crate::sync::CriticalSectionClock;
use crate::time::Hertz;

fn clock() -> Arc<CriticalSectionClock> {
    Arc::new(CriticalSectionClock)
}

/// Record every firing of `signals` on `producer` into a shared log.
fn record(producer: &dyn EventProducer, signals: &[Signal]) -> Arc<Mutex<Vec<Signal>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for (slot, signal) in signals.iter().copied().enumerate() {
        let log = log.clone();
        producer.subscribe(
            signal,
            SubscriberKey { owner: 0, slot: slot as u32 },
            Arc::new(move || log.lock().unwrap().push(signal)),
        );
    }
    log
}

#[test]
fn demand_transitions() {
    let demand = Demand::default();
    assert_eq!(demand.ctrl_written(0, CTRL_FORCEEN), Transition::Start);
    assert_eq!(demand.ctrl_written(CTRL_FORCEEN, 0), Transition::Stop);

    assert_eq!(demand.request(0, false), Transition::Start);
    // A pending request keeps the oscillator on when FORCEEN drops.
    assert_eq!(demand.ctrl_written(CTRL_FORCEEN, 0), Transition::None);
    assert_eq!(demand.release(CTRL_FORCEEN, true), Transition::None);
    assert_eq!(demand.release(0, true), Transition::Stop);

    assert_eq!(demand.request(CTRL_DISONDEMAND, false), Transition::None);
}

#[test]
fn hfxo_fires_ens_then_ready() {
    let hfxo = hfxo::Hfxo::new(clock(), hfxo::Config::new());
    let log = record(&hfxo, &[Signal::Ready, Signal::Ens]);

    assert_eq!(hfxo.frequency(), None);
    hfxo.write_double_word(hfxo::CTRL + 0x1000, CTRL_FORCEEN);
    assert_eq!(*log.lock().unwrap(), vec![Signal::Ens, Signal::Ready]);

    let status = hfxo.read_double_word(hfxo::STATUS);
    assert_eq!(status & (STATUS_RDY | STATUS_ENS), STATUS_RDY | STATUS_ENS);
    assert_eq!(hfxo.read_double_word(hfxo::IF) & IF_RDY, IF_RDY);
    assert_eq!(hfxo.frequency(), Some(Hertz::mhz(39)));

    // Setting FORCEEN again is not a new start-up.
    hfxo.write_double_word(hfxo::CTRL + 0x1000, CTRL_FORCEEN);
    assert_eq!(log.lock().unwrap().len(), 2);

    hfxo.write_double_word(hfxo::CTRL + 0x2000, CTRL_FORCEEN);
    assert_eq!(hfxo.read_double_word(hfxo::STATUS) & STATUS_RDY, 0);
}

#[test]
fn hfxo_lock_blocks_ctrl() {
    let hfxo = hfxo::Hfxo::new(clock(), hfxo::Config::new().with_frequency(Hertz::mhz(38)));

    hfxo.write_double_word(hfxo::LOCK, 0);
    assert_eq!(hfxo.read_double_word(hfxo::STATUS) & STATUS_LOCK, STATUS_LOCK);
    hfxo.write_double_word(hfxo::CTRL + 0x1000, CTRL_FORCEEN);
    assert!(!hfxo.is_ready());

    hfxo.write_double_word(hfxo::LOCK, hfxo::LOCK_KEY);
    hfxo.write_double_word(hfxo::CTRL + 0x1000, CTRL_FORCEEN);
    assert_eq!(hfxo.frequency(), Some(Hertz::mhz(38)));
}

#[test]
fn hfxo_on_demand() {
    let hfxo = hfxo::Hfxo::new(clock(), hfxo::Config::new());
    hfxo.request();
    assert!(hfxo.is_ready());
    hfxo.release();
    assert!(!hfxo.is_ready());

    hfxo.write_double_word(hfxo::CTRL + 0x1000, CTRL_DISONDEMAND);
    hfxo.request();
    assert!(!hfxo.is_ready());
}

#[test]
fn hfrco_cal_selects_frequency() {
    let hfrco = hfrco::Hfrco::new(clock(), hfrco::Config::new());
    assert_eq!(hfrco.nominal_frequency(), Some(Hertz::mhz(19)));

    let cal = Cal::new().with_freqrange(FreqRange::Mhz38.to_bits()).with_clkdiv(1);
    hfrco.write_double_word(hfrco::CAL, cal.into_bits());
    assert_eq!(hfrco.nominal_frequency(), Some(Hertz::mhz(19)));

    let cal = Cal::new().with_freqrange(FreqRange::Mhz80.to_bits()).with_clkdiv(2);
    hfrco.write_double_word(hfrco::CAL, cal.into_bits());
    assert_eq!(hfrco.nominal_frequency(), Some(Hertz::mhz(20)));

    let cal = Cal::new().with_freqrange(31);
    hfrco.write_double_word(hfrco::CAL, cal.into_bits());
    assert_eq!(hfrco.nominal_frequency(), None);
}

#[test]
fn hfrco_and_lfrco_fire_ready() {
    let hfrco = hfrco::Hfrco::new(clock(), hfrco::Config::new());
    let lfrco = lfrco::Lfrco::new(clock());
    let hfrco_log = record(&hfrco, &[Signal::Ready]);
    let lfrco_log = record(&lfrco, &[Signal::Ready]);

    hfrco.write_double_word(hfrco::CTRL, CTRL_FORCEEN);
    lfrco.request();

    assert_eq!(*hfrco_log.lock().unwrap(), vec![Signal::Ready]);
    assert_eq!(*lfrco_log.lock().unwrap(), vec![Signal::Ready]);
    assert_eq!(lfrco.frequency(), Some(lfrco::FREQUENCY));
    assert_eq!(hfrco.frequency(), Some(Hertz::mhz(19)));
}

#[test]
fn lfrco_reset_stops_and_forgets_requests() {
    let lfrco = lfrco::Lfrco::new(clock());
    lfrco.request();
    lfrco.write_double_word(lfrco::IEN, IF_RDY);
    assert!(lfrco.interrupt_pending());

    lfrco.reset();
    assert!(!lfrco.is_ready());
    assert!(!lfrco.interrupt_pending());
    assert_eq!(lfrco.read_double_word(lfrco::NOMCAL), 0x0005_b8d8);
}

#[test]
fn cfg1_lock_outcome() {
    let reference = Hertz::mhz(39);
    let cfg1 = dpll::Cfg1::new().with_n(3999).with_m(1999);
    assert_eq!(cfg1.lock_outcome(reference), dpll::LockOutcome::Locked(Hertz::mhz(78)));
    assert_eq!(dpll::Cfg1::new().with_n(299).lock_outcome(reference), dpll::LockOutcome::TooLow);
    assert_eq!(
        dpll::Cfg1::new().with_n(4095).with_m(0).lock_outcome(reference),
        dpll::LockOutcome::TooHigh
    );
}

#[test]
fn dpll_lock_retunes_hfrco() {
    let clock = clock();
    let hfrco = Arc::new(hfrco::Hfrco::new(clock.clone(), hfrco::Config::new()));
    let dpll = dpll::Dpll::new(clock, hfrco.clone(), dpll::Config::new());
    let log = record(&dpll, &[Signal::Lock, Signal::LockFail]);

    let cfg1 = dpll::Cfg1::new().with_n(3999).with_m(1999);
    dpll.write_double_word(dpll::CFG1, cfg1.into_bits());
    dpll.write_double_word(dpll::EN, dpll::EN_EN);

    assert_eq!(*log.lock().unwrap(), vec![Signal::Lock]);
    assert_eq!(dpll.read_double_word(dpll::IF), dpll::IF_LOCK);
    assert_eq!(dpll.frequency(), Some(Hertz::mhz(78)));
    assert_eq!(hfrco.frequency(), Some(Hertz::mhz(78)));

    dpll.write_double_word(dpll::EN, 0);
    assert!(!dpll.is_locked());
    assert_eq!(hfrco.nominal_frequency(), Some(Hertz::mhz(19)));
}

#[test]
fn dpll_lock_failures() {
    let clock = clock();
    let hfrco = Arc::new(hfrco::Hfrco::new(clock.clone(), hfrco::Config::new()));
    let dpll = dpll::Dpll::new(clock, hfrco.clone(), dpll::Config::new());
    let log = record(&dpll, &[Signal::Lock, Signal::LockFail]);

    dpll.write_double_word(dpll::CFG1, dpll::Cfg1::new().with_n(100).into_bits());
    dpll.write_double_word(dpll::EN, dpll::EN_EN);
    assert_eq!(dpll.read_double_word(dpll::IF), dpll::IF_LOCKFAILLOW);
    dpll.write_double_word(dpll::EN, 0);

    dpll.write_double_word(dpll::IF + 0x2000, u32::MAX);
    dpll.write_double_word(dpll::CFG1, dpll::Cfg1::new().with_n(4000).into_bits());
    dpll.write_double_word(dpll::EN, dpll::EN_EN);
    assert_eq!(dpll.read_double_word(dpll::IF), dpll::IF_LOCKFAILHIGH);

    assert_eq!(*log.lock().unwrap(), vec![Signal::LockFail, Signal::LockFail]);
    assert!(!dpll.is_locked());
    assert!(!hfrco.is_ready());
}
