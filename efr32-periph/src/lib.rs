#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod utils;

pub use utils::Field;

pub mod cmu;
pub mod devinfo;
pub mod emu;
pub mod event;
pub mod prs;
pub mod register;
pub mod sync;
pub mod sysrtc;
pub mod time;
pub mod userdata;

pub use event::{ConsumerSelector, EventConsumer, EventProducer, Signal, SignalHub, SubscriberKey};
pub use register::{RegisterBank, RegisterPeripheral};
pub use sync::{with_clock, ClockOrder, CriticalSectionClock};
pub use time::Hertz;
