//! Per-variant channel layouts and source/signal tables.
//!
//! The tables are generated by `build.rs` from `data/prs/*.yaml`.

use super::{ConsumerKind, Source};
use crate::event::Signal;
use crate::utils::Field;

/// One signal a source can drive onto a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEntry {
    /// SIGSEL value.
    pub id: u8,
    pub signal: Signal,
}

/// One SOURCESEL value and the signals it offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEntry {
    /// SOURCESEL value.
    pub id: u8,
    pub source: Source,
    pub signals: &'static [SignalEntry],
}

/// A PRS hardware variant.
pub trait Variant: Copy + Send + Sync + 'static {
    /// Short lowercase name used in log messages.
    const NAME: &'static str;
    /// Number of asynchronous channels.
    const CHANNELS: usize;
    /// IPVERSION reset value.
    const IPVERSION: u32;
    /// Offset of CH0_CTRL. Channel `i` lives at `CH_CTRL_OFFSET + 4 * i`.
    const CH_CTRL_OFFSET: u32;
    /// Signal selector field of CHx_CTRL.
    const SIGSEL: Field;
    /// Source selector field of CHx_CTRL.
    const SOURCESEL: Field;
    /// Recognized sources, each with its recognized signals.
    const SOURCES: &'static [SourceEntry];
    /// Consumers in dispatch order.
    const CONSUMERS: &'static [ConsumerKind];

    /// Resolve a (source id, signal id) pair. Source first, then signal within the source.
    fn lookup(source_id: u32, signal_id: u32) -> Option<(Source, Signal)> {
        let source = Self::SOURCES.iter().find(|s| u32::from(s.id) == source_id)?;
        let signal = source.signals.iter().find(|s| u32::from(s.id) == signal_id)?;
        Some((source.source, signal.signal))
    }

    /// Split a CHx_CTRL value into `(source id, signal id)`.
    fn decode(raw: u32) -> (u32, u32) {
        (Self::SOURCESEL.extract(raw), Self::SIGSEL.extract(raw))
    }

    /// CHx_CTRL value selecting `signal` of `source`, if the variant can route it.
    fn encode(source: Source, signal: Signal) -> Option<u32> {
        let entry = Self::SOURCES.iter().find(|s| s.source == source)?;
        let signal = entry.signals.iter().find(|s| s.signal == signal)?;
        let raw = Self::SOURCESEL.insert(0, u32::from(entry.id));
        Some(Self::SIGSEL.insert(raw, u32::from(signal.id)))
    }

    /// Writable bits of CHx_CTRL.
    fn ctrl_mask() -> u32 {
        Self::SIGSEL.register_mask() | Self::SOURCESEL.register_mask()
    }

    /// One bit per channel, as used by ASYNC_SWPULSE and ASYNC_SWLEVEL.
    fn channel_mask() -> u32 {
        if Self::CHANNELS >= 32 {
            u32::MAX
        } else {
            (1 << Self::CHANNELS) - 1
        }
    }

    /// Whether the variant has a slot for `kind`.
    fn has_consumer(kind: ConsumerKind) -> bool {
        Self::CONSUMERS.contains(&kind)
    }
}

include!(concat!(env!("OUT_DIR"), "/prs_variants.rs"));
