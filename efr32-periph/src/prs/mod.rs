//! Peripheral Reflex System (PRS): the asynchronous channel controller.
//!
//! A channel binds to at most one producer signal, chosen by writing a
//! (source, signal) pair to its CHx_CTRL register. When the producer fires,
//! the controller scans the variant's consumer list in declaration order and
//! runs every consumer whose selector names that channel.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use efr32_periph::prs::{ConsumerKind, Prs, SelectorConsumer, Standard};
//! use efr32_periph::sync::CriticalSectionClock;
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let h = hits.clone();
//! let wakeup = Arc::new(SelectorConsumer::new(move || {
//!     h.fetch_add(1, Ordering::SeqCst);
//! }));
//! wakeup.selector().select(Some(4));
//!
//! let prs = Prs::<Standard>::builder(Arc::new(CriticalSectionClock))
//!     .consumer(ConsumerKind::EmuWakeup, wakeup.clone())
//!     .build();
//!
//! prs.trigger_software_pulse(4);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

mod channel;
mod consumer;
mod variant;

use core::marker::PhantomData;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub use channel::Subscription;
use channel::ChannelTable;
pub use consumer::{ConsumerKind, SelectorConsumer};
pub use variant::{Compact, Extended, SignalEntry, SourceEntry, Standard, Variant};

use crate::event::{EventConsumer, EventProducer, Signal, SubscriberKey};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};
use crate::utils::BitIter;

/// Producer peripherals a channel can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    Letimer0,
    /// HFXO0, low-jitter output.
    Hfxo0L,
    Hfrco0,
    Lfrco,
    Dpll0,
    Sysrtc0,
}

pub const IPVERSION: u32 = 0x000;
pub const ASYNC_SWPULSE: u32 = 0x008;
pub const ASYNC_SWLEVEL: u32 = 0x00c;
pub const ASYNC_PEEK: u32 = 0x010;

const CH_CTRL_NAMES: [&str; 16] = [
    "CH0_CTRL", "CH1_CTRL", "CH2_CTRL", "CH3_CTRL", "CH4_CTRL", "CH5_CTRL", "CH6_CTRL", "CH7_CTRL",
    "CH8_CTRL", "CH9_CTRL", "CH10_CTRL", "CH11_CTRL", "CH12_CTRL", "CH13_CTRL", "CH14_CTRL", "CH15_CTRL",
];

/// Asynchronous channel controller for variant `V`.
///
/// Cheap to clone; clones share the same channels.
pub struct Prs<V: Variant> {
    inner: Arc<Inner<V>>,
}

impl<V: Variant> Clone for Prs<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<V: Variant> {
    owner: u32,
    clock: Arc<dyn ClockOrder>,
    producers: BTreeMap<Source, Arc<dyn EventProducer>>,
    /// Bound consumers, already in the variant's dispatch order.
    consumers: Vec<(ConsumerKind, Arc<dyn EventConsumer>)>,
    channels: ChannelTable,
    registers: RegisterBank<Inner<V>>,
    this: Weak<Inner<V>>,
    _variant: PhantomData<V>,
}

/// Wires producers and consumers into a [`Prs`].
pub struct PrsBuilder<V: Variant> {
    clock: Arc<dyn ClockOrder>,
    producers: BTreeMap<Source, Arc<dyn EventProducer>>,
    consumers: BTreeMap<ConsumerKind, Arc<dyn EventConsumer>>,
    _variant: PhantomData<V>,
}

impl<V: Variant> PrsBuilder<V> {
    /// Connect the peripheral behind `source`. A later call for the same source replaces it.
    pub fn producer(mut self, source: Source, producer: Arc<dyn EventProducer>) -> Self {
        if !V::SOURCES.iter().any(|s| s.source == source) {
            warn!("prs-{}: variant has no source {:?}, ignoring", V::NAME, source);
            return self;
        }
        self.producers.insert(source, producer);
        self
    }

    /// Bind the consumer slot `kind`. A later call for the same slot replaces it.
    pub fn consumer(mut self, kind: ConsumerKind, consumer: Arc<dyn EventConsumer>) -> Self {
        if !V::has_consumer(kind) {
            warn!("prs-{}: variant has no consumer {:?}, ignoring", V::NAME, kind);
            return self;
        }
        self.consumers.insert(kind, consumer);
        self
    }

    pub fn build(self) -> Prs<V> {
        let PrsBuilder {
            clock,
            producers,
            mut consumers,
            ..
        } = self;
        let consumers = V::CONSUMERS
            .iter()
            .filter_map(|kind| consumers.remove(kind).map(|c| (*kind, c)))
            .collect();

        let inner = Arc::new_cyclic(|this| Inner {
            owner: SubscriberKey::allocate_owner(),
            clock,
            producers,
            consumers,
            channels: ChannelTable::new(V::CHANNELS),
            registers: Inner::<V>::register_bank(),
            this: this.clone(),
            _variant: PhantomData,
        });
        debug!(
            "prs-{}: {} channels, {} producer(s), {} consumer(s)",
            V::NAME,
            V::CHANNELS,
            inner.producers.len(),
            inner.consumers.len()
        );
        Prs { inner }
    }
}

impl<V: Variant> Prs<V> {
    pub fn builder(clock: Arc<dyn ClockOrder>) -> PrsBuilder<V> {
        PrsBuilder {
            clock,
            producers: BTreeMap::new(),
            consumers: BTreeMap::new(),
            _variant: PhantomData,
        }
    }

    pub const fn channel_count(&self) -> usize {
        V::CHANNELS
    }

    /// Offset of channel `index`'s control register.
    pub fn ch_ctrl_offset(index: usize) -> u32 {
        V::CH_CTRL_OFFSET + 4 * index as u32
    }

    /// Bind channel `index` to the producer signal named by `(source_id, signal_id)`.
    ///
    /// The previous binding is removed first. Unrecognized pairs, including
    /// source 0, leave every channel untouched.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a channel of this variant.
    pub fn configure_channel(&self, index: usize, source_id: u32, signal_id: u32) {
        self.inner.configure_channel(index, source_id, signal_id)
    }

    /// Dispatch channel `index` to every consumer currently selecting it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a channel of this variant.
    pub fn on_producer_event(&self, index: usize) {
        self.inner.on_producer_event(index)
    }

    /// Raise the ASYNC_SWPULSE bit of channel `index`. Fires only if the bit was clear.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a channel of this variant.
    pub fn trigger_software_pulse(&self, index: usize) {
        self.inner.trigger_software_pulse(index)
    }

    /// Current binding of channel `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a channel of this variant.
    pub fn subscription(&self, index: usize) -> Option<Subscription> {
        Inner::<V>::check_channel(index);
        self.inner.channels.get(index)
    }

    /// Channels currently bound to `signal` of `source`.
    pub fn channels_bound_to(&self, source: Source, signal: Signal) -> Vec<usize> {
        self.inner.channels.bound_to(Subscription { source, signal })
    }

    /// Consumer slots with a bound consumer, in dispatch order.
    pub fn bound_consumers(&self) -> Vec<ConsumerKind> {
        self.inner.consumers.iter().map(|(kind, _)| *kind).collect()
    }
}

impl<V: Variant> Inner<V> {
    fn register_bank() -> RegisterBank<Self> {
        let mut bank = RegisterBank::new("prs")
            .with_aliases()
            .register(IPVERSION, Register::new("IPVERSION", V::IPVERSION).read_only())
            .register(
                ASYNC_SWPULSE,
                Register::new("ASYNC_SWPULSE", 0)
                    .write_only()
                    .with_mask(V::channel_mask())
                    .on_write(Self::write_swpulse),
            )
            .register(
                ASYNC_SWLEVEL,
                Register::new("ASYNC_SWLEVEL", 0).with_mask(V::channel_mask()),
            )
            .register(ASYNC_PEEK, Register::new("ASYNC_PEEK", 0).read_only().on_read(Self::read_peek));
        for (index, name) in CH_CTRL_NAMES.iter().copied().enumerate().take(V::CHANNELS) {
            bank = bank.register(
                Prs::<V>::ch_ctrl_offset(index),
                Register::new(name, 0)
                    .with_mask(V::ctrl_mask())
                    .on_write(Self::write_ch_ctrl),
            );
        }
        bank
    }

    fn check_channel(index: usize) {
        assert!(
            index < V::CHANNELS,
            "prs-{}: channel {} out of range (0..{})",
            V::NAME,
            index,
            V::CHANNELS
        );
    }

    fn key(&self, index: usize) -> SubscriberKey {
        SubscriberKey {
            owner: self.owner,
            slot: index as u32,
        }
    }

    fn configure_channel(&self, index: usize, source_id: u32, signal_id: u32) {
        Self::check_channel(index);
        with_clock(&*self.clock, || {
            let Some(next) = self.rebind(index, source_id, signal_id) else {
                return;
            };
            if let Some(raw) = V::encode(next.source, next.signal) {
                self.registers.set_value(Prs::<V>::ch_ctrl_offset(index), raw);
            }
        })
    }

    /// Returns the new binding, or `None` if the channel was left as it was.
    fn rebind(&self, index: usize, source_id: u32, signal_id: u32) -> Option<Subscription> {
        let Some((source, signal)) = V::lookup(source_id, signal_id) else {
            debug!(
                "prs-{}: ch{} ignoring unrecognized source {:#x} signal {:#x}",
                V::NAME,
                index,
                source_id,
                signal_id
            );
            return None;
        };
        let Some(producer) = self.producers.get(&source) else {
            warn!("prs-{}: ch{} selects {:?} but no producer is connected", V::NAME, index, source);
            return None;
        };
        if !producer.hub().exposes(signal) {
            warn!("prs-{}: ch{} producer {} has no signal {:?}", V::NAME, index, producer.hub().name(), signal);
            return None;
        }

        let key = self.key(index);
        let next = Subscription { source, signal };
        if let Some(previous) = self.channels.replace(index, Some(next)) {
            self.release(key, previous);
        }

        let this = self.this.clone();
        producer.subscribe(
            signal,
            key,
            Arc::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.on_bound_event(index, next);
                }
            }),
        );
        debug!("prs-{}: ch{} -> {:?}.{:?}", V::NAME, index, source, signal);
        Some(next)
    }

    fn release(&self, key: SubscriberKey, subscription: Subscription) {
        if let Some(producer) = self.producers.get(&subscription.source) {
            producer.unsubscribe(subscription.signal, key);
        }
    }

    fn on_producer_event(&self, index: usize) {
        Self::check_channel(index);
        with_clock(&*self.clock, || self.dispatch(index))
    }

    /// Producer callback for the binding `bound` of channel `index`.
    ///
    /// A firing snapshots its subscribers, so a callback can arrive after its
    /// channel was moved to another signal. Those are dropped.
    fn on_bound_event(&self, index: usize, bound: Subscription) {
        with_clock(&*self.clock, || {
            if self.channels.get(index) == Some(bound) {
                self.dispatch(index);
            } else {
                trace!("prs-{}: ch{} no longer bound to {:?}.{:?}", V::NAME, index, bound.source, bound.signal);
            }
        })
    }

    fn dispatch(&self, index: usize) {
        let mut hits = 0;
        for (kind, consumer) in &self.consumers {
            if consumer.selected_channel() == Some(index) {
                trace!("prs-{}: ch{} -> {:?}", V::NAME, index, kind);
                consumer.on_channel_event();
                hits += 1;
            }
        }
        if hits == 0 {
            trace!("prs-{}: ch{} fired with no consumer", V::NAME, index);
        }
    }

    fn trigger_software_pulse(&self, index: usize) {
        Self::check_channel(index);
        with_clock(&*self.clock, || {
            let bit = 1 << index;
            let old = self.registers.value(ASYNC_SWPULSE);
            self.registers.set_value(ASYNC_SWPULSE, old | bit);
            if old & bit == 0 {
                self.dispatch(index);
            }
        })
    }

    fn reset(&self) {
        with_clock(&*self.clock, || {
            for (index, subscription) in self.channels.clear() {
                self.release(self.key(index), subscription);
            }
            self.registers.reset();
        })
    }

    fn write_swpulse(&self, _offset: u32, old: u32, new: u32) {
        for channel in BitIter(new & !old) {
            self.dispatch(channel as usize);
        }
    }

    fn write_ch_ctrl(&self, offset: u32, _old: u32, new: u32) {
        let index = ((offset - V::CH_CTRL_OFFSET) / 4) as usize;
        let (source_id, signal_id) = V::decode(new);
        self.rebind(index, source_id, signal_id);
    }

    fn read_peek(&self, _offset: u32, _stored: u32) -> u32 {
        self.registers.value(ASYNC_SWLEVEL)
    }
}

impl<V: Variant> Drop for Inner<V> {
    fn drop(&mut self) {
        for (index, subscription) in self.channels.clear() {
            self.release(self.key(index), subscription);
        }
    }
}

impl<V: Variant> RegisterPeripheral for Prs<V> {
    fn read_double_word(&self, offset: u32) -> u32 {
        let inner = &*self.inner;
        with_clock(&*inner.clock, || inner.registers.read(inner, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        let inner = &*self.inner;
        with_clock(&*inner.clock, || inner.registers.write(inner, offset, value))
    }

    fn reset(&self) {
        self.inner.reset()
    }
}
