//! Event producer and consumer capabilities.
//!
//! A producer owns a [`SignalHub`], an explicit subscriber registry mapping each
//! of its signals to an ordered list of callbacks. Subscribers are identified by
//! a [`SubscriberKey`]; the PRS uses one key per channel, so rewiring a channel
//! is always "unsubscribe this key, subscribe this key".
//!
//! Consumers do not subscribe. They expose the channel their selector currently
//! names and an action; the PRS samples selectors at dispatch time.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::sync::StateMutex;

/// Named point-in-time events a producer can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Signal {
    /// Oscillator output is ready.
    Ready,
    /// Oscillator is enabled (crystal core running).
    Ens,
    /// DPLL achieved lock.
    Lock,
    /// DPLL lock failed (frequency too low or too high).
    LockFail,
    /// SYSRTC group 0 compare channel 0 match.
    Group0Compare0,
    /// SYSRTC group 0 compare channel 1 match.
    Group0Compare1,
    /// SYSRTC group 1 compare channel 0 match.
    Group1Compare0,
    /// SYSRTC group 1 compare channel 1 match.
    Group1Compare1,
    /// LETIMER underflow / output channel 0.
    Channel0,
    /// LETIMER output channel 1.
    Channel1,
}

/// Identifies one subscription inside a [`SignalHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriberKey {
    /// Unique id of the subscribing component.
    pub owner: u32,
    /// Slot inside the owner (the PRS channel index).
    pub slot: u32,
}

static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

impl SubscriberKey {
    /// Allocate a fresh owner id.
    pub fn allocate_owner() -> u32 {
        NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
    }
}

/// Callback invoked when a subscribed signal fires.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

struct Subscription {
    signal: Signal,
    key: SubscriberKey,
    callback: Callback,
}

/// Per-producer subscriber registry.
pub struct SignalHub {
    name: &'static str,
    signals: &'static [Signal],
    subscribers: StateMutex<RefCell<Vec<Subscription>>>,
}

impl SignalHub {
    /// Registry for a producer exposing `signals`.
    pub fn new(name: &'static str, signals: &'static [Signal]) -> Self {
        Self {
            name,
            signals,
            subscribers: StateMutex::new(RefCell::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals this producer can raise.
    pub fn signals(&self) -> &'static [Signal] {
        self.signals
    }

    /// Whether the producer exposes `signal`.
    pub fn exposes(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }

    /// Add `callback` for `signal` under `key`.
    ///
    /// An existing subscription with the same key and signal is replaced, so a
    /// repeated subscribe never causes a double notification. Returns `false`
    /// if the producer does not expose `signal`.
    pub fn subscribe(&self, signal: Signal, key: SubscriberKey, callback: Callback) -> bool {
        if !self.exposes(signal) {
            warn!("{}: no signal {:?}", self.name, signal);
            return false;
        }
        self.subscribers.lock(|subscribers| {
            let mut subscribers = subscribers.borrow_mut();
            match subscribers
                .iter_mut()
                .find(|s| s.signal == signal && s.key == key)
            {
                Some(existing) => existing.callback = callback,
                None => subscribers.push(Subscription {
                    signal,
                    key,
                    callback,
                }),
            }
        });
        trace!("{}: {:?} subscribed to {:?}", self.name, key, signal);
        true
    }

    /// Remove the subscription for `signal` under `key`. Absent subscriptions are a no-op.
    pub fn unsubscribe(&self, signal: Signal, key: SubscriberKey) {
        self.subscribers.lock(|subscribers| {
            subscribers
                .borrow_mut()
                .retain(|s| !(s.signal == signal && s.key == key));
        });
        trace!("{}: {:?} unsubscribed from {:?}", self.name, key, signal);
    }

    /// Number of subscriptions currently registered for `signal`.
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        self.subscribers.lock(|subscribers| {
            subscribers
                .borrow()
                .iter()
                .filter(|s| s.signal == signal)
                .count()
        })
    }

    /// Notify every subscriber of `signal`, in subscription order.
    ///
    /// The subscriber list is snapshotted first; callbacks may subscribe or
    /// unsubscribe without affecting the current firing.
    pub fn fire(&self, signal: Signal) {
        let callbacks: Vec<Callback> = self.subscribers.lock(|subscribers| {
            subscribers
                .borrow()
                .iter()
                .filter(|s| s.signal == signal)
                .map(|s| s.callback.clone())
                .collect()
        });
        trace!("{}: {:?} -> {} subscriber(s)", self.name, signal, callbacks.len());
        for callback in callbacks {
            callback();
        }
    }
}

/// Peripheral capability: exposes named signals others can subscribe to.
pub trait EventProducer: Send + Sync {
    /// The producer's subscriber registry.
    fn hub(&self) -> &SignalHub;

    fn subscribe(&self, signal: Signal, key: SubscriberKey, callback: Callback) -> bool {
        self.hub().subscribe(signal, key, callback)
    }

    fn unsubscribe(&self, signal: Signal, key: SubscriberKey) {
        self.hub().unsubscribe(signal, key)
    }
}

/// Peripheral capability: reacts when the channel its selector names fires.
pub trait EventConsumer: Send + Sync {
    /// Channel index the consumer's selector currently names, or `None`.
    fn selected_channel(&self) -> Option<usize>;

    /// The consumer's action ("wake up", "start capture", ...).
    fn on_channel_event(&self);
}

/// Channel selector field held by a consumer peripheral.
///
/// Stored as a raw value; [`ConsumerSelector::NONE`] means "not listening".
#[derive(Debug)]
pub struct ConsumerSelector(AtomicU32);

impl ConsumerSelector {
    /// Raw sentinel meaning "no channel".
    pub const NONE: u32 = u32::MAX;

    /// A selector that listens to nothing.
    pub const fn new() -> Self {
        Self(AtomicU32::new(Self::NONE))
    }

    /// A selector listening to `channel`.
    pub const fn with_channel(channel: usize) -> Self {
        Self(AtomicU32::new(channel as u32))
    }

    pub fn select(&self, channel: Option<usize>) {
        let raw = channel.map_or(Self::NONE, |c| c as u32);
        self.0.store(raw, Ordering::SeqCst);
    }

    pub fn channel(&self) -> Option<usize> {
        match self.0.load(Ordering::SeqCst) {
            Self::NONE => None,
            raw => Some(raw as usize),
        }
    }

    /// Raw value, as a register read would see it.
    pub fn raw(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_raw(&self, raw: u32) {
        self.0.store(raw, Ordering::SeqCst);
    }
}

impl Default for ConsumerSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    const SIGNALS: &[Signal] = &[Signal::Ready, Signal::Ens];

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn fire_reaches_only_matching_signal() {
        let hub = SignalHub::new("osc", SIGNALS);
        let key = SubscriberKey { owner: 1, slot: 0 };
        let (count, cb) = counter();

        assert!(hub.subscribe(Signal::Ready, key, cb));
        hub.fire(Signal::Ens);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        hub.fire(Signal::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_subscribe_notifies_once() {
        let hub = SignalHub::new("osc", SIGNALS);
        let key = SubscriberKey { owner: 1, slot: 3 };
        let (count, cb) = counter();

        hub.subscribe(Signal::Ready, key, cb.clone());
        hub.subscribe(Signal::Ready, key, cb);
        assert_eq!(hub.subscriber_count(Signal::Ready), 1);
        hub.fire(Signal::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_absent_is_noop() {
        let hub = SignalHub::new("osc", SIGNALS);
        let key = SubscriberKey { owner: 9, slot: 9 };
        hub.unsubscribe(Signal::Ens, key);
        assert_eq!(hub.subscriber_count(Signal::Ens), 0);
    }

    #[test]
    fn unknown_signal_is_rejected() {
        let hub = SignalHub::new("osc", SIGNALS);
        let (_, cb) = counter();
        assert!(!hub.subscribe(Signal::Lock, SubscriberKey { owner: 1, slot: 0 }, cb));
        assert_eq!(hub.subscriber_count(Signal::Lock), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let hub = Arc::new(SignalHub::new("osc", SIGNALS));
        let key = SubscriberKey { owner: 2, slot: 1 };
        let count = Arc::new(AtomicUsize::new(0));
        let (h, c) = (Arc::downgrade(&hub), count.clone());
        hub.subscribe(
            Signal::Ready,
            key,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                if let Some(hub) = h.upgrade() {
                    hub.unsubscribe(Signal::Ready, key);
                }
            }),
        );

        hub.fire(Signal::Ready);
        hub.fire(Signal::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn selector_sentinel() {
        let selector = ConsumerSelector::new();
        assert_eq!(selector.channel(), None);
        selector.select(Some(5));
        assert_eq!(selector.channel(), Some(5));
        assert_eq!(selector.raw(), 5);
        selector.select(None);
        assert_eq!(selector.raw(), ConsumerSelector::NONE);
    }
}
