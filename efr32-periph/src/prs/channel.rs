use core::cell::RefCell;

use super::Source;
use crate::event::Signal;
use crate::sync::StateMutex;

/// The producer signal a channel is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Subscription {
    pub source: Source,
    pub signal: Signal,
}

/// Fixed-size channel registry. Each slot holds at most one subscription.
pub(crate) struct ChannelTable {
    slots: StateMutex<RefCell<Vec<Option<Subscription>>>>,
}

impl ChannelTable {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            slots: StateMutex::new(RefCell::new(vec![None; channels])),
        }
    }

    pub(crate) fn get(&self, index: usize) -> Option<Subscription> {
        self.slots.lock(|slots| slots.borrow()[index])
    }

    /// Store `subscription` in slot `index` and return what it replaced.
    pub(crate) fn replace(&self, index: usize, subscription: Option<Subscription>) -> Option<Subscription> {
        self.slots
            .lock(|slots| core::mem::replace(&mut slots.borrow_mut()[index], subscription))
    }

    /// Empty every slot, returning the subscriptions that were active.
    pub(crate) fn clear(&self) -> Vec<(usize, Subscription)> {
        self.slots.lock(|slots| {
            slots
                .borrow_mut()
                .iter_mut()
                .enumerate()
                .filter_map(|(index, slot)| slot.take().map(|s| (index, s)))
                .collect()
        })
    }

    /// Channels currently bound to `subscription`.
    pub(crate) fn bound_to(&self, subscription: Subscription) -> Vec<usize> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .enumerate()
                .filter(|(_, slot)| **slot == Some(subscription))
                .map(|(index, _)| index)
                .collect()
        })
    }
}
