use crate::event::{ConsumerSelector, EventConsumer};

/// Consumer slots a PRS variant may dispatch to.
///
/// The variant's table lists the subset it supports, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsumerKind {
    CmuCalDown,
    CmuCalUp,
    EmuWakeup,
    Letimer0Clear,
    Letimer0Start,
    Letimer0Stop,
    Sysrtc0In0,
    Sysrtc0In1,
    Timer0Cc0,
    Timer0Cc1,
}

/// Consumer made of a selector and a closure.
///
/// Stands in for consumer peripherals that are not modeled in detail.
pub struct SelectorConsumer<F> {
    selector: ConsumerSelector,
    action: F,
}

impl<F: Fn() + Send + Sync> SelectorConsumer<F> {
    pub fn new(action: F) -> Self {
        Self {
            selector: ConsumerSelector::new(),
            action,
        }
    }

    pub fn selector(&self) -> &ConsumerSelector {
        &self.selector
    }
}

impl<F: Fn() + Send + Sync> EventConsumer for SelectorConsumer<F> {
    fn selected_channel(&self) -> Option<usize> {
        self.selector.channel()
    }

    fn on_channel_event(&self) {
        (self.action)()
    }
}
