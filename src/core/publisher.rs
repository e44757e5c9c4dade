//! Deduplicating fan-out of layer state to display subscribers
//!
//! The monitor thread owns the publisher; the last published value is the
//! only state shared with the display side, and it crosses the thread
//! boundary by value inside an [`AppEvent`].

use crate::core::events::{AppEvent, EventSender};
use crate::hid::protocol::LayerState;
use tracing::debug;

/// A sink for display updates.
///
/// Delivery is fire-and-forget: a failing or departed subscriber must never
/// propagate an error back into the monitor loop.
pub trait Subscription: Send {
    fn deliver(&self, event: AppEvent);
}

impl Subscription for EventSender {
    fn deliver(&self, event: AppEvent) {
        let _ = self.send(event);
    }
}

/// Last value handed to subscribers, for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastPublished {
    Nothing,
    State(LayerState),
    Lost,
}

/// Republishes the latest layer state to all subscribers, skipping values
/// identical to the previous one so a firmware that re-sends its state at a
/// fixed rate does not cause redundant display repaints.
pub struct StatePublisher {
    subscribers: Vec<Box<dyn Subscription>>,
    last: LastPublished,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            last: LastPublished::Nothing,
        }
    }

    /// Register a subscriber for all future updates
    pub fn attach(&mut self, subscription: impl Subscription + 'static) {
        self.subscribers.push(Box::new(subscription));
    }

    /// Announce the device a fresh session was opened on. Not deduplicated:
    /// every reconnect is worth reporting to the display.
    pub fn announce_attached(&mut self, product: &str) {
        self.deliver_all(AppEvent::DeviceAttached {
            product: product.to_string(),
        });
    }

    /// Publish a layer state, unless it equals the last published one
    pub fn publish(&mut self, state: LayerState) {
        if self.last == LastPublished::State(state) {
            return;
        }
        self.last = LastPublished::State(state);
        debug!(layer = state.layer, locks = state.locks, "layer changed");
        self.deliver_all(AppEvent::LayerChanged(state));
    }

    /// Publish the distinguished source-lost signal. Deduplicated like any
    /// state, and resets the last value so the first report after a
    /// reconnect is always delivered.
    pub fn publish_lost(&mut self) {
        if self.last == LastPublished::Lost {
            return;
        }
        self.last = LastPublished::Lost;
        self.deliver_all(AppEvent::SourceLost);
    }

    fn deliver_all(&self, event: AppEvent) {
        for subscriber in &self.subscribers {
            subscriber.deliver(event.clone());
        }
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}
