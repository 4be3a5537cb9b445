use crate::event::Event;

/// Name of the "new event" signal as seen by host pages.
pub const NEW_EVENT: &str = "analytics-event";

/// Type alias for subscription callback ID.
pub type SubscriptionId = u64;

/// Callback invoked with every newly captured event.
pub type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Synchronous fan-out of newly captured events to dashboard observers.
pub struct EventBus {
    subscriptions: Vec<(SubscriptionId, Listener)>,
    next_sub_id: SubscriptionId,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_sub_id: 1,
        }
    }

    /// Subscribe to new events. Returns a subscription ID for unsubscribing.
    pub fn subscribe(&mut self, callback: Listener) -> SubscriptionId {
        let id = self.next_sub_id;
        self.next_sub_id += 1;
        self.subscriptions.push((id, callback));
        id
    }

    /// Unsubscribe by subscription ID. Returns true if found.
    pub fn unsubscribe(&mut self, sub_id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(id, _)| *id != sub_id);
        self.subscriptions.len() < before
    }

    /// Notify every subscriber, in subscription order.
    pub fn emit(&self, event: &Event) {
        for (_, callback) in &self.subscriptions {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
