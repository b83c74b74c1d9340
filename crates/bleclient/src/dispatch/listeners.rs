//! Observer registration

use super::{Event, EventMask};
use std::sync::Arc;

/// Observer callback. Called on the dispatching thread, after the core state
/// reflects the event, with no internal lock held.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, EventMask, Listener)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, mask: EventMask, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, mask, listener));
        id
    }

    /// Returns `false` if no listener had this id
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Listeners interested in `category`, in subscription order
    pub fn snapshot(&self, category: EventMask) -> Vec<Listener> {
        self.listeners
            .iter()
            .filter(|(_, mask, _)| mask.intersects(category))
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
