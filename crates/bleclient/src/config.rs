//! Client configuration

use crate::transport::{event_channel, EventQueue, EventSink};
use crate::uuid::Uuid128;

/// Largest attribute value the ATT protocol allows
pub const MAX_ATTRIBUTE_LEN: usize = 512;

/// Default bound of the transport event queue
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Application identifier registered with the adapter on enable
    pub app_uuid: Uuid128,
    /// Largest value accepted by write requests
    pub max_attribute_len: usize,
    /// Number of transport events that may wait for the dispatcher
    pub event_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_uuid: Uuid128::new_random_v4(),
            max_attribute_len: MAX_ATTRIBUTE_LEN,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn with_app_uuid(mut self, app_uuid: Uuid128) -> Self {
        self.app_uuid = app_uuid;
        self
    }

    pub fn with_max_attribute_len(mut self, len: usize) -> Self {
        self.max_attribute_len = len;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    /// Creates the transport event queue with the configured bound
    pub fn event_channel(&self) -> (EventSink, EventQueue) {
        event_channel(self.event_queue_capacity)
    }
}
