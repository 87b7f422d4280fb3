//! Configuration for the message queue between RT and GUI

/// Sizing of the pooled message queue created by [`crate::message::queue`]
///
/// Both values are fixed at construction: the RT side never grows the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageQueueConfig {
    /// Number of message objects in flight at once
    pub capacity: usize,
    /// Bytes preallocated for each message payload
    pub payload_capacity: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            payload_capacity: 1024,
        }
    }
}

impl MessageQueueConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the payload size preallocated per message
    ///
    /// Payloads larger than this still work, but growing them allocates on
    /// whichever thread writes the message.
    pub fn with_payload_capacity(mut self, payload_capacity: usize) -> Self {
        self.payload_capacity = payload_capacity;
        self
    }
}
