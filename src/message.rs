//! Host boundary: messages, message producers and parameter change queues

use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::MessageQueueConfig;
use crate::param::ParamId;

/// A discrete message exchanged between the RT and GUI sides
///
/// Carries the id of the parameter it belongs to and one serialized value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    id: Option<ParamId>,
    payload: Vec<u8>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message whose payload can hold `capacity` bytes without growing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: None,
            payload: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn id(&self) -> Option<ParamId> {
        self.id
    }

    #[inline]
    pub fn set_id(&mut self, id: ParamId) {
        self.id = Some(id);
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    /// Forget id and payload, keeping the allocation
    pub fn clear(&mut self) {
        self.id = None;
        self.payload.clear();
    }
}

/// Source of message objects and sink for sending them to the other side
pub trait MessageProducer {
    /// Hand out an empty message, or `None` when none can be allocated
    fn allocate_message(&mut self) -> Option<Message>;

    /// Deliver a message; on failure the message is handed back
    fn send_message(&mut self, message: Message) -> Result<(), Message>;

    /// Take back a message that was allocated but could not be sent
    fn release_message(&mut self, message: Message) {
        drop(message);
    }
}

/// The queued value points the host delivers for one parameter in a block
pub trait ParamValueQueue {
    fn param_id(&self) -> ParamId;

    fn point_count(&self) -> usize;

    /// The `(sample_offset, normalized_value)` point at `index`
    fn point(&self, index: usize) -> Option<(i32, f64)>;

    /// The most recent point, which is all the RT store looks at
    fn last_point(&self) -> Option<(i32, f64)> {
        self.point_count().checked_sub(1).and_then(|last| self.point(last))
    }
}

/// A plain [`ParamValueQueue`] for hosts and tests that build change lists themselves
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamChangeQueue {
    id: ParamId,
    points: Vec<(i32, f64)>,
}

impl ParamChangeQueue {
    pub fn new(id: ParamId) -> Self {
        Self { id, points: Vec::new() }
    }

    pub fn with_point(mut self, sample_offset: i32, value: f64) -> Self {
        self.points.push((sample_offset, value));
        self
    }

    pub fn push(&mut self, sample_offset: i32, value: f64) {
        self.points.push((sample_offset, value));
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl ParamValueQueue for ParamChangeQueue {
    fn param_id(&self) -> ParamId {
        self.id
    }

    fn point_count(&self) -> usize {
        self.points.len()
    }

    fn point(&self, index: usize) -> Option<(i32, f64)> {
        self.points.get(index).copied()
    }
}

/// Create a pooled message queue
///
/// All messages are allocated up front; sent messages travel to the
/// [`QueueReceiver`] through one ring buffer and come back through another
/// once handled. Neither side allocates afterwards.
pub fn queue(config: &MessageQueueConfig) -> (QueueProducer, QueueReceiver) {
    let capacity = config.capacity.max(1);
    let (outbox, inbox) = RingBuffer::new(capacity);
    let (mut recycle, free) = RingBuffer::new(capacity);

    for _ in 0..capacity {
        // The pool exactly fills the recycle lane
        let _ = recycle.push(Message::with_capacity(config.payload_capacity));
    }

    (
        QueueProducer {
            outbox,
            free,
            spare: None,
        },
        QueueReceiver { inbox, recycle },
    )
}

/// Sending half of a message queue, usable from the RT thread
pub struct QueueProducer {
    outbox: Producer<Message>,
    free: Consumer<Message>,
    /// A message whose send failed, reused before touching the pool
    spare: Option<Message>,
}

impl QueueProducer {
    /// Number of messages that can be handed out right now
    pub fn available(&self) -> usize {
        self.free.slots() + self.spare.is_some() as usize
    }
}

impl MessageProducer for QueueProducer {
    fn allocate_message(&mut self) -> Option<Message> {
        let mut message = self.spare.take().or_else(|| self.free.pop().ok())?;
        message.clear();
        Some(message)
    }

    fn send_message(&mut self, message: Message) -> Result<(), Message> {
        self.outbox.push(message).map_err(|rtrb::PushError::Full(m)| m)
    }

    fn release_message(&mut self, message: Message) {
        if self.spare.is_none() {
            self.spare = Some(message);
        }
    }
}

/// Receiving half of a message queue, owned by the GUI side
pub struct QueueReceiver {
    inbox: Consumer<Message>,
    recycle: Producer<Message>,
}

impl QueueReceiver {
    /// Number of messages waiting to be handled
    pub fn pending(&self) -> usize {
        self.inbox.slots()
    }

    /// Pop every waiting message, hand it to `handle`, then return it to the pool
    pub fn drain<F: FnMut(&Message)>(&mut self, mut handle: F) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.pop() {
            handle(&message);
            let _ = self.recycle.push(message);
            handled += 1;
        }
        handled
    }

    /// Take the next message out of the queue
    ///
    /// Pass it back through [`recycle`](Self::recycle) once done, otherwise the
    /// pool shrinks by one.
    pub fn recv(&mut self) -> Option<Message> {
        self.inbox.pop().ok()
    }

    pub fn recycle(&mut self, message: Message) {
        let _ = self.recycle.push(message);
    }
}
