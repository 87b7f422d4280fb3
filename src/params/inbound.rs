//! GUI-owned messaging parameter applied by RT

use core::any::Any;

use crate::codec::ParamSerializer;
use crate::error::CodecError;
use crate::exchange::{self, Publisher, Receiver};
use crate::message::Message;
use crate::param::ParamDef;
use crate::params::{ErasedInbound, ErasedInboundSender};

/// RT half: the live value plus the pending slot the GUI writes into
pub struct RtInboundParameter<S: ParamSerializer> {
    def: ParamDef,
    value: S::Value,
    pending: Receiver<S::Value>,
    changed: bool,
}

/// Host-thread half: decodes incoming messages into the pending slot
pub(crate) struct InboundSender<S: ParamSerializer> {
    def: ParamDef,
    serializer: S,
    pending: Publisher<S::Value>,
}

impl<S: ParamSerializer> RtInboundParameter<S> {
    pub(crate) fn pair(def: ParamDef, serializer: S, value: S::Value) -> (Self, InboundSender<S>) {
        let (publisher, receiver) = exchange::channel(value.clone());
        let rt = Self {
            def,
            value,
            pending: receiver,
            changed: false,
        };
        let sender = InboundSender {
            def,
            serializer,
            pending: publisher,
        };
        (rt, sender)
    }

    #[inline]
    pub fn def(&self) -> &ParamDef {
        &self.def
    }

    #[inline]
    pub fn value(&self) -> &S::Value {
        &self.value
    }

    /// Whether an update was applied at the start of the current cycle
    #[inline]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Whether the GUI has sent a value not applied yet
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.has_pending()
    }
}

impl<S: ParamSerializer> ErasedInbound for RtInboundParameter<S> {
    fn apply_update(&mut self) -> bool {
        self.changed = self.pending.consume_swap(&mut self.value);
        self.changed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: ParamSerializer> ErasedInboundSender for InboundSender<S> {
    fn def(&self) -> &ParamDef {
        &self.def
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), CodecError> {
        let value = self.serializer.read_from_message(message)?;
        self.pending.publish_with(move |slot| *slot = value);
        Ok(())
    }
}
