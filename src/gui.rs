//! GUI-side copies of the messaging parameters

use core::any::Any;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use crate::codec::ParamSerializer;
use crate::error::{CodecError, MessageError};
use crate::message::{Message, MessageProducer};
use crate::param::{Owner, ParamDef, ParamDefs, ParamId};
use crate::params::{Inbound, Outbound};

pub(crate) trait ErasedGuiParam: Send {
    fn def(&self) -> &ParamDef;
    /// Decode a value sent by RT; returns whether it differed
    fn handle_message(&mut self, message: &Message) -> Result<bool, CodecError>;
    fn version(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) struct GuiParameter<S: ParamSerializer> {
    def: ParamDef,
    serializer: S,
    value: S::Value,
    version: u64,
}

impl<S: ParamSerializer> GuiParameter<S> {
    pub(crate) fn new(def: ParamDef, serializer: S, value: S::Value) -> Self {
        Self {
            def,
            serializer,
            value,
            version: 0,
        }
    }

    fn replace(&mut self, value: S::Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.version += 1;
        true
    }
}

impl<S: ParamSerializer> ErasedGuiParam for GuiParameter<S> {
    fn def(&self) -> &ParamDef {
        &self.def
    }

    fn handle_message(&mut self, message: &Message) -> Result<bool, CodecError> {
        let value = self.serializer.read_from_message(message)?;
        Ok(self.replace(value))
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The GUI's view of every shared messaging parameter
///
/// Outbound values arrive through [`handle_message`](GuiState::handle_message).
/// Inbound values are changed with [`update`](GuiState::update), which also
/// sends them to RT.
pub struct GuiState {
    defs: Arc<ParamDefs>,
    params: HashMap<ParamId, Box<dyn ErasedGuiParam>>,
}

impl GuiState {
    pub(crate) fn new(
        defs: Arc<ParamDefs>,
        params: HashMap<ParamId, Box<dyn ErasedGuiParam>>,
    ) -> Self {
        Self { defs, params }
    }

    pub fn defs(&self) -> &ParamDefs {
        &self.defs
    }

    /// Apply a message RT sent for an outbound parameter; returns whether the value changed
    pub fn handle_message(&mut self, message: &Message) -> Result<bool, MessageError> {
        let id = message.id().ok_or(MessageError::MissingId)?;
        let param = match self.params.get_mut(&id) {
            Some(param) => param,
            None if self.defs.contains(id) => return Err(MessageError::NotOutbound(id)),
            None => {
                warn!(id, "message for unknown parameter");
                return Err(MessageError::UnknownParam(id));
            }
        };
        if param.def().owner() != Owner::Rt {
            return Err(MessageError::NotOutbound(id));
        }

        let changed = param.handle_message(message).map_err(|source| {
            warn!(id, "failed to decode outbound message: {}", source);
            MessageError::Codec { id, source }
        })?;
        trace!(id, changed, "outbound value received");
        Ok(changed)
    }

    /// Change a GUI-owned value and send it to RT
    ///
    /// Nothing is sent when the value is unchanged. The local copy is only
    /// updated once the message went out.
    pub fn update<S, P>(
        &mut self,
        handle: &Inbound<S>,
        value: S::Value,
        producer: &mut P,
    ) -> Result<bool, MessageError>
    where
        S: ParamSerializer,
        P: MessageProducer + ?Sized,
    {
        let id = handle.id();
        let param = self
            .params
            .get_mut(&id)
            .and_then(|p| p.as_any_mut().downcast_mut::<GuiParameter<S>>())
            .ok_or(MessageError::NotInbound(id))?;
        if param.def.owner() != Owner::Gui {
            return Err(MessageError::NotInbound(id));
        }
        if param.value == value {
            return Ok(false);
        }

        let mut message = producer.allocate_message().ok_or(MessageError::Allocation(id))?;
        message.set_id(id);
        if let Err(source) = param.serializer.write_to_message(&value, &mut message) {
            producer.release_message(message);
            return Err(MessageError::Codec { id, source });
        }
        if let Err(message) = producer.send_message(message) {
            producer.release_message(message);
            warn!(id, "failed to send inbound value");
            return Err(MessageError::Send(id));
        }

        debug!(id, "inbound value sent");
        Ok(param.replace(value))
    }

    /// Last value RT sent for an outbound parameter
    pub fn value<S: ParamSerializer>(&self, handle: &Outbound<S>) -> Option<&S::Value> {
        self.typed::<S>(handle.id()).map(|p| &p.value)
    }

    /// Current GUI-side value of an inbound parameter
    pub fn inbound_value<S: ParamSerializer>(&self, handle: &Inbound<S>) -> Option<&S::Value> {
        self.typed::<S>(handle.id()).map(|p| &p.value)
    }

    /// Number of times the value of `id` changed on this side
    pub fn version(&self, id: ParamId) -> Option<u64> {
        self.params.get(&id).map(|p| p.version())
    }

    fn typed<S: ParamSerializer>(&self, id: ParamId) -> Option<&GuiParameter<S>> {
        self.params.get(&id)?.as_any().downcast_ref()
    }
}
