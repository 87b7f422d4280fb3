//! Parameter synchronization between a plugin's real-time thread and its GUI
//!
//! Parameters are registered once with a [`ParameterRegistry`], then split by
//! [`ParameterRegistry::build`] into three owned halves:
//!
//! - [`RtState`] for the audio thread, which runs the per-block protocol and never
//!   locks or allocates
//! - [`RtStateHandle`] for the host's main thread, which loads and saves state and
//!   forwards GUI messages
//! - [`GuiState`] for the GUI, which mirrors the messaging parameters
//!
//! Plain parameters are normalized `f64` values owned by RT and persisted in
//! [`SaveOrder`]. Messaging parameters carry typed values through a
//! [`ParamSerializer`] and travel as [`Message`]s.

mod codec;
mod config;
mod error;
mod exchange;
mod gui;
mod message;
mod normalized;
mod param;
mod params;
mod registry;
mod rt_state;

pub use crate::codec::{
    BooleanSerializer, BytesSerializer, DoubleSerializer, FloatSerializer, Int32Serializer,
    Int64Serializer, ParamSerializer, Utf8StringSerializer,
};
pub use crate::config::MessageQueueConfig;
pub use crate::error::{
    CodecError, DrainError, LayoutError, MessageError, RegistrationError, SendFault, SendFaultKind,
    StateError,
};
pub use crate::exchange::{channel, Publisher, Receiver};
pub use crate::gui::GuiState;
pub use crate::message::{
    queue, Message, MessageProducer, ParamChangeQueue, ParamValueQueue, QueueProducer,
    QueueReceiver,
};
pub use crate::normalized::{NormalizedState, SaveOrder};
pub use crate::param::{Owner, ParamDef, ParamDefs, ParamId, ParamRole, ValueKind};
pub use crate::params::{
    Inbound, Outbound, RtInboundParameter, RtOutboundParameter, RtPlainParameter,
};
pub use crate::registry::{ParameterRegistry, SyncState};
pub use crate::rt_state::{CyclePhase, CycleReport, RtState, RtStateHandle};
