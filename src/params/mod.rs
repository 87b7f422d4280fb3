//! Live parameter entries owned by the RT side
//!
//! Every registered id maps to exactly one of three kinds:
//! - `plain`: a normalized value driven by the host, RT owned
//! - `outbound`: a typed value RT mutates and sends to the GUI as messages
//! - `inbound`: a typed value the GUI sends, applied by RT before processing

mod inbound;
mod outbound;
mod plain;

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;

pub use inbound::RtInboundParameter;
pub use outbound::RtOutboundParameter;
pub use plain::RtPlainParameter;

pub(crate) use inbound::InboundSender;

use crate::codec::ParamSerializer;
use crate::error::CodecError;
use crate::message::Message;
use crate::param::{ParamDef, ParamId};

/// One entry of the RT parameter store
pub(crate) enum RtParam {
    Plain(RtPlainParameter),
    Outbound(Box<dyn ErasedOutbound>),
    Inbound(Box<dyn ErasedInbound>),
}

// Type-erased views so parameters of different value types share one map
pub(crate) trait ErasedOutbound: Send {
    fn def(&self) -> &ParamDef;
    fn has_update(&self) -> bool;
    fn clear_update(&self);
    fn write_to_message(&self, message: &mut Message) -> Result<(), CodecError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) trait ErasedInbound: Send {
    fn apply_update(&mut self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

/// Host-thread side of an inbound parameter: decodes messages into its pending slot
pub(crate) trait ErasedInboundSender: Send {
    fn def(&self) -> &ParamDef;
    fn handle_message(&mut self, message: &Message) -> Result<(), CodecError>;
}

/// Typed handle to an outbound (RT to GUI) messaging parameter
pub struct Outbound<S> {
    id: ParamId,
    _marker: PhantomData<fn() -> S>,
}

/// Typed handle to an inbound (GUI to RT) messaging parameter
pub struct Inbound<S> {
    id: ParamId,
    _marker: PhantomData<fn() -> S>,
}

macro_rules! typed_handle {
    ($handle:ident) => {
        impl<S: ParamSerializer> $handle<S> {
            pub(crate) fn new(id: ParamId) -> Self {
                Self {
                    id,
                    _marker: PhantomData,
                }
            }

            #[inline]
            pub fn id(&self) -> ParamId {
                self.id
            }
        }

        impl<S> Clone for $handle<S> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<S> Copy for $handle<S> {}

        impl<S> fmt::Debug for $handle<S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($handle)).field(&self.id).finish()
            }
        }
    };
}

typed_handle!(Outbound);
typed_handle!(Inbound);
