//! Error types

use std::io;

use thiserror::Error;

use crate::param::{Owner, ParamId, ValueKind};

/// Registration rejected; the registry is left unchanged
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("duplicate parameter id {0}")]
    DuplicateId(ParamId),
    #[error("parameter {id} is owned by {actual:?} but this kind requires {expected:?}")]
    WrongOwner {
        id: ParamId,
        expected: Owner,
        actual: Owner,
    },
    #[error("messaging parameter {0} must be shared")]
    NotShared(ParamId),
    #[error("plain parameter {id} has a non-finite default {default}")]
    NonFiniteDefault { id: ParamId, default: f64 },
    #[error("parameter {id} has value kind {actual:?}, expected {expected:?}")]
    WrongValueKind {
        id: ParamId,
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// The save order does not describe a valid snapshot layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("parameter {0} used in the save order is not registered")]
    Unregistered(ParamId),
    #[error("parameter {0} used in the save order is a messaging parameter")]
    NotPlain(ParamId),
    #[error("parameter {0} is transient and cannot be part of the save order")]
    Transient(ParamId),
    #[error("parameter {0} appears more than once in the save order")]
    Duplicate(ParamId),
}

/// Failure to serialize or deserialize a single value
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    #[error("payload of {len} bytes exceeds the limit of {max}")]
    TooLong { len: usize, max: usize },
    #[error("{0} unread trailing byte(s) in message payload")]
    Trailing(usize),
    #[error("length prefix announces {expected} bytes but only {actual} follow")]
    Truncated { expected: usize, actual: usize },
}

/// Failure to read or write the persisted normalized state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state stream error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failure to handle or produce a messaging parameter message
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message carries no parameter id")]
    MissingId,
    #[error("no messaging parameter registered with id {0}")]
    UnknownParam(ParamId),
    #[error("parameter {0} does not accept messages from the GUI")]
    NotInbound(ParamId),
    #[error("parameter {0} is not sent by the RT side")]
    NotOutbound(ParamId),
    #[error("parameter {id}: {source}")]
    Codec {
        id: ParamId,
        #[source]
        source: CodecError,
    },
    #[error("no message could be allocated for parameter {0}")]
    Allocation(ParamId),
    #[error("message for parameter {0} could not be delivered")]
    Send(ParamId),
}

/// Why one outbound parameter could not be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFaultKind {
    /// The producer had no message object to hand out
    Allocation,
    /// The value could not be serialized into the message
    Encode,
    /// The producer refused the message
    Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendFault {
    pub id: ParamId,
    pub kind: SendFaultKind,
}

/// Combined, non-fatal result of draining outbound messages
///
/// Failed parameters keep their dirty flag and are retried on the next drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{failed} outbound message(s) failed ({sent} sent), first failure {first:?}")]
pub struct DrainError {
    pub sent: usize,
    pub failed: usize,
    pub first: SendFault,
}
