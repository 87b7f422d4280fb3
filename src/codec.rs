//! Serialization of typed parameter values
//!
//! A [`ParamSerializer`] fixes the binary layout of one value type. Every
//! layout here is little-endian. Messages carry exactly one serialized value
//! as their payload, so the message methods are derived from the stream ones.

use std::io::{Read, Write};

use crate::error::CodecError;
use crate::message::Message;

/// Reads and writes values of one type to byte streams and host messages
///
/// Implementations must be symmetric: reading what was written under the same
/// serializer reproduces the original value exactly.
pub trait ParamSerializer: Clone + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + 'static;

    fn write_to_stream<W: Write + ?Sized>(
        &self,
        value: &Self::Value,
        stream: &mut W,
    ) -> Result<(), CodecError>;

    fn read_from_stream<R: Read + ?Sized>(&self, stream: &mut R) -> Result<Self::Value, CodecError>;

    /// Replace the message payload with the serialized value
    ///
    /// Writing into a message whose payload already has enough capacity does
    /// not allocate.
    fn write_to_message(
        &self,
        value: &Self::Value,
        message: &mut Message,
    ) -> Result<(), CodecError> {
        let payload = message.payload_mut();
        payload.clear();
        self.write_to_stream(value, payload)
    }

    /// Decode the message payload, which must hold exactly one value
    fn read_from_message(&self, message: &Message) -> Result<Self::Value, CodecError> {
        let mut payload = message.payload();
        let value = self.read_from_stream(&mut payload)?;
        if !payload.is_empty() {
            return Err(CodecError::Trailing(payload.len()));
        }
        Ok(value)
    }
}

fn read_array<const N: usize, R: Read + ?Sized>(stream: &mut R) -> Result<[u8; N], CodecError> {
    let mut bytes = [0u8; N];
    stream.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_len<W: Write + ?Sized>(
    len: usize,
    max: Option<usize>,
    stream: &mut W,
) -> Result<(), CodecError> {
    let limit = max.unwrap_or(u32::MAX as usize).min(u32::MAX as usize);
    if len > limit {
        return Err(CodecError::TooLong { len, max: limit });
    }
    stream.write_all(&(len as u32).to_le_bytes())?;
    Ok(())
}

fn read_len<R: Read + ?Sized>(max: Option<usize>, stream: &mut R) -> Result<usize, CodecError> {
    let len = u32::from_le_bytes(read_array(stream)?) as usize;
    match max {
        Some(max) if len > max => Err(CodecError::TooLong { len, max }),
        _ => Ok(len),
    }
}

/// Read a length prefix and the bytes it announces
///
/// The buffer grows with the bytes actually present, never with the prefix.
fn read_prefixed<R: Read + ?Sized>(
    max: Option<usize>,
    stream: &mut R,
) -> Result<Vec<u8>, CodecError> {
    let expected = read_len(max, stream)?;
    let mut bytes = Vec::new();
    let actual = (&mut *stream).take(expected as u64).read_to_end(&mut bytes)?;
    if actual < expected {
        return Err(CodecError::Truncated { expected, actual });
    }
    Ok(bytes)
}

/// Generates a serializer for a fixed-size number stored with `to_le_bytes`
macro_rules! le_number_serializer {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name;

        impl ParamSerializer for $name {
            type Value = $ty;

            fn write_to_stream<W: Write + ?Sized>(
                &self,
                value: &$ty,
                stream: &mut W,
            ) -> Result<(), CodecError> {
                stream.write_all(&value.to_le_bytes())?;
                Ok(())
            }

            fn read_from_stream<R: Read + ?Sized>(
                &self,
                stream: &mut R,
            ) -> Result<$ty, CodecError> {
                Ok(<$ty>::from_le_bytes(read_array(stream)?))
            }
        }
    };
}

le_number_serializer!(
    /// 64-bit float, 8 bytes
    DoubleSerializer,
    f64
);
le_number_serializer!(
    /// 32-bit float, 4 bytes
    FloatSerializer,
    f32
);
le_number_serializer!(Int32Serializer, i32);
le_number_serializer!(Int64Serializer, i64);

/// One byte, `0` or `1`
#[derive(Clone, Copy, Debug, Default)]
pub struct BooleanSerializer;

impl ParamSerializer for BooleanSerializer {
    type Value = bool;

    fn write_to_stream<W: Write + ?Sized>(
        &self,
        value: &bool,
        stream: &mut W,
    ) -> Result<(), CodecError> {
        stream.write_all(&[*value as u8])?;
        Ok(())
    }

    fn read_from_stream<R: Read + ?Sized>(&self, stream: &mut R) -> Result<bool, CodecError> {
        match read_array::<1, R>(stream)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

/// UTF-8 text behind a `u32` byte-length prefix
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8StringSerializer {
    max_len: Option<usize>,
}

impl Utf8StringSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject strings longer than `max_len` bytes in either direction
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

impl ParamSerializer for Utf8StringSerializer {
    type Value = String;

    fn write_to_stream<W: Write + ?Sized>(
        &self,
        value: &String,
        stream: &mut W,
    ) -> Result<(), CodecError> {
        write_len(value.len(), self.max_len, stream)?;
        stream.write_all(value.as_bytes())?;
        Ok(())
    }

    fn read_from_stream<R: Read + ?Sized>(&self, stream: &mut R) -> Result<String, CodecError> {
        let bytes = read_prefixed(self.max_len, stream)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Opaque bytes behind a `u32` length prefix
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesSerializer {
    max_len: Option<usize>,
}

impl BytesSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

impl ParamSerializer for BytesSerializer {
    type Value = Vec<u8>;

    fn write_to_stream<W: Write + ?Sized>(
        &self,
        value: &Vec<u8>,
        stream: &mut W,
    ) -> Result<(), CodecError> {
        write_len(value.len(), self.max_len, stream)?;
        stream.write_all(value)?;
        Ok(())
    }

    fn read_from_stream<R: Read + ?Sized>(&self, stream: &mut R) -> Result<Vec<u8>, CodecError> {
        read_prefixed(self.max_len, stream)
    }
}
