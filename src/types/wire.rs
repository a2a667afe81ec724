//! Little-endian payload encoding trait and primitive implementations

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{KickoffError, Result};

/// Trait for types that can be written to and read from a message payload.
///
/// All multi-byte values use little-endian order. Variable-length values
/// (strings, byte arrays, lists) carry a `u32` element count prefix, and
/// optional values carry a one-byte presence flag.
pub trait WireData: Sized {
    /// Append this value to the payload buffer.
    fn write(&self, buf: &mut BytesMut);

    /// Read this value from the front of the payload, advancing it.
    fn read(buf: &mut Bytes) -> Result<Self>;
}

/// Fail with a parse error unless `needed` bytes remain.
pub(crate) fn ensure_remaining(buf: &Bytes, needed: usize, context: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(KickoffError::parse(
            context,
            format!("needed {} bytes, {} remaining", needed, buf.remaining()),
        ));
    }
    Ok(())
}

macro_rules! wire_number {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl WireData for $ty {
            fn write(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn read(buf: &mut Bytes) -> Result<Self> {
                ensure_remaining(buf, $size, stringify!($ty))?;
                Ok(buf.$get())
            }
        }
    };
}

wire_number!(u8, 1, put_u8, get_u8);
wire_number!(u16, 2, put_u16_le, get_u16_le);
wire_number!(u32, 4, put_u32_le, get_u32_le);
wire_number!(i32, 4, put_i32_le, get_i32_le);
wire_number!(f32, 4, put_f32_le, get_f32_le);

impl WireData for bool {
    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        match u8::read(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(KickoffError::parse("bool", format!("invalid value {}", other))),
        }
    }
}

fn read_len(buf: &mut Bytes, context: &str) -> Result<usize> {
    let len = u32::read(buf)? as usize;
    // Every element occupies at least one byte, which bounds allocations.
    ensure_remaining(buf, len, context)?;
    Ok(len)
}

impl WireData for String {
    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        let len = read_len(buf, "string")?;
        let raw = buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| KickoffError::parse("string", format!("invalid UTF-8: {}", e)))
    }
}

impl WireData for Bytes {
    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self);
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        let len = read_len(buf, "byte array")?;
        Ok(buf.split_to(len))
    }
}

impl<T: WireData> WireData for Vec<T> {
    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        for item in self {
            item.write(buf);
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        let len = read_len(buf, "list")?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(buf)?);
        }
        Ok(items)
    }
}

impl<T: WireData> WireData for Option<T> {
    fn write(&self, buf: &mut BytesMut) {
        match self {
            Some(value) => {
                buf.put_u8(1);
                value.write(buf);
            }
            None => buf.put_u8(0),
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        if bool::read(buf)? { Ok(Some(T::read(buf)?)) } else { Ok(None) }
    }
}

/// Implement [`WireData`] for a struct by encoding its fields in order.
macro_rules! wire_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::types::WireData for $ty {
            fn write(&self, buf: &mut ::bytes::BytesMut) {
                $($crate::types::WireData::write(&self.$field, buf);)*
            }

            fn read(buf: &mut ::bytes::Bytes) -> $crate::Result<Self> {
                Ok(Self { $($field: $crate::types::WireData::read(buf)?,)* })
            }
        }
    };
}

pub(crate) use wire_struct;
