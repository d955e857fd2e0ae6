//! XDR (External Data Representation, RFC 1832) serialization layer.
//!
//! Everything that crosses the wire (RPC envelopes, NFSv3 argument and
//! result records, MOUNT records) implements the [`Serialize`] and
//! [`Deserialize`] traits defined here. All primitives are big-endian and
//! 4-byte aligned; variable-length opaques carry a length prefix and zero
//! padding up to the alignment boundary, which the decoder consumes.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};

pub mod mount;
pub mod nfs3;
pub mod rpc;

/// Endianness used for every XDR primitive.
pub type XDREndian = BigEndian;

/// XDR alignment: encoded items occupy a multiple of four bytes.
pub const ALIGNMENT: usize = 4;

/// Upper bound accepted for any variable-length opaque.
///
/// Protects the decoder from allocating on a hostile length prefix; the
/// record-marking layer enforces the tighter per-procedure caps.
pub const MAX_OPAQUE_LEN: usize = 64 * 1024 * 1024;

/// Serializes the implementing type into an XDR byte stream.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Deserializes the implementing type in place from an XDR byte stream.
pub trait Deserialize {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads one `T` from the stream.
///
/// Convenience wrapper over [`Deserialize`] for call sites that want a
/// value instead of filling a `&mut T`.
pub fn deserialize<T: Default + Deserialize, R: Read>(src: &mut R) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

/// Builds the `InvalidData` error every decoder reports malformed input with.
pub fn invalid_data(m: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, m.into())
}

impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self as u32)
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()? > 0;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for i64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i64::<XDREndian>(*self)
    }
}

impl Deserialize for i64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i64::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XDREndian>(*self)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XDREndian>()?;
        Ok(())
    }
}

/// Fixed-size byte arrays are emitted raw, without a length prefix.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_all(self)
    }
}

impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)
    }
}

/// Variable-length opaque: length prefix, raw bytes, zero padding to the
/// 4-byte boundary. The decoder consumes the padding.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        let length = self.len() as u32;
        length.serialize(dest)?;
        dest.write_all(self)?;
        let pad = (ALIGNMENT - self.len() % ALIGNMENT) % ALIGNMENT;
        let zeros = [0_u8; ALIGNMENT];
        if pad > 0 {
            dest.write_all(&zeros[..pad])?;
        }
        Ok(())
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32, R>(src)? as usize;
        if length > MAX_OPAQUE_LEN {
            return Err(invalid_data(format!("opaque length {length} exceeds maximum")));
        }
        self.resize(length, 0);
        src.read_exact(self)?;
        let pad = (ALIGNMENT - length % ALIGNMENT) % ALIGNMENT;
        let mut zeros = [0_u8; ALIGNMENT];
        src.read_exact(&mut zeros[..pad])?;
        Ok(())
    }
}

/// Counted arrays of integers: length prefix, then each element.
impl Serialize for Vec<u32> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        (self.len() as u32).serialize(dest)?;
        for i in self {
            i.serialize(dest)?;
        }
        Ok(())
    }
}

impl Deserialize for Vec<u32> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32, R>(src)? as usize;
        if length > MAX_OPAQUE_LEN / ALIGNMENT {
            return Err(invalid_data(format!("array length {length} exceeds maximum")));
        }
        self.resize(length, 0);
        for i in self.iter_mut() {
            i.deserialize(src)?;
        }
        Ok(())
    }
}

/// Strings share the opaque framing; UTF-8 is required only on decode.
impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.as_bytes().to_vec().serialize(dest)
    }
}

impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let bytes = deserialize::<Vec<u8>, R>(src)?;
        *self = String::from_utf8(bytes).map_err(|_| invalid_data("string is not UTF-8"))?;
        Ok(())
    }
}

/// XDR boolean unions: a discriminant, then the value when present.
///
/// NFSv3 leans on these for every optional field (`post_op_attr`,
/// `pre_op_attr`, `post_op_fh3`, `sattrguard3`), which are type aliases
/// over `Option` in this crate.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            None => false.serialize(dest),
            Some(v) => {
                true.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl<T: Default + Deserialize> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        if deserialize::<bool, R>(src)? {
            *self = Some(deserialize(src)?);
        } else {
            *self = None;
        }
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by emitting each field in order.
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($element:ident),*) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Deserialize`] for a struct by filling each field in order.
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($element:ident),*) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Serialize`] for a fieldless enum as its `u32` discriminant.
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                (*self as u32).serialize(dest)
            }
        }
    };
}

/// Implements [`Deserialize`] for a fieldless enum, rejecting unknown
/// discriminants with `InvalidData`.
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let raw = $crate::xdr::deserialize::<u32, R>(src)?;
                match FromPrimitive::from_u32(raw) {
                    Some(v) => {
                        *self = v;
                        Ok(())
                    }
                    None => Err($crate::xdr::invalid_data(format!(
                        "invalid value {} for {}",
                        raw,
                        stringify!($t)
                    ))),
                }
            }
        }
    };
}

pub use crate::DeserializeEnum;
pub use crate::DeserializeStruct;
pub use crate::SerializeEnum;
pub use crate::SerializeStruct;
