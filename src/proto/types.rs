//! Primitive Minecraft protocol field types shared across packets.

use crate::error::{RelayError, Result};
use crate::proto::varint::VarInt;
use std::io::{Read, Write};
use uuid::Uuid;

/// A length-prefixed UTF-8 string, as used throughout the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct McString(pub String);

impl McString {
    /// Default maximum string length in characters (vanilla's generic cap).
    pub const MAX_LENGTH: usize = 32767;

    /// Reads a string bounded by [`Self::MAX_LENGTH`].
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Self::read_with_max_length(reader, Self::MAX_LENGTH)
    }

    /// Reads a string bounded by an explicit maximum length.
    pub fn read_with_max_length<R: Read>(reader: &mut R, max_length: usize) -> Result<Self> {
        let length = VarInt::read(reader)?;
        if length.0 < 0 {
            return Err(RelayError::Protocol("negative string length".into()));
        }

        let length = length.0 as usize;
        if length > max_length {
            return Err(RelayError::Protocol(format!(
                "string too long: {length} > {max_length}"
            )));
        }

        let mut bytes = vec![0u8; length];
        reader.read_exact(&mut bytes)?;

        let string = String::from_utf8(bytes)
            .map_err(|_| RelayError::Protocol("invalid UTF-8 in string".into()))?;

        Ok(McString(string))
    }

    /// Writes this string, prefixed by its byte length.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.0.as_bytes();
        if bytes.len() > Self::MAX_LENGTH {
            return Err(RelayError::Protocol("string too long".into()));
        }

        VarInt(bytes.len() as i32).write(writer)?;
        writer.write_all(bytes)?;
        Ok(())
    }
}

impl From<String> for McString {
    fn from(value: String) -> Self {
        McString(value)
    }
}

impl From<&str> for McString {
    fn from(value: &str) -> Self {
        McString(value.to_string())
    }
}

impl From<McString> for String {
    fn from(value: McString) -> Self {
        value.0
    }
}

impl std::fmt::Display for McString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Minecraft UUID, stored as-is (16 raw bytes on the wire, no hyphens).
pub type McUuid = Uuid;

/// Reads a raw 16-byte UUID.
pub fn read_uuid<R: Read>(reader: &mut R) -> Result<McUuid> {
    let mut bytes = [0u8; 16];
    reader.read_exact(&mut bytes)?;
    Ok(Uuid::from_bytes(bytes))
}

/// Writes a raw 16-byte UUID.
pub fn write_uuid<W: Write>(uuid: &McUuid, writer: &mut W) -> Result<()> {
    writer.write_all(uuid.as_bytes())?;
    Ok(())
}

/// Reads a single boolean byte.
pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0] != 0)
}

/// Writes a single boolean byte.
pub fn write_bool<W: Write>(value: bool, writer: &mut W) -> Result<()> {
    writer.write_all(&[value as u8])
        .map_err(RelayError::from)
}

/// Reads a big-endian unsigned 16-bit integer (e.g. port numbers).
pub fn read_unsigned_short<R: Read>(reader: &mut R) -> Result<u16> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

/// Writes a big-endian unsigned 16-bit integer.
pub fn write_unsigned_short<W: Write>(value: u16, writer: &mut W) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Reads a big-endian signed 64-bit integer.
pub fn read_long<R: Read>(reader: &mut R) -> Result<i64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(i64::from_be_bytes(bytes))
}

/// Writes a big-endian signed 64-bit integer.
pub fn write_long<W: Write>(value: i64, writer: &mut W) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Reads a length-prefixed byte array (VarInt length + raw bytes), used for
/// signatures, public keys, and other opaque byte blobs.
pub fn read_byte_array<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let length = VarInt::read(reader)?;
    if length.0 < 0 {
        return Err(RelayError::Protocol("negative byte array length".into()));
    }
    let mut bytes = vec![0u8; length.0 as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Writes a length-prefixed byte array.
pub fn write_byte_array<W: Write>(bytes: &[u8], writer: &mut W) -> Result<()> {
    VarInt(bytes.len() as i32).write(writer)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads a fixed-size byte array.
pub fn read_fixed_bytes<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mcstring_round_trip() {
        let s = McString::from("proxy.local");
        let mut buf = Vec::new();
        s.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = McString::read(&mut cursor).unwrap();
        assert_eq!(decoded.0, "proxy.local");
    }

    #[test]
    fn test_byte_array_round_trip() {
        let data = vec![1u8, 2, 3, 4, 5];
        let mut buf = Vec::new();
        write_byte_array(&data, &mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_byte_array(&mut cursor).unwrap(), data);
    }
}
