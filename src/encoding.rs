//! Encoding and decoding for the primitive types of the CQL wire format.
//!
//! Each primitive gets its own module with `encode`, `decode` and
//! `encoded_len` functions operating on [`Buf`]/[`BufMut`]. All integers are
//! big-endian. Message codecs compose these; nothing here knows about
//! messages or flag bitmaps.
//!
//! `encoded_len` is analytic: it never serializes, and for every input its
//! corresponding `encode` accepts it returns exactly the number of bytes
//! `encode` writes.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use ::bytes::{Buf, BufMut};

use crate::error::Error;
use crate::types::Value;
use crate::version::ProtocolVersion;

/// Fails with a short-read error unless `needed` bytes remain.
#[inline]
pub(crate) fn ensure(buf: &impl Buf, needed: usize) -> Result<(), Error> {
    if buf.remaining() < needed {
        return Err(Error::short_read());
    }
    Ok(())
}

pub mod byte {
    use super::*;

    #[inline]
    pub fn encode(value: u8, buf: &mut impl BufMut) {
        buf.put_u8(value);
    }

    #[inline]
    pub fn decode(buf: &mut impl Buf) -> Result<u8, Error> {
        ensure(buf, 1)?;
        Ok(buf.get_u8())
    }

    #[inline]
    pub const fn encoded_len() -> usize {
        1
    }
}

pub mod short {
    use super::*;

    #[inline]
    pub fn encode(value: u16, buf: &mut impl BufMut) {
        buf.put_u16(value);
    }

    #[inline]
    pub fn decode(buf: &mut impl Buf) -> Result<u16, Error> {
        ensure(buf, 2)?;
        Ok(buf.get_u16())
    }

    #[inline]
    pub const fn encoded_len() -> usize {
        2
    }
}

pub mod int {
    use super::*;

    #[inline]
    pub fn encode(value: i32, buf: &mut impl BufMut) {
        buf.put_i32(value);
    }

    #[inline]
    pub fn decode(buf: &mut impl Buf) -> Result<i32, Error> {
        ensure(buf, 4)?;
        Ok(buf.get_i32())
    }

    #[inline]
    pub const fn encoded_len() -> usize {
        4
    }
}

pub mod long {
    use super::*;

    #[inline]
    pub fn encode(value: i64, buf: &mut impl BufMut) {
        buf.put_i64(value);
    }

    #[inline]
    pub fn decode(buf: &mut impl Buf) -> Result<i64, Error> {
        ensure(buf, 8)?;
        Ok(buf.get_i64())
    }

    #[inline]
    pub const fn encoded_len() -> usize {
        8
    }
}

/// A UTF-8 string prefixed by an unsigned [short] length.
pub mod string {
    use super::*;

    pub fn encode(value: &str, buf: &mut impl BufMut) -> Result<(), Error> {
        let len = u16::try_from(value.len())
            .map_err(|_| Error::invalid(format!("string of {} bytes overflows [short]", value.len())))?;
        buf.put_u16(len);
        buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<String, Error> {
        let len = short::decode(buf)? as usize;
        ensure(buf, len)?;
        let raw = buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::malformed("string is not valid UTF-8"))
    }

    #[inline]
    pub fn encoded_len(value: &str) -> usize {
        2 + value.len()
    }
}

/// A UTF-8 string prefixed by a signed [int] length.
pub mod long_string {
    use super::*;

    pub fn encode(value: &str, buf: &mut impl BufMut) -> Result<(), Error> {
        let len = i32::try_from(value.len())
            .map_err(|_| Error::invalid(format!("string of {} bytes overflows [int]", value.len())))?;
        buf.put_i32(len);
        buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<String, Error> {
        let len = int::decode(buf)?;
        if len < 0 {
            return Err(Error::malformed(format!(
                "negative long string length: {len}"
            )));
        }
        let len = len as usize;
        ensure(buf, len)?;
        let raw = buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::malformed("long string is not valid UTF-8"))
    }

    #[inline]
    pub fn encoded_len(value: &str) -> usize {
        4 + value.len()
    }
}

/// Binary data prefixed by a signed [int] length; length -1 encodes null.
pub mod bytes {
    use super::*;

    pub fn encode(value: Option<&[u8]>, buf: &mut impl BufMut) -> Result<(), Error> {
        match value {
            None => buf.put_i32(-1),
            Some(data) => {
                let len = i32::try_from(data.len()).map_err(|_| {
                    Error::invalid(format!("{} bytes overflows [int]", data.len()))
                })?;
                buf.put_i32(len);
                buf.put_slice(data);
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Option<Vec<u8>>, Error> {
        let len = int::decode(buf)?;
        if len < 0 {
            if len != -1 {
                return Err(Error::malformed(format!("invalid bytes length: {len}")));
            }
            return Ok(None);
        }
        let len = len as usize;
        ensure(buf, len)?;
        Ok(Some(buf.copy_to_bytes(len).to_vec()))
    }

    #[inline]
    pub fn encoded_len(value: Option<&[u8]>) -> usize {
        4 + value.map_or(0, <[u8]>::len)
    }
}

/// Binary data prefixed by an unsigned [short] length. No null form exists.
pub mod short_bytes {
    use super::*;

    pub fn encode(value: &[u8], buf: &mut impl BufMut) -> Result<(), Error> {
        let len = u16::try_from(value.len())
            .map_err(|_| Error::invalid(format!("{} bytes overflows [short]", value.len())))?;
        buf.put_u16(len);
        buf.put_slice(value);
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Vec<u8>, Error> {
        let len = short::decode(buf)? as usize;
        ensure(buf, len)?;
        Ok(buf.copy_to_bytes(len).to_vec())
    }

    #[inline]
    pub fn encoded_len(value: &[u8]) -> usize {
        2 + value.len()
    }
}

/// A 16-byte UUID, raw.
pub mod uuid {
    use super::*;

    #[inline]
    pub fn encode(value: ::uuid::Uuid, buf: &mut impl BufMut) {
        buf.put_slice(value.as_bytes());
    }

    pub fn decode(buf: &mut impl Buf) -> Result<::uuid::Uuid, Error> {
        ensure(buf, 16)?;
        let mut raw = [0u8; 16];
        buf.copy_to_slice(&mut raw);
        Ok(::uuid::Uuid::from_bytes(raw))
    }

    #[inline]
    pub const fn encoded_len() -> usize {
        16
    }
}

/// An IP address without a port: a length [byte] (4 or 16) and the raw
/// address octets. Used inside failure reason maps.
pub mod inet_addr {
    use super::*;

    pub fn encode(value: IpAddr, buf: &mut impl BufMut) {
        match value {
            IpAddr::V4(addr) => {
                buf.put_u8(4);
                buf.put_slice(&addr.octets());
            }
            IpAddr::V6(addr) => {
                buf.put_u8(16);
                buf.put_slice(&addr.octets());
            }
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<IpAddr, Error> {
        let len = byte::decode(buf)?;
        match len {
            4 => {
                ensure(buf, 4)?;
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                Ok(IpAddr::from(octets))
            }
            16 => {
                ensure(buf, 16)?;
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                Ok(IpAddr::from(octets))
            }
            other => Err(Error::malformed(format!(
                "invalid inet address length: {other}"
            ))),
        }
    }

    #[inline]
    pub fn encoded_len(value: IpAddr) -> usize {
        match value {
            IpAddr::V4(_) => 1 + 4,
            IpAddr::V6(_) => 1 + 16,
        }
    }
}

/// An IP address plus an [int] port.
pub mod inet {
    use super::*;

    pub fn encode(value: SocketAddr, buf: &mut impl BufMut) {
        inet_addr::encode(value.ip(), buf);
        buf.put_i32(i32::from(value.port()));
    }

    pub fn decode(buf: &mut impl Buf) -> Result<SocketAddr, Error> {
        let ip = inet_addr::decode(buf)?;
        let port = int::decode(buf)?;
        let port = u16::try_from(port)
            .map_err(|_| Error::malformed(format!("invalid inet port: {port}")))?;
        Ok(SocketAddr::new(ip, port))
    }

    #[inline]
    pub fn encoded_len(value: SocketAddr) -> usize {
        inet_addr::encoded_len(value.ip()) + 4
    }
}

/// A [short] count of [string]s.
pub mod string_list {
    use super::*;

    pub fn encode(values: &[String], buf: &mut impl BufMut) -> Result<(), Error> {
        let count = u16::try_from(values.len())
            .map_err(|_| Error::invalid(format!("{} strings overflow [short]", values.len())))?;
        buf.put_u16(count);
        for value in values {
            string::encode(value, buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Vec<String>, Error> {
        let count = short::decode(buf)? as usize;
        let mut values = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            values.push(string::decode(buf)?);
        }
        Ok(values)
    }

    #[inline]
    pub fn encoded_len(values: &[String]) -> usize {
        2 + values.iter().map(|v| string::encoded_len(v)).sum::<usize>()
    }
}

/// A [short] count of [string] key / [string] value entries.
pub mod string_map {
    use super::*;

    pub fn encode(values: &HashMap<String, String>, buf: &mut impl BufMut) -> Result<(), Error> {
        let count = u16::try_from(values.len())
            .map_err(|_| Error::invalid(format!("{} entries overflow [short]", values.len())))?;
        buf.put_u16(count);
        for (key, value) in values {
            string::encode(key, buf)?;
            string::encode(value, buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<HashMap<String, String>, Error> {
        let count = short::decode(buf)? as usize;
        let mut values = HashMap::with_capacity(count.min(64));
        for _ in 0..count {
            let key = string::decode(buf)?;
            let value = string::decode(buf)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    #[inline]
    pub fn encoded_len(values: &HashMap<String, String>) -> usize {
        2 + values
            .iter()
            .map(|(k, v)| string::encoded_len(k) + string::encoded_len(v))
            .sum::<usize>()
    }
}

/// A [short] count of [string] key / [string list] value entries.
pub mod string_multimap {
    use super::*;

    pub fn encode(
        values: &HashMap<String, Vec<String>>,
        buf: &mut impl BufMut,
    ) -> Result<(), Error> {
        let count = u16::try_from(values.len())
            .map_err(|_| Error::invalid(format!("{} entries overflow [short]", values.len())))?;
        buf.put_u16(count);
        for (key, value) in values {
            string::encode(key, buf)?;
            string_list::encode(value, buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<HashMap<String, Vec<String>>, Error> {
        let count = short::decode(buf)? as usize;
        let mut values = HashMap::with_capacity(count.min(64));
        for _ in 0..count {
            let key = string::decode(buf)?;
            let value = string_list::decode(buf)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    #[inline]
    pub fn encoded_len(values: &HashMap<String, Vec<String>>) -> usize {
        2 + values
            .iter()
            .map(|(k, v)| string::encoded_len(k) + string_list::encoded_len(v))
            .sum::<usize>()
    }
}

/// A single bound value: [int] length then payload, with -1 for null and -2
/// for unset (v4+).
pub mod value {
    use super::*;

    pub fn encode(
        value: &Value,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        match value {
            Value::Regular(data) => {
                let len = i32::try_from(data.len()).map_err(|_| {
                    Error::invalid(format!("value of {} bytes overflows [int]", data.len()))
                })?;
                buf.put_i32(len);
                buf.put_slice(data);
            }
            Value::Null => buf.put_i32(-1),
            Value::Unset => {
                if !version.supports_unset_values() {
                    return Err(Error::unsupported(format!(
                        "unset values are not defined in {version:?}"
                    )));
                }
                buf.put_i32(-2);
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Value, Error> {
        let len = int::decode(buf)?;
        match len {
            -1 => Ok(Value::Null),
            -2 => {
                if !version.supports_unset_values() {
                    return Err(Error::unsupported(format!(
                        "unset values are not defined in {version:?}"
                    )));
                }
                Ok(Value::Unset)
            }
            len if len < 0 => Err(Error::malformed(format!("invalid value length: {len}"))),
            len => {
                let len = len as usize;
                ensure(buf, len)?;
                Ok(Value::Regular(buf.copy_to_bytes(len).to_vec()))
            }
        }
    }

    #[inline]
    pub fn encoded_len(value: &Value) -> usize {
        match value {
            Value::Regular(data) => 4 + data.len(),
            Value::Null | Value::Unset => 4,
        }
    }
}

/// A [short] count of positional bound values.
pub mod positional_values {
    use super::*;

    pub fn encode(
        values: &[Value],
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        let count = u16::try_from(values.len())
            .map_err(|_| Error::invalid(format!("{} values overflow [short]", values.len())))?;
        buf.put_u16(count);
        for value in values {
            super::value::encode(value, buf, version)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Vec<Value>, Error> {
        let count = short::decode(buf)? as usize;
        let mut values = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            values.push(super::value::decode(buf, version)?);
        }
        Ok(values)
    }

    #[inline]
    pub fn encoded_len(values: &[Value]) -> usize {
        2 + values.iter().map(super::value::encoded_len).sum::<usize>()
    }
}

/// A [short] count of name/value pairs of bound values.
pub mod named_values {
    use super::*;

    pub fn encode(
        values: &HashMap<String, Value>,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        let count = u16::try_from(values.len())
            .map_err(|_| Error::invalid(format!("{} values overflow [short]", values.len())))?;
        buf.put_u16(count);
        for (name, value) in values {
            string::encode(name, buf)?;
            super::value::encode(value, buf, version)?;
        }
        Ok(())
    }

    pub fn decode(
        buf: &mut impl Buf,
        version: ProtocolVersion,
    ) -> Result<HashMap<String, Value>, Error> {
        let count = short::decode(buf)? as usize;
        let mut values = HashMap::with_capacity(count.min(64));
        for _ in 0..count {
            let name = string::decode(buf)?;
            let value = super::value::decode(buf, version)?;
            values.insert(name, value);
        }
        Ok(values)
    }

    #[inline]
    pub fn encoded_len(values: &HashMap<String, Value>) -> usize {
        2 + values
            .iter()
            .map(|(name, value)| string::encoded_len(name) + super::value::encoded_len(value))
            .sum::<usize>()
    }
}
