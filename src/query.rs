//! The query options sub-codec shared by QUERY and EXECUTE.

use std::collections::HashMap;

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::encoding::{self, int, long, short};
use crate::error::Error;
use crate::types::{Consistency, Value};
use crate::version::ProtocolVersion;

bitflags! {
    /// The query flag bitmap. One byte wide on v3/v4, four bytes on v5 and
    /// the DSE variants. BATCH reuses a subset of these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct QueryFlags: u32 {
        const VALUES = 0x0001;
        const SKIP_METADATA = 0x0002;
        const PAGE_SIZE = 0x0004;
        const PAGING_STATE = 0x0008;
        const SERIAL_CONSISTENCY = 0x0010;
        const DEFAULT_TIMESTAMP = 0x0020;
        const VALUE_NAMES = 0x0040;
        const WITH_KEYSPACE = 0x0080;
        const NOW_IN_SECONDS = 0x0100;
        const PAGE_SIZE_BYTES = 0x4000_0000;
        const CONTINUOUS_PAGING = 0x8000_0000;
    }
}

impl QueryFlags {
    /// The bits a given protocol version defines. Undefined bits are never
    /// emitted, and are ignored on decode so their gated fields come back
    /// absent.
    pub(crate) fn defined_in(version: ProtocolVersion) -> Self {
        let mut mask = QueryFlags::VALUES
            | QueryFlags::SKIP_METADATA
            | QueryFlags::PAGE_SIZE
            | QueryFlags::PAGING_STATE
            | QueryFlags::SERIAL_CONSISTENCY
            | QueryFlags::DEFAULT_TIMESTAMP
            | QueryFlags::VALUE_NAMES;
        if version.supports_per_query_keyspace() {
            mask |= QueryFlags::WITH_KEYSPACE;
        }
        if version.supports_now_in_seconds() {
            mask |= QueryFlags::NOW_IN_SECONDS;
        }
        if version.is_dse() {
            mask |= QueryFlags::PAGE_SIZE_BYTES | QueryFlags::CONTINUOUS_PAGING;
        }
        mask
    }

    pub(crate) fn encode(self, buf: &mut impl BufMut, version: ProtocolVersion) {
        if version.uses_4_byte_query_flags() {
            int::encode(self.bits() as i32, buf);
        } else {
            encoding::byte::encode(self.bits() as u8, buf);
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let raw = if version.uses_4_byte_query_flags() {
            int::decode(buf)? as u32
        } else {
            u32::from(encoding::byte::decode(buf)?)
        };
        QueryFlags::from_bits(raw)
            .ok_or_else(|| Error::malformed(format!("unknown query flags: {raw:#010x}")))
    }

    pub(crate) const fn encoded_len(version: ProtocolVersion) -> usize {
        if version.uses_4_byte_query_flags() {
            4
        } else {
            1
        }
    }
}

/// Client-requested continuous paging behaviour (DSE only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuousPagingOptions {
    /// Maximum number of pages to stream; 0 means no limit.
    pub max_pages: i32,
    /// Throttle in pages per second; 0 means no limit.
    pub pages_per_second: i32,
    /// How many further pages the client is ready for. DSE v2 only; a `None`
    /// encodes as 0 there.
    pub next_pages: Option<i32>,
}

impl ContinuousPagingOptions {
    fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        int::encode(self.max_pages, buf);
        int::encode(self.pages_per_second, buf);
        if version.supports_continuous_paging_next_pages() {
            int::encode(self.next_pages.unwrap_or(0), buf);
        } else if self.next_pages.is_some() {
            return Err(Error::unsupported(format!(
                "continuous paging next-pages is not defined in {version:?}"
            ))
            .at("next_pages"));
        }
        Ok(())
    }

    fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let max_pages = int::decode(buf)?;
        let pages_per_second = int::decode(buf)?;
        let next_pages = if version.supports_continuous_paging_next_pages() {
            Some(int::decode(buf)?)
        } else {
            None
        };
        Ok(ContinuousPagingOptions {
            max_pages,
            pages_per_second,
            next_pages,
        })
    }

    fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        if version.supports_continuous_paging_next_pages() {
            Ok(12)
        } else if self.next_pages.is_some() {
            Err(Error::unsupported(format!(
                "continuous paging next-pages is not defined in {version:?}"
            ))
            .at("next_pages"))
        } else {
            Ok(8)
        }
    }
}

/// The per-statement execution options carried by QUERY and EXECUTE.
///
/// Every optional field is gated by a flag bit on the wire; the flag bitmap
/// is derived from which fields are set. When both positional and named
/// values are supplied, positional values win and the named ones are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub consistency: Consistency,
    pub positional_values: Vec<Value>,
    pub named_values: HashMap<String, Value>,
    /// Ask the server to omit result metadata from the response.
    pub skip_metadata: bool,
    /// Page size; zero or negative disables paging.
    pub page_size: Option<i32>,
    /// Interpret `page_size` as a byte count instead of a row count (DSE).
    pub page_size_in_bytes: bool,
    pub paging_state: Option<Vec<u8>>,
    /// Must be `Serial` or `LocalSerial` when present.
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
    /// Execute in this keyspace (v5/DSE v2).
    pub keyspace: Option<String>,
    /// Override the server's notion of "now" (v5 only).
    pub now_in_seconds: Option<i32>,
    /// Stream pages continuously (DSE only).
    pub continuous_paging: Option<ContinuousPagingOptions>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            consistency: Consistency::Any,
            positional_values: Vec::new(),
            named_values: HashMap::new(),
            skip_metadata: false,
            page_size: None,
            page_size_in_bytes: false,
            paging_state: None,
            serial_consistency: None,
            default_timestamp: None,
            keyspace: None,
            now_in_seconds: None,
            continuous_paging: None,
        }
    }
}

impl QueryOptions {
    fn flags(&self, version: ProtocolVersion) -> Result<QueryFlags, Error> {
        let mut flags = QueryFlags::empty();
        if !self.positional_values.is_empty() {
            flags |= QueryFlags::VALUES;
        } else if !self.named_values.is_empty() {
            flags |= QueryFlags::VALUES | QueryFlags::VALUE_NAMES;
        }
        if self.skip_metadata {
            flags |= QueryFlags::SKIP_METADATA;
        }
        if self.page_size.is_some() {
            flags |= QueryFlags::PAGE_SIZE;
        }
        if self.page_size_in_bytes {
            if !version.is_dse() {
                return Err(Error::unsupported(format!(
                    "page size in bytes is not defined in {version:?}"
                ))
                .at("page_size_in_bytes"));
            }
            if self.page_size.is_none() {
                return Err(Error::invalid("page size in bytes set without a page size")
                    .at("page_size_in_bytes"));
            }
            flags |= QueryFlags::PAGE_SIZE_BYTES;
        }
        if self.paging_state.is_some() {
            flags |= QueryFlags::PAGING_STATE;
        }
        if let Some(serial) = self.serial_consistency {
            if !serial.is_serial() {
                return Err(Error::invalid(format!(
                    "{serial:?} is not a serial consistency level"
                ))
                .at("serial_consistency"));
            }
            flags |= QueryFlags::SERIAL_CONSISTENCY;
        }
        if self.default_timestamp.is_some() {
            flags |= QueryFlags::DEFAULT_TIMESTAMP;
        }
        if let Some(keyspace) = &self.keyspace {
            if !version.supports_per_query_keyspace() {
                return Err(Error::unsupported(format!(
                    "per-query keyspaces are not defined in {version:?}"
                ))
                .at("keyspace"));
            }
            if keyspace.is_empty() {
                return Err(Error::invalid("empty keyspace").at("keyspace"));
            }
            flags |= QueryFlags::WITH_KEYSPACE;
        }
        if self.now_in_seconds.is_some() {
            if !version.supports_now_in_seconds() {
                return Err(Error::unsupported(format!(
                    "now-in-seconds is not defined in {version:?}"
                ))
                .at("now_in_seconds"));
            }
            flags |= QueryFlags::NOW_IN_SECONDS;
        }
        if self.continuous_paging.is_some() {
            if !version.supports_continuous_paging() {
                return Err(Error::unsupported(format!(
                    "continuous paging is not defined in {version:?}"
                ))
                .at("continuous_paging"));
            }
            flags |= QueryFlags::CONTINUOUS_PAGING;
        }
        Ok(flags)
    }

    pub fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        let flags = self.flags(version)?;
        short::encode(self.consistency as u16, buf);
        flags.encode(buf, version);
        if flags.contains(QueryFlags::VALUES) {
            if flags.contains(QueryFlags::VALUE_NAMES) {
                encoding::named_values::encode(&self.named_values, buf, version)
                    .map_err(|e| e.at("named_values"))?;
            } else {
                encoding::positional_values::encode(&self.positional_values, buf, version)
                    .map_err(|e| e.at("positional_values"))?;
            }
        }
        if let Some(page_size) = self.page_size {
            int::encode(page_size, buf);
        }
        if let Some(paging_state) = &self.paging_state {
            encoding::bytes::encode(Some(paging_state.as_slice()), buf)
                .map_err(|e| e.at("paging_state"))?;
        }
        if let Some(serial) = self.serial_consistency {
            short::encode(serial as u16, buf);
        }
        if let Some(timestamp) = self.default_timestamp {
            long::encode(timestamp, buf);
        }
        if let Some(keyspace) = &self.keyspace {
            encoding::string::encode(keyspace, buf).map_err(|e| e.at("keyspace"))?;
        }
        if let Some(now) = self.now_in_seconds {
            int::encode(now, buf);
        }
        if let Some(paging) = &self.continuous_paging {
            paging.encode(buf, version).map_err(|e| e.at("continuous_paging"))?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let consistency = Consistency::try_from(short::decode(buf)?)?;
        let flags = QueryFlags::decode(buf, version)? & QueryFlags::defined_in(version);
        if flags.contains(QueryFlags::VALUE_NAMES) && !flags.contains(QueryFlags::VALUES) {
            return Err(Error::malformed("value names flag without values flag"));
        }

        let mut positional_values = Vec::new();
        let mut named_values = HashMap::new();
        if flags.contains(QueryFlags::VALUES) {
            if flags.contains(QueryFlags::VALUE_NAMES) {
                named_values = encoding::named_values::decode(buf, version)
                    .map_err(|e| e.at("named_values"))?;
            } else {
                positional_values = encoding::positional_values::decode(buf, version)
                    .map_err(|e| e.at("positional_values"))?;
            }
        }
        let page_size = if flags.contains(QueryFlags::PAGE_SIZE) {
            Some(int::decode(buf)?)
        } else {
            None
        };
        if flags.contains(QueryFlags::PAGE_SIZE_BYTES) && page_size.is_none() {
            return Err(Error::malformed("page size in bytes flag without a page size"));
        }
        let paging_state = if flags.contains(QueryFlags::PAGING_STATE) {
            let state = encoding::bytes::decode(buf).map_err(|e| e.at("paging_state"))?;
            Some(state.ok_or_else(|| Error::malformed("null paging state"))?)
        } else {
            None
        };
        let serial_consistency = if flags.contains(QueryFlags::SERIAL_CONSISTENCY) {
            let serial = Consistency::try_from(short::decode(buf)?)?;
            if !serial.is_serial() {
                return Err(Error::invalid(format!(
                    "{serial:?} is not a serial consistency level"
                ))
                .at("serial_consistency"));
            }
            Some(serial)
        } else {
            None
        };
        let default_timestamp = if flags.contains(QueryFlags::DEFAULT_TIMESTAMP) {
            Some(long::decode(buf)?)
        } else {
            None
        };
        let keyspace = if flags.contains(QueryFlags::WITH_KEYSPACE) {
            let keyspace = encoding::string::decode(buf).map_err(|e| e.at("keyspace"))?;
            if keyspace.is_empty() {
                return Err(Error::invalid("empty keyspace").at("keyspace"));
            }
            Some(keyspace)
        } else {
            None
        };
        let now_in_seconds = if flags.contains(QueryFlags::NOW_IN_SECONDS) {
            Some(int::decode(buf)?)
        } else {
            None
        };
        let continuous_paging = if flags.contains(QueryFlags::CONTINUOUS_PAGING) {
            Some(
                ContinuousPagingOptions::decode(buf, version)
                    .map_err(|e| e.at("continuous_paging"))?,
            )
        } else {
            None
        };

        Ok(QueryOptions {
            consistency,
            positional_values,
            named_values,
            skip_metadata: flags.contains(QueryFlags::SKIP_METADATA),
            page_size,
            page_size_in_bytes: flags.contains(QueryFlags::PAGE_SIZE_BYTES),
            paging_state,
            serial_consistency,
            default_timestamp,
            keyspace,
            now_in_seconds,
            continuous_paging,
        })
    }

    pub fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let flags = self.flags(version)?;
        let mut len = 2 + QueryFlags::encoded_len(version);
        if flags.contains(QueryFlags::VALUES) {
            if flags.contains(QueryFlags::VALUE_NAMES) {
                len += encoding::named_values::encoded_len(&self.named_values);
            } else {
                len += encoding::positional_values::encoded_len(&self.positional_values);
            }
        }
        if self.page_size.is_some() {
            len += 4;
        }
        if let Some(paging_state) = &self.paging_state {
            len += encoding::bytes::encoded_len(Some(paging_state.as_slice()));
        }
        if self.serial_consistency.is_some() {
            len += 2;
        }
        if self.default_timestamp.is_some() {
            len += 8;
        }
        if let Some(keyspace) = &self.keyspace {
            len += encoding::string::encoded_len(keyspace);
        }
        if self.now_in_seconds.is_some() {
            len += 4;
        }
        if let Some(paging) = &self.continuous_paging {
            len += paging.encoded_len(version)?;
        }
        Ok(len)
    }
}
