//! The BATCH message codec.

use bytes::{Buf, BufMut};

use crate::encoding::{self, long, short};
use crate::error::Error;
use crate::query::QueryFlags;
use crate::types::{BatchType, Consistency, Value};
use crate::version::ProtocolVersion;

const CHILD_KIND_QUERY: u8 = 0x00;
const CHILD_KIND_PREPARED: u8 = 0x01;

/// One statement inside a batch: either inline CQL or a prepared id.
///
/// Batch children only ever carry positional values; the protocol reserves
/// named values for standalone QUERY/EXECUTE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchChild {
    pub statement: BatchStatement,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatement {
    Query(String),
    Prepared(Vec<u8>),
}

impl BatchChild {
    pub fn query(query: impl Into<String>, values: Vec<Value>) -> Self {
        BatchChild {
            statement: BatchStatement::Query(query.into()),
            values,
        }
    }

    pub fn prepared(id: impl Into<Vec<u8>>, values: Vec<Value>) -> Self {
        BatchChild {
            statement: BatchStatement::Prepared(id.into()),
            values,
        }
    }

    fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        match &self.statement {
            BatchStatement::Query(query) => {
                encoding::byte::encode(CHILD_KIND_QUERY, buf);
                encoding::long_string::encode(query, buf).map_err(|e| e.at("query"))?;
            }
            BatchStatement::Prepared(id) => {
                if id.is_empty() {
                    return Err(Error::invalid("empty prepared id").at("prepared_id"));
                }
                encoding::byte::encode(CHILD_KIND_PREPARED, buf);
                encoding::short_bytes::encode(id, buf).map_err(|e| e.at("prepared_id"))?;
            }
        }
        encoding::positional_values::encode(&self.values, buf, version)
            .map_err(|e| e.at("values"))
    }

    fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let statement = match encoding::byte::decode(buf)? {
            CHILD_KIND_QUERY => BatchStatement::Query(
                encoding::long_string::decode(buf).map_err(|e| e.at("query"))?,
            ),
            CHILD_KIND_PREPARED => BatchStatement::Prepared(
                encoding::short_bytes::decode(buf).map_err(|e| e.at("prepared_id"))?,
            ),
            other => {
                return Err(Error::invalid(format!(
                    "unknown batch child kind: {other:#04x}"
                )))
            }
        };
        let values =
            encoding::positional_values::decode(buf, version).map_err(|e| e.at("values"))?;
        Ok(BatchChild { statement, values })
    }

    fn encoded_len(&self) -> usize {
        let statement_len = match &self.statement {
            BatchStatement::Query(query) => encoding::long_string::encoded_len(query),
            BatchStatement::Prepared(id) => encoding::short_bytes::encoded_len(id),
        };
        1 + statement_len + encoding::positional_values::encoded_len(&self.values)
    }
}

/// BATCH: a group of statements executed as one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub batch_type: BatchType,
    pub children: Vec<BatchChild>,
    pub consistency: Consistency,
    /// Must be `Serial` or `LocalSerial` when present.
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
    /// Execute in this keyspace (v5 only).
    pub keyspace: Option<String>,
    /// Override the server's notion of "now" (v5 only).
    pub now_in_seconds: Option<i32>,
}

impl Default for Batch {
    fn default() -> Self {
        Batch {
            batch_type: BatchType::Logged,
            children: Vec::new(),
            consistency: Consistency::Any,
            serial_consistency: None,
            default_timestamp: None,
            keyspace: None,
            now_in_seconds: None,
        }
    }
}

impl Batch {
    /// The query-flag bits BATCH recognises for a given version.
    fn defined_flags(version: ProtocolVersion) -> QueryFlags {
        let mut mask = QueryFlags::SERIAL_CONSISTENCY | QueryFlags::DEFAULT_TIMESTAMP;
        if version == ProtocolVersion::V5 {
            mask |= QueryFlags::WITH_KEYSPACE | QueryFlags::NOW_IN_SECONDS;
        }
        mask
    }

    fn flags(&self, version: ProtocolVersion) -> Result<QueryFlags, Error> {
        let mut flags = QueryFlags::empty();
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
            if version != ProtocolVersion::V5 {
                return Err(Error::unsupported(format!(
                    "batch keyspaces are not defined in {version:?}"
                ))
                .at("keyspace"));
            }
            if keyspace.is_empty() {
                return Err(Error::invalid("empty keyspace").at("keyspace"));
            }
            flags |= QueryFlags::WITH_KEYSPACE;
        }
        if self.now_in_seconds.is_some() {
            if version != ProtocolVersion::V5 {
                return Err(Error::unsupported(format!(
                    "now-in-seconds is not defined in {version:?}"
                ))
                .at("now_in_seconds"));
            }
            flags |= QueryFlags::NOW_IN_SECONDS;
        }
        Ok(flags)
    }

    fn check_children(&self) -> Result<u16, Error> {
        if self.children.is_empty() {
            return Err(Error::invalid("batch has no children").at("children"));
        }
        u16::try_from(self.children.len()).map_err(|_| {
            Error::invalid(format!(
                "{} batch children overflow [short]",
                self.children.len()
            ))
            .at("children")
        })
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        let flags = self.flags(version)?;
        let count = self.check_children()?;
        encoding::byte::encode(self.batch_type as u8, buf);
        short::encode(count, buf);
        for child in &self.children {
            child.encode(buf, version).map_err(|e| e.at("children"))?;
        }
        short::encode(self.consistency as u16, buf);
        flags.encode(buf, version);
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
            encoding::int::encode(now, buf);
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let batch_type = BatchType::try_from(encoding::byte::decode(buf)?)?;
        let count = short::decode(buf)? as usize;
        let mut children = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            children.push(BatchChild::decode(buf, version).map_err(|e| e.at("children"))?);
        }
        let consistency = Consistency::try_from(short::decode(buf)?)?;
        let flags = QueryFlags::decode(buf, version)?;
        if flags.contains(QueryFlags::VALUE_NAMES) {
            return Err(Error::invalid("named values are not permitted in a batch"));
        }
        let flags = flags & Self::defined_flags(version);
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
            Some(encoding::int::decode(buf)?)
        } else {
            None
        };
        Ok(Batch {
            batch_type,
            children,
            consistency,
            serial_consistency,
            default_timestamp,
            keyspace,
            now_in_seconds,
        })
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        self.flags(version)?;
        self.check_children()?;
        let mut len = 1 + 2;
        len += self.children.iter().map(BatchChild::encoded_len).sum::<usize>();
        len += 2 + QueryFlags::encoded_len(version);
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
        Ok(len)
    }
}
