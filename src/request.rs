//! Client-to-server message codecs.

pub mod batch;

use std::collections::HashMap;

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::encoding::{self, int};
use crate::error::Error;
use crate::query::QueryOptions;
use crate::types::EventType;
use crate::version::ProtocolVersion;

/// STARTUP: the connection's option map.
///
/// The `CQL_VERSION` key is mandatory and enforced on encode; decoding is
/// lenient so that a misbehaving peer's message can still be inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    pub options: HashMap<String, String>,
}

impl Startup {
    pub const CQL_VERSION: &'static str = "CQL_VERSION";
    pub const COMPRESSION: &'static str = "COMPRESSION";
    pub const DRIVER_NAME: &'static str = "DRIVER_NAME";
    pub const DRIVER_VERSION: &'static str = "DRIVER_VERSION";
    pub const NO_COMPACT: &'static str = "NO_COMPACT";
    pub const THROW_ON_OVERLOAD: &'static str = "THROW_ON_OVERLOAD";

    /// A startup message advertising CQL 3.0.0 and nothing else.
    pub fn new() -> Self {
        let mut options = HashMap::new();
        options.insert(Self::CQL_VERSION.to_string(), "3.0.0".to_string());
        Startup { options }
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        if !self.options.contains_key(Self::CQL_VERSION) {
            return Err(Error::invalid("missing CQL_VERSION option"));
        }
        encoding::string_map::encode(&self.options, buf)
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(Startup {
            options: encoding::string_map::decode(buf)?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        if !self.options.contains_key(Self::CQL_VERSION) {
            return Err(Error::invalid("missing CQL_VERSION option"));
        }
        Ok(encoding::string_map::encoded_len(&self.options))
    }
}

impl Default for Startup {
    fn default() -> Self {
        Self::new()
    }
}

/// QUERY: a CQL statement and its execution options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub query: String,
    pub options: QueryOptions,
}

impl Query {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::long_string::encode(&self.query, buf).map_err(|e| e.at("query"))?;
        self.options.encode(buf, version).map_err(|e| e.at("options"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let query = encoding::long_string::decode(buf).map_err(|e| e.at("query"))?;
        let options = QueryOptions::decode(buf, version).map_err(|e| e.at("options"))?;
        Ok(Query { query, options })
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        Ok(encoding::long_string::encoded_len(&self.query)
            + self.options.encoded_len(version).map_err(|e| e.at("options"))?)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PrepareFlags: u32 {
        const WITH_KEYSPACE = 0x0001;
    }
}

/// PREPARE: a statement to compile server-side, optionally pinned to a
/// keyspace (v5/DSE v2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prepare {
    pub query: String,
    pub keyspace: Option<String>,
}

impl Prepare {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::long_string::encode(&self.query, buf).map_err(|e| e.at("query"))?;
        if version.supports_per_query_keyspace() {
            let mut flags = PrepareFlags::empty();
            if self.keyspace.is_some() {
                flags |= PrepareFlags::WITH_KEYSPACE;
            }
            int::encode(flags.bits() as i32, buf);
            if let Some(keyspace) = &self.keyspace {
                if keyspace.is_empty() {
                    return Err(Error::invalid("empty keyspace").at("keyspace"));
                }
                encoding::string::encode(keyspace, buf).map_err(|e| e.at("keyspace"))?;
            }
        } else if self.keyspace.is_some() {
            return Err(Error::unsupported(format!(
                "per-query keyspaces are not defined in {version:?}"
            ))
            .at("keyspace"));
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let query = encoding::long_string::decode(buf).map_err(|e| e.at("query"))?;
        let mut keyspace = None;
        if version.supports_per_query_keyspace() {
            let raw = int::decode(buf)? as u32;
            let flags = PrepareFlags::from_bits(raw)
                .ok_or_else(|| Error::malformed(format!("unknown prepare flags: {raw:#010x}")))?;
            if flags.contains(PrepareFlags::WITH_KEYSPACE) {
                let name = encoding::string::decode(buf).map_err(|e| e.at("keyspace"))?;
                if name.is_empty() {
                    return Err(Error::invalid("empty keyspace").at("keyspace"));
                }
                keyspace = Some(name);
            }
        }
        Ok(Prepare { query, keyspace })
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let mut len = encoding::long_string::encoded_len(&self.query);
        if version.supports_per_query_keyspace() {
            len += 4;
            if let Some(keyspace) = &self.keyspace {
                len += encoding::string::encoded_len(keyspace);
            }
        } else if self.keyspace.is_some() {
            return Err(Error::unsupported(format!(
                "per-query keyspaces are not defined in {version:?}"
            ))
            .at("keyspace"));
        }
        Ok(len)
    }
}

/// EXECUTE: run a prepared statement by id.
///
/// On v5/DSE v2 the client must echo the result metadata id it last saw for
/// the statement, so the server can detect a stale result shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Execute {
    pub query_id: Vec<u8>,
    pub result_metadata_id: Option<Vec<u8>>,
    pub options: QueryOptions,
}

impl Execute {
    fn check_ids(&self, version: ProtocolVersion) -> Result<(), Error> {
        if self.query_id.is_empty() {
            return Err(Error::invalid("empty query id").at("query_id"));
        }
        if version.supports_result_metadata_id() {
            match &self.result_metadata_id {
                Some(id) if id.is_empty() => {
                    return Err(Error::invalid("empty result metadata id")
                        .at("result_metadata_id"))
                }
                Some(_) => {}
                None => {
                    return Err(Error::invalid(format!(
                        "{version:?} requires a result metadata id"
                    ))
                    .at("result_metadata_id"))
                }
            }
        } else if self.result_metadata_id.is_some() {
            return Err(Error::unsupported(format!(
                "result metadata ids are not defined in {version:?}"
            ))
            .at("result_metadata_id"));
        }
        Ok(())
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        self.check_ids(version)?;
        encoding::short_bytes::encode(&self.query_id, buf).map_err(|e| e.at("query_id"))?;
        if let Some(id) = &self.result_metadata_id {
            encoding::short_bytes::encode(id, buf).map_err(|e| e.at("result_metadata_id"))?;
        }
        self.options.encode(buf, version).map_err(|e| e.at("options"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let query_id = encoding::short_bytes::decode(buf).map_err(|e| e.at("query_id"))?;
        if query_id.is_empty() {
            return Err(Error::invalid("empty query id").at("query_id"));
        }
        let result_metadata_id = if version.supports_result_metadata_id() {
            let id = encoding::short_bytes::decode(buf).map_err(|e| e.at("result_metadata_id"))?;
            if id.is_empty() {
                return Err(Error::invalid("empty result metadata id").at("result_metadata_id"));
            }
            Some(id)
        } else {
            None
        };
        let options = QueryOptions::decode(buf, version).map_err(|e| e.at("options"))?;
        Ok(Execute {
            query_id,
            result_metadata_id,
            options,
        })
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        self.check_ids(version)?;
        let mut len = encoding::short_bytes::encoded_len(&self.query_id);
        if let Some(id) = &self.result_metadata_id {
            len += encoding::short_bytes::encoded_len(id);
        }
        len += self.options.encoded_len(version).map_err(|e| e.at("options"))?;
        Ok(len)
    }
}

/// REGISTER: subscribe this connection to server event pushes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Register {
    pub event_types: Vec<EventType>,
}

impl Register {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        let count = u16::try_from(self.event_types.len()).map_err(|_| {
            Error::invalid(format!(
                "{} event types overflow [short]",
                self.event_types.len()
            ))
        })?;
        encoding::short::encode(count, buf);
        for event_type in &self.event_types {
            encoding::string::encode(event_type.as_str(), buf)?;
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        let names = encoding::string_list::decode(buf)?;
        let event_types = names
            .iter()
            .map(|name| EventType::parse(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Register { event_types })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        Ok(2 + self
            .event_types
            .iter()
            .map(|e| encoding::string::encoded_len(e.as_str()))
            .sum::<usize>())
    }
}

/// AUTH_RESPONSE: the client's answer to an authentication challenge. The
/// token is opaque to the protocol; a null token is legal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthResponse {
    pub token: Option<Vec<u8>>,
}

impl AuthResponse {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::bytes::encode(self.token.as_deref(), buf).map_err(|e| e.at("token"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(AuthResponse {
            token: encoding::bytes::decode(buf).map_err(|e| e.at("token"))?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        Ok(encoding::bytes::encoded_len(self.token.as_deref()))
    }
}

/// REVISE: adjust or cancel an in-flight continuous paging session (DSE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revise {
    /// Stop streaming pages for the given stream.
    CancelContinuousPaging { target_stream_id: i32 },
    /// Release the server to send up to `next_pages` further pages (DSE v2).
    MoreContinuousPages {
        target_stream_id: i32,
        next_pages: i32,
    },
}

const REVISE_CANCEL: i32 = 1;
const REVISE_MORE_PAGES: i32 = 2;

impl Revise {
    fn check_supported(&self, version: ProtocolVersion) -> Result<(), Error> {
        if !version.is_dse() {
            return Err(Error::unsupported(format!(
                "revise requests are not defined in {version:?}"
            )));
        }
        if matches!(self, Revise::MoreContinuousPages { .. })
            && !version.supports_continuous_paging_next_pages()
        {
            return Err(Error::unsupported(format!(
                "requesting more pages is not defined in {version:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        self.check_supported(version)?;
        match self {
            Revise::CancelContinuousPaging { target_stream_id } => {
                int::encode(REVISE_CANCEL, buf);
                int::encode(*target_stream_id, buf);
            }
            Revise::MoreContinuousPages {
                target_stream_id,
                next_pages,
            } => {
                int::encode(REVISE_MORE_PAGES, buf);
                int::encode(*target_stream_id, buf);
                int::encode(*next_pages, buf);
            }
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let revision_type = int::decode(buf)?;
        let target_stream_id = int::decode(buf)?;
        let revise = match revision_type {
            REVISE_CANCEL => Revise::CancelContinuousPaging { target_stream_id },
            REVISE_MORE_PAGES => Revise::MoreContinuousPages {
                target_stream_id,
                next_pages: int::decode(buf)?,
            },
            other => {
                return Err(Error::malformed(format!(
                    "unknown revise revision type: {other}"
                )))
            }
        };
        revise.check_supported(version)?;
        Ok(revise)
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        self.check_supported(version)?;
        Ok(match self {
            Revise::CancelContinuousPaging { .. } => 8,
            Revise::MoreContinuousPages { .. } => 12,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Consistency, Value};

    #[test]
    fn startup_single_option_layout() {
        let startup = Startup::new();
        let mut buf = Vec::new();
        startup.encode(&mut buf, ProtocolVersion::V4).unwrap();
        let mut expected = vec![0x00, 0x01, 0x00, 0x0B];
        expected.extend_from_slice(b"CQL_VERSION");
        expected.extend_from_slice(&[0x00, 0x05]);
        expected.extend_from_slice(b"3.0.0");
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), startup.encoded_len(ProtocolVersion::V4).unwrap());
        assert_eq!(
            Startup::decode(&mut &buf[..], ProtocolVersion::V4).unwrap(),
            startup
        );
    }

    #[test]
    fn startup_requires_cql_version() {
        let startup = Startup {
            options: HashMap::new(),
        };
        let mut buf = Vec::new();
        assert_eq!(
            startup
                .encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn query_with_default_options() {
        let query = Query {
            query: "SELECT".to_string(),
            options: QueryOptions::default(),
        };
        let mut buf = Vec::new();
        query.encode(&mut buf, ProtocolVersion::V4).unwrap();
        let mut expected = vec![0x00, 0x00, 0x00, 0x06];
        expected.extend_from_slice(b"SELECT");
        expected.extend_from_slice(&[0x00, 0x00, 0x00]);
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), query.encoded_len(ProtocolVersion::V4).unwrap());
        assert_eq!(
            Query::decode(&mut &buf[..], ProtocolVersion::V4).unwrap(),
            query
        );
    }

    #[test]
    fn empty_query_string_is_accepted() {
        let query = Query::default();
        let mut buf = Vec::new();
        query.encode(&mut buf, ProtocolVersion::V3).unwrap();
        assert_eq!(
            Query::decode(&mut &buf[..], ProtocolVersion::V3).unwrap(),
            query
        );
    }

    #[test]
    fn prepare_keyspace_gated_by_version() {
        let prepare = Prepare {
            query: "SELECT * FROM t".to_string(),
            keyspace: Some("ks1".to_string()),
        };
        for version in [ProtocolVersion::V5, ProtocolVersion::Dse2] {
            let mut buf = Vec::new();
            prepare.encode(&mut buf, version).unwrap();
            assert_eq!(buf.len(), prepare.encoded_len(version).unwrap());
            assert_eq!(Prepare::decode(&mut &buf[..], version).unwrap(), prepare);
        }
        let mut buf = Vec::new();
        assert_eq!(
            prepare
                .encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedFeature
        );

        let plain = Prepare {
            keyspace: None,
            ..prepare
        };
        let mut buf = Vec::new();
        plain.encode(&mut buf, ProtocolVersion::V4).unwrap();
        assert_eq!(Prepare::decode(&mut &buf[..], ProtocolVersion::V4).unwrap(), plain);
        // v5 without a keyspace still writes the empty flags int.
        let mut v5_buf = Vec::new();
        plain.encode(&mut v5_buf, ProtocolVersion::V5).unwrap();
        assert_eq!(v5_buf.len(), buf.len() + 4);
    }

    #[test]
    fn execute_v4_layout() {
        let execute = Execute {
            query_id: vec![0x01, 0x02, 0x03, 0x04],
            result_metadata_id: None,
            options: QueryOptions {
                consistency: Consistency::LocalQuorum,
                skip_metadata: true,
                page_size: Some(100),
                paging_state: Some(vec![0xCA, 0xFE, 0xBA, 0xBE]),
                serial_consistency: Some(Consistency::LocalSerial),
                default_timestamp: Some(123),
                ..Default::default()
            },
        };
        let mut buf = Vec::new();
        execute.encode(&mut buf, ProtocolVersion::V4).unwrap();
        let expected = [
            0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // query id
            0x00, 0x06, // consistency
            0x3E, // flags
            0x00, 0x00, 0x00, 0x64, // page size
            0x00, 0x00, 0x00, 0x04, 0xCA, 0xFE, 0xBA, 0xBE, // paging state
            0x00, 0x09, // serial consistency
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7B, // timestamp
        ];
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), execute.encoded_len(ProtocolVersion::V4).unwrap());
        assert_eq!(
            Execute::decode(&mut &buf[..], ProtocolVersion::V4).unwrap(),
            execute
        );
    }

    #[test]
    fn execute_v5_carries_result_metadata_id() {
        let execute = Execute {
            query_id: vec![0x01, 0x02, 0x03, 0x04],
            result_metadata_id: Some(vec![0x05, 0x06, 0x07, 0x08]),
            options: QueryOptions {
                keyspace: Some("ks1".to_string()),
                now_in_seconds: Some(123),
                ..Default::default()
            },
        };
        let mut buf = Vec::new();
        execute.encode(&mut buf, ProtocolVersion::V5).unwrap();
        let mut expected = vec![
            0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // query id
            0x00, 0x04, 0x05, 0x06, 0x07, 0x08, // result metadata id
            0x00, 0x00, // consistency
            0x00, 0x00, 0x01, 0x80, // flags: keyspace | now-in-seconds
            0x00, 0x03,
        ];
        expected.extend_from_slice(b"ks1");
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x7B]);
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), execute.encoded_len(ProtocolVersion::V5).unwrap());
        assert_eq!(
            Execute::decode(&mut &buf[..], ProtocolVersion::V5).unwrap(),
            execute
        );
    }

    #[test]
    fn execute_rejects_empty_ids() {
        let mut buf = Vec::new();
        let no_id = Execute::default();
        assert_eq!(
            no_id
                .encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidValue
        );

        let missing_metadata_id = Execute {
            query_id: vec![0x01],
            result_metadata_id: None,
            ..Default::default()
        };
        assert_eq!(
            missing_metadata_id
                .encode(&mut buf, ProtocolVersion::V5)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidValue
        );

        let stray_metadata_id = Execute {
            query_id: vec![0x01],
            result_metadata_id: Some(vec![0x02]),
            ..Default::default()
        };
        assert_eq!(
            stray_metadata_id
                .encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn register_roundtrip() {
        let register = Register {
            event_types: vec![EventType::TopologyChange, EventType::SchemaChange],
        };
        let mut buf = Vec::new();
        register.encode(&mut buf, ProtocolVersion::V3).unwrap();
        assert_eq!(buf.len(), register.encoded_len(ProtocolVersion::V3).unwrap());
        assert_eq!(
            Register::decode(&mut &buf[..], ProtocolVersion::V3).unwrap(),
            register
        );
    }

    #[test]
    fn auth_response_null_and_empty_tokens_differ() {
        let null_token = AuthResponse { token: None };
        let empty_token = AuthResponse {
            token: Some(Vec::new()),
        };
        let mut null_buf = Vec::new();
        null_token.encode(&mut null_buf, ProtocolVersion::V4).unwrap();
        let mut empty_buf = Vec::new();
        empty_token.encode(&mut empty_buf, ProtocolVersion::V4).unwrap();
        assert_eq!(null_buf, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty_buf, [0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            AuthResponse::decode(&mut &null_buf[..], ProtocolVersion::V4).unwrap(),
            null_token
        );
        assert_eq!(
            AuthResponse::decode(&mut &empty_buf[..], ProtocolVersion::V4).unwrap(),
            empty_token
        );
    }

    #[test]
    fn revise_cancel_roundtrip_on_dse() {
        let revise = Revise::CancelContinuousPaging {
            target_stream_id: 42,
        };
        for version in [ProtocolVersion::Dse1, ProtocolVersion::Dse2] {
            let mut buf = Vec::new();
            revise.encode(&mut buf, version).unwrap();
            assert_eq!(buf.len(), revise.encoded_len(version).unwrap());
            assert_eq!(Revise::decode(&mut &buf[..], version).unwrap(), revise);
        }
        let mut buf = Vec::new();
        assert_eq!(
            revise
                .encode(&mut buf, ProtocolVersion::V5)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn revise_more_pages_requires_dse2() {
        let revise = Revise::MoreContinuousPages {
            target_stream_id: 1,
            next_pages: 4,
        };
        let mut buf = Vec::new();
        revise.encode(&mut buf, ProtocolVersion::Dse2).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(
            Revise::decode(&mut &buf[..], ProtocolVersion::Dse2).unwrap(),
            revise
        );
        let mut buf = Vec::new();
        assert_eq!(
            revise
                .encode(&mut buf, ProtocolVersion::Dse1)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn batch_values_share_the_value_codec() {
        // A child with one regular value keeps the same wire shape as a
        // positional values list in query options.
        let values = vec![Value::regular(b"hello".to_vec())];
        let mut buf = Vec::new();
        crate::encoding::positional_values::encode(&values, &mut buf, ProtocolVersion::V4).unwrap();
        let mut expected = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x05];
        expected.extend_from_slice(b"hello");
        assert_eq!(buf, expected);
    }
}
