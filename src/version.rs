//! Protocol version negotiation constants and capability predicates.
//!
//! Every version-conditional branch in the codec goes through a predicate
//! defined here, so the per-version wire differences are auditable in one
//! place instead of being scattered through the message codecs.

use crate::error::Error;

/// A version of the Cassandra native protocol.
///
/// Covers the three canonical Cassandra versions plus the two DSE variants.
/// DSE v1 extends the v4 wire format, DSE v2 extends it further; neither is
/// ordered relative to Cassandra v5, which is why this enum deliberately does
/// not implement `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V3,
    V4,
    V5,
    Dse1,
    Dse2,
}

impl ProtocolVersion {
    /// All versions this crate speaks, useful for exhaustive tests.
    pub const ALL: [ProtocolVersion; 5] = [
        ProtocolVersion::V3,
        ProtocolVersion::V4,
        ProtocolVersion::V5,
        ProtocolVersion::Dse1,
        ProtocolVersion::Dse2,
    ];

    /// The version byte as it appears in the frame header (sans direction
    /// bit). The framing layer owns the header; the byte is exposed for its
    /// benefit.
    pub fn code(self) -> u8 {
        match self {
            ProtocolVersion::V3 => 0x03,
            ProtocolVersion::V4 => 0x04,
            ProtocolVersion::V5 => 0x05,
            ProtocolVersion::Dse1 => 0x41,
            ProtocolVersion::Dse2 => 0x42,
        }
    }

    /// True for the DSE protocol variants.
    pub fn is_dse(self) -> bool {
        matches!(self, ProtocolVersion::Dse1 | ProtocolVersion::Dse2)
    }

    /// Whether QUERY/EXECUTE/BATCH flag bitmaps are 4 bytes wide instead of 1.
    pub const fn uses_4_byte_query_flags(self) -> bool {
        matches!(
            self,
            ProtocolVersion::V5 | ProtocolVersion::Dse1 | ProtocolVersion::Dse2
        )
    }

    /// Whether EXECUTE and the PREPARED result carry a result metadata id.
    pub fn supports_result_metadata_id(self) -> bool {
        matches!(self, ProtocolVersion::V5 | ProtocolVersion::Dse2)
    }

    /// Whether ROWS metadata may signal a changed result metadata id.
    pub fn supports_metadata_changed(self) -> bool {
        matches!(self, ProtocolVersion::V5 | ProtocolVersion::Dse2)
    }

    /// Whether query options may carry a per-query keyspace.
    pub fn supports_per_query_keyspace(self) -> bool {
        matches!(self, ProtocolVersion::V5 | ProtocolVersion::Dse2)
    }

    /// Whether query options may carry a "now in seconds" override. This is a
    /// Cassandra v5 feature; the DSE variants do not define the flag.
    pub fn supports_now_in_seconds(self) -> bool {
        matches!(self, ProtocolVersion::V5)
    }

    /// Whether bound values may be marked unset rather than null.
    pub fn supports_unset_values(self) -> bool {
        !matches!(self, ProtocolVersion::V3)
    }

    /// Whether bound values may be named. Named values arrived with the v3
    /// wire format, the oldest this crate speaks.
    pub fn supports_named_values(self) -> bool {
        true
    }

    /// Whether the PREPARED result prefixes its variables metadata with
    /// partition key indices.
    pub fn supports_pk_indices(self) -> bool {
        !matches!(self, ProtocolVersion::V3)
    }

    /// Whether READ_FAILURE/WRITE_FAILURE carry a per-node reason map instead
    /// of a bare failure count.
    pub fn supports_failure_reason_map(self) -> bool {
        matches!(
            self,
            ProtocolVersion::V5 | ProtocolVersion::Dse1 | ProtocolVersion::Dse2
        )
    }

    /// Whether the version supports continuous paging at all.
    pub fn supports_continuous_paging(self) -> bool {
        self.is_dse()
    }

    /// Whether continuous paging carries the next-pages count (DSE v2).
    pub fn supports_continuous_paging_next_pages(self) -> bool {
        matches!(self, ProtocolVersion::Dse2)
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0x03 => Ok(ProtocolVersion::V3),
            0x04 => Ok(ProtocolVersion::V4),
            0x05 => Ok(ProtocolVersion::V5),
            0x41 => Ok(ProtocolVersion::Dse1),
            0x42 => Ok(ProtocolVersion::Dse2),
            other => Err(Error::malformed(format!(
                "unknown protocol version: {other:#04x}"
            ))),
        }
    }
}
