//! Result-set and prepared-statement metadata codecs.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::datatype::DataType;
use crate::encoding::{self, int, short};
use crate::error::Error;
use crate::version::ProtocolVersion;

/// The shape of one column: where it lives and what type it carries.
///
/// A column's index is its position in the surrounding `columns` vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub data_type: DataType,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct RowsFlags: u32 {
        const GLOBAL_TABLE_SPEC = 0x0001;
        const HAS_MORE_PAGES = 0x0002;
        const NO_METADATA = 0x0004;
        const METADATA_CHANGED = 0x0008;
        const CONTINUOUS_PAGING = 0x4000_0000;
        const LAST_CONTINUOUS_PAGE = 0x8000_0000;
    }
}

impl RowsFlags {
    /// The bits a given protocol version defines. Bits outside this mask are
    /// ignored on decode so that a field gated by a flag another version
    /// defines simply comes back absent.
    fn defined_in(version: ProtocolVersion) -> Self {
        let mut mask =
            RowsFlags::GLOBAL_TABLE_SPEC | RowsFlags::HAS_MORE_PAGES | RowsFlags::NO_METADATA;
        if version.supports_metadata_changed() {
            mask |= RowsFlags::METADATA_CHANGED;
        }
        if version.supports_continuous_paging() {
            mask |= RowsFlags::CONTINUOUS_PAGING | RowsFlags::LAST_CONTINUOUS_PAGE;
        }
        mask
    }
}

/// The metadata block at the head of a ROWS result.
///
/// `columns` is `None` when the sender omitted the column specs (the
/// NO_METADATA optimisation); `column_count` still carries the width of each
/// row in that case. When `columns` is present the encoder derives the count
/// from it, and the decoder fills `column_count` back in from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowsMetadata {
    pub column_count: i32,
    pub paging_state: Option<Vec<u8>>,
    /// Set when the prepared statement's result shape changed (v5/DSE v2).
    pub new_metadata_id: Option<Vec<u8>>,
    /// Sequence number of a continuous paging page (DSE).
    pub continuous_page_number: Option<i32>,
    /// Marks the final continuous paging page (DSE).
    pub last_continuous_page: bool,
    pub columns: Option<Vec<ColumnSpec>>,
}

/// If every column shares one keyspace and table, they can be encoded once
/// up front.
fn global_spec(columns: &[ColumnSpec]) -> Option<(&str, &str)> {
    let first = columns.first()?;
    columns
        .iter()
        .all(|c| c.keyspace == first.keyspace && c.table == first.table)
        .then_some((first.keyspace.as_str(), first.table.as_str()))
}

impl RowsMetadata {
    fn flags(&self, version: ProtocolVersion) -> Result<RowsFlags, Error> {
        let mut flags = RowsFlags::empty();
        match &self.columns {
            None => flags |= RowsFlags::NO_METADATA,
            Some(columns) => {
                if global_spec(columns).is_some() {
                    flags |= RowsFlags::GLOBAL_TABLE_SPEC;
                }
            }
        }
        if self.paging_state.is_some() {
            flags |= RowsFlags::HAS_MORE_PAGES;
        }
        if self.new_metadata_id.is_some() {
            if !version.supports_metadata_changed() {
                return Err(Error::unsupported(format!(
                    "result metadata ids are not defined in {version:?}"
                ))
                .at("new_metadata_id"));
            }
            flags |= RowsFlags::METADATA_CHANGED;
        }
        if self.continuous_page_number.is_some() || self.last_continuous_page {
            if !version.supports_continuous_paging() {
                return Err(Error::unsupported(format!(
                    "continuous paging is not defined in {version:?}"
                ))
                .at("continuous_paging"));
            }
            if self.continuous_page_number.is_some() {
                flags |= RowsFlags::CONTINUOUS_PAGING;
            }
            if self.last_continuous_page {
                flags |= RowsFlags::LAST_CONTINUOUS_PAGE;
            }
        }
        Ok(flags)
    }

    fn wire_column_count(&self) -> Result<i32, Error> {
        match &self.columns {
            Some(columns) => i32::try_from(columns.len())
                .map_err(|_| Error::invalid(format!("{} columns overflow [int]", columns.len()))),
            None => Ok(self.column_count),
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        let flags = self.flags(version)?;
        int::encode(flags.bits() as i32, buf);
        int::encode(self.wire_column_count()?, buf);
        if let Some(paging_state) = &self.paging_state {
            encoding::bytes::encode(Some(paging_state.as_slice()), buf)
                .map_err(|e| e.at("paging_state"))?;
        }
        if let Some(id) = &self.new_metadata_id {
            encoding::short_bytes::encode(id, buf).map_err(|e| e.at("new_metadata_id"))?;
        }
        if let Some(page_number) = self.continuous_page_number {
            int::encode(page_number, buf);
        }
        if let Some(columns) = &self.columns {
            if let Some((keyspace, table)) = global_spec(columns) {
                encoding::string::encode(keyspace, buf)?;
                encoding::string::encode(table, buf)?;
                for column in columns {
                    encoding::string::encode(&column.name, buf)?;
                    column.data_type.encode(buf, version)?;
                }
            } else {
                for column in columns {
                    encoding::string::encode(&column.keyspace, buf)?;
                    encoding::string::encode(&column.table, buf)?;
                    encoding::string::encode(&column.name, buf)?;
                    column.data_type.encode(buf, version)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let raw_flags = int::decode(buf)? as u32;
        let flags = RowsFlags::from_bits(raw_flags)
            .ok_or_else(|| Error::malformed(format!("unknown rows metadata flags: {raw_flags:#010x}")))?
            & RowsFlags::defined_in(version);
        let column_count = int::decode(buf)?;
        if column_count < 0 {
            return Err(Error::malformed(format!(
                "negative column count: {column_count}"
            )));
        }

        let paging_state = if flags.contains(RowsFlags::HAS_MORE_PAGES) {
            let state = encoding::bytes::decode(buf).map_err(|e| e.at("paging_state"))?;
            Some(state.ok_or_else(|| Error::malformed("null paging state"))?)
        } else {
            None
        };
        let new_metadata_id = if flags.contains(RowsFlags::METADATA_CHANGED) {
            Some(encoding::short_bytes::decode(buf).map_err(|e| e.at("new_metadata_id"))?)
        } else {
            None
        };
        let continuous_page_number = if flags.contains(RowsFlags::CONTINUOUS_PAGING) {
            Some(int::decode(buf)?)
        } else {
            None
        };

        let columns = if flags.contains(RowsFlags::NO_METADATA) {
            None
        } else {
            let global = if flags.contains(RowsFlags::GLOBAL_TABLE_SPEC) {
                let keyspace = encoding::string::decode(buf)?;
                let table = encoding::string::decode(buf)?;
                Some((keyspace, table))
            } else {
                None
            };
            let mut columns = Vec::with_capacity((column_count as usize).min(64));
            for _ in 0..column_count {
                let (keyspace, table) = match &global {
                    Some((keyspace, table)) => (keyspace.clone(), table.clone()),
                    None => {
                        let keyspace = encoding::string::decode(buf)?;
                        let table = encoding::string::decode(buf)?;
                        (keyspace, table)
                    }
                };
                let name = encoding::string::decode(buf)?;
                let data_type = DataType::decode(buf, version)?;
                columns.push(ColumnSpec {
                    keyspace,
                    table,
                    name,
                    data_type,
                });
            }
            Some(columns)
        };

        Ok(RowsMetadata {
            column_count,
            paging_state,
            new_metadata_id,
            continuous_page_number,
            last_continuous_page: flags.contains(RowsFlags::LAST_CONTINUOUS_PAGE),
            columns,
        })
    }

    pub fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        // Validates the same version constraints as encode.
        let flags = self.flags(version)?;
        let mut len = 4 + 4;
        if let Some(paging_state) = &self.paging_state {
            len += encoding::bytes::encoded_len(Some(paging_state.as_slice()));
        }
        if let Some(id) = &self.new_metadata_id {
            len += encoding::short_bytes::encoded_len(id);
        }
        if self.continuous_page_number.is_some() {
            len += 4;
        }
        if let Some(columns) = &self.columns {
            if flags.contains(RowsFlags::GLOBAL_TABLE_SPEC) {
                if let Some((keyspace, table)) = global_spec(columns) {
                    len += encoding::string::encoded_len(keyspace)
                        + encoding::string::encoded_len(table);
                }
                len += columns
                    .iter()
                    .map(|c| encoding::string::encoded_len(&c.name) + c.data_type.encoded_len())
                    .sum::<usize>();
            } else {
                len += columns
                    .iter()
                    .map(|c| {
                        encoding::string::encoded_len(&c.keyspace)
                            + encoding::string::encoded_len(&c.table)
                            + encoding::string::encoded_len(&c.name)
                            + c.data_type.encoded_len()
                    })
                    .sum::<usize>();
            }
        }
        Ok(len)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct VariablesFlags: u32 {
        const GLOBAL_TABLE_SPEC = 0x0001;
    }
}

/// The shape of a prepared statement's bound variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariablesMetadata {
    /// Which bound variables form the partition key (v4+).
    pub pk_indices: Vec<u16>,
    pub columns: Vec<ColumnSpec>,
}

impl VariablesMetadata {
    pub fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        let mut flags = VariablesFlags::empty();
        if global_spec(&self.columns).is_some() {
            flags |= VariablesFlags::GLOBAL_TABLE_SPEC;
        }
        int::encode(flags.bits() as i32, buf);
        let count = i32::try_from(self.columns.len())
            .map_err(|_| Error::invalid(format!("{} columns overflow [int]", self.columns.len())))?;
        int::encode(count, buf);
        if version.supports_pk_indices() {
            let pk_count = i32::try_from(self.pk_indices.len()).map_err(|_| {
                Error::invalid(format!("{} pk indices overflow [int]", self.pk_indices.len()))
            })?;
            int::encode(pk_count, buf);
            for index in &self.pk_indices {
                short::encode(*index, buf);
            }
        } else if !self.pk_indices.is_empty() {
            return Err(Error::unsupported(format!(
                "partition key indices are not defined in {version:?}"
            ))
            .at("pk_indices"));
        }
        if let Some((keyspace, table)) = global_spec(&self.columns) {
            encoding::string::encode(keyspace, buf)?;
            encoding::string::encode(table, buf)?;
            for column in &self.columns {
                encoding::string::encode(&column.name, buf)?;
                column.data_type.encode(buf, version)?;
            }
        } else {
            for column in &self.columns {
                encoding::string::encode(&column.keyspace, buf)?;
                encoding::string::encode(&column.table, buf)?;
                encoding::string::encode(&column.name, buf)?;
                column.data_type.encode(buf, version)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let raw_flags = int::decode(buf)? as u32;
        let flags = VariablesFlags::from_bits(raw_flags).ok_or_else(|| {
            Error::malformed(format!("unknown variables metadata flags: {raw_flags:#010x}"))
        })?;
        let column_count = int::decode(buf)?;
        if column_count < 0 {
            return Err(Error::malformed(format!(
                "negative column count: {column_count}"
            )));
        }
        let mut pk_indices = Vec::new();
        if version.supports_pk_indices() {
            let pk_count = int::decode(buf)?;
            if pk_count < 0 {
                return Err(Error::malformed(format!(
                    "negative pk index count: {pk_count}"
                )));
            }
            pk_indices.reserve((pk_count as usize).min(64));
            for _ in 0..pk_count {
                pk_indices.push(short::decode(buf)?);
            }
        }
        let global = if flags.contains(VariablesFlags::GLOBAL_TABLE_SPEC) {
            let keyspace = encoding::string::decode(buf)?;
            let table = encoding::string::decode(buf)?;
            Some((keyspace, table))
        } else {
            None
        };
        let mut columns = Vec::with_capacity((column_count as usize).min(64));
        for _ in 0..column_count {
            let (keyspace, table) = match &global {
                Some((keyspace, table)) => (keyspace.clone(), table.clone()),
                None => {
                    let keyspace = encoding::string::decode(buf)?;
                    let table = encoding::string::decode(buf)?;
                    (keyspace, table)
                }
            };
            let name = encoding::string::decode(buf)?;
            let data_type = DataType::decode(buf, version)?;
            columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                data_type,
            });
        }
        Ok(VariablesMetadata {
            pk_indices,
            columns,
        })
    }

    pub fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let mut len = 4 + 4;
        if version.supports_pk_indices() {
            len += 4 + 2 * self.pk_indices.len();
        } else if !self.pk_indices.is_empty() {
            return Err(Error::unsupported(format!(
                "partition key indices are not defined in {version:?}"
            ))
            .at("pk_indices"));
        }
        if let Some((keyspace, table)) = global_spec(&self.columns) {
            len += encoding::string::encoded_len(keyspace) + encoding::string::encoded_len(table);
            len += self
                .columns
                .iter()
                .map(|c| encoding::string::encoded_len(&c.name) + c.data_type.encoded_len())
                .sum::<usize>();
        } else {
            len += self
                .columns
                .iter()
                .map(|c| {
                    encoding::string::encoded_len(&c.keyspace)
                        + encoding::string::encoded_len(&c.table)
                        + encoding::string::encoded_len(&c.name)
                        + c.data_type.encoded_len()
                })
                .sum::<usize>();
        }
        Ok(len)
    }
}
