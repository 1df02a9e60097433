//! The RESULT message codec: a tagged union of five response shapes.

use bytes::{Buf, BufMut};

use crate::encoding::{self, int};
use crate::error::Error;
use crate::metadata::{RowsMetadata, VariablesMetadata};
use crate::response::event::SchemaChange;
use crate::types::ResultKind;
use crate::version::ProtocolVersion;

/// One row of a result set: a nullable cell per column.
pub type Row = Vec<Option<Vec<u8>>>;

/// A page of rows plus the metadata describing their shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rows {
    pub metadata: RowsMetadata,
    pub data: Vec<Row>,
}

impl Rows {
    /// The number of cells every row must carry, per the metadata.
    fn row_width(&self) -> usize {
        match &self.metadata.columns {
            Some(columns) => columns.len(),
            None => self.metadata.column_count.max(0) as usize,
        }
    }

    fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        self.metadata.encode(buf, version).map_err(|e| e.at("metadata"))?;
        let count = i32::try_from(self.data.len())
            .map_err(|_| Error::invalid(format!("{} rows overflow [int]", self.data.len())))?;
        int::encode(count, buf);
        let width = self.row_width();
        for row in &self.data {
            if row.len() != width {
                return Err(Error::invalid(format!(
                    "row has {} cells, metadata says {width}",
                    row.len()
                ))
                .at("data"));
            }
            for cell in row {
                encoding::bytes::encode(cell.as_deref(), buf).map_err(|e| e.at("data"))?;
            }
        }
        Ok(())
    }

    fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let metadata = RowsMetadata::decode(buf, version).map_err(|e| e.at("metadata"))?;
        let row_count = int::decode(buf)?;
        if row_count < 0 {
            return Err(Error::malformed(format!("negative row count: {row_count}")));
        }
        let width = match &metadata.columns {
            Some(columns) => columns.len(),
            None => metadata.column_count as usize,
        };
        let mut data = Vec::with_capacity((row_count as usize).min(64));
        for _ in 0..row_count {
            let mut row = Vec::with_capacity(width);
            for _ in 0..width {
                row.push(encoding::bytes::decode(buf).map_err(|e| e.at("data"))?);
            }
            data.push(row);
        }
        Ok(Rows { metadata, data })
    }

    fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let mut len = self
            .metadata
            .encoded_len(version)
            .map_err(|e| e.at("metadata"))?;
        len += 4;
        let width = self.row_width();
        for row in &self.data {
            if row.len() != width {
                return Err(Error::invalid(format!(
                    "row has {} cells, metadata says {width}",
                    row.len()
                ))
                .at("data"));
            }
            len += row
                .iter()
                .map(|cell| encoding::bytes::encoded_len(cell.as_deref()))
                .sum::<usize>();
        }
        Ok(len)
    }
}

/// The server's answer to PREPARE: the statement id, the shape of its bound
/// variables, and the shape of the result set it will produce.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prepared {
    pub id: Vec<u8>,
    /// v5/DSE v2 only.
    pub result_metadata_id: Option<Vec<u8>>,
    pub variables: VariablesMetadata,
    pub result_metadata: RowsMetadata,
}

impl Prepared {
    fn check_metadata_id(&self, version: ProtocolVersion) -> Result<(), Error> {
        if version.supports_result_metadata_id() {
            match &self.result_metadata_id {
                Some(id) if id.is_empty() => {
                    Err(Error::invalid("empty result metadata id").at("result_metadata_id"))
                }
                Some(_) => Ok(()),
                None => Err(Error::invalid(format!(
                    "{version:?} requires a result metadata id"
                ))
                .at("result_metadata_id")),
            }
        } else if self.result_metadata_id.is_some() {
            Err(Error::unsupported(format!(
                "result metadata ids are not defined in {version:?}"
            ))
            .at("result_metadata_id"))
        } else {
            Ok(())
        }
    }

    fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        self.check_metadata_id(version)?;
        encoding::short_bytes::encode(&self.id, buf).map_err(|e| e.at("id"))?;
        if let Some(id) = &self.result_metadata_id {
            encoding::short_bytes::encode(id, buf).map_err(|e| e.at("result_metadata_id"))?;
        }
        self.variables
            .encode(buf, version)
            .map_err(|e| e.at("variables"))?;
        self.result_metadata
            .encode(buf, version)
            .map_err(|e| e.at("result_metadata"))
    }

    fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let id = encoding::short_bytes::decode(buf).map_err(|e| e.at("id"))?;
        let result_metadata_id = if version.supports_result_metadata_id() {
            Some(encoding::short_bytes::decode(buf).map_err(|e| e.at("result_metadata_id"))?)
        } else {
            None
        };
        let variables = VariablesMetadata::decode(buf, version).map_err(|e| e.at("variables"))?;
        let result_metadata =
            RowsMetadata::decode(buf, version).map_err(|e| e.at("result_metadata"))?;
        Ok(Prepared {
            id,
            result_metadata_id,
            variables,
            result_metadata,
        })
    }

    fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        self.check_metadata_id(version)?;
        let mut len = encoding::short_bytes::encoded_len(&self.id);
        if let Some(id) = &self.result_metadata_id {
            len += encoding::short_bytes::encoded_len(id);
        }
        len += self
            .variables
            .encoded_len(version)
            .map_err(|e| e.at("variables"))?;
        len += self
            .result_metadata
            .encoded_len(version)
            .map_err(|e| e.at("result_metadata"))?;
        Ok(len)
    }
}

/// RESULT: the server's answer to QUERY, PREPARE, EXECUTE and BATCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// The statement succeeded and produced nothing.
    Void,
    /// USE succeeded; the connection is now in this keyspace.
    SetKeyspace(String),
    Rows(Rows),
    Prepared(Prepared),
    SchemaChange(SchemaChange),
}

impl QueryResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            QueryResult::Void => ResultKind::Void,
            QueryResult::SetKeyspace(_) => ResultKind::SetKeyspace,
            QueryResult::Rows(_) => ResultKind::Rows,
            QueryResult::Prepared(_) => ResultKind::Prepared,
            QueryResult::SchemaChange(_) => ResultKind::SchemaChange,
        }
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        int::encode(self.kind() as i32, buf);
        match self {
            QueryResult::Void => Ok(()),
            QueryResult::SetKeyspace(keyspace) => {
                encoding::string::encode(keyspace, buf).map_err(|e| e.at("keyspace"))
            }
            QueryResult::Rows(rows) => rows.encode(buf, version),
            QueryResult::Prepared(prepared) => prepared.encode(buf, version),
            QueryResult::SchemaChange(change) => change.encode(buf, version),
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        match ResultKind::try_from(int::decode(buf)?)? {
            ResultKind::Void => Ok(QueryResult::Void),
            ResultKind::SetKeyspace => Ok(QueryResult::SetKeyspace(
                encoding::string::decode(buf).map_err(|e| e.at("keyspace"))?,
            )),
            ResultKind::Rows => Ok(QueryResult::Rows(Rows::decode(buf, version)?)),
            ResultKind::Prepared => Ok(QueryResult::Prepared(Prepared::decode(buf, version)?)),
            ResultKind::SchemaChange => {
                Ok(QueryResult::SchemaChange(SchemaChange::decode(buf, version)?))
            }
        }
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        Ok(4 + match self {
            QueryResult::Void => 0,
            QueryResult::SetKeyspace(keyspace) => encoding::string::encoded_len(keyspace),
            QueryResult::Rows(rows) => rows.encoded_len(version)?,
            QueryResult::Prepared(prepared) => prepared.encoded_len(version)?,
            QueryResult::SchemaChange(change) => change.encoded_len(version)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::error::ErrorKind;
    use crate::metadata::ColumnSpec;
    use crate::types::{SchemaChangeTarget, SchemaChangeType};

    fn roundtrip(result: &QueryResult, version: ProtocolVersion) -> QueryResult {
        let mut buf = Vec::new();
        result.encode(&mut buf, version).unwrap();
        assert_eq!(buf.len(), result.encoded_len(version).unwrap());
        let mut slice = &buf[..];
        let decoded = QueryResult::decode(&mut slice, version).unwrap();
        assert!(slice.is_empty());
        decoded
    }

    fn sample_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec {
                keyspace: "ks".to_string(),
                table: "t".to_string(),
                name: "id".to_string(),
                data_type: DataType::Int,
            },
            ColumnSpec {
                keyspace: "ks".to_string(),
                table: "t".to_string(),
                name: "body".to_string(),
                data_type: DataType::Varchar,
            },
        ]
    }

    #[test]
    fn void_is_just_the_kind_tag() {
        let mut buf = Vec::new();
        QueryResult::Void.encode(&mut buf, ProtocolVersion::V4).unwrap();
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x01]);
        assert_eq!(roundtrip(&QueryResult::Void, ProtocolVersion::V4), QueryResult::Void);
    }

    #[test]
    fn set_keyspace_roundtrip() {
        let result = QueryResult::SetKeyspace("ks1".to_string());
        for version in ProtocolVersion::ALL {
            assert_eq!(roundtrip(&result, version), result);
        }
    }

    #[test]
    fn rows_roundtrip() {
        let result = QueryResult::Rows(Rows {
            metadata: RowsMetadata {
                column_count: 2,
                columns: Some(sample_columns()),
                ..Default::default()
            },
            data: vec![
                vec![Some(vec![0, 0, 0, 1]), Some(b"one".to_vec())],
                vec![Some(vec![0, 0, 0, 2]), None],
            ],
        });
        for version in ProtocolVersion::ALL {
            assert_eq!(roundtrip(&result, version), result);
        }
    }

    #[test]
    fn rows_without_metadata_use_the_column_count() {
        let result = QueryResult::Rows(Rows {
            metadata: RowsMetadata {
                column_count: 2,
                columns: None,
                ..Default::default()
            },
            data: vec![vec![None, Some(b"x".to_vec())]],
        });
        assert_eq!(roundtrip(&result, ProtocolVersion::V4), result);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = Rows {
            metadata: RowsMetadata {
                column_count: 2,
                columns: Some(sample_columns()),
                ..Default::default()
            },
            data: vec![vec![None]],
        };
        let mut buf = Vec::new();
        assert_eq!(
            rows.encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn prepared_roundtrip_v4() {
        let result = QueryResult::Prepared(Prepared {
            id: vec![0xDE, 0xAD],
            result_metadata_id: None,
            variables: VariablesMetadata {
                pk_indices: vec![0],
                columns: sample_columns(),
            },
            result_metadata: RowsMetadata {
                column_count: 2,
                columns: Some(sample_columns()),
                ..Default::default()
            },
        });
        assert_eq!(roundtrip(&result, ProtocolVersion::V4), result);
    }

    #[test]
    fn prepared_metadata_id_follows_version() {
        let with_id = QueryResult::Prepared(Prepared {
            id: vec![0xDE, 0xAD],
            result_metadata_id: Some(vec![0xBE, 0xEF]),
            ..Default::default()
        });
        assert_eq!(roundtrip(&with_id, ProtocolVersion::V5), with_id);
        assert_eq!(roundtrip(&with_id, ProtocolVersion::Dse2), with_id);

        let mut buf = Vec::new();
        assert_eq!(
            with_id
                .encode(&mut buf, ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedFeature
        );

        let without_id = QueryResult::Prepared(Prepared {
            id: vec![0xDE, 0xAD],
            ..Default::default()
        });
        let mut buf = Vec::new();
        assert_eq!(
            without_id
                .encode(&mut buf, ProtocolVersion::V5)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn schema_change_result_shares_the_event_body() {
        let result = QueryResult::SchemaChange(SchemaChange {
            change_type: SchemaChangeType::Created,
            target: SchemaChangeTarget::Aggregate,
            keyspace: "ks".to_string(),
            object: Some("agg".to_string()),
            arguments: vec!["int".to_string()],
        });
        assert_eq!(roundtrip(&result, ProtocolVersion::V4), result);
    }

    #[test]
    fn unknown_kind_tag_is_malformed() {
        let raw = 0x0006i32.to_be_bytes();
        assert_eq!(
            QueryResult::decode(&mut &raw[..], ProtocolVersion::V4)
                .unwrap_err()
                .kind(),
            ErrorKind::MalformedFrame
        );
    }
}
