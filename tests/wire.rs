//! End-to-end wire vectors and cross-version properties for the message
//! codecs.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use cql_proto::{
    AuthChallenge, AuthResponse, AuthSuccess, Authenticate, Batch, BatchChild, Consistency,
    ContinuousPagingOptions, DataType, DbError, ErrorResponse, Event, Execute, Message, Prepare,
    Prepared, ProtocolVersion, Query, QueryOptions, QueryResult, Register, Revise, RowsMetadata,
    SchemaChange, SchemaChangeTarget, SchemaChangeType, Startup, StatusChangeType, Supported,
    TopologyChangeType, Value, VariablesMetadata, WriteType,
};
use cql_proto::metadata::ColumnSpec;
use cql_proto::response::result::Rows;
use cql_proto::types::EventType;

fn roundtrip(message: &Message, version: ProtocolVersion) -> Message {
    let bytes = message.encode_to_vec(version).unwrap();
    assert_eq!(
        bytes.len(),
        message.encoded_len(version).unwrap(),
        "encoded_len mismatch for {message:?} on {version:?}"
    );
    let mut slice = &bytes[..];
    let decoded = Message::decode(message.direction(), message.opcode(), &mut slice, version)
        .unwrap_or_else(|e| panic!("decode failed for {message:?} on {version:?}: {e}"));
    assert!(slice.is_empty(), "decode left trailing bytes on {version:?}");
    decoded
}

#[test]
fn startup_wire_vector() {
    let message = Message::Startup(Startup::new());
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
    let mut expected = vec![0x00, 0x01, 0x00, 0x0B];
    expected.extend_from_slice(b"CQL_VERSION");
    expected.extend_from_slice(&[0x00, 0x05]);
    expected.extend_from_slice(b"3.0.0");
    assert_eq!(bytes, expected);
    assert_eq!(roundtrip(&message, ProtocolVersion::V4), message);
}

#[test]
fn query_wire_vector() {
    let message = Message::Query(Query {
        query: "SELECT".to_string(),
        options: QueryOptions::default(),
    });
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
    let mut expected = vec![0x00, 0x00, 0x00, 0x06];
    expected.extend_from_slice(b"SELECT");
    expected.extend_from_slice(&[0x00, 0x00, 0x00]);
    assert_eq!(bytes, expected);
}

#[test]
fn execute_v4_wire_vector() {
    let message = Message::Execute(Execute {
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
    });
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
    assert_eq!(
        bytes,
        [
            0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // query id
            0x00, 0x06, // consistency
            0x3E, // flags
            0x00, 0x00, 0x00, 0x64, // page size
            0x00, 0x00, 0x00, 0x04, 0xCA, 0xFE, 0xBA, 0xBE, // paging state
            0x00, 0x09, // serial consistency
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7B, // default timestamp
        ]
    );
    assert_eq!(roundtrip(&message, ProtocolVersion::V4), message);
}

#[test]
fn execute_v5_wire_vector() {
    let message = Message::Execute(Execute {
        query_id: vec![0x01, 0x02, 0x03, 0x04],
        result_metadata_id: Some(vec![0x05, 0x06, 0x07, 0x08]),
        options: QueryOptions {
            keyspace: Some("ks1".to_string()),
            now_in_seconds: Some(123),
            ..Default::default()
        },
    });
    let bytes = message.encode_to_vec(ProtocolVersion::V5).unwrap();
    let mut expected = vec![
        0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // query id
        0x00, 0x04, 0x05, 0x06, 0x07, 0x08, // result metadata id
        0x00, 0x00, // consistency
        0x00, 0x00, 0x01, 0x80, // flags: with-keyspace | now-in-seconds
        0x00, 0x03,
    ];
    expected.extend_from_slice(b"ks1");
    expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x7B]);
    assert_eq!(bytes, expected);
    assert_eq!(roundtrip(&message, ProtocolVersion::V5), message);
}

#[test]
fn batch_wire_vector() {
    let message = Message::Batch(Batch {
        children: vec![BatchChild::query(
            "INSERT",
            vec![Value::regular(b"hello".to_vec())],
        )],
        ..Default::default()
    });
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
    let mut expected = vec![
        0x00, // logged
        0x00, 0x01, // one child
        0x00, // query-string child
        0x00, 0x00, 0x00, 0x06,
    ];
    expected.extend_from_slice(b"INSERT");
    expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x05]);
    expected.extend_from_slice(b"hello");
    expected.extend_from_slice(&[0x00, 0x00, 0x00]); // consistency + flags
    assert_eq!(bytes, expected);
    assert_eq!(roundtrip(&message, ProtocolVersion::V4), message);
}

#[test]
fn read_timeout_wire_vector() {
    let message = Message::Error(ErrorResponse::new(
        DbError::ReadTimeout {
            consistency: Consistency::LocalQuorum,
            received: 1,
            block_for: 2,
            data_present: true,
        },
        "BOOM",
    ));
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
    let mut expected = vec![0x00, 0x00, 0x12, 0x00, 0x00, 0x04];
    expected.extend_from_slice(b"BOOM");
    expected.extend_from_slice(&[
        0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01,
    ]);
    assert_eq!(bytes, expected);
    assert_eq!(roundtrip(&message, ProtocolVersion::V4), message);
}

fn sample_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            keyspace: "ks".to_string(),
            table: "t".to_string(),
            name: "id".to_string(),
            data_type: DataType::Uuid,
        },
        ColumnSpec {
            keyspace: "ks".to_string(),
            table: "t".to_string(),
            name: "tags".to_string(),
            data_type: DataType::set(DataType::Varchar),
        },
    ]
}

/// Messages legal on every protocol version this crate speaks.
fn version_agnostic_messages() -> Vec<Message> {
    let mut supported_options = HashMap::new();
    supported_options.insert(
        "COMPRESSION".to_string(),
        vec!["lz4".to_string(), "snappy".to_string()],
    );
    vec![
        Message::Startup(Startup::new()),
        Message::Options,
        Message::Query(Query {
            query: "SELECT * FROM ks.t WHERE id = ?".to_string(),
            options: QueryOptions {
                consistency: Consistency::LocalOne,
                positional_values: vec![Value::regular(vec![0x01]), Value::Null],
                page_size: Some(5000),
                serial_consistency: Some(Consistency::Serial),
                default_timestamp: Some(-1),
                ..Default::default()
            },
        }),
        Message::Prepare(Prepare {
            query: "UPDATE ks.t SET v = ? WHERE id = ?".to_string(),
            keyspace: None,
        }),
        Message::Batch(Batch {
            children: vec![
                BatchChild::query("INSERT INTO t (a) VALUES (?)", vec![Value::Null]),
                BatchChild::prepared(vec![0xAA, 0xBB], vec![Value::regular(vec![7])]),
            ],
            consistency: Consistency::Quorum,
            serial_consistency: Some(Consistency::LocalSerial),
            default_timestamp: Some(42),
            ..Default::default()
        }),
        Message::Register(Register {
            event_types: vec![
                EventType::TopologyChange,
                EventType::StatusChange,
                EventType::SchemaChange,
            ],
        }),
        Message::AuthResponse(AuthResponse {
            token: Some(b"user:pass".to_vec()),
        }),
        Message::Ready,
        Message::Authenticate(Authenticate {
            authenticator: "org.apache.cassandra.auth.PasswordAuthenticator".to_string(),
        }),
        Message::Supported(Supported {
            options: supported_options,
        }),
        Message::AuthChallenge(AuthChallenge {
            token: Some(vec![0x01, 0x02]),
        }),
        Message::AuthSuccess(AuthSuccess { token: None }),
        Message::Event(Event::TopologyChange {
            change_type: TopologyChangeType::NewNode,
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)), 9042),
        }),
        Message::Event(Event::StatusChange {
            change_type: StatusChangeType::Up,
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 6)), 9042),
        }),
        Message::Event(Event::SchemaChange(SchemaChange {
            change_type: SchemaChangeType::Updated,
            target: SchemaChangeTarget::Table,
            keyspace: "ks".to_string(),
            object: Some("t".to_string()),
            arguments: Vec::new(),
        })),
        Message::Result(QueryResult::Void),
        Message::Result(QueryResult::SetKeyspace("ks".to_string())),
        Message::Result(QueryResult::Rows(Rows {
            metadata: RowsMetadata {
                column_count: 2,
                columns: Some(sample_columns()),
                ..Default::default()
            },
            data: vec![
                vec![Some(vec![0u8; 16]), Some(b"\x00\x01\x00\x01a".to_vec())],
                vec![Some(vec![1u8; 16]), None],
            ],
        })),
        Message::Error(ErrorResponse::new(DbError::Overloaded, "shedding load")),
        Message::Error(ErrorResponse::new(
            DbError::Unavailable {
                consistency: Consistency::Quorum,
                required: 2,
                alive: 1,
            },
            "not enough replicas",
        )),
    ]
}

#[test]
fn roundtrip_across_all_versions() {
    for message in version_agnostic_messages() {
        for version in ProtocolVersion::ALL {
            assert_eq!(roundtrip(&message, version), message);
        }
    }
}

#[test]
fn prepared_result_shape_follows_version() {
    let base = Prepared {
        id: vec![0xDE, 0xAD, 0xBE, 0xEF],
        result_metadata_id: None,
        variables: VariablesMetadata {
            pk_indices: vec![1],
            columns: sample_columns(),
        },
        result_metadata: RowsMetadata {
            column_count: 2,
            columns: Some(sample_columns()),
            ..Default::default()
        },
    };

    // v3 has no pk indices on the wire.
    let v3 = Message::Result(QueryResult::Prepared(Prepared {
        variables: VariablesMetadata {
            pk_indices: vec![],
            columns: sample_columns(),
        },
        ..base.clone()
    }));
    assert_eq!(roundtrip(&v3, ProtocolVersion::V3), v3);

    // v4 and DSE v1 carry pk indices but no result metadata id.
    let v4 = Message::Result(QueryResult::Prepared(base.clone()));
    for version in [ProtocolVersion::V4, ProtocolVersion::Dse1] {
        assert_eq!(roundtrip(&v4, version), v4);
    }

    // v5 and DSE v2 add the result metadata id.
    let v5 = Message::Result(QueryResult::Prepared(Prepared {
        result_metadata_id: Some(vec![0x11, 0x22]),
        ..base
    }));
    for version in [ProtocolVersion::V5, ProtocolVersion::Dse2] {
        assert_eq!(roundtrip(&v5, version), v5);
    }

    let v4_bytes = v4.encode_to_vec(ProtocolVersion::V4).unwrap();
    let v5_bytes = v5.encode_to_vec(ProtocolVersion::V5).unwrap();
    // The extra short-bytes id is the only difference in the fixed prefix.
    assert_eq!(v5_bytes.len(), v4_bytes.len() + 2 + 2);
}

#[test]
fn dse_only_messages_roundtrip() {
    let revise = Message::Revise(Revise::CancelContinuousPaging {
        target_stream_id: 17,
    });
    for version in [ProtocolVersion::Dse1, ProtocolVersion::Dse2] {
        assert_eq!(roundtrip(&revise, version), revise);
    }

    let continuous_query = Message::Query(Query {
        query: "SELECT * FROM big".to_string(),
        options: QueryOptions {
            page_size: Some(1 << 16),
            page_size_in_bytes: true,
            continuous_paging: Some(ContinuousPagingOptions {
                max_pages: 0,
                pages_per_second: 25,
                next_pages: None,
            }),
            ..Default::default()
        },
    });
    assert_eq!(
        roundtrip(&continuous_query, ProtocolVersion::Dse1),
        continuous_query
    );
}

#[test]
fn failure_details_switch_shape_at_v5() {
    let count_failure = Message::Error(ErrorResponse::new(
        DbError::ReadFailure {
            consistency: Consistency::One,
            received: 0,
            block_for: 1,
            failures: cql_proto::FailureDetail::Count(1),
            data_present: false,
        },
        "read failed",
    ));
    for version in [ProtocolVersion::V3, ProtocolVersion::V4] {
        assert_eq!(roundtrip(&count_failure, version), count_failure);
    }

    let map_failure = Message::Error(ErrorResponse::new(
        DbError::ReadFailure {
            consistency: Consistency::One,
            received: 0,
            block_for: 1,
            failures: cql_proto::FailureDetail::ReasonMap(vec![(
                IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)),
                0x0000,
            )]),
            data_present: false,
        },
        "read failed",
    ));
    for version in [
        ProtocolVersion::V5,
        ProtocolVersion::Dse1,
        ProtocolVersion::Dse2,
    ] {
        assert_eq!(roundtrip(&map_failure, version), map_failure);
    }
}

#[test]
fn skipped_metadata_rows_roundtrip() {
    let message = Message::Result(QueryResult::Rows(Rows {
        metadata: RowsMetadata {
            column_count: 1,
            columns: None,
            ..Default::default()
        },
        data: vec![vec![Some(b"payload".to_vec())], vec![None]],
    }));
    for version in ProtocolVersion::ALL {
        assert_eq!(roundtrip(&message, version), message);
    }
}

#[test]
fn clones_are_independent() {
    let original = Message::Batch(Batch {
        children: vec![BatchChild::query(
            "INSERT",
            vec![Value::regular(b"hello".to_vec())],
        )],
        keyspace: None,
        ..Default::default()
    });
    let snapshot = original.encode_to_vec(ProtocolVersion::V4).unwrap();

    let mut clone = original.clone();
    if let Message::Batch(batch) = &mut clone {
        batch.consistency = Consistency::All;
        batch.children[0].values.push(Value::Unset);
        if let cql_proto::BatchStatement::Query(q) = &mut batch.children[0].statement {
            q.push_str(" INTO nowhere");
        }
    }

    // The original's bytes are unchanged by any mutation of the clone.
    assert_eq!(original.encode_to_vec(ProtocolVersion::V4).unwrap(), snapshot);
    assert_ne!(clone, original);
}

#[test]
fn deep_clone_of_nested_metadata() {
    let original = Message::Result(QueryResult::Rows(Rows {
        metadata: RowsMetadata {
            column_count: 2,
            paging_state: Some(vec![1, 2, 3]),
            columns: Some(sample_columns()),
            ..Default::default()
        },
        data: vec![vec![Some(vec![9u8; 16]), None]],
    }));
    let mut clone = original.clone();
    if let Message::Result(QueryResult::Rows(rows)) = &mut clone {
        rows.metadata.paging_state.as_mut().unwrap().push(4);
        rows.metadata.columns.as_mut().unwrap()[0].name.push('x');
        rows.data[0][0].as_mut().unwrap()[0] = 0;
    }
    if let (Message::Result(QueryResult::Rows(a)), Message::Result(QueryResult::Rows(b))) =
        (&original, &clone)
    {
        assert_eq!(a.metadata.paging_state.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(a.metadata.columns.as_ref().unwrap()[0].name, "id");
        assert_eq!(a.data[0][0].as_deref(), Some(&[9u8; 16][..]));
        assert_ne!(a, b);
    } else {
        unreachable!();
    }
}

#[test]
fn named_and_positional_precedence_is_visible_at_message_level() {
    let mut named = HashMap::new();
    named.insert("k".to_string(), Value::regular(b"v".to_vec()));
    let with_both = Message::Query(Query {
        query: "Q".to_string(),
        options: QueryOptions {
            positional_values: vec![Value::regular(b"p".to_vec())],
            named_values: named,
            ..Default::default()
        },
    });
    let positional_only = Message::Query(Query {
        query: "Q".to_string(),
        options: QueryOptions {
            positional_values: vec![Value::regular(b"p".to_vec())],
            ..Default::default()
        },
    });
    for version in ProtocolVersion::ALL {
        assert_eq!(
            with_both.encode_to_vec(version).unwrap(),
            positional_only.encode_to_vec(version).unwrap()
        );
    }
}

#[test]
fn write_types_survive_error_roundtrips() {
    for write_type in [
        WriteType::Simple,
        WriteType::Batch,
        WriteType::UnloggedBatch,
        WriteType::Counter,
        WriteType::BatchLog,
        WriteType::Cas,
        WriteType::View,
        WriteType::Cdc,
    ] {
        let message = Message::Error(ErrorResponse::new(
            DbError::WriteTimeout {
                consistency: Consistency::Two,
                received: 1,
                block_for: 2,
                write_type,
            },
            "slow",
        ));
        assert_eq!(roundtrip(&message, ProtocolVersion::V4), message);
    }
}
