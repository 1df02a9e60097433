#![doc(html_root_url = "https://docs.rs/cql-proto/0.1.0")]
#![doc = include_str!("../README.md")]

// Re-export the bytes crate; the codec API is expressed in its Buf/BufMut
// traits.
pub use bytes;

mod error;
mod message;
mod version;

pub mod datatype;
pub mod encoding;
pub mod metadata;
pub mod query;
pub mod request;
pub mod response;
pub mod types;

pub use crate::error::{Error, ErrorKind};
pub use crate::message::Message;
pub use crate::version::ProtocolVersion;

pub use crate::datatype::{DataType, UdtType};
pub use crate::metadata::{ColumnSpec, RowsMetadata, VariablesMetadata};
pub use crate::query::{ContinuousPagingOptions, QueryOptions};
pub use crate::request::batch::{Batch, BatchChild, BatchStatement};
pub use crate::request::{AuthResponse, Execute, Prepare, Query, Register, Revise, Startup};
pub use crate::response::error::{DbError, ErrorResponse, FailureDetail};
pub use crate::response::event::{Event, SchemaChange};
pub use crate::response::result::{Prepared, QueryResult, Row, Rows};
pub use crate::response::{AuthChallenge, AuthSuccess, Authenticate, Supported};
pub use crate::types::{
    BatchType, Consistency, Direction, EventType, Opcode, ResultKind, SchemaChangeTarget,
    SchemaChangeType, StatusChangeType, TopologyChangeType, Value, WriteType,
};
