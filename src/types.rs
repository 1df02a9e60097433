//! Enumerated wire constants shared across message codecs.

use core::fmt;

use crate::error::Error;

/// A message operation code, as carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
    /// DSE only.
    Revise = 0xFF,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0x00 => Ok(Opcode::Error),
            0x01 => Ok(Opcode::Startup),
            0x02 => Ok(Opcode::Ready),
            0x03 => Ok(Opcode::Authenticate),
            0x05 => Ok(Opcode::Options),
            0x06 => Ok(Opcode::Supported),
            0x07 => Ok(Opcode::Query),
            0x08 => Ok(Opcode::Result),
            0x09 => Ok(Opcode::Prepare),
            0x0A => Ok(Opcode::Execute),
            0x0B => Ok(Opcode::Register),
            0x0C => Ok(Opcode::Event),
            0x0D => Ok(Opcode::Batch),
            0x0E => Ok(Opcode::AuthChallenge),
            0x0F => Ok(Opcode::AuthResponse),
            0x10 => Ok(Opcode::AuthSuccess),
            0xFF => Ok(Opcode::Revise),
            other => Err(Error::malformed(format!("unknown opcode: {other:#04x}"))),
        }
    }
}

/// Whether a message flows client-to-server or server-to-client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

/// A consistency level, encoded as a [short].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    Serial = 0x0008,
    LocalSerial = 0x0009,
    LocalOne = 0x000A,
}

impl Consistency {
    /// Whether this level is one of the two serial levels, the only ones
    /// admissible as a serial consistency in query options.
    pub fn is_serial(self) -> bool {
        matches!(self, Consistency::Serial | Consistency::LocalSerial)
    }
}

impl TryFrom<u16> for Consistency {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self, Error> {
        match code {
            0x0000 => Ok(Consistency::Any),
            0x0001 => Ok(Consistency::One),
            0x0002 => Ok(Consistency::Two),
            0x0003 => Ok(Consistency::Three),
            0x0004 => Ok(Consistency::Quorum),
            0x0005 => Ok(Consistency::All),
            0x0006 => Ok(Consistency::LocalQuorum),
            0x0007 => Ok(Consistency::EachQuorum),
            0x0008 => Ok(Consistency::Serial),
            0x0009 => Ok(Consistency::LocalSerial),
            0x000A => Ok(Consistency::LocalOne),
            other => Err(Error::malformed(format!(
                "unknown consistency level: {other:#06x}"
            ))),
        }
    }
}

/// The batch atomicity mode, encoded as a [byte].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BatchType {
    Logged = 0x00,
    Unlogged = 0x01,
    Counter = 0x02,
}

impl TryFrom<u8> for BatchType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0x00 => Ok(BatchType::Logged),
            0x01 => Ok(BatchType::Unlogged),
            0x02 => Ok(BatchType::Counter),
            other => Err(Error::invalid(format!("unknown batch type: {other:#04x}"))),
        }
    }
}

/// The kind of write that timed out or failed, encoded as a [string].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

impl WriteType {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteType::Simple => "SIMPLE",
            WriteType::Batch => "BATCH",
            WriteType::UnloggedBatch => "UNLOGGED_BATCH",
            WriteType::Counter => "COUNTER",
            WriteType::BatchLog => "BATCH_LOG",
            WriteType::Cas => "CAS",
            WriteType::View => "VIEW",
            WriteType::Cdc => "CDC",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "SIMPLE" => Ok(WriteType::Simple),
            "BATCH" => Ok(WriteType::Batch),
            "UNLOGGED_BATCH" => Ok(WriteType::UnloggedBatch),
            "COUNTER" => Ok(WriteType::Counter),
            "BATCH_LOG" => Ok(WriteType::BatchLog),
            "CAS" => Ok(WriteType::Cas),
            "VIEW" => Ok(WriteType::View),
            "CDC" => Ok(WriteType::Cdc),
            other => Err(Error::malformed(format!("unknown write type: {other:?}"))),
        }
    }
}

impl fmt::Display for WriteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registrable event categories, encoded as [string]s in REGISTER and as
/// the leading tag of EVENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TopologyChange,
    StatusChange,
    SchemaChange,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TopologyChange => "TOPOLOGY_CHANGE",
            EventType::StatusChange => "STATUS_CHANGE",
            EventType::SchemaChange => "SCHEMA_CHANGE",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "TOPOLOGY_CHANGE" => Ok(EventType::TopologyChange),
            "STATUS_CHANGE" => Ok(EventType::StatusChange),
            "SCHEMA_CHANGE" => Ok(EventType::SchemaChange),
            other => Err(Error::malformed(format!("unknown event type: {other:?}"))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyChangeType {
    NewNode,
    RemovedNode,
    MovedNode,
}

impl TopologyChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            TopologyChangeType::NewNode => "NEW_NODE",
            TopologyChangeType::RemovedNode => "REMOVED_NODE",
            TopologyChangeType::MovedNode => "MOVED_NODE",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "NEW_NODE" => Ok(TopologyChangeType::NewNode),
            "REMOVED_NODE" => Ok(TopologyChangeType::RemovedNode),
            "MOVED_NODE" => Ok(TopologyChangeType::MovedNode),
            other => Err(Error::malformed(format!(
                "unknown topology change type: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusChangeType {
    Up,
    Down,
}

impl StatusChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusChangeType::Up => "UP",
            StatusChangeType::Down => "DOWN",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "UP" => Ok(StatusChangeType::Up),
            "DOWN" => Ok(StatusChangeType::Down),
            other => Err(Error::malformed(format!(
                "unknown status change type: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaChangeType {
    Created,
    Updated,
    Dropped,
}

impl SchemaChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaChangeType::Created => "CREATED",
            SchemaChangeType::Updated => "UPDATED",
            SchemaChangeType::Dropped => "DROPPED",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "CREATED" => Ok(SchemaChangeType::Created),
            "UPDATED" => Ok(SchemaChangeType::Updated),
            "DROPPED" => Ok(SchemaChangeType::Dropped),
            other => Err(Error::malformed(format!(
                "unknown schema change type: {other:?}"
            ))),
        }
    }
}

/// What kind of schema object a schema change affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaChangeTarget {
    Keyspace,
    Table,
    Type,
    Function,
    Aggregate,
}

impl SchemaChangeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaChangeTarget::Keyspace => "KEYSPACE",
            SchemaChangeTarget::Table => "TABLE",
            SchemaChangeTarget::Type => "TYPE",
            SchemaChangeTarget::Function => "FUNCTION",
            SchemaChangeTarget::Aggregate => "AGGREGATE",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "KEYSPACE" => Ok(SchemaChangeTarget::Keyspace),
            "TABLE" => Ok(SchemaChangeTarget::Table),
            "TYPE" => Ok(SchemaChangeTarget::Type),
            "FUNCTION" => Ok(SchemaChangeTarget::Function),
            "AGGREGATE" => Ok(SchemaChangeTarget::Aggregate),
            other => Err(Error::malformed(format!(
                "unknown schema change target: {other:?}"
            ))),
        }
    }
}

/// The shape tag at the head of a RESULT body, encoded as an [int].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultKind {
    Void = 0x0001,
    Rows = 0x0002,
    SetKeyspace = 0x0003,
    Prepared = 0x0004,
    SchemaChange = 0x0005,
}

impl TryFrom<i32> for ResultKind {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Error> {
        match code {
            0x0001 => Ok(ResultKind::Void),
            0x0002 => Ok(ResultKind::Rows),
            0x0003 => Ok(ResultKind::SetKeyspace),
            0x0004 => Ok(ResultKind::Prepared),
            0x0005 => Ok(ResultKind::SchemaChange),
            other => Err(Error::malformed(format!(
                "unknown result kind: {other:#06x}"
            ))),
        }
    }
}

/// A bound value as carried in QUERY, EXECUTE and BATCH value lists.
///
/// The wire representation is an [int] length: non-negative lengths prefix
/// the payload bytes, -1 marks a null and -2 marks an unset value (v4+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A present value. A zero-length payload is distinct from null.
    Regular(Vec<u8>),
    Null,
    /// Leave the bound marker unassigned. Requires protocol v4 or later.
    Unset,
}

impl Value {
    pub fn regular(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Regular(bytes.into())
    }
}
