//! The ERROR message codec: an error code, a message, and a code-specific
//! tail.

use std::net::IpAddr;

use bytes::{Buf, BufMut};

use crate::encoding::{self, inet_addr, int, short, string, string_list};
use crate::error::Error;
use crate::types::{Consistency, WriteType};
use crate::version::ProtocolVersion;

mod code {
    pub const SERVER: i32 = 0x0000;
    pub const PROTOCOL: i32 = 0x000A;
    pub const AUTHENTICATION: i32 = 0x0100;
    pub const UNAVAILABLE: i32 = 0x1000;
    pub const OVERLOADED: i32 = 0x1001;
    pub const IS_BOOTSTRAPPING: i32 = 0x1002;
    pub const TRUNCATE: i32 = 0x1003;
    pub const WRITE_TIMEOUT: i32 = 0x1100;
    pub const READ_TIMEOUT: i32 = 0x1200;
    pub const READ_FAILURE: i32 = 0x1300;
    pub const FUNCTION_FAILURE: i32 = 0x1400;
    pub const WRITE_FAILURE: i32 = 0x1500;
    pub const SYNTAX: i32 = 0x2000;
    pub const UNAUTHORIZED: i32 = 0x2100;
    pub const INVALID: i32 = 0x2200;
    pub const CONFIG: i32 = 0x2300;
    pub const ALREADY_EXISTS: i32 = 0x2400;
    pub const UNPREPARED: i32 = 0x2500;
}

/// Reason codes carried per node in failure reason maps. The set is open:
/// servers may send codes this crate does not name, so the map stores a raw
/// [short].
pub mod failure_code {
    pub const UNKNOWN: u16 = 0x0000;
    pub const TOO_MANY_TOMBSTONES: u16 = 0x0001;
    pub const INDEX_NOT_AVAILABLE: u16 = 0x0002;
    pub const CDC_SPACE_FULL: u16 = 0x0003;
    pub const COUNTER_WRITE: u16 = 0x0004;
    pub const TABLE_NOT_FOUND: u16 = 0x0005;
    pub const KEYSPACE_NOT_FOUND: u16 = 0x0006;
}

/// How READ_FAILURE and WRITE_FAILURE report the failed replicas: a bare
/// count through v4, a per-node reason map from v5 and on the DSE variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    Count(i32),
    /// Failing node address and its [`failure_code`].
    ReasonMap(Vec<(IpAddr, u16)>),
}

impl FailureDetail {
    fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        match self {
            FailureDetail::Count(count) => {
                if version.supports_failure_reason_map() {
                    return Err(Error::unsupported(format!(
                        "{version:?} reports failures as a reason map"
                    )));
                }
                int::encode(*count, buf);
            }
            FailureDetail::ReasonMap(reasons) => {
                if !version.supports_failure_reason_map() {
                    return Err(Error::unsupported(format!(
                        "{version:?} reports failures as a count"
                    )));
                }
                let count = i32::try_from(reasons.len()).map_err(|_| {
                    Error::invalid(format!("{} failure reasons overflow [int]", reasons.len()))
                })?;
                int::encode(count, buf);
                for (address, reason) in reasons {
                    inet_addr::encode(*address, buf);
                    short::encode(*reason, buf);
                }
            }
        }
        Ok(())
    }

    fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        if version.supports_failure_reason_map() {
            let count = int::decode(buf)?;
            if count < 0 {
                return Err(Error::malformed(format!(
                    "negative failure reason count: {count}"
                )));
            }
            let mut reasons = Vec::with_capacity((count as usize).min(64));
            for _ in 0..count {
                let address = inet_addr::decode(buf)?;
                let reason = short::decode(buf)?;
                reasons.push((address, reason));
            }
            Ok(FailureDetail::ReasonMap(reasons))
        } else {
            Ok(FailureDetail::Count(int::decode(buf)?))
        }
    }

    fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        match self {
            FailureDetail::Count(_) => {
                if version.supports_failure_reason_map() {
                    return Err(Error::unsupported(format!(
                        "{version:?} reports failures as a reason map"
                    )));
                }
                Ok(4)
            }
            FailureDetail::ReasonMap(reasons) => {
                if !version.supports_failure_reason_map() {
                    return Err(Error::unsupported(format!(
                        "{version:?} reports failures as a count"
                    )));
                }
                Ok(4 + reasons
                    .iter()
                    .map(|(address, _)| inet_addr::encoded_len(*address) + 2)
                    .sum::<usize>())
            }
        }
    }
}

/// The server-side failure carried by an ERROR message, minus the
/// human-readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    ServerError,
    ProtocolError,
    AuthenticationError,
    Unavailable {
        consistency: Consistency,
        required: i32,
        alive: i32,
    },
    Overloaded,
    IsBootstrapping,
    TruncateError,
    WriteTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        write_type: WriteType,
    },
    ReadTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    ReadFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        failures: FailureDetail,
        data_present: bool,
    },
    FunctionFailure {
        keyspace: String,
        function: String,
        arg_types: Vec<String>,
    },
    WriteFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        failures: FailureDetail,
        write_type: WriteType,
    },
    SyntaxError,
    Unauthorized,
    Invalid,
    ConfigError,
    AlreadyExists {
        keyspace: String,
        table: String,
    },
    Unprepared {
        id: Vec<u8>,
    },
}

impl DbError {
    /// The wire error code for this variant.
    pub fn code(&self) -> i32 {
        match self {
            DbError::ServerError => code::SERVER,
            DbError::ProtocolError => code::PROTOCOL,
            DbError::AuthenticationError => code::AUTHENTICATION,
            DbError::Unavailable { .. } => code::UNAVAILABLE,
            DbError::Overloaded => code::OVERLOADED,
            DbError::IsBootstrapping => code::IS_BOOTSTRAPPING,
            DbError::TruncateError => code::TRUNCATE,
            DbError::WriteTimeout { .. } => code::WRITE_TIMEOUT,
            DbError::ReadTimeout { .. } => code::READ_TIMEOUT,
            DbError::ReadFailure { .. } => code::READ_FAILURE,
            DbError::FunctionFailure { .. } => code::FUNCTION_FAILURE,
            DbError::WriteFailure { .. } => code::WRITE_FAILURE,
            DbError::SyntaxError => code::SYNTAX,
            DbError::Unauthorized => code::UNAUTHORIZED,
            DbError::Invalid => code::INVALID,
            DbError::ConfigError => code::CONFIG,
            DbError::AlreadyExists { .. } => code::ALREADY_EXISTS,
            DbError::Unprepared { .. } => code::UNPREPARED,
        }
    }
}

/// ERROR: something went wrong server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
    pub error: DbError,
}

impl ErrorResponse {
    pub fn new(error: DbError, message: impl Into<String>) -> Self {
        ErrorResponse {
            message: message.into(),
            error,
        }
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        int::encode(self.error.code(), buf);
        string::encode(&self.message, buf).map_err(|e| e.at("message"))?;
        match &self.error {
            DbError::ServerError
            | DbError::ProtocolError
            | DbError::AuthenticationError
            | DbError::Overloaded
            | DbError::IsBootstrapping
            | DbError::TruncateError
            | DbError::SyntaxError
            | DbError::Unauthorized
            | DbError::Invalid
            | DbError::ConfigError => {}
            DbError::Unavailable {
                consistency,
                required,
                alive,
            } => {
                short::encode(*consistency as u16, buf);
                int::encode(*required, buf);
                int::encode(*alive, buf);
            }
            DbError::WriteTimeout {
                consistency,
                received,
                block_for,
                write_type,
            } => {
                short::encode(*consistency as u16, buf);
                int::encode(*received, buf);
                int::encode(*block_for, buf);
                string::encode(write_type.as_str(), buf)?;
            }
            DbError::ReadTimeout {
                consistency,
                received,
                block_for,
                data_present,
            } => {
                short::encode(*consistency as u16, buf);
                int::encode(*received, buf);
                int::encode(*block_for, buf);
                encoding::byte::encode(u8::from(*data_present), buf);
            }
            DbError::ReadFailure {
                consistency,
                received,
                block_for,
                failures,
                data_present,
            } => {
                short::encode(*consistency as u16, buf);
                int::encode(*received, buf);
                int::encode(*block_for, buf);
                failures.encode(buf, version).map_err(|e| e.at("failures"))?;
                encoding::byte::encode(u8::from(*data_present), buf);
            }
            DbError::FunctionFailure {
                keyspace,
                function,
                arg_types,
            } => {
                string::encode(keyspace, buf).map_err(|e| e.at("keyspace"))?;
                string::encode(function, buf).map_err(|e| e.at("function"))?;
                string_list::encode(arg_types, buf).map_err(|e| e.at("arg_types"))?;
            }
            DbError::WriteFailure {
                consistency,
                received,
                block_for,
                failures,
                write_type,
            } => {
                short::encode(*consistency as u16, buf);
                int::encode(*received, buf);
                int::encode(*block_for, buf);
                failures.encode(buf, version).map_err(|e| e.at("failures"))?;
                string::encode(write_type.as_str(), buf)?;
            }
            DbError::AlreadyExists { keyspace, table } => {
                string::encode(keyspace, buf).map_err(|e| e.at("keyspace"))?;
                string::encode(table, buf).map_err(|e| e.at("table"))?;
            }
            DbError::Unprepared { id } => {
                encoding::short_bytes::encode(id, buf).map_err(|e| e.at("id"))?;
            }
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        let error_code = int::decode(buf)?;
        let message = string::decode(buf).map_err(|e| e.at("message"))?;
        let error = match error_code {
            code::SERVER => DbError::ServerError,
            code::PROTOCOL => DbError::ProtocolError,
            code::AUTHENTICATION => DbError::AuthenticationError,
            code::UNAVAILABLE => DbError::Unavailable {
                consistency: Consistency::try_from(short::decode(buf)?)?,
                required: int::decode(buf)?,
                alive: int::decode(buf)?,
            },
            code::OVERLOADED => DbError::Overloaded,
            code::IS_BOOTSTRAPPING => DbError::IsBootstrapping,
            code::TRUNCATE => DbError::TruncateError,
            code::WRITE_TIMEOUT => DbError::WriteTimeout {
                consistency: Consistency::try_from(short::decode(buf)?)?,
                received: int::decode(buf)?,
                block_for: int::decode(buf)?,
                write_type: WriteType::parse(&string::decode(buf)?)?,
            },
            code::READ_TIMEOUT => DbError::ReadTimeout {
                consistency: Consistency::try_from(short::decode(buf)?)?,
                received: int::decode(buf)?,
                block_for: int::decode(buf)?,
                data_present: encoding::byte::decode(buf)? != 0,
            },
            code::READ_FAILURE => DbError::ReadFailure {
                consistency: Consistency::try_from(short::decode(buf)?)?,
                received: int::decode(buf)?,
                block_for: int::decode(buf)?,
                failures: FailureDetail::decode(buf, version).map_err(|e| e.at("failures"))?,
                data_present: encoding::byte::decode(buf)? != 0,
            },
            code::FUNCTION_FAILURE => DbError::FunctionFailure {
                keyspace: string::decode(buf).map_err(|e| e.at("keyspace"))?,
                function: string::decode(buf).map_err(|e| e.at("function"))?,
                arg_types: string_list::decode(buf).map_err(|e| e.at("arg_types"))?,
            },
            code::WRITE_FAILURE => DbError::WriteFailure {
                consistency: Consistency::try_from(short::decode(buf)?)?,
                received: int::decode(buf)?,
                block_for: int::decode(buf)?,
                failures: FailureDetail::decode(buf, version).map_err(|e| e.at("failures"))?,
                write_type: WriteType::parse(&string::decode(buf)?)?,
            },
            code::SYNTAX => DbError::SyntaxError,
            code::UNAUTHORIZED => DbError::Unauthorized,
            code::INVALID => DbError::Invalid,
            code::CONFIG => DbError::ConfigError,
            code::ALREADY_EXISTS => DbError::AlreadyExists {
                keyspace: string::decode(buf).map_err(|e| e.at("keyspace"))?,
                table: string::decode(buf).map_err(|e| e.at("table"))?,
            },
            code::UNPREPARED => DbError::Unprepared {
                id: encoding::short_bytes::decode(buf).map_err(|e| e.at("id"))?,
            },
            other => {
                return Err(Error::malformed(format!(
                    "unknown error code: {other:#010x}"
                )))
            }
        };
        Ok(ErrorResponse { message, error })
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let mut len = 4 + string::encoded_len(&self.message);
        len += match &self.error {
            DbError::ServerError
            | DbError::ProtocolError
            | DbError::AuthenticationError
            | DbError::Overloaded
            | DbError::IsBootstrapping
            | DbError::TruncateError
            | DbError::SyntaxError
            | DbError::Unauthorized
            | DbError::Invalid
            | DbError::ConfigError => 0,
            DbError::Unavailable { .. } => 2 + 4 + 4,
            DbError::WriteTimeout { write_type, .. } => {
                2 + 4 + 4 + string::encoded_len(write_type.as_str())
            }
            DbError::ReadTimeout { .. } => 2 + 4 + 4 + 1,
            DbError::ReadFailure { failures, .. } => {
                2 + 4 + 4 + failures.encoded_len(version).map_err(|e| e.at("failures"))? + 1
            }
            DbError::FunctionFailure {
                keyspace,
                function,
                arg_types,
            } => {
                string::encoded_len(keyspace)
                    + string::encoded_len(function)
                    + string_list::encoded_len(arg_types)
            }
            DbError::WriteFailure {
                failures,
                write_type,
                ..
            } => {
                2 + 4
                    + 4
                    + failures.encoded_len(version).map_err(|e| e.at("failures"))?
                    + string::encoded_len(write_type.as_str())
            }
            DbError::AlreadyExists { keyspace, table } => {
                string::encoded_len(keyspace) + string::encoded_len(table)
            }
            DbError::Unprepared { id } => encoding::short_bytes::encoded_len(id),
        };
        Ok(len)
    }
}
