//! The recursive CQL column data type tree and its codec.

use core::fmt;

use ::bytes::{Buf, BufMut};

use crate::encoding::{self, short};
use crate::error::Error;
use crate::version::ProtocolVersion;

// Nested collections and UDTs recurse; cap the depth so a hostile stream
// cannot blow the stack.
const MAX_NESTING: u32 = 100;

mod code {
    pub const CUSTOM: u16 = 0x0000;
    pub const ASCII: u16 = 0x0001;
    pub const BIGINT: u16 = 0x0002;
    pub const BLOB: u16 = 0x0003;
    pub const BOOLEAN: u16 = 0x0004;
    pub const COUNTER: u16 = 0x0005;
    pub const DECIMAL: u16 = 0x0006;
    pub const DOUBLE: u16 = 0x0007;
    pub const FLOAT: u16 = 0x0008;
    pub const INT: u16 = 0x0009;
    pub const TIMESTAMP: u16 = 0x000B;
    pub const UUID: u16 = 0x000C;
    pub const VARCHAR: u16 = 0x000D;
    pub const VARINT: u16 = 0x000E;
    pub const TIMEUUID: u16 = 0x000F;
    pub const INET: u16 = 0x0010;
    pub const DATE: u16 = 0x0011;
    pub const TIME: u16 = 0x0012;
    pub const SMALLINT: u16 = 0x0013;
    pub const TINYINT: u16 = 0x0014;
    pub const DURATION: u16 = 0x0015;
    pub const LIST: u16 = 0x0020;
    pub const MAP: u16 = 0x0021;
    pub const SET: u16 = 0x0022;
    pub const UDT: u16 = 0x0030;
    pub const TUPLE: u16 = 0x0031;
}

/// A CQL column type: a [short] type code followed by code-specific content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// A server-defined type named by its Java class.
    Custom(String),
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    /// v4 and later.
    Date,
    /// v4 and later.
    Time,
    /// v4 and later.
    Smallint,
    /// v4 and later.
    Tinyint,
    /// v5 and the DSE variants.
    Duration,
    List(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Set(Box<DataType>),
    Udt(UdtType),
    Tuple(Vec<DataType>),
}

/// A user-defined type: its defining keyspace, its name, and its ordered
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtType {
    pub keyspace: String,
    pub name: String,
    pub fields: Vec<(String, DataType)>,
}

impl DataType {
    pub fn list(element: DataType) -> Self {
        DataType::List(Box::new(element))
    }

    pub fn set(element: DataType) -> Self {
        DataType::Set(Box::new(element))
    }

    pub fn map(key: DataType, value: DataType) -> Self {
        DataType::Map(Box::new(key), Box::new(value))
    }

    fn check_supported(&self, version: ProtocolVersion) -> Result<(), Error> {
        match self {
            DataType::Date | DataType::Time | DataType::Smallint | DataType::Tinyint => {
                if version == ProtocolVersion::V3 {
                    return Err(Error::unsupported(format!(
                        "{self} is not defined in {version:?}"
                    )));
                }
            }
            DataType::Duration => {
                if !matches!(
                    version,
                    ProtocolVersion::V5 | ProtocolVersion::Dse1 | ProtocolVersion::Dse2
                ) {
                    return Err(Error::unsupported(format!(
                        "{self} is not defined in {version:?}"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        self.check_supported(version)?;
        match self {
            DataType::Custom(class) => {
                short::encode(code::CUSTOM, buf);
                encoding::string::encode(class, buf)?;
            }
            DataType::Ascii => short::encode(code::ASCII, buf),
            DataType::Bigint => short::encode(code::BIGINT, buf),
            DataType::Blob => short::encode(code::BLOB, buf),
            DataType::Boolean => short::encode(code::BOOLEAN, buf),
            DataType::Counter => short::encode(code::COUNTER, buf),
            DataType::Decimal => short::encode(code::DECIMAL, buf),
            DataType::Double => short::encode(code::DOUBLE, buf),
            DataType::Float => short::encode(code::FLOAT, buf),
            DataType::Int => short::encode(code::INT, buf),
            DataType::Timestamp => short::encode(code::TIMESTAMP, buf),
            DataType::Uuid => short::encode(code::UUID, buf),
            DataType::Varchar => short::encode(code::VARCHAR, buf),
            DataType::Varint => short::encode(code::VARINT, buf),
            DataType::Timeuuid => short::encode(code::TIMEUUID, buf),
            DataType::Inet => short::encode(code::INET, buf),
            DataType::Date => short::encode(code::DATE, buf),
            DataType::Time => short::encode(code::TIME, buf),
            DataType::Smallint => short::encode(code::SMALLINT, buf),
            DataType::Tinyint => short::encode(code::TINYINT, buf),
            DataType::Duration => short::encode(code::DURATION, buf),
            DataType::List(element) => {
                short::encode(code::LIST, buf);
                element.encode(buf, version)?;
            }
            DataType::Set(element) => {
                short::encode(code::SET, buf);
                element.encode(buf, version)?;
            }
            DataType::Map(key, value) => {
                short::encode(code::MAP, buf);
                key.encode(buf, version)?;
                value.encode(buf, version)?;
            }
            DataType::Udt(udt) => {
                short::encode(code::UDT, buf);
                encoding::string::encode(&udt.keyspace, buf)?;
                encoding::string::encode(&udt.name, buf)?;
                let count = u16::try_from(udt.fields.len()).map_err(|_| {
                    Error::invalid(format!("{} UDT fields overflow [short]", udt.fields.len()))
                })?;
                short::encode(count, buf);
                for (name, field) in &udt.fields {
                    encoding::string::encode(name, buf)?;
                    field.encode(buf, version)?;
                }
            }
            DataType::Tuple(elements) => {
                short::encode(code::TUPLE, buf);
                let count = u16::try_from(elements.len()).map_err(|_| {
                    Error::invalid(format!("{} tuple elements overflow [short]", elements.len()))
                })?;
                short::encode(count, buf);
                for element in elements {
                    element.encode(buf, version)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        Self::decode_nested(buf, version, 0)
    }

    fn decode_nested(
        buf: &mut impl Buf,
        version: ProtocolVersion,
        depth: u32,
    ) -> Result<Self, Error> {
        if depth >= MAX_NESTING {
            return Err(Error::malformed("data type nesting limit reached"));
        }
        let data_type = match short::decode(buf)? {
            code::CUSTOM => DataType::Custom(encoding::string::decode(buf)?),
            code::ASCII => DataType::Ascii,
            code::BIGINT => DataType::Bigint,
            code::BLOB => DataType::Blob,
            code::BOOLEAN => DataType::Boolean,
            code::COUNTER => DataType::Counter,
            code::DECIMAL => DataType::Decimal,
            code::DOUBLE => DataType::Double,
            code::FLOAT => DataType::Float,
            code::INT => DataType::Int,
            code::TIMESTAMP => DataType::Timestamp,
            code::UUID => DataType::Uuid,
            code::VARCHAR => DataType::Varchar,
            code::VARINT => DataType::Varint,
            code::TIMEUUID => DataType::Timeuuid,
            code::INET => DataType::Inet,
            code::DATE => DataType::Date,
            code::TIME => DataType::Time,
            code::SMALLINT => DataType::Smallint,
            code::TINYINT => DataType::Tinyint,
            code::DURATION => DataType::Duration,
            code::LIST => DataType::List(Box::new(Self::decode_nested(buf, version, depth + 1)?)),
            code::SET => DataType::Set(Box::new(Self::decode_nested(buf, version, depth + 1)?)),
            code::MAP => {
                let key = Self::decode_nested(buf, version, depth + 1)?;
                let value = Self::decode_nested(buf, version, depth + 1)?;
                DataType::Map(Box::new(key), Box::new(value))
            }
            code::UDT => {
                let keyspace = encoding::string::decode(buf)?;
                let name = encoding::string::decode(buf)?;
                let count = short::decode(buf)? as usize;
                let mut fields = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let field_name = encoding::string::decode(buf)?;
                    let field_type = Self::decode_nested(buf, version, depth + 1)?;
                    fields.push((field_name, field_type));
                }
                DataType::Udt(UdtType {
                    keyspace,
                    name,
                    fields,
                })
            }
            code::TUPLE => {
                let count = short::decode(buf)? as usize;
                let mut elements = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    elements.push(Self::decode_nested(buf, version, depth + 1)?);
                }
                DataType::Tuple(elements)
            }
            other => {
                return Err(Error::malformed(format!(
                    "unknown data type code: {other:#06x}"
                )))
            }
        };
        data_type.check_supported(version)?;
        Ok(data_type)
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            DataType::Custom(class) => 2 + encoding::string::encoded_len(class),
            DataType::List(element) | DataType::Set(element) => 2 + element.encoded_len(),
            DataType::Map(key, value) => 2 + key.encoded_len() + value.encoded_len(),
            DataType::Udt(udt) => {
                2 + encoding::string::encoded_len(&udt.keyspace)
                    + encoding::string::encoded_len(&udt.name)
                    + 2
                    + udt
                        .fields
                        .iter()
                        .map(|(name, field)| {
                            encoding::string::encoded_len(name) + field.encoded_len()
                        })
                        .sum::<usize>()
            }
            DataType::Tuple(elements) => {
                2 + 2 + elements.iter().map(DataType::encoded_len).sum::<usize>()
            }
            _ => 2,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Custom(class) => write!(f, "custom({class})"),
            DataType::Ascii => f.write_str("ascii"),
            DataType::Bigint => f.write_str("bigint"),
            DataType::Blob => f.write_str("blob"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::Counter => f.write_str("counter"),
            DataType::Decimal => f.write_str("decimal"),
            DataType::Double => f.write_str("double"),
            DataType::Float => f.write_str("float"),
            DataType::Int => f.write_str("int"),
            DataType::Timestamp => f.write_str("timestamp"),
            DataType::Uuid => f.write_str("uuid"),
            DataType::Varchar => f.write_str("varchar"),
            DataType::Varint => f.write_str("varint"),
            DataType::Timeuuid => f.write_str("timeuuid"),
            DataType::Inet => f.write_str("inet"),
            DataType::Date => f.write_str("date"),
            DataType::Time => f.write_str("time"),
            DataType::Smallint => f.write_str("smallint"),
            DataType::Tinyint => f.write_str("tinyint"),
            DataType::Duration => f.write_str("duration"),
            DataType::List(element) => write!(f, "list<{element}>"),
            DataType::Set(element) => write!(f, "set<{element}>"),
            DataType::Map(key, value) => write!(f, "map<{key}, {value}>"),
            DataType::Udt(udt) => write!(f, "{}.{}", udt.keyspace, udt.name),
            DataType::Tuple(elements) => {
                f.write_str("tuple<")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(">")
            }
        }
    }
}
