//! The EVENT message codec and the schema-change body it shares with RESULT.

use std::net::SocketAddr;

use bytes::{Buf, BufMut};

use crate::encoding::{self, inet, string, string_list};
use crate::error::Error;
use crate::types::{
    EventType, SchemaChangeTarget, SchemaChangeType, StatusChangeType, TopologyChangeType,
};
use crate::version::ProtocolVersion;

/// A schema modification notice. The same body appears in SCHEMA_CHANGE
/// events and in the SchemaChange RESULT variant.
///
/// `object` names the table, type, function or aggregate the change affected;
/// it is absent for keyspace-level changes. `arguments` lists the argument
/// type names of a function or aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    pub change_type: SchemaChangeType,
    pub target: SchemaChangeTarget,
    pub keyspace: String,
    pub object: Option<String>,
    pub arguments: Vec<String>,
}

impl SchemaChange {
    fn check_shape(&self) -> Result<(), Error> {
        match self.target {
            SchemaChangeTarget::Keyspace => {
                if self.object.is_some() || !self.arguments.is_empty() {
                    return Err(Error::invalid(
                        "keyspace changes carry no object name or arguments",
                    ));
                }
            }
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                if self.object.is_none() {
                    return Err(Error::invalid(format!(
                        "{} changes require an object name",
                        self.target.as_str()
                    )));
                }
                if !self.arguments.is_empty() {
                    return Err(Error::invalid(format!(
                        "{} changes carry no arguments",
                        self.target.as_str()
                    )));
                }
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                if self.object.is_none() {
                    return Err(Error::invalid(format!(
                        "{} changes require an object name",
                        self.target.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        self.check_shape()?;
        string::encode(self.change_type.as_str(), buf)?;
        string::encode(self.target.as_str(), buf)?;
        string::encode(&self.keyspace, buf).map_err(|e| e.at("keyspace"))?;
        if let Some(object) = &self.object {
            string::encode(object, buf).map_err(|e| e.at("object"))?;
        }
        if matches!(
            self.target,
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate
        ) {
            string_list::encode(&self.arguments, buf).map_err(|e| e.at("arguments"))?;
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        let change_type = SchemaChangeType::parse(&string::decode(buf)?)?;
        let target = SchemaChangeTarget::parse(&string::decode(buf)?)?;
        let keyspace = string::decode(buf).map_err(|e| e.at("keyspace"))?;
        let (object, arguments) = match target {
            SchemaChangeTarget::Keyspace => (None, Vec::new()),
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                (Some(string::decode(buf).map_err(|e| e.at("object"))?), Vec::new())
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                let object = string::decode(buf).map_err(|e| e.at("object"))?;
                let arguments = string_list::decode(buf).map_err(|e| e.at("arguments"))?;
                (Some(object), arguments)
            }
        };
        Ok(SchemaChange {
            change_type,
            target,
            keyspace,
            object,
            arguments,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        self.check_shape()?;
        let mut len = string::encoded_len(self.change_type.as_str())
            + string::encoded_len(self.target.as_str())
            + string::encoded_len(&self.keyspace);
        if let Some(object) = &self.object {
            len += string::encoded_len(object);
        }
        if matches!(
            self.target,
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate
        ) {
            len += string_list::encoded_len(&self.arguments);
        }
        Ok(len)
    }
}

/// EVENT: an unsolicited server push on a connection that registered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TopologyChange {
        change_type: TopologyChangeType,
        address: SocketAddr,
    },
    StatusChange {
        change_type: StatusChangeType,
        address: SocketAddr,
    },
    SchemaChange(SchemaChange),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::TopologyChange { .. } => EventType::TopologyChange,
            Event::StatusChange { .. } => EventType::StatusChange,
            Event::SchemaChange(_) => EventType::SchemaChange,
        }
    }

    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        string::encode(self.event_type().as_str(), buf)?;
        match self {
            Event::TopologyChange {
                change_type,
                address,
            } => {
                string::encode(change_type.as_str(), buf)?;
                inet::encode(*address, buf);
            }
            Event::StatusChange {
                change_type,
                address,
            } => {
                string::encode(change_type.as_str(), buf)?;
                inet::encode(*address, buf);
            }
            Event::SchemaChange(change) => change.encode(buf, version)?,
        }
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, Error> {
        match EventType::parse(&string::decode(buf)?)? {
            EventType::TopologyChange => Ok(Event::TopologyChange {
                change_type: TopologyChangeType::parse(&string::decode(buf)?)?,
                address: inet::decode(buf).map_err(|e| e.at("address"))?,
            }),
            EventType::StatusChange => Ok(Event::StatusChange {
                change_type: StatusChangeType::parse(&string::decode(buf)?)?,
                address: inet::decode(buf).map_err(|e| e.at("address"))?,
            }),
            EventType::SchemaChange => Ok(Event::SchemaChange(SchemaChange::decode(buf, version)?)),
        }
    }

    pub(crate) fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let mut len = encoding::string::encoded_len(self.event_type().as_str());
        len += match self {
            Event::TopologyChange {
                change_type,
                address,
            } => string::encoded_len(change_type.as_str()) + inet::encoded_len(*address),
            Event::StatusChange {
                change_type,
                address,
            } => string::encoded_len(change_type.as_str()) + inet::encoded_len(*address),
            Event::SchemaChange(change) => change.encoded_len(version)?,
        };
        Ok(len)
    }
}
