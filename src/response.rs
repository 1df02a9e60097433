//! Server-to-client message codecs.

pub mod error;
pub mod event;
pub mod result;

use std::collections::HashMap;

use bytes::{Buf, BufMut};

use crate::encoding;
use crate::error::Error;
use crate::version::ProtocolVersion;

/// AUTHENTICATE: the server demands authentication and names the class that
/// will run the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Authenticate {
    pub authenticator: String,
}

impl Authenticate {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::string::encode(&self.authenticator, buf).map_err(|e| e.at("authenticator"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(Authenticate {
            authenticator: encoding::string::decode(buf).map_err(|e| e.at("authenticator"))?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        Ok(encoding::string::encoded_len(&self.authenticator))
    }
}

/// SUPPORTED: the option values the server accepts in STARTUP.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Supported {
    pub options: HashMap<String, Vec<String>>,
}

impl Supported {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::string_multimap::encode(&self.options, buf)
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(Supported {
            options: encoding::string_multimap::decode(buf)?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        Ok(encoding::string_multimap::encoded_len(&self.options))
    }
}

/// AUTH_CHALLENGE: a further token from the server's authenticator. The
/// server always has something to say, so a null token cannot be encoded;
/// an empty one can.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthChallenge {
    pub token: Option<Vec<u8>>,
}

impl AuthChallenge {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        if self.token.is_none() {
            return Err(Error::invalid("auth challenge token cannot be null").at("token"));
        }
        encoding::bytes::encode(self.token.as_deref(), buf).map_err(|e| e.at("token"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(AuthChallenge {
            token: encoding::bytes::decode(buf).map_err(|e| e.at("token"))?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        if self.token.is_none() {
            return Err(Error::invalid("auth challenge token cannot be null").at("token"));
        }
        Ok(encoding::bytes::encoded_len(self.token.as_deref()))
    }
}

/// AUTH_SUCCESS: the exchange is complete; the token may carry final
/// authenticator output or be null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSuccess {
    pub token: Option<Vec<u8>>,
}

impl AuthSuccess {
    pub(crate) fn encode(
        &self,
        buf: &mut impl BufMut,
        _version: ProtocolVersion,
    ) -> Result<(), Error> {
        encoding::bytes::encode(self.token.as_deref(), buf).map_err(|e| e.at("token"))
    }

    pub(crate) fn decode(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, Error> {
        Ok(AuthSuccess {
            token: encoding::bytes::decode(buf).map_err(|e| e.at("token"))?,
        })
    }

    pub(crate) fn encoded_len(&self, _version: ProtocolVersion) -> Result<usize, Error> {
        Ok(encoding::bytes::encoded_len(self.token.as_deref()))
    }
}
