//! The umbrella message type and the opcode dispatch table.

use bytes::{Buf, BufMut};

use crate::error::Error;
use crate::request::batch::Batch;
use crate::request::{AuthResponse, Execute, Prepare, Query, Register, Revise, Startup};
use crate::response::error::ErrorResponse;
use crate::response::event::Event;
use crate::response::result::QueryResult;
use crate::response::{AuthChallenge, AuthSuccess, Authenticate, Supported};
use crate::types::{Direction, Opcode};
use crate::version::ProtocolVersion;

/// Any message body of the native protocol, requests and responses alike.
///
/// The frame header (version, flags, stream id, opcode, body length) is the
/// framing layer's concern; a `Message` is exactly the frame body. Cloning a
/// message clones its whole value graph, so a clone can outlive and be
/// mutated independently of the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Requests.
    Startup(Startup),
    Options,
    Query(Query),
    Prepare(Prepare),
    Execute(Execute),
    Batch(Batch),
    Register(Register),
    AuthResponse(AuthResponse),
    Revise(Revise),
    // Responses.
    Ready,
    Authenticate(Authenticate),
    Supported(Supported),
    AuthChallenge(AuthChallenge),
    AuthSuccess(AuthSuccess),
    Event(Event),
    Result(QueryResult),
    Error(ErrorResponse),
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Startup(_) => Opcode::Startup,
            Message::Options => Opcode::Options,
            Message::Query(_) => Opcode::Query,
            Message::Prepare(_) => Opcode::Prepare,
            Message::Execute(_) => Opcode::Execute,
            Message::Batch(_) => Opcode::Batch,
            Message::Register(_) => Opcode::Register,
            Message::AuthResponse(_) => Opcode::AuthResponse,
            Message::Revise(_) => Opcode::Revise,
            Message::Ready => Opcode::Ready,
            Message::Authenticate(_) => Opcode::Authenticate,
            Message::Supported(_) => Opcode::Supported,
            Message::AuthChallenge(_) => Opcode::AuthChallenge,
            Message::AuthSuccess(_) => Opcode::AuthSuccess,
            Message::Event(_) => Opcode::Event,
            Message::Result(_) => Opcode::Result,
            Message::Error(_) => Opcode::Error,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Message::Startup(_)
            | Message::Options
            | Message::Query(_)
            | Message::Prepare(_)
            | Message::Execute(_)
            | Message::Batch(_)
            | Message::Register(_)
            | Message::AuthResponse(_)
            | Message::Revise(_) => Direction::Request,
            Message::Ready
            | Message::Authenticate(_)
            | Message::Supported(_)
            | Message::AuthChallenge(_)
            | Message::AuthSuccess(_)
            | Message::Event(_)
            | Message::Result(_)
            | Message::Error(_) => Direction::Response,
        }
    }

    /// Encodes the message body to `buf` for the given protocol version.
    ///
    /// The sink's capacity is checked against [`encoded_len`](Self::encoded_len)
    /// up front, so a successful return means the whole body was written and
    /// an `Io` error means nothing useful was.
    pub fn encode(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        let required = self.encoded_len(version)?;
        let remaining = buf.remaining_mut();
        if required > remaining {
            return Err(Error::short_write(required, remaining).at(self.name()));
        }
        self.encode_body(buf, version)
    }

    /// Encodes the message body to a fresh, exactly sized buffer.
    pub fn encode_to_vec(&self, version: ProtocolVersion) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(self.encoded_len(version)?);
        self.encode_body(&mut buf, version)?;
        Ok(buf)
    }

    fn encode_body(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), Error> {
        let result = match self {
            Message::Startup(startup) => startup.encode(buf, version),
            Message::Options => Ok(()),
            Message::Query(query) => query.encode(buf, version),
            Message::Prepare(prepare) => prepare.encode(buf, version),
            Message::Execute(execute) => execute.encode(buf, version),
            Message::Batch(batch) => batch.encode(buf, version),
            Message::Register(register) => register.encode(buf, version),
            Message::AuthResponse(auth_response) => auth_response.encode(buf, version),
            Message::Revise(revise) => revise.encode(buf, version),
            Message::Ready => Ok(()),
            Message::Authenticate(authenticate) => authenticate.encode(buf, version),
            Message::Supported(supported) => supported.encode(buf, version),
            Message::AuthChallenge(challenge) => challenge.encode(buf, version),
            Message::AuthSuccess(success) => success.encode(buf, version),
            Message::Event(event) => event.encode(buf, version),
            Message::Result(result) => result.encode(buf, version),
            Message::Error(error) => error.encode(buf, version),
        };
        result.map_err(|e| e.at(self.name()))
    }

    /// The exact number of body bytes [`encode`](Self::encode) would write.
    /// Computed analytically; nothing is serialized.
    pub fn encoded_len(&self, version: ProtocolVersion) -> Result<usize, Error> {
        let result = match self {
            Message::Startup(startup) => startup.encoded_len(version),
            Message::Options => Ok(0),
            Message::Query(query) => query.encoded_len(version),
            Message::Prepare(prepare) => prepare.encoded_len(version),
            Message::Execute(execute) => execute.encoded_len(version),
            Message::Batch(batch) => batch.encoded_len(version),
            Message::Register(register) => register.encoded_len(version),
            Message::AuthResponse(auth_response) => auth_response.encoded_len(version),
            Message::Revise(revise) => revise.encoded_len(version),
            Message::Ready => Ok(0),
            Message::Authenticate(authenticate) => authenticate.encoded_len(version),
            Message::Supported(supported) => supported.encoded_len(version),
            Message::AuthChallenge(challenge) => challenge.encoded_len(version),
            Message::AuthSuccess(success) => success.encoded_len(version),
            Message::Event(event) => event.encoded_len(version),
            Message::Result(result) => result.encoded_len(version),
            Message::Error(error) => error.encoded_len(version),
        };
        result.map_err(|e| e.at(self.name()))
    }

    /// Decodes the body of the message a frame header announced.
    ///
    /// This is the codec registry: every (direction, opcode) pair maps to
    /// exactly one body codec, fixed at compile time. An opcode that does not
    /// exist in the given direction is a `TypeMismatch` error.
    pub fn decode(
        direction: Direction,
        opcode: Opcode,
        buf: &mut impl Buf,
        version: ProtocolVersion,
    ) -> Result<Message, Error> {
        let message = match (direction, opcode) {
            (Direction::Request, Opcode::Startup) => {
                Message::Startup(Startup::decode(buf, version).map_err(|e| e.at("startup"))?)
            }
            (Direction::Request, Opcode::Options) => Message::Options,
            (Direction::Request, Opcode::Query) => {
                Message::Query(Query::decode(buf, version).map_err(|e| e.at("query"))?)
            }
            (Direction::Request, Opcode::Prepare) => {
                Message::Prepare(Prepare::decode(buf, version).map_err(|e| e.at("prepare"))?)
            }
            (Direction::Request, Opcode::Execute) => {
                Message::Execute(Execute::decode(buf, version).map_err(|e| e.at("execute"))?)
            }
            (Direction::Request, Opcode::Batch) => {
                Message::Batch(Batch::decode(buf, version).map_err(|e| e.at("batch"))?)
            }
            (Direction::Request, Opcode::Register) => {
                Message::Register(Register::decode(buf, version).map_err(|e| e.at("register"))?)
            }
            (Direction::Request, Opcode::AuthResponse) => Message::AuthResponse(
                AuthResponse::decode(buf, version).map_err(|e| e.at("auth_response"))?,
            ),
            (Direction::Request, Opcode::Revise) => {
                Message::Revise(Revise::decode(buf, version).map_err(|e| e.at("revise"))?)
            }
            (Direction::Response, Opcode::Ready) => Message::Ready,
            (Direction::Response, Opcode::Authenticate) => Message::Authenticate(
                Authenticate::decode(buf, version).map_err(|e| e.at("authenticate"))?,
            ),
            (Direction::Response, Opcode::Supported) => {
                Message::Supported(Supported::decode(buf, version).map_err(|e| e.at("supported"))?)
            }
            (Direction::Response, Opcode::AuthChallenge) => Message::AuthChallenge(
                AuthChallenge::decode(buf, version).map_err(|e| e.at("auth_challenge"))?,
            ),
            (Direction::Response, Opcode::AuthSuccess) => Message::AuthSuccess(
                AuthSuccess::decode(buf, version).map_err(|e| e.at("auth_success"))?,
            ),
            (Direction::Response, Opcode::Event) => {
                Message::Event(Event::decode(buf, version).map_err(|e| e.at("event"))?)
            }
            (Direction::Response, Opcode::Result) => {
                Message::Result(QueryResult::decode(buf, version).map_err(|e| e.at("result"))?)
            }
            (Direction::Response, Opcode::Error) => {
                Message::Error(ErrorResponse::decode(buf, version).map_err(|e| e.at("error"))?)
            }
            (direction, opcode) => {
                return Err(Error::mismatch(format!(
                    "opcode {opcode:?} has no {direction:?} body"
                )))
            }
        };
        Ok(message)
    }

    fn name(&self) -> &'static str {
        match self {
            Message::Startup(_) => "startup",
            Message::Options => "options",
            Message::Query(_) => "query",
            Message::Prepare(_) => "prepare",
            Message::Execute(_) => "execute",
            Message::Batch(_) => "batch",
            Message::Register(_) => "register",
            Message::AuthResponse(_) => "auth_response",
            Message::Revise(_) => "revise",
            Message::Ready => "ready",
            Message::Authenticate(_) => "authenticate",
            Message::Supported(_) => "supported",
            Message::AuthChallenge(_) => "auth_challenge",
            Message::AuthSuccess(_) => "auth_success",
            Message::Event(_) => "event",
            Message::Result(_) => "result",
            Message::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn opcode_and_direction_are_consistent_with_dispatch() {
        // Every encodable message decodes back through its own
        // (direction, opcode) pair.
        let messages = [
            Message::Startup(Startup::new()),
            Message::Options,
            Message::Query(Query::default()),
            Message::Ready,
            Message::AuthResponse(AuthResponse::default()),
            Message::AuthSuccess(AuthSuccess::default()),
            Message::Result(QueryResult::Void),
        ];
        for message in messages {
            let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();
            let decoded = Message::decode(
                message.direction(),
                message.opcode(),
                &mut &bytes[..],
                ProtocolVersion::V4,
            )
            .unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn empty_bodies_have_zero_length() {
        for message in [Message::Options, Message::Ready] {
            assert_eq!(message.encoded_len(ProtocolVersion::V3).unwrap(), 0);
            assert_eq!(
                message.encode_to_vec(ProtocolVersion::V3).unwrap(),
                Vec::<u8>::new()
            );
        }
    }

    #[test]
    fn wrong_direction_is_a_type_mismatch() {
        let err = Message::decode(
            Direction::Request,
            Opcode::Ready,
            &mut &[][..],
            ProtocolVersion::V4,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let err = Message::decode(
            Direction::Response,
            Opcode::Query,
            &mut &[][..],
            ProtocolVersion::V4,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn encode_checks_capacity_first() {
        let message = Message::Startup(Startup::new());
        let mut tiny = [0u8; 4];
        let err = message
            .encode(&mut &mut tiny[..], ProtocolVersion::V4)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn errors_carry_the_message_context() {
        let execute = Message::Execute(Execute::default());
        let err = execute.encoded_len(ProtocolVersion::V4).unwrap_err();
        assert_eq!(err.path().collect::<Vec<_>>(), vec!["execute", "query_id"]);
    }
}
