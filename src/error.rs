//! CQL wire codec errors.

use core::fmt;
use std::error::Error as StdError;

/// The category of a codec failure.
///
/// Every error produced by this crate falls into exactly one of these kinds;
/// callers that need to branch on the failure mode should match on
/// [`Error::kind`] rather than on the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A codec was asked to handle a message or opcode it does not handle,
    /// such as decoding a response opcode in the request direction.
    TypeMismatch,
    /// A semantic rule of the protocol was violated: a disallowed consistency
    /// level, an empty prepared statement id, a batch without children.
    InvalidValue,
    /// A field or option is set that the negotiated protocol version does not
    /// define.
    UnsupportedFeature,
    /// Short read or short write on the underlying buffer.
    Io,
    /// The byte stream does not form a valid message: an out-of-range length
    /// prefix, an unknown variant tag, an inconsistent flag combination.
    MalformedFrame,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::InvalidValue => "invalid value",
            ErrorKind::UnsupportedFeature => "unsupported feature",
            ErrorKind::Io => "io",
            ErrorKind::MalformedFrame => "malformed frame",
        }
    }
}

/// A CQL wire codec error.
///
/// Carries the failure [kind](ErrorKind), a detail message, and the logical
/// path (message kind, then nested field names) to the place in the message
/// where encoding or decoding failed.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    inner: Box<Inner>,
}

#[derive(Clone, PartialEq, Eq)]
struct Inner {
    kind: ErrorKind,
    detail: String,
    /// Logical location, innermost segment first. Rendered outermost-first.
    path: Vec<&'static str>,
}

impl Error {
    /// Creates a new error of the given kind.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Error {
            inner: Box::new(Inner {
                kind,
                detail: detail.into(),
                path: Vec::new(),
            }),
        }
    }

    #[cold]
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::MalformedFrame, detail)
    }

    #[cold]
    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidValue, detail)
    }

    #[cold]
    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::UnsupportedFeature, detail)
    }

    #[cold]
    pub(crate) fn mismatch(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::TypeMismatch, detail)
    }

    /// A read ran past the end of the source buffer.
    #[cold]
    pub(crate) fn short_read() -> Self {
        Error::new(ErrorKind::Io, "short read")
    }

    /// The sink buffer cannot hold the encoded message.
    #[cold]
    pub(crate) fn short_write(required: usize, remaining: usize) -> Self {
        Error::new(
            ErrorKind::Io,
            format!("short write: need {required} bytes, buffer has {remaining}"),
        )
    }

    /// Prepends a path segment. Codecs call this as errors propagate outward,
    /// so the innermost field pushes first and the message kind pushes last.
    #[must_use]
    pub(crate) fn at(mut self, segment: &'static str) -> Self {
        self.inner.path.push(segment);
        self
    }

    /// The category of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    /// Logical path to the failure, outermost segment (the message kind)
    /// first.
    pub fn path(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.path.iter().rev().copied()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("detail", &self.inner.detail)
            .field("path", &self.inner.path.iter().rev().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.kind.as_str(), self.inner.detail)?;
        if !self.inner.path.is_empty() {
            f.write_str(" (in ")?;
            for (i, segment) in self.path().enumerate() {
                if i > 0 {
                    f.write_str(".")?;
                }
                f.write_str(segment)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl StdError for Error {}

impl From<Error> for std::io::Error {
    fn from(error: Error) -> std::io::Error {
        let kind = match error.kind() {
            ErrorKind::Io => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path() {
        let err = Error::short_read().at("paging_state").at("options").at("query");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(
            err.to_string(),
            "io: short read (in query.options.paging_state)"
        );
        assert_eq!(
            err.path().collect::<Vec<_>>(),
            vec!["query", "options", "paging_state"]
        );
    }

    #[test]
    fn io_conversion_keeps_source() {
        let err = Error::invalid("batch has no children").at("batch");
        let io_err = std::io::Error::from(err);
        assert_eq!(io_err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(
            io_err.get_ref().unwrap().to_string(),
            "invalid value: batch has no children (in batch)"
        );
    }
}
