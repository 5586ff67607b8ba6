// Codec error type.
//
// Every failure here is local to one record: the relay drops the offending
// record and keeps the connection open. Nothing in this crate panics on
// malformed input.

use thiserror::Error;

/// Errors produced while decoding a framed record.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The record bytes are not UTF-8.
    #[error("record is not valid UTF-8")]
    InvalidUtf8,

    /// The record has fewer fields than its command tag requires.
    #[error("{command} record is missing field `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    /// A fixed-grammar numeric field did not parse as a decimal integer.
    #[error("{command} field `{field}` is not an integer: {value:?}")]
    InvalidNumber {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    /// A freehand point is not a `hexX,hexY` pair.
    #[error("invalid freehand point: {0:?}")]
    InvalidPoint(String),
}
