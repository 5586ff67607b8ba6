// scribble_protocol — wire codec for the shared-whiteboard relay.
//
// This crate turns whiteboard edit events into newline-framed text records and
// back. It is shared by the relay server (`scribble_relay`) and by clients, and
// has no networking or threading of its own.
//
// Module overview:
// - `escape.rs`:   Entity-style escaping of free-text fields so they never
//                  contain the field or record separators.
// - `framing.rs`:  `frame`/`split` on the `\n` record separator, and
//                  `RecordBuffer`, which carries a partial record across reads.
// - `message.rs`:  The `Message` enum (one variant per command tag) with
//                  `parse`/`serialize` to the `/`-separated record format.
// - `types.rs`:    `ViobId`, `BoardId`, and the freehand point-list encoding.
// - `error.rs`:    `ProtocolError`, returned for malformed records.
//
// Design decisions:
// - **Text records, not JSON.** The format is line-oriented so records can be
//   replayed from plain files and inspected with a terminal.
// - **Malformed input is an error value.** `Message::parse` never panics; one
//   bad record from one peer must not take down a shared relay.
// - **Payload stays opaque.** Ids and point lists are strings; only endpoints
//   that draw need to interpret them.

pub mod error;
pub mod escape;
pub mod framing;
pub mod message;
pub mod types;

pub use error::ProtocolError;
pub use escape::{escape, unescape};
pub use framing::{READ_CHUNK_SIZE, RECORD_SEPARATOR, RecordBuffer, frame, split};
pub use message::Message;
pub use types::{BoardId, Point, ViobId, decode_points, encode_points};
