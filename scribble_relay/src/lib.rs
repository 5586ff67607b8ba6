// scribble_relay — room-partitioned relay server for the shared whiteboard.
//
// The relay is a thin message broker: it accepts TCP connections from
// whiteboard clients, groups them into named rooms ("boards"), rebroadcasts
// every edit record to all members of the sender's room, and keeps each
// room's ordered history so late joiners can be caught up. It never
// interprets drawing semantics; the only record it acts on is `join`.
//
// Module overview:
// - `rooms.rs`:   Room and connection state: membership, per-connection
//                 partial-record buffers, pending batches, history. The core
//                 data structure that `server.rs` drives.
// - `server.rs`:  TCP listener, reader threads (one per client), and the main
//                 event loop. Uses `std::net` with a thread-per-reader
//                 architecture and an `mpsc` channel to funnel events into
//                 the single-threaded `Rooms`. Also `RelayConfig`.
// - `peer.rs`:    `PeerWriter`, the bounded outbound queue and writer thread
//                 of one client, so no socket write ever runs on the loop.
// - `client.rs`:  `NetClient`, a blocking client with a background reader.
// - `error.rs`:   `RelayError`.
//
// Dependencies: `scribble_protocol` (record codec), `tracing` for logs,
// `serde`/`serde_json` for the config file.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod client;
pub mod error;
pub mod peer;
pub mod rooms;
pub mod server;

pub use client::NetClient;
pub use error::{RelayError, Result};
pub use server::{RelayConfig, RelayHandle, start_relay};
