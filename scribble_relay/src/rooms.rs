// Room and connection state for the relay.
//
// `Rooms` is the central data structure that `server.rs` drives. It owns every
// live connection (its write half, its partial-record buffer and the room it
// is in) and every room (its ordered history and member set). All mutation
// happens through methods called from the server's single event-loop thread;
// there is no internal locking.
//
// Key responsibilities:
// - Connection lifecycle: a new connection lands in the default room and is
//   sent that room's full history before anything else. Removal drops it from
//   its room.
// - Record intake: raw bytes are appended to the connection's `RecordBuffer`;
//   each completed record is parsed only to classify it. `join` moves the
//   connection (replaying the target room's history) and is never stored or
//   forwarded. Payload records are queued for the sender's *current* room,
//   byte-for-byte as received. Unknown and malformed records are dropped
//   without touching the connection.
// - Flushing: at the end of each loop iteration, each room's queued records
//   are written, in arrival order, to every current member (the sender
//   included) and then appended to the room's history.
//
// Writes are best-effort and must not block: each batch goes to a writer in a
// single `write_all`, which either takes the whole batch or fails. A failed
// write is logged and otherwise ignored; the broken peer is cleaned up when
// its reader thread reports the disconnect.
//
// `Rooms` is generic over the writer so tests can observe output through
// in-memory buffers; the server instantiates it with `PeerWriter`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;

use scribble_protocol::framing::{RecordBuffer, frame};
use scribble_protocol::{BoardId, Message};
use tracing::{debug, info, trace, warn};

/// Stable handle for one accepted connection. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection<W> {
    board: BoardId,
    buffer: RecordBuffer,
    writer: W,
}

#[derive(Default)]
struct Room {
    /// Every payload record ever relayed in this room, oldest first.
    history: Vec<Vec<u8>>,
    members: BTreeSet<ConnectionId>,
}

/// All rooms and connections of one relay.
pub struct Rooms<W> {
    connections: BTreeMap<ConnectionId, Connection<W>>,
    rooms: BTreeMap<BoardId, Room>,
    /// Records accepted this iteration and not yet broadcast, per room.
    pending: BTreeMap<BoardId, Vec<Vec<u8>>>,
    next_connection_id: u64,
}

impl<W: Write> Default for Rooms<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Rooms<W> {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            rooms: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_connection_id: 0,
        }
    }

    /// Register a new connection in the default room and send it that room's
    /// history. Returns the handle the reader for this connection must use.
    pub fn add_connection(&mut self, writer: W) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        let board = BoardId::default();
        let mut conn = Connection {
            board: board.clone(),
            buffer: RecordBuffer::new(),
            writer,
        };

        let room = self.rooms.entry(board.clone()).or_default();
        replay_history(id, &mut conn.writer, &room.history);
        room.members.insert(id);
        self.connections.insert(id, conn);

        info!(connection = %id, board = %board, "connection added");
        id
    }

    /// Forget a connection. Records it already submitted stay queued for its
    /// room. Returns false if the connection was not known.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let Some(conn) = self.connections.remove(&id) else {
            return false;
        };
        if let Some(room) = self.rooms.get_mut(&conn.board) {
            room.members.remove(&id);
        }
        if !conn.buffer.is_empty() {
            debug!(
                connection = %id,
                bytes = conn.buffer.pending().len(),
                "discarding unterminated record"
            );
        }
        info!(connection = %id, board = %conn.board, "connection removed");
        true
    }

    /// Take in bytes read from a connection and act on every record they
    /// complete.
    pub fn receive(&mut self, id: ConnectionId, bytes: &[u8]) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let records = conn.buffer.push(bytes);
        for record in records {
            self.handle_record(id, record);
        }
    }

    fn handle_record(&mut self, id: ConnectionId, record: Vec<u8>) {
        match Message::parse(&record) {
            Ok(Message::Join { board_id }) => self.join(id, board_id),
            Ok(Message::Unknown { command }) => {
                debug!(connection = %id, command = %command, "ignoring unknown command");
            }
            Ok(_) => {
                if let Some(conn) = self.connections.get(&id) {
                    let board = conn.board.clone();
                    self.enqueue(board, record);
                }
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "dropping malformed record");
            }
        }
    }

    /// Move a connection to `board`, creating the room if needed, and replay
    /// the room's history to it. Joining the current room does nothing.
    pub fn join(&mut self, id: ConnectionId, board: BoardId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if conn.board == board {
            debug!(connection = %id, board = %board, "already in room");
            return;
        }

        if let Some(old) = self.rooms.get_mut(&conn.board) {
            old.members.remove(&id);
        }
        let room = self.rooms.entry(board.clone()).or_default();
        replay_history(id, &mut conn.writer, &room.history);
        room.members.insert(id);

        info!(connection = %id, from = %conn.board, to = %board, "joined room");
        conn.board = board;
    }

    /// Queue a payload record for broadcast to `board` at the next flush.
    pub fn enqueue(&mut self, board: BoardId, record: Vec<u8>) {
        trace!(board = %board, bytes = record.len(), "record queued");
        self.pending.entry(board).or_default().push(record);
    }

    /// Append a record straight to a room's history without broadcasting it.
    /// Used to preload rooms before any client connects.
    pub fn seed_history(&mut self, board: BoardId, record: Vec<u8>) {
        self.rooms.entry(board).or_default().history.push(record);
    }

    /// Broadcast every queued record to its room's current members, then
    /// append the records to the room's history.
    pub fn flush(&mut self) {
        for (board, records) in std::mem::take(&mut self.pending) {
            let room = self.rooms.entry(board.clone()).or_default();

            let mut batch = Vec::new();
            for record in &records {
                batch.extend(frame(record));
            }

            for member in &room.members {
                let Some(conn) = self.connections.get_mut(member) else {
                    continue;
                };
                if let Err(e) = send(&mut conn.writer, &batch) {
                    warn!(connection = %member, board = %board, error = %e, "send failed");
                }
            }

            debug!(
                board = %board,
                records = records.len(),
                members = room.members.len(),
                "relayed batch"
            );
            room.history.extend(records);
        }
    }

    /// Whether any records are waiting for the next flush.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// History of `board`, oldest first. Empty for rooms never referenced.
    pub fn history(&self, board: &BoardId) -> &[Vec<u8>] {
        self.rooms
            .get(board)
            .map(|room| room.history.as_slice())
            .unwrap_or_default()
    }

    /// Room the connection currently belongs to.
    pub fn board_of(&self, id: ConnectionId) -> Option<&BoardId> {
        self.connections.get(&id).map(|conn| &conn.board)
    }

    /// Current members of `board`, in connection order.
    pub fn members(&self, board: &BoardId) -> Vec<ConnectionId> {
        self.rooms
            .get(board)
            .map(|room| room.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Remove every connection, handing back their writers so the caller can
    /// close the sockets.
    pub fn drain_connections(&mut self) -> Vec<(ConnectionId, W)> {
        for room in self.rooms.values_mut() {
            room.members.clear();
        }
        std::mem::take(&mut self.connections)
            .into_iter()
            .map(|(id, conn)| (id, conn.writer))
            .collect()
    }

    #[cfg(test)]
    fn writer(&self, id: ConnectionId) -> &W {
        &self.connections[&id].writer
    }
}

fn replay_history<W: Write>(id: ConnectionId, writer: &mut W, history: &[Vec<u8>]) {
    if history.is_empty() {
        return;
    }
    let mut batch = Vec::new();
    for record in history {
        batch.extend(frame(record));
    }
    match send(writer, &batch) {
        Ok(()) => debug!(connection = %id, records = history.len(), "history replayed"),
        Err(e) => warn!(connection = %id, error = %e, "history replay failed"),
    }
}

fn send<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()
}
