// TCP client for connecting to the relay.
//
// This is the thin process that sits between a relay and a renderer: it
// sends local edits as records and hands parsed remote edits to whoever
// polls it. Architecture:
// - `connect()` performs the TCP connect on the calling thread, optionally
//   sends a `join`, then spawns a background reader thread.
// - The reader thread reads `READ_CHUNK_SIZE` chunks, reassembles records in
//   a `RecordBuffer`, parses them, and pushes `Message`s into an `mpsc`
//   channel. Malformed records are dropped.
// - The calling thread keeps the write half and sends synchronously (records
//   are small).
// - `poll()` drains the inbox without blocking; `recv_timeout()` waits for
//   the next message.
//
// The relay echoes every payload back to its sender, so a client sees its own
// edits come back in room order. Renderers that apply edits locally first
// should skip ids they already have.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use scribble_protocol::framing::{READ_CHUNK_SIZE, RecordBuffer};
use scribble_protocol::{BoardId, Message, Point, ViobId, encode_points};
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

/// TCP client for relay communication.
pub struct NetClient {
    writer: TcpStream,
    inbox: Receiver<Message>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Connect to a relay and start receiving. When `board` is given the
    /// client joins that room straight away; otherwise it stays in the
    /// default room.
    pub fn connect<A: ToSocketAddrs>(addr: A, board: Option<&str>) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let reader_stream = stream.try_clone()?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader_stream, tx);
        });

        let mut client = Self {
            writer: stream,
            inbox: rx,
            _reader_thread: Some(reader_thread),
        };
        if let Some(board) = board {
            client.join(board)?;
        }
        Ok(client)
    }

    /// Send one message.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        self.writer.write_all(&msg.to_frame())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Move to another room. The relay replays that room's history next.
    pub fn join(&mut self, board: &str) -> Result<()> {
        self.send(&Message::Join {
            board_id: BoardId::from(board),
        })
    }

    /// Create a rectangle and return its freshly minted id.
    pub fn create_rect(
        &mut self,
        (ll_x, ll_y): (i64, i64),
        (ur_x, ur_y): (i64, i64),
        color: &str,
    ) -> Result<ViobId> {
        let viob_id = ViobId::random();
        self.send(&Message::CreateRect {
            viob_id: viob_id.clone(),
            ll_x,
            ll_y,
            ur_x,
            ur_y,
            color: color.into(),
        })?;
        Ok(viob_id)
    }

    /// Create a text object anchored at its lower-left corner.
    pub fn create_text(
        &mut self,
        (ll_x, ll_y): (i64, i64),
        text: &str,
        color: &str,
        font: &str,
        size: i64,
        weight: &str,
    ) -> Result<ViobId> {
        let viob_id = ViobId::random();
        self.send(&Message::CreateText {
            viob_id: viob_id.clone(),
            ll_x,
            ll_y,
            text: text.into(),
            color: color.into(),
            font: font.into(),
            size,
            weight: weight.into(),
        })?;
        Ok(viob_id)
    }

    pub fn create_freehand(&mut self, points: &[Point], color: &str, lwidth: i64) -> Result<ViobId> {
        let viob_id = ViobId::random();
        self.send(&Message::CreateFreehand {
            viob_id: viob_id.clone(),
            color: color.into(),
            lwidth,
            points: encode_points(points),
        })?;
        Ok(viob_id)
    }

    /// Drain all queued messages (non-blocking).
    pub fn poll(&self) -> Vec<Message> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Message>> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::ConnectionClosed),
        }
    }

    /// Close the connection. Messages already received stay in the inbox.
    pub fn disconnect(&mut self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Reader thread: reassemble records, parse, push to channel.
fn reader_loop(mut stream: TcpStream, tx: mpsc::Sender<Message>) {
    let mut buffer = RecordBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "relay read failed");
                break;
            }
        };
        for record in buffer.push(&chunk[..n]) {
            match Message::parse(&record) {
                Ok(msg) => {
                    if tx.send(msg).is_err() {
                        return; // Client dropped the receiver
                    }
                }
                Err(e) => warn!(error = %e, "dropping malformed record from relay"),
            }
        }
    }
}
