// TCP server and main event loop for the relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (non-blocking `TcpListener::accept()` loop): accepts
//   new TCP connections and sends `InternalEvent::NewConnection` to the main
//   thread.
// - **Reader threads** (one per client): perform bounded reads of
//   `READ_CHUNK_SIZE` bytes and forward the raw bytes as
//   `InternalEvent::Data`. On EOF or error they send
//   `InternalEvent::Disconnected` and exit. Readers never parse; record
//   boundaries are found on the main thread, in the connection's own buffer.
// - **Main thread**: owns `Rooms`, so all room and connection state has a
//   single owner. Each iteration waits up to `poll_interval` for an event,
//   drains whatever else is already queued, then flushes every room's batch.
//   Everything that arrived in one iteration is therefore broadcast together,
//   in arrival order.
// - **Writer threads** (one per client, see `peer.rs`): the main thread
//   only queues whole batches for them and never waits on a socket, so a
//   peer that stops reading cannot delay anyone else. A peer whose queue
//   overflows is disconnected.
//
// Embedding: `RelayHandle::publish` injects a payload message into the same
// channel, so external callers never touch `Rooms` directly.
//
// Shutdown: `RelayHandle::stop` clears `keep_running`; the main thread leaves
// its loop, shuts down every client socket (which unblocks the readers and
// writers) and returns.

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use scribble_protocol::framing::{READ_CHUNK_SIZE, split};
use scribble_protocol::{BoardId, Message};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::peer::PeerWriter;
use crate::rooms::{ConnectionId, Rooms};

/// Upper bound on events handled before a flush, so a peer that never stops
/// sending cannot postpone broadcasts indefinitely.
const MAX_EVENTS_PER_ITERATION: usize = 1024;

/// Events sent from listener/reader threads and the handle to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
        peer: SocketAddr,
    },
    Data {
        connection: ConnectionId,
        bytes: Vec<u8>,
    },
    Disconnected {
        connection: ConnectionId,
    },
    Inject {
        board: BoardId,
        record: Vec<u8>,
    },
}

/// Configuration for starting a relay server.
///
/// Every field has a default, so a JSON config file only needs the keys it
/// wants to change.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    /// Listen port; 0 lets the OS pick one.
    pub port: u16,
    /// Longest the event loop waits for activity before running an
    /// iteration anyway.
    pub poll_interval_ms: u64,
    /// Batches that may wait for one slow client before it is
    /// disconnected.
    pub outbound_queue_batches: usize,
    /// Records to preload into the default room's history.
    pub history_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7878,
            poll_interval_ms: 100,
            outbound_queue_batches: 256,
            history_file: None,
        }
    }
}

impl RelayConfig {
    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    fn outbound_queue(&self) -> usize {
        self.outbound_queue_batches.max(1)
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    tx: Sender<InternalEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Inject a payload message into `board` as if a member had sent it. It
    /// is broadcast and stored at the end of the loop's next iteration.
    /// `Join` and unknown messages are not payload and are ignored.
    pub fn publish(&self, board: BoardId, message: &Message) -> Result<()> {
        if matches!(message, Message::Join { .. } | Message::Unknown { .. }) {
            debug!(command = message.command(), "ignoring non-payload publish");
            return Ok(());
        }
        self.tx
            .send(InternalEvent::Inject {
                board,
                record: message.serialize(),
            })
            .map_err(|_| RelayError::ConnectionClosed)
    }

    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
///
/// Binding and history preloading happen before this returns, so their
/// failures are reported here rather than lost on the background thread.
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr)> {
    let addr = config.bind_addr();
    // std enables SO_REUSEADDR on Unix listeners.
    let listener = TcpListener::bind(&addr).map_err(|source| RelayError::Bind {
        addr: addr.clone(),
        source,
    })?;
    let local_addr = listener.local_addr()?;

    let mut rooms = Rooms::new();
    if let Some(path) = &config.history_file {
        let loaded = load_history(&mut rooms, path)?;
        info!(path = %path.display(), records = loaded, "history preloaded");
    }

    let keep_running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let keep_running_clone = keep_running.clone();
    let tx_clone = tx.clone();
    let thread = thread::spawn(move || {
        run_relay(listener, rooms, config, rx, tx_clone, keep_running_clone);
    });

    info!(addr = %local_addr, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            tx,
            thread: Some(thread),
        },
        local_addr,
    ))
}

/// Read newline-separated records from `path` into the default room's
/// history. Control, unknown and malformed records are skipped.
fn load_history(rooms: &mut Rooms<PeerWriter>, path: &Path) -> Result<usize> {
    let bytes = std::fs::read(path).map_err(|source| RelayError::File {
        path: path.to_path_buf(),
        source,
    })?;

    let (mut records, remainder) = split(&bytes);
    let last = remainder.trim_ascii();
    if !last.is_empty() {
        records.push(last.to_vec());
    }

    let mut loaded = 0;
    for (line, record) in records.into_iter().enumerate() {
        match Message::parse(&record) {
            Ok(Message::Join { .. } | Message::Unknown { .. }) => {
                if !record.is_empty() {
                    warn!(line = line + 1, "skipping non-payload history record");
                }
            }
            Ok(_) => {
                rooms.seed_history(BoardId::default(), record);
                loaded += 1;
            }
            Err(e) => warn!(line = line + 1, error = %e, "skipping malformed history record"),
        }
    }
    Ok(loaded)
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(
    listener: TcpListener,
    mut rooms: Rooms<PeerWriter>,
    config: RelayConfig,
    rx: Receiver<InternalEvent>,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    let poll_interval = config.poll_interval();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    if let Err(e) = listener.set_nonblocking(true) {
        warn!(error = %e, "listener could not be made non-blocking");
    }

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    let accept_backoff = poll_interval.min(Duration::from_millis(50));
    thread::spawn(move || {
        accept_loop(listener, tx_listener, keep_running_listener, accept_backoff);
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(poll_interval) {
            Ok(event) => {
                handle_event(&mut rooms, event, &tx, &config);
                // Drain events that are already waiting, bounded so the
                // flush below is never starved.
                for _ in 1..MAX_EVENTS_PER_ITERATION {
                    match rx.try_recv() {
                        Ok(event) => handle_event(&mut rooms, event, &tx, &config),
                        Err(_) => break,
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        rooms.flush();
    }

    info!("relay shutting down");
    for (_, mut writer) in rooms.drain_connections() {
        writer.close();
    }
}

/// Accept connections until `keep_running` goes false or the listener fails.
fn accept_loop(
    listener: TcpListener,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
    backoff: Duration,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(peer = %peer, error = %e, "dropping connection");
                    continue;
                }
                if tx.send(InternalEvent::NewConnection { stream, peer }).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(backoff);
            }
            Err(e) => {
                warn!(error = %e, "accept failed; listener stopping");
                break;
            }
        }
    }
}

/// Dispatch a single event to the room state.
fn handle_event(
    rooms: &mut Rooms<PeerWriter>,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    config: &RelayConfig,
) {
    match event {
        InternalEvent::NewConnection { stream, peer } => {
            handle_new_connection(rooms, stream, peer, tx, config);
        }
        InternalEvent::Data { connection, bytes } => {
            rooms.receive(connection, &bytes);
        }
        InternalEvent::Disconnected { connection } => {
            rooms.remove_connection(connection);
        }
        InternalEvent::Inject { board, record } => {
            rooms.enqueue(board, record);
        }
    }
}

/// Register a new connection (which queues the default room's history for
/// it) and spawn its reader and writer threads.
fn handle_new_connection(
    rooms: &mut Rooms<PeerWriter>,
    stream: TcpStream,
    peer: SocketAddr,
    tx: &Sender<InternalEvent>,
    config: &RelayConfig,
) {
    let reader = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %peer, error = %e, "dropping connection");
            return;
        }
    };
    let writer = match PeerWriter::spawn(peer, stream, config.outbound_queue()) {
        Ok(w) => w,
        Err(e) => {
            warn!(peer = %peer, error = %e, "dropping connection");
            let _ = reader.shutdown(Shutdown::Both);
            return;
        }
    };

    let connection = rooms.add_connection(writer);
    info!(connection = %connection, peer = %peer, "accepted");

    let tx_reader = tx.clone();
    thread::spawn(move || {
        reader_loop(reader, connection, tx_reader);
    });
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(mut stream: TcpStream, connection: ConnectionId, tx: Sender<InternalEvent>) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let event = InternalEvent::Data {
                    connection,
                    bytes: chunk[..n].to_vec(),
                };
                if tx.send(event).is_err() {
                    // Main loop is gone.
                    return;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(connection = %connection, error = %e, "read failed");
                break;
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { connection });
}
