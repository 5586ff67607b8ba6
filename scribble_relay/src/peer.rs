// Outbound half of one client connection.
//
// The event loop never writes to a client socket itself. Each connection
// gets a writer thread that owns a clone of the stream and does the blocking
// writes; the loop hands it whole batches through a bounded channel with
// `try_send`, so queuing never waits on the network.
//
// A peer that stops reading eventually fills its queue. The next batch is
// then refused and the socket is shut down, so a peer either receives every
// record of its room in order or is disconnected; it never sees part of a
// record. The shutdown also ends the connection's reader thread, which
// reports the disconnect to the loop like any other.
//
// `PeerWriter` implements `Write` so `Rooms` can stay generic over its
// writers: one `write` call queues one whole batch or fails.

use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

use tracing::{debug, warn};

/// Queue handle for one connection's writer thread.
pub struct PeerWriter {
    peer: SocketAddr,
    queue: SyncSender<Vec<u8>>,
    /// Clone of the stream, kept only to shut it down.
    socket: TcpStream,
    closed: bool,
}

impl PeerWriter {
    /// Start a writer thread for `stream`. At most `capacity` batches wait
    /// for a peer that is slow to read.
    pub fn spawn(peer: SocketAddr, stream: TcpStream, capacity: usize) -> io::Result<Self> {
        let socket = stream.try_clone()?;
        let (queue, batches) = mpsc::sync_channel(capacity.max(1));
        thread::Builder::new()
            .name(format!("writer-{peer}"))
            .spawn(move || writer_loop(peer, stream, batches))?;
        Ok(Self::new(peer, queue, socket))
    }

    fn new(peer: SocketAddr, queue: SyncSender<Vec<u8>>, socket: TcpStream) -> Self {
        Self {
            peer,
            queue,
            socket,
            closed: false,
        }
    }

    /// Shut the socket down in both directions. Batches still queued are
    /// abandoned.
    pub fn close(&mut self) {
        self.closed = true;
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            debug!(peer = %self.peer, error = %e, "shutdown failed");
        }
    }
}

impl Write for PeerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(ErrorKind::BrokenPipe.into());
        }
        match self.queue.try_send(buf.to_vec()) {
            Ok(()) => Ok(buf.len()),
            Err(TrySendError::Full(_)) => {
                warn!(peer = %self.peer, "outbound queue full, disconnecting slow peer");
                self.close();
                Err(ErrorKind::WouldBlock.into())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.closed = true;
                Err(ErrorKind::BrokenPipe.into())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer thread: send queued batches until the queue is dropped or the
/// socket fails.
fn writer_loop(peer: SocketAddr, mut stream: TcpStream, batches: Receiver<Vec<u8>>) {
    for batch in batches {
        if let Err(e) = stream.write_all(&batch) {
            debug!(peer = %peer, error = %e, "write failed");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    }
}
