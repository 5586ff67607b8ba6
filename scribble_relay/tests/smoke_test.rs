// Integration smoke tests for the relay server.
//
// Each test starts a relay on localhost port 0 and drives it with plain TCP
// sockets writing raw records (or with `NetClient`), exercising the full
// path: accept, history replay, partial reads, join, room isolation,
// broadcast with echo, and disconnect.
//
// Synchronization: the relay echoes payload back to its sender, so a client
// that reads its own record back knows the relay has processed everything it
// sent before it.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use scribble_protocol::{BoardId, Message, Point, decode_points};
use scribble_relay::server::{RelayConfig, RelayHandle, start_relay};
use scribble_relay::NetClient;

/// Start a relay with a short tick on a free port.
fn relay() -> (RelayHandle, SocketAddr) {
    let config = RelayConfig {
        port: 0,
        poll_interval_ms: 20,
        ..RelayConfig::default()
    };
    start_relay(config).unwrap()
}

/// Send an erase for `marker` and wait for it to come back, which proves the
/// relay has handled everything the client sent before it (its join
/// included). Replayed history and other traffic ahead of it are skipped.
fn await_marker(client: &mut NetClient, marker: &str) {
    client
        .send(&Message::Erase {
            viob_id: marker.into(),
        })
        .unwrap();
    loop {
        let msg = client
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("marker echo from relay");
        if matches!(&msg, Message::Erase { viob_id } if viob_id.as_str() == marker) {
            return;
        }
    }
}

/// A raw line-oriented test client.
struct Raw {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Raw {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            reader,
            writer: stream,
        }
    }

    fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    /// Read one record, without its separator.
    fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).unwrap();
        assert!(n > 0, "relay closed the connection");
        line.trim_end_matches('\n').to_owned()
    }

    /// Send a record and wait for the relay to echo it back.
    fn send_synced(&mut self, record: &str) {
        self.send(format!("{record}\n").as_bytes());
        assert_eq!(self.recv(), record);
    }

    /// Join a room and confirm the relay has processed it by round-tripping
    /// a marker record through that room. Returns the replayed history that
    /// arrived ahead of the marker.
    fn join(&mut self, board: &str, marker: &str) -> Vec<String> {
        self.send(format!("<join/{board}\n{marker}\n").as_bytes());
        let mut history = Vec::new();
        loop {
            let record = self.recv();
            if record == marker {
                return history;
            }
            history.push(record);
        }
    }

    /// Assert nothing arrives within a short window.
    fn expect_silence(&mut self) {
        self.reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut line = String::new();
        let result = self.reader.read_line(&mut line);
        assert!(
            result.is_err() || line.is_empty(),
            "expected silence, got {line:?}"
        );
        self.reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
    }
}

#[test]
fn newcomer_receives_history_first() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    a.send_synced("<newrec/v1/0/0/10/10/red");

    let mut b = Raw::connect(addr);
    assert_eq!(b.recv(), "<newrec/v1/0/0/10/10/red");

    // Live traffic follows the replay.
    a.send_synced("<colupd/v1/blue");
    assert_eq!(b.recv(), "<colupd/v1/blue");

    handle.stop();
}

#[test]
fn history_replays_in_original_order() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    let mut b = Raw::connect(addr);
    let sent = ["<erase/1", "<erase/2", "<erase/3", "<erase/4"];
    a.send_synced(sent[0]);
    assert_eq!(b.recv(), sent[0]);
    b.send_synced(sent[1]);
    assert_eq!(a.recv(), sent[1]);
    a.send(format!("{}\n{}\n", sent[2], sent[3]).as_bytes());
    assert_eq!(a.recv(), sent[2]);
    assert_eq!(a.recv(), sent[3]);

    let mut late = Raw::connect(addr);
    for record in sent {
        assert_eq!(late.recv(), record);
    }
    late.expect_silence();

    handle.stop();
}

#[test]
fn join_isolates_rooms() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    let mut bystander = Raw::connect(addr);
    let mut c = Raw::connect(addr);

    assert!(a.join("room2", "<colupd/marker-a/x").is_empty());
    assert_eq!(
        c.join("room2", "<colupd/marker-c/x"),
        vec!["<colupd/marker-a/x"]
    );
    // A also sees C's marker, since they now share room2.
    assert_eq!(a.recv(), "<colupd/marker-c/x");

    a.send_synced("<erase/v1");
    assert_eq!(c.recv(), "<erase/v1");
    bystander.expect_silence();

    handle.stop();
}

#[test]
fn join_is_never_stored_or_relayed() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    assert!(a.join("foo", "<erase/after-join").is_empty());

    // A newcomer to foo sees the payload but not the join itself.
    let mut b = Raw::connect(addr);
    b.send(b"<join/foo\n");
    assert_eq!(b.recv(), "<erase/after-join");
    b.expect_silence();

    // The default room saw nothing at all.
    let mut c = Raw::connect(addr);
    c.expect_silence();

    handle.stop();
}

#[test]
fn records_split_across_writes_are_reassembled() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    let mut b = Raw::connect(addr);

    a.send(b"<newrec/v1/0/");
    std::thread::sleep(Duration::from_millis(60));
    a.send(b"0/10/10/red\n<erase");
    std::thread::sleep(Duration::from_millis(60));
    a.send(b"/v1\n");

    assert_eq!(b.recv(), "<newrec/v1/0/0/10/10/red");
    assert_eq!(b.recv(), "<erase/v1");

    handle.stop();
}

#[test]
fn malformed_record_does_not_drop_connection() {
    let (handle, addr) = relay();

    let mut a = Raw::connect(addr);
    let mut b = Raw::connect(addr);

    a.send(b"<posupd/v1/0\n<unheard-of/1\n");
    a.send_synced("<erase/v2");
    assert_eq!(b.recv(), "<erase/v2");

    handle.stop();
}

#[test]
fn disconnect_leaves_others_working() {
    let (handle, addr) = relay();

    let a = Raw::connect(addr);
    let mut b = Raw::connect(addr);
    let _ = a.writer.shutdown(std::net::Shutdown::Both);
    drop(a);

    b.send_synced("<erase/still-here");

    let mut late = Raw::connect(addr);
    assert_eq!(late.recv(), "<erase/still-here");

    handle.stop();
}

#[test]
fn stalled_readers_do_not_delay_the_relay() {
    let (handle, addr) = relay();

    // Members of "busy" that never read after joining.
    let mut stalled = Vec::new();
    for i in 0..4 {
        let mut peer = Raw::connect(addr);
        peer.join("busy", &format!("<erase/stalled-{i}"));
        stalled.push(peer);
    }

    // A flooder in the same room that keeps draining its own echoes.
    let mut flooder = Raw::connect(addr);
    flooder.join("busy", "<erase/flooder");
    let mut echoes = flooder.writer.try_clone().unwrap();
    std::thread::spawn(move || {
        let _ = std::io::copy(&mut echoes, &mut std::io::sink());
    });
    let mut writer = flooder.writer.try_clone().unwrap();
    let flood = std::thread::spawn(move || {
        let color = "x".repeat(60 * 1024);
        for i in 0..300 {
            let record = format!("<colupd/flood-{i}/{color}\n");
            if writer.write_all(record.as_bytes()).is_err() {
                return;
            }
        }
    });

    // An active pair in the default room, sharing it with one more peer
    // that never reads, keeps getting prompt echoes.
    let _silent = Raw::connect(addr);
    let mut b = Raw::connect(addr);
    let mut c = Raw::connect(addr);
    let mut round = 0;
    loop {
        let record = format!("<erase/active-{round}");
        let started = Instant::now();
        b.send_synced(&record);
        let elapsed = started.elapsed();
        assert!(
            elapsed < Duration::from_secs(1),
            "echo took {elapsed:?} with stalled peers connected"
        );
        assert_eq!(c.recv(), record);
        round += 1;
        if round >= 5 && flood.is_finished() {
            break;
        }
    }
    flood.join().unwrap();

    drop(stalled);
    handle.stop();
}

#[test]
fn text_with_slash_and_newline_survives_relay() {
    let (handle, addr) = relay();

    let mut sender = NetClient::connect(addr, Some("notes")).unwrap();
    await_marker(&mut sender, "sender-ready");
    let mut receiver = NetClient::connect(addr, Some("notes")).unwrap();
    await_marker(&mut receiver, "receiver-ready");

    let text = "path/to/file\nsecond line & more";
    let id = sender
        .create_text((4, 8), text, "dark/blue", "Times", 12, "bold")
        .unwrap();

    let msg = receiver
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("message from relay");
    assert_eq!(
        msg,
        Message::CreateText {
            viob_id: id,
            ll_x: 4,
            ll_y: 8,
            text: text.into(),
            color: "dark/blue".into(),
            font: "Times".into(),
            size: 12,
            weight: "bold".into(),
        }
    );

    sender.disconnect();
    receiver.disconnect();
    handle.stop();
}

#[test]
fn net_client_sees_its_own_echo_and_freehand_points() {
    let (handle, addr) = relay();

    let mut client = NetClient::connect(addr, None).unwrap();
    let points = [Point { x: 0, y: 0 }, Point { x: 16, y: 32 }];
    let id = client.create_freehand(&points, "black", 2).unwrap();

    let msg = client
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("echo from relay");
    match msg {
        Message::CreateFreehand {
            viob_id,
            points: text,
            lwidth,
            ..
        } => {
            assert_eq!(viob_id, id);
            assert_eq!(lwidth, 2);
            assert_eq!(decode_points(&text).unwrap(), points);
        }
        other => panic!("expected CreateFreehand, got {other:?}"),
    }
    assert!(client.poll().is_empty());

    handle.stop();
}

#[test]
fn published_messages_reach_room_and_history() {
    let (handle, addr) = relay();

    let mut member = Raw::connect(addr);
    assert!(member.join("lobby", "<erase/ready").is_empty());

    let msg = Message::ColorUpdate {
        viob_id: "v7".into(),
        color: "gold".into(),
    };
    handle.publish(BoardId::from("lobby"), &msg).unwrap();
    assert_eq!(member.recv(), "<colupd/v7/gold");

    let mut late = Raw::connect(addr);
    late.send(b"<join/lobby\n");
    assert_eq!(late.recv(), "<erase/ready");
    assert_eq!(late.recv(), "<colupd/v7/gold");

    handle.stop();
}

#[test]
fn history_file_seeds_default_room() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "<newrec/seed/1/1/5/5/green").unwrap();
    writeln!(file, "<join/ignored").unwrap();
    writeln!(file, "<posupd/seed/2/2/6/6").unwrap();

    let config = RelayConfig {
        port: 0,
        poll_interval_ms: 20,
        history_file: Some(file.path().to_path_buf()),
        ..RelayConfig::default()
    };
    let (handle, addr) = start_relay(config).unwrap();

    let mut client = Raw::connect(addr);
    assert_eq!(client.recv(), "<newrec/seed/1/1/5/5/green");
    assert_eq!(client.recv(), "<posupd/seed/2/2/6/6");
    client.expect_silence();

    handle.stop();
}

#[test]
fn missing_history_file_fails_startup() {
    let config = RelayConfig {
        port: 0,
        history_file: Some("/nonexistent/history.txt".into()),
        ..RelayConfig::default()
    };
    assert!(start_relay(config).is_err());
}
