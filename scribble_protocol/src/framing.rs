// Newline-delimited record framing.
//
// A record is one line of UTF-8 text; records are separated by a single
// `\n` byte. Because free-text fields are escaped (see `escape.rs`), the
// separator never appears inside a record, so splitting on it is enough to
// recover record boundaries.
//
// Stream sockets deliver arbitrary byte chunks: one read may hold half a
// record, or several records plus the start of the next. `split` returns the
// complete records and the unconsumed tail; `RecordBuffer` keeps that tail
// between reads for one connection.

/// Byte that terminates every record on the wire.
pub const RECORD_SEPARATOR: u8 = b'\n';

/// Character that separates fields within a record.
pub const FIELD_SEPARATOR: char = '/';

/// Size of a single socket read. Records longer than this simply span
/// several reads.
pub const READ_CHUNK_SIZE: usize = 8192;

/// Append the record separator to an encoded record.
pub fn frame(record: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.len() + 1);
    out.extend_from_slice(record);
    out.push(RECORD_SEPARATOR);
    out
}

/// Split `buf` into complete records and the remainder after the last
/// separator.
///
/// Complete records are trimmed of surrounding ASCII whitespace (so `\r\n`
/// line endings are tolerated). The remainder may be empty. A buffer with no
/// separator yields no records and is returned whole as the remainder.
pub fn split(buf: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
    let mut pieces: Vec<&[u8]> = buf.split(|b| *b == RECORD_SEPARATOR).collect();
    // `split` on a slice always yields at least one piece.
    let remainder = pieces.pop().unwrap_or_default().to_vec();
    let records = pieces
        .into_iter()
        .map(|piece| piece.trim_ascii().to_vec())
        .collect();
    (records, remainder)
}

/// Per-connection accumulator for partially received records.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    pending: Vec<u8>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes and return every record they complete.
    /// Bytes after the last separator are held until the next call.
    ///
    /// Only the new bytes are searched for a separator, and completed
    /// records are drained from the front, so a record that arrives in many
    /// chunks costs time linear in its length.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let Some(last) = bytes.iter().rposition(|b| *b == RECORD_SEPARATOR) else {
            self.pending.extend_from_slice(bytes);
            return Vec::new();
        };
        self.pending.extend_from_slice(&bytes[..last]);
        let records = self
            .pending
            .split(|b| *b == RECORD_SEPARATOR)
            .map(|piece| piece.trim_ascii().to_vec())
            .collect();
        self.pending.clear();
        self.pending.extend_from_slice(&bytes[last + 1..]);
        records
    }

    /// Bytes received but not yet terminated by a separator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
