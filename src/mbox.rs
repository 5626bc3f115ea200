//! Streaming mbox reader and writer.
//!
//! Messages are separated by lines beginning with exactly `From ` at column
//! zero (mboxrd separator rule). The reader tracks absolute byte offsets so
//! callers can checkpoint resume positions; message bodies are passed
//! through without `>From ` unescaping.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

/// One message pulled out of an mbox stream, with the byte offsets of the
/// `From ` separator that opened it (`start`) and of the first byte past it
/// (`end`).
#[derive(Debug)]
pub struct MboxMessage {
    pub body: Vec<u8>,
    pub start: u64,
    pub end: u64,
}

pub struct MboxReader<R: BufRead> {
    inner: R,
    pos: u64,
    /// Offset of a `From ` line already consumed while scanning for the end
    /// of the previous message.
    pending_from: Option<u64>,
}

fn is_from_line(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

impl MboxReader<BufReader<File>> {
    /// Open `path` and position the reader at `offset`.
    pub fn open(path: &Path, offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(MboxReader::new(BufReader::new(file), offset))
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Wrap a reader already positioned at absolute offset `offset`.
    pub fn new(inner: R, offset: u64) -> Self {
        MboxReader {
            inner,
            pos: offset,
            pending_from: None,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        let n = self.inner.read_until(b'\n', buf)?;
        self.pos += n as u64;
        Ok(n > 0)
    }

    /// Yield the next message, or `None` at end of stream. Content before
    /// the first separator line is skipped.
    pub fn next_message(&mut self) -> io::Result<Option<MboxMessage>> {
        let mut line = Vec::new();

        let start = match self.pending_from.take() {
            Some(off) => off,
            None => loop {
                let line_start = self.pos;
                if !self.read_line(&mut line)? {
                    return Ok(None);
                }
                if is_from_line(&line) {
                    break line_start;
                }
            },
        };

        let mut body = Vec::new();
        loop {
            let line_start = self.pos;
            if !self.read_line(&mut line)? {
                return Ok(Some(MboxMessage {
                    body,
                    start,
                    end: self.pos,
                }));
            }
            if is_from_line(&line) {
                self.pending_from = Some(line_start);
                return Ok(Some(MboxMessage {
                    body,
                    start,
                    end: line_start,
                }));
            }
            body.extend_from_slice(&line);
        }
    }
}

/// Count separator lines from the reader's current position. Used to size
/// the progress display before the copy pass.
pub fn count_messages<R: BufRead>(mut reader: R) -> io::Result<usize> {
    let mut count = 0;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(count);
        }
        if is_from_line(&line) {
            count += 1;
        }
    }
}

/// Append a raw message to an mbox file: `From MAILER-DAEMON <ctime>`
/// separator, `>From ` escaping on body lines, and a trailing blank line.
pub fn append_message<W: Write>(w: &mut W, raw: &[u8], date: DateTime<Utc>) -> io::Result<()> {
    writeln!(w, "From MAILER-DAEMON {}", date.format("%a %b %e %H:%M:%S %Y"))?;
    for line in raw.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b"From ") {
            w.write_all(b">")?;
        }
        w.write_all(line)?;
    }
    if !raw.ends_with(b"\n") {
        w.write_all(b"\n")?;
    }
    w.write_all(b"\n")?;
    Ok(())
}
