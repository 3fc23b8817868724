//! Newline framing for the bytes read by the tail loop.

use std::mem;
use tracing::debug;

/// Splits a byte stream into lines, carrying unterminated bytes across calls.
///
/// Bytes are buffered until a `\n` arrives and only then decoded, so UTF-8
/// sequences split across two reads come out intact. Invalid UTF-8 is
/// replaced with U+FFFD rather than rejected.
#[derive(Debug)]
pub struct LineDecoder {
    partial: Vec<u8>,
    max_partial: usize,
    // Set after a forced emission until the next newline
    after_forced: bool,
}

impl LineDecoder {
    /// Creates a decoder that force-emits once `max_partial` unterminated
    /// bytes have accumulated.
    pub fn new(max_partial: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_partial: max_partial.max(1),
            after_forced: false,
        }
    }

    /// Feeds a chunk and returns every line it completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(index) = rest.iter().position(|&b| b == b'\n') {
            let (segment, tail) = rest.split_at(index);
            let buffered = if self.partial.is_empty() {
                Vec::new()
            } else {
                self.partial.extend_from_slice(segment);
                mem::take(&mut self.partial)
            };
            let line = if buffered.is_empty() {
                strip_carriage_return(segment)
            } else {
                strip_carriage_return(&buffered)
            };

            // The terminator of a force-emitted line is not a line of its own
            if !(mem::take(&mut self.after_forced) && line.is_empty()) {
                lines.push(decode_line(line));
            }
            rest = &tail[1..];
        }

        if !rest.is_empty() {
            self.partial.extend_from_slice(rest);
            self.drain_overflow(&mut lines);
        }

        lines
    }

    /// Returns the unterminated bytes as a line, if there are any.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        self.after_forced = false;
        let buffered = mem::take(&mut self.partial);
        Some(decode_line(strip_carriage_return(&buffered)))
    }

    /// Discards the unterminated bytes, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.partial.len();
        self.partial.clear();
        self.after_forced = false;
        dropped
    }

    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    fn drain_overflow(&mut self, lines: &mut Vec<String>) {
        while self.partial.len() >= self.max_partial {
            let mut split = char_boundary_before(&self.partial, self.max_partial);

            // A `\r` before the cut may be the first half of a CRLF pair; keep it buffered
            if self.partial[split - 1] == b'\r' {
                if split > 1 {
                    split -= 1;
                } else if self.partial.len() == 1 {
                    break;
                }
            }

            let remainder = self.partial.split_off(split);
            let forced = mem::replace(&mut self.partial, remainder);
            debug!(bytes = forced.len(), "Emitting forced line at partial line cap");
            lines.push(decode_line(strip_carriage_return(&forced)));
            self.after_forced = true;
        }
    }
}

fn strip_carriage_return(segment: &[u8]) -> &[u8] {
    segment.strip_suffix(b"\r").unwrap_or(segment)
}

pub(crate) fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Moves a cut at `at` back so it does not land inside a UTF-8 sequence.
///
/// Only the bytes before `at` are inspected, so a sequence whose tail has not
/// been read yet is kept whole for the next emission.
fn char_boundary_before(bytes: &[u8], at: usize) -> usize {
    let floor = at.saturating_sub(4);
    let mut lead = at;
    while lead > floor {
        lead -= 1;
        if !is_continuation(bytes[lead]) {
            break;
        }
    }

    if is_continuation(bytes[lead]) {
        return at;
    }
    if lead + sequence_len(bytes[lead]) > at && lead > 0 {
        lead
    } else {
        at
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
