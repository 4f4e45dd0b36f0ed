//! Punch record decoding
//!
//! # Record Format
//!
//! ```text
//! userId,timestamp,directionCode[,deviceId]\n
//! U7,2024-03-01T09:15:00Z,1\n
//! U7,2024-03-01 18:00:00,0,D2\n
//! ```
//!
//! Direction code `1` is a check-in, anything else a check-out. A fourth
//! field names the terminal that recorded the punch and takes precedence over
//! the terminal the bytes arrived from.

use bytes::BytesMut;
use tracing::{trace, warn};

use punchsync_types::{DeviceTimestamp, Direction, PunchEvent};

use crate::constants::{FIELD_DELIMITER, MAX_LINE_LEN, MIN_FIELDS, RECORD_DELIMITER};
use crate::error::{Error, Result};

/// Decode a buffer of punch records
///
/// Returns a lazy iterator over the well-formed records in line order.
/// Malformed records are logged, counted and skipped.
///
/// # Examples
///
/// ```
/// use punchsync_core::decode;
///
/// let raw = b"U7,2024-03-01T09:15:00Z,1\ngarbage\nU7,2024-03-01T18:00:00Z,0\n";
/// let mut decoder = decode(raw, "D1");
/// let events: Vec<_> = decoder.by_ref().collect();
///
/// assert_eq!(events.len(), 2);
/// assert_eq!(decoder.skipped(), 1);
/// ```
pub fn decode<'a>(raw: &'a [u8], device_id: &'a str) -> Decoder<'a> {
    Decoder {
        rest: raw,
        device_id,
        line_no: 0,
        skipped: 0,
    }
}

/// Decode a single record without its line terminator
pub fn decode_line(line: &str, device_id: &str) -> Result<PunchEvent> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();

    if fields.len() < MIN_FIELDS {
        return Err(Error::TooFewFields {
            expected: MIN_FIELDS,
            actual: fields.len(),
        });
    }

    let device_user_id = fields[0];
    if device_user_id.is_empty() {
        return Err(Error::EmptyUserId);
    }

    let timestamp = DeviceTimestamp::parse(fields[1])?;
    let direction = Direction::from_code(fields[2]);

    let source = fields
        .get(3)
        .copied()
        .filter(|id| !id.is_empty())
        .unwrap_or(device_id);

    Ok(PunchEvent {
        device_id: source.to_string(),
        device_user_id: device_user_id.to_string(),
        timestamp,
        direction,
    })
}

/// Lazy record iterator returned by [`decode`]
#[derive(Debug)]
pub struct Decoder<'a> {
    rest: &'a [u8],
    device_id: &'a str,
    line_no: usize,
    skipped: usize,
}

impl<'a> Decoder<'a> {
    /// Malformed records skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        let line = match self.rest.iter().position(|b| *b == RECORD_DELIMITER) {
            Some(end) => {
                let line = &self.rest[..end];
                self.rest = &self.rest[end + 1..];
                line
            }
            None => std::mem::take(&mut self.rest),
        };

        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn parse(&self, line: &[u8]) -> Result<PunchEvent> {
        let text = std::str::from_utf8(line)
            .map_err(|_| Error::InvalidEncoding(hex::encode(line)))?;
        decode_line(text, self.device_id)
    }
}

impl Iterator for Decoder<'_> {
    type Item = PunchEvent;

    fn next(&mut self) -> Option<PunchEvent> {
        while let Some(line) = self.next_line() {
            self.line_no += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match self.parse(line) {
                Ok(event) => {
                    trace!("Decoded {}", event);
                    return Some(event);
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        "Skipping record {} from {}: {}",
                        self.line_no, self.device_id, e
                    );
                }
            }
        }

        None
    }
}

/// Reassembles records split across network reads
///
/// Complete lines are decoded as soon as their newline arrives; the trailing
/// partial line waits for the next read.
#[derive(Debug)]
pub struct LineBuffer {
    device_id: String,
    pending: BytesMut,
    discarding: bool,
    skipped: usize,
}

impl LineBuffer {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            pending: BytesMut::with_capacity(MAX_LINE_LEN),
            discarding: false,
            skipped: 0,
        }
    }

    /// Append a chunk and decode every line it completes
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<PunchEvent> {
        if self.discarding {
            match chunk.iter().position(|b| *b == RECORD_DELIMITER) {
                Some(end) => {
                    self.discarding = false;
                    chunk = &chunk[end + 1..];
                }
                None => return Vec::new(),
            }
        }

        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        if let Some(last) = self.pending.iter().rposition(|b| *b == RECORD_DELIMITER) {
            let complete = self.pending.split_to(last + 1);
            let mut decoder = decode(&complete, &self.device_id);
            events.extend(&mut decoder);
            self.skipped += decoder.skipped();
        }

        if self.pending.len() > MAX_LINE_LEN {
            let e = Error::LineTooLong {
                size: self.pending.len(),
                max: MAX_LINE_LEN,
            };
            warn!("Dropping partial record from {}: {}", self.device_id, e);
            self.pending.clear();
            self.discarding = true;
            self.skipped += 1;
        }

        events
    }

    /// Decode whatever is left once the connection has closed
    pub fn finish(&mut self) -> Vec<PunchEvent> {
        let rest = self.pending.split();
        self.discarding = false;

        let mut decoder = decode(&rest, &self.device_id);
        let events: Vec<_> = decoder.by_ref().collect();
        self.skipped += decoder.skipped();
        events
    }

    /// Drop an incomplete trailing record instead of decoding it
    ///
    /// Used when the connection ends for any reason other than the device
    /// closing it: the record may still have been in flight. Returns whether
    /// anything was dropped; a dropped record counts as skipped.
    pub fn abandon(&mut self) -> bool {
        let dropped = self.pending.iter().any(|b| !b.is_ascii_whitespace());
        self.pending.clear();
        self.discarding = false;

        if dropped {
            warn!("Dropping incomplete record from {}", self.device_id);
            self.skipped += 1;
        }
        dropped
    }

    /// Bytes waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Malformed records counted since the last call
    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }
}
