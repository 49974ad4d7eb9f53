use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{DecodeError, FrameError},
    registry::AuctionState,
};

/// Servers announce the end of an auction with a line starting with this text.
pub const CLOSED_NOTICE: &str = "Auction closed";

/// Longest server frame accepted, terminator excluded.
pub const MAX_FRAME_LEN: usize = 1024;

pub(crate) const LINE_ENDINGS: &[char] = &['\n', '\r', '\0'];

/// Bytes that end a server frame.
const FRAME_DELIMITERS: &[u8] = b"\n\0";

/// A decoded line pushed by an auction server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerUpdate {
    /// First line on a connection; carries the item the slot binds to.
    FirstBid {
        item: String,
        bid: i64,
        seconds_left: i64,
    },
    SubsequentBid { bid: i64, seconds_left: i64 },
    /// The auction is over. `notice` is the server's text, shown verbatim.
    Closed { notice: String },
}

/// Decodes one server line against the current state of its slot.
///
/// The item name binds once: after the first message the item field is
/// still required on the wire but its value is ignored.
pub fn decode(line: &str, state: &AuctionState) -> Result<ServerUpdate, DecodeError> {
    let line = line.trim_end_matches(LINE_ENDINGS);
    if line.starts_with(CLOSED_NOTICE) {
        return Ok(ServerUpdate::Closed {
            notice: line.to_string(),
        });
    }

    let mut fields = line.split_whitespace();
    let item = fields.next().ok_or_else(|| malformed(line, "missing item"))?;
    let bid = parse_field(fields.next(), line, "missing bid", "bid is not an integer")?;
    let seconds_left = parse_field(
        fields.next(),
        line,
        "missing seconds remaining",
        "seconds remaining is not an integer",
    )?;

    if state.item().is_none() {
        Ok(ServerUpdate::FirstBid {
            item: item.to_string(),
            bid,
            seconds_left,
        })
    } else {
        Ok(ServerUpdate::SubsequentBid { bid, seconds_left })
    }
}

fn parse_field(
    field: Option<&str>,
    line: &str,
    missing: &'static str,
    invalid: &'static str,
) -> Result<i64, DecodeError> {
    let field = field.ok_or_else(|| malformed(line, missing))?;
    field.parse().map_err(|_| malformed(line, invalid))
}

fn malformed(line: &str, reason: &'static str) -> DecodeError {
    DecodeError::Malformed {
        line: line.to_string(),
        reason,
    }
}

/// Reads the next non-empty frame, without its terminator.
///
/// Frames end at `\n` or `\0`; a trailing `\r` is dropped. Returns
/// `Ok(None)` once the peer has closed its side of the stream. A frame longer
/// than [`MAX_FRAME_LEN`] or one that is not UTF-8 is malformed.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    loop {
        let (used, delimited) = {
            let available = reader.fill_buf().await?;
            match available.iter().position(|byte| FRAME_DELIMITERS.contains(byte)) {
                Some(end) => {
                    frame.extend_from_slice(&available[..end]);
                    (end + 1, true)
                }
                None => {
                    frame.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        let at_eof = used == 0;
        reader.consume(used);

        if frame.len() > MAX_FRAME_LEN {
            frame.truncate(MAX_FRAME_LEN);
            return Err(malformed(&String::from_utf8_lossy(&frame), "frame too long").into());
        }
        if !delimited && !at_eof {
            continue;
        }

        while frame.last() == Some(&b'\r') {
            frame.pop();
        }
        if frame.is_empty() {
            if at_eof {
                return Ok(None);
            }
            continue;
        }
        let line = String::from_utf8(frame).map_err(|err| {
            malformed(&String::from_utf8_lossy(err.as_bytes()), "not valid UTF-8")
        })?;
        return Ok(Some(line));
    }
}

/// Writes `text` followed by a newline and flushes, so the server sees it at once.
pub async fn write_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(text.len() + 1);
    encoded.extend_from_slice(text.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
