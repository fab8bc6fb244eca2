//! Binary wire protocol: a strict subset of RESP2.
//!
//! Requests are arrays of bulk strings. Replies are one of status, integer,
//! bulk string, array, nil or error. Both directions share one frame type,
//! [`Reply`], and one incremental decoder.

use bytes::{Buf, BufMut, BytesMut};

use crate::core::RuntimeError;

/// Largest bulk string accepted (512 MiB, matching common RESP servers).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Largest array accepted.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;
/// Longest header line accepted before a CRLF must appear.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A typed protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`-style status line.
    Status(String),
    /// `:n` integer.
    Integer(i64),
    /// `$n` bulk string.
    Bulk(String),
    /// `*n` array of frames.
    Array(Vec<Reply>),
    /// `$-1` / `*-1`.
    Nil,
    /// `-ERR ...` error line.
    Error(String),
}

impl Reply {
    /// The canonical `+OK`.
    #[must_use]
    pub fn ok() -> Self {
        Self::Status("OK".into())
    }

    /// An `ERR`-prefixed error reply.
    #[must_use]
    pub fn err(msg: impl AsRef<str>) -> Self {
        Self::Error(format!("ERR {}", msg.as_ref()))
    }

    /// Bulk array of strings.
    #[must_use]
    pub fn bulk_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Self::Bulk(s.into())).collect())
    }

    /// Bulk string or nil.
    #[must_use]
    pub fn from_option(value: Option<String>) -> Self {
        value.map_or(Self::Nil, Self::Bulk)
    }

    /// Append the wire encoding of this frame to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::Status(s) => {
                out.put_u8(b'+');
                out.put_slice(single_line(s).as_bytes());
                out.put_slice(b"\r\n");
            }
            Self::Error(s) => {
                out.put_u8(b'-');
                out.put_slice(single_line(s).as_bytes());
                out.put_slice(b"\r\n");
            }
            Self::Integer(n) => {
                out.put_slice(format!(":{n}\r\n").as_bytes());
            }
            Self::Bulk(s) => {
                out.put_slice(format!("${}\r\n", s.len()).as_bytes());
                out.put_slice(s.as_bytes());
                out.put_slice(b"\r\n");
            }
            Self::Array(items) => {
                out.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
            Self::Nil => out.put_slice(b"$-1\r\n"),
        }
    }
}

fn single_line(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains(['\r', '\n']) {
        std::borrow::Cow::Owned(s.replace(['\r', '\n'], " "))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

/// Encode a command as an array of bulk strings.
pub fn encode_command<S: AsRef<str>>(args: &[S], out: &mut BytesMut) {
    out.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.put_slice(arg.as_bytes());
        out.put_slice(b"\r\n");
    }
}

/// Decode one frame from the front of `buf`, consuming it.
///
/// Returns `Ok(None)` when more bytes are needed.
///
/// # Errors
///
/// `Protocol` when the bytes can never form a valid frame.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Reply>, RuntimeError> {
    match parse_frame(buf, 0)? {
        Some((frame, consumed)) => {
            buf.advance(consumed);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

/// Decode one command (array of bulk strings) from the front of `buf`.
///
/// # Errors
///
/// `Protocol` for malformed frames, non-array frames, empty arrays or
/// non-bulk elements.
pub fn decode_command(buf: &mut BytesMut) -> Result<Option<Vec<String>>, RuntimeError> {
    let Some(frame) = decode(buf)? else {
        return Ok(None);
    };
    match frame {
        Reply::Array(items) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(s) => Ok(s),
                other => Err(protocol(format!("expected bulk string argument, got {other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Reply::Array(_) => Err(protocol("empty command")),
        other => Err(protocol(format!("expected command array, got {other:?}"))),
    }
}

fn protocol(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::Protocol(msg.into())
}

fn read_line(buf: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>, RuntimeError> {
    let rest = &buf[pos..];
    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(end) => Ok(Some((&rest[..end], pos + end + 2))),
        None if rest.len() > MAX_LINE_LEN => Err(protocol("header line too long")),
        None => Ok(None),
    }
}

fn parse_int(line: &[u8]) -> Result<i64, RuntimeError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| protocol(format!("invalid integer `{}`", String::from_utf8_lossy(line))))
}

fn parse_text(line: &[u8]) -> Result<String, RuntimeError> {
    String::from_utf8(line.to_vec()).map_err(|_| protocol("line is not valid UTF-8"))
}

fn parse_frame(buf: &[u8], pos: usize) -> Result<Option<(Reply, usize)>, RuntimeError> {
    if pos >= buf.len() {
        return Ok(None);
    }
    let kind = buf[pos];
    let Some((line, next)) = read_line(buf, pos + 1)? else {
        return Ok(None);
    };
    match kind {
        b'+' => Ok(Some((Reply::Status(parse_text(line)?), next))),
        b'-' => Ok(Some((Reply::Error(parse_text(line)?), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(line)?), next))),
        b'$' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Reply::Nil, next)));
            }
            let len = usize::try_from(len).map_err(|_| protocol("negative bulk length"))?;
            if len > MAX_BULK_LEN {
                return Err(protocol("bulk string too large"));
            }
            if buf.len() < next + len + 2 {
                return Ok(None);
            }
            if &buf[next + len..next + len + 2] != b"\r\n" {
                return Err(protocol("bulk string not terminated by CRLF"));
            }
            let body = String::from_utf8(buf[next..next + len].to_vec())
                .map_err(|_| protocol("bulk string is not valid UTF-8"))?;
            Ok(Some((Reply::Bulk(body), next + len + 2)))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Reply::Nil, next)));
            }
            let len = usize::try_from(len).map_err(|_| protocol("negative array length"))?;
            if len > MAX_ARRAY_LEN {
                return Err(protocol("array too large"));
            }
            let mut items = Vec::with_capacity(len.min(64));
            let mut cursor = next;
            for _ in 0..len {
                match parse_frame(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(items), cursor)))
        }
        other => Err(protocol(format!("unexpected frame type byte {other:#04x}"))),
    }
}
