use bytes::{Buf, Bytes, BytesMut};

use crate::{PipeError, Result};

const RESPONSE_PREFIX: &[u8] = b"RTSP/";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// A parsed RTSP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code, e.g. 200
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Content-Length bounded body
    pub body: Bytes,
}

impl Response {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every header named `name`; servers may repeat `WWW-Authenticate`.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `CSeq` header, if it parses.
    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One unit extracted from the transport byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A textual RTSP response
    Response(Response),
    /// A `$`-framed binary packet
    Interleaved {
        /// Channel id; even for RTP, odd for RTCP
        channel: u8,
        /// Exactly the announced number of bytes
        data: Bytes,
    },
}

/// Incremental splitter for the RTSP control connection.
///
/// Bytes are appended as they arrive; [`FrameParser::next_frame`] yields
/// complete frames and keeps a cursor so a header block split across many
/// reads is scanned only once.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
    scan: usize,
}

impl FrameParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends transport bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extracts the next complete frame, or `Ok(None)` if more bytes are needed.
    ///
    /// Unframed bytes are discarded up to the next plausible frame start and
    /// reported as a non-fatal protocol error; calling again continues parsing.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.buf[0] == b'$' {
            return Ok(self.next_interleaved());
        }

        let prefix = RESPONSE_PREFIX.len().min(self.buf.len());
        if self.buf[..prefix] == RESPONSE_PREFIX[..prefix] {
            if self.buf.len() < RESPONSE_PREFIX.len() {
                return Ok(None);
            }
            return self.next_response();
        }

        let skipped = self.resync();
        Err(PipeError::Protocol(format!(
            "discarded {} bytes of unframed data",
            skipped
        )))
    }

    fn next_interleaved(&mut self) -> Option<Frame> {
        if self.buf.len() < 4 {
            return None;
        }
        let channel = self.buf[1];
        let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        self.buf.advance(4);
        let data = self.buf.split_to(len).freeze();
        self.scan = 0;
        Some(Frame::Interleaved { channel, data })
    }

    fn next_response(&mut self) -> Result<Option<Frame>> {
        let start = self.scan;
        let Some(pos) = self.buf[start..]
            .windows(HEADER_END.len())
            .position(|w| w == HEADER_END)
            .map(|p| p + start)
        else {
            self.scan = self.buf.len().saturating_sub(HEADER_END.len() - 1);
            return Ok(None);
        };
        // Resume here while the body is still arriving.
        self.scan = pos;

        let head = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        let total = pos + HEADER_END.len() + content_length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut message = self.buf.split_to(total);
        self.scan = 0;
        message.advance(pos + HEADER_END.len());
        let body = message.freeze();

        let mut parts = status_line.splitn(3, ' ');
        let _version = parts.next();
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| PipeError::Protocol(format!("bad status line: {:?}", status_line)))?;
        let reason = parts.next().unwrap_or_default().to_string();

        Ok(Some(Frame::Response(Response {
            status,
            reason,
            headers,
            body,
        })))
    }

    /// Drops bytes up to the next `$` or `RTSP/`, keeping a trailing partial
    /// `RTSP/` prefix. Returns the number of bytes dropped.
    fn resync(&mut self) -> usize {
        let keep_from = (1..self.buf.len())
            .find(|&i| {
                let rest = &self.buf[i..];
                let n = rest.len().min(RESPONSE_PREFIX.len());
                rest[0] == b'$' || rest[..n] == RESPONSE_PREFIX[..n]
            })
            .unwrap_or(self.buf.len());
        self.buf.advance(keep_from);
        self.scan = 0;
        keep_from
    }
}
