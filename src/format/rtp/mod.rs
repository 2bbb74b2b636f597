//! # Real-time Transport Protocol (RTP) header codec
//!
//! [`RtpView`] reads the fixed header of a received packet without copying: the
//! payload is a [`Bytes`] slice of the interleaved frame it arrived in.
//! [`RTPPacket`] builds packets, which the tests and loopback servers use.
//!
//! ```rust
//! use rtspipe::format::rtp::{RTPPacket, RtpView};
//! use bytes::Bytes;
//!
//! let payload = Bytes::from_static(&[1, 2, 3]);
//! let wire = RTPPacket::new(96, 1000, 90000, 0x12345678, true, payload).to_bytes();
//! let view = RtpView::parse(wire).unwrap();
//! assert_eq!(view.sequence_number(), 1000);
//! assert_eq!(&view.payload()[..], &[1, 2, 3]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::PipeError;

/// Errors that can occur while reading an RTP header
#[derive(Debug, Error, PartialEq)]
pub enum RTPError {
    /// Shorter than the fixed header plus CSRC list and extension
    #[error("RTP packet truncated: {0} bytes")]
    Truncated(usize),

    /// Version field is not 2
    #[error("unsupported RTP version {0}")]
    BadVersion(u8),

    /// Padding count exceeds the payload
    #[error("invalid RTP padding")]
    BadPadding,
}

impl From<RTPError> for PipeError {
    fn from(err: RTPError) -> Self {
        PipeError::Media(err.to_string())
    }
}

/// Specialized Result type for RTP operations
pub type Result<T> = std::result::Result<T, RTPError>;

const FIXED_HEADER: usize = 12;

/// Read-only view over one received RTP packet.
#[derive(Debug, Clone)]
pub struct RtpView {
    data: Bytes,
    payload_start: usize,
    payload_end: usize,
}

impl RtpView {
    /// Validates the header and locates the payload.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < FIXED_HEADER {
            return Err(RTPError::Truncated(data.len()));
        }
        let version = data[0] >> 6;
        if version != 2 {
            return Err(RTPError::BadVersion(version));
        }

        let csrc_count = (data[0] & 0x0f) as usize;
        let mut offset = FIXED_HEADER + csrc_count * 4;
        if data.len() < offset {
            return Err(RTPError::Truncated(data.len()));
        }

        if data[0] & 0x10 != 0 {
            if data.len() < offset + 4 {
                return Err(RTPError::Truncated(data.len()));
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(RTPError::Truncated(data.len()));
            }
        }

        let mut end = data.len();
        if data[0] & 0x20 != 0 {
            let padding = data[end - 1] as usize;
            if padding == 0 || offset + padding > end {
                return Err(RTPError::BadPadding);
            }
            end -= padding;
        }

        Ok(Self {
            data,
            payload_start: offset,
            payload_end: end,
        })
    }

    /// RTP version (always 2 once parsed)
    pub fn version(&self) -> u8 {
        self.data[0] >> 6
    }

    /// Marker bit; for video it flags the last packet of an access unit
    pub fn marker(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    /// Payload type
    pub fn payload_type(&self) -> u8 {
        self.data[1] & 0x7f
    }

    /// 16-bit sequence number
    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// 32-bit media timestamp
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    /// Synchronization source
    pub fn ssrc(&self) -> u32 {
        u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]])
    }

    /// Contributing sources
    pub fn csrc(&self) -> impl Iterator<Item = u32> + '_ {
        let count = (self.data[0] & 0x0f) as usize;
        self.data[FIXED_HEADER..FIXED_HEADER + count * 4]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// Byte offset of the payload within the packet
    pub fn payload_offset(&self) -> usize {
        self.payload_start
    }

    /// Payload with padding removed; shares the packet's buffer
    pub fn payload(&self) -> Bytes {
        self.data.slice(self.payload_start..self.payload_end)
    }

    /// Whole packet
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }
}

/// Whether `next` directly follows `prev`, modulo 2^16.
pub fn is_next_sequence(prev: u16, next: u16) -> bool {
    next == prev.wrapping_add(1)
}

/// An RTP packet to be serialized
#[derive(Debug, Clone, PartialEq)]
pub struct RTPPacket {
    /// Marker bit
    pub marker: bool,
    /// Payload type identifier
    pub payload_type: u8,
    /// Packet sequence number
    pub sequence_number: u16,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Contributing source identifiers
    pub csrc: Vec<u32>,
    /// Packet payload data
    pub payload: Bytes,
}

impl RTPPacket {
    /// Creates a new RTP packet with the specified parameters
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: Bytes,
    ) -> Self {
        Self {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            payload,
        }
    }

    /// Serializes the packet, without padding or extension.
    pub fn to_bytes(&self) -> Bytes {
        let csrc_count = self.csrc.len().min(15);
        let mut buf = BytesMut::with_capacity(FIXED_HEADER + csrc_count * 4 + self.payload.len());
        buf.put_u8(0x80 | csrc_count as u8);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for &csrc in self.csrc.iter().take(csrc_count) {
            buf.put_u32(csrc);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
