//! # RTP Control Protocol (RTCP)
//!
//! Parsing of the packets a server sends on the odd interleaved channel (sender
//! reports, source descriptions and BYE), and serialization of the receiver
//! reports the session sends back with its keepalives.
//!
//! ```rust
//! use rtspipe::format::rtcp::{RTCPPacket, ReceptionReport};
//!
//! let report = RTCPPacket::ReceiverReport {
//!     ssrc: 0x12345678,
//!     reports: vec![ReceptionReport {
//!         ssrc: 0x87654321,
//!         fraction_lost: 0,
//!         packets_lost: 0,
//!         highest_seq: 1000,
//!         jitter: 0,
//!         last_sr: 0,
//!         delay_last_sr: 0,
//!     }],
//! };
//! let wire = report.to_bytes();
//! assert_eq!(RTCPPacket::parse_compound(&wire).unwrap().len(), 1);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::PipeError;

/// Errors that can occur during RTCP packet operations
#[derive(Debug, Error, PartialEq)]
pub enum RTCPError {
    /// The packet data is malformed or incomplete
    #[error("invalid RTCP packet: {0}")]
    InvalidPacket(&'static str),

    /// The packet type is not supported by this implementation
    #[error("unsupported RTCP packet type {0}")]
    UnsupportedType(u8),
}

impl From<RTCPError> for PipeError {
    fn from(err: RTCPError) -> Self {
        PipeError::Media(err.to_string())
    }
}

/// Specialized Result type for RTCP operations
pub type Result<T> = std::result::Result<T, RTCPError>;

/// RTCP packet types (RFC 3550 section 12.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// 200
    SenderReport,
    /// 201
    ReceiverReport,
    /// 202
    SourceDescription,
    /// 203
    Goodbye,
    /// 204
    ApplicationDefined,
}

impl PacketType {
    /// Maps the wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            200 => Some(PacketType::SenderReport),
            201 => Some(PacketType::ReceiverReport),
            202 => Some(PacketType::SourceDescription),
            203 => Some(PacketType::Goodbye),
            204 => Some(PacketType::ApplicationDefined),
            _ => None,
        }
    }
}

/// Type of the first packet in a compound RTCP datagram, without parsing the body.
pub fn peek_packet_type(data: &[u8]) -> Option<PacketType> {
    if data.len() < 4 || data[0] >> 6 != 2 {
        return None;
    }
    PacketType::from_u8(data[1])
}

/// Reception statistics for an RTP source
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptionReport {
    /// SSRC of the source this report is for
    pub ssrc: u32,
    /// Fraction of RTP data packets lost since the previous SR/RR
    pub fraction_lost: u8,
    /// Cumulative number of packets lost (24 bits)
    pub packets_lost: u32,
    /// Extended highest sequence number received
    pub highest_seq: u32,
    /// Interarrival jitter
    pub jitter: u32,
    /// Last SR timestamp (LSR)
    pub last_sr: u32,
    /// Delay since last SR (DLSR)
    pub delay_last_sr: u32,
}

impl ReceptionReport {
    fn parse(buf: &mut &[u8]) -> Self {
        let ssrc = buf.get_u32();
        let lost_word = buf.get_u32();
        ReceptionReport {
            ssrc,
            fraction_lost: (lost_word >> 24) as u8,
            packets_lost: lost_word & 0x00FF_FFFF,
            highest_seq: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sr: buf.get_u32(),
            delay_last_sr: buf.get_u32(),
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32(self.ssrc);
        buf.put_u32(((self.fraction_lost as u32) << 24) | (self.packets_lost & 0x00FF_FFFF));
        buf.put_u32(self.highest_seq);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sr);
        buf.put_u32(self.delay_last_sr);
    }
}

/// Different types of RTCP packets
#[derive(Debug, Clone, PartialEq)]
pub enum RTCPPacket {
    /// Sender Report (SR) packet, containing transmission and reception statistics
    SenderReport {
        /// Synchronization source identifier
        ssrc: u32,
        /// NTP timestamp in 64-bit fixed point format
        ntp_timestamp: u64,
        /// RTP timestamp corresponding to NTP timestamp
        rtp_timestamp: u32,
        /// Total number of packets sent
        packet_count: u32,
        /// Total number of payload octets sent
        octet_count: u32,
        /// Reception reports for other sources
        reports: Vec<ReceptionReport>,
    },

    /// Receiver Report (RR) packet, containing reception statistics
    ReceiverReport {
        /// Synchronization source identifier
        ssrc: u32,
        /// Reception reports for other sources
        reports: Vec<ReceptionReport>,
    },

    /// Source Description (SDES) packet
    SourceDescription {
        /// List of (SSRC, item list) pairs. Each item is (type, value)
        chunks: Vec<(u32, Vec<(u8, String)>)>,
    },

    /// Goodbye (BYE) packet
    Goodbye {
        /// List of sources leaving the session
        sources: Vec<u32>,
        /// Optional reason for leaving
        reason: Option<String>,
    },

    /// Application-Defined (APP) packet
    ApplicationDefined {
        /// Source identifier
        ssrc: u32,
        /// Four-character name
        name: [u8; 4],
        /// Application-specific data
        data: Bytes,
    },
}

impl RTCPPacket {
    /// Parses every packet of a compound RTCP datagram.
    ///
    /// Packets of unknown type are skipped using their length field.
    pub fn parse_compound(data: &[u8]) -> Result<Vec<Self>> {
        let mut packets = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(RTCPError::InvalidPacket("trailing bytes"));
            }
            let len = (u16::from_be_bytes([rest[2], rest[3]]) as usize + 1) * 4;
            if rest.len() < len {
                return Err(RTCPError::InvalidPacket("length exceeds datagram"));
            }
            match Self::parse(&rest[..len]) {
                Ok(packet) => packets.push(packet),
                Err(RTCPError::UnsupportedType(_)) => {}
                Err(e) => return Err(e),
            }
            rest = &rest[len..];
        }
        Ok(packets)
    }

    /// Parses a single RTCP packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(RTCPError::InvalidPacket("shorter than header"));
        }
        if data[0] >> 6 != 2 {
            return Err(RTCPError::InvalidPacket("version is not 2"));
        }

        let padding = data[0] & 0x20 != 0;
        let count = (data[0] & 0x1f) as usize;
        let packet_type = data[1];
        let length = (u16::from_be_bytes([data[2], data[3]]) as usize + 1) * 4;
        if data.len() < length {
            return Err(RTCPError::InvalidPacket("truncated"));
        }

        let mut end = length;
        if padding {
            let pad = data[length - 1] as usize;
            if pad == 0 || pad > length - 4 {
                return Err(RTCPError::InvalidPacket("bad padding"));
            }
            end -= pad;
        }
        let mut body = &data[4..end];

        match PacketType::from_u8(packet_type) {
            Some(PacketType::SenderReport) => {
                if body.len() < 24 + count * 24 {
                    return Err(RTCPError::InvalidPacket("short sender report"));
                }
                let ssrc = body.get_u32();
                let ntp_timestamp = body.get_u64();
                let rtp_timestamp = body.get_u32();
                let packet_count = body.get_u32();
                let octet_count = body.get_u32();
                let reports = (0..count).map(|_| ReceptionReport::parse(&mut body)).collect();
                Ok(RTCPPacket::SenderReport {
                    ssrc,
                    ntp_timestamp,
                    rtp_timestamp,
                    packet_count,
                    octet_count,
                    reports,
                })
            }
            Some(PacketType::ReceiverReport) => {
                if body.len() < 4 + count * 24 {
                    return Err(RTCPError::InvalidPacket("short receiver report"));
                }
                let ssrc = body.get_u32();
                let reports = (0..count).map(|_| ReceptionReport::parse(&mut body)).collect();
                Ok(RTCPPacket::ReceiverReport { ssrc, reports })
            }
            Some(PacketType::SourceDescription) => {
                let mut chunks = Vec::with_capacity(count);
                for _ in 0..count {
                    if body.len() < 4 {
                        return Err(RTCPError::InvalidPacket("short SDES chunk"));
                    }
                    let start_len = body.len();
                    let ssrc = body.get_u32();
                    let mut items = Vec::new();
                    loop {
                        if body.is_empty() {
                            return Err(RTCPError::InvalidPacket("unterminated SDES chunk"));
                        }
                        let kind = body.get_u8();
                        if kind == 0 {
                            break;
                        }
                        if body.is_empty() || body.len() < 1 + body[0] as usize {
                            return Err(RTCPError::InvalidPacket("short SDES item"));
                        }
                        let len = body.get_u8() as usize;
                        items.push((kind, String::from_utf8_lossy(&body[..len]).into_owned()));
                        body.advance(len);
                    }
                    // chunks are padded to a 32-bit boundary
                    let consumed = start_len - body.len();
                    let pad = (4 - consumed % 4) % 4;
                    body.advance(pad.min(body.len()));
                    chunks.push((ssrc, items));
                }
                Ok(RTCPPacket::SourceDescription { chunks })
            }
            Some(PacketType::Goodbye) => {
                if body.len() < count * 4 {
                    return Err(RTCPError::InvalidPacket("short BYE"));
                }
                let sources = (0..count).map(|_| body.get_u32()).collect();
                let reason = match body.first() {
                    Some(&len) if body.len() > len as usize => {
                        Some(String::from_utf8_lossy(&body[1..1 + len as usize]).into_owned())
                    }
                    _ => None,
                };
                Ok(RTCPPacket::Goodbye { sources, reason })
            }
            Some(PacketType::ApplicationDefined) => {
                if body.len() < 8 {
                    return Err(RTCPError::InvalidPacket("short APP"));
                }
                let ssrc = body.get_u32();
                let mut name = [0u8; 4];
                body.copy_to_slice(&mut name);
                Ok(RTCPPacket::ApplicationDefined {
                    ssrc,
                    name,
                    data: Bytes::copy_from_slice(body),
                })
            }
            None => Err(RTCPError::UnsupportedType(packet_type)),
        }
    }

    /// Packet type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            RTCPPacket::SenderReport { .. } => PacketType::SenderReport,
            RTCPPacket::ReceiverReport { .. } => PacketType::ReceiverReport,
            RTCPPacket::SourceDescription { .. } => PacketType::SourceDescription,
            RTCPPacket::Goodbye { .. } => PacketType::Goodbye,
            RTCPPacket::ApplicationDefined { .. } => PacketType::ApplicationDefined,
        }
    }

    /// Serializes the packet. SDES is written without items other than those given.
    pub fn to_bytes(&self) -> Bytes {
        let mut body = BytesMut::new();
        let count = match self {
            RTCPPacket::SenderReport {
                ssrc,
                ntp_timestamp,
                rtp_timestamp,
                packet_count,
                octet_count,
                reports,
            } => {
                body.put_u32(*ssrc);
                body.put_u64(*ntp_timestamp);
                body.put_u32(*rtp_timestamp);
                body.put_u32(*packet_count);
                body.put_u32(*octet_count);
                reports.iter().for_each(|r| r.write(&mut body));
                reports.len()
            }
            RTCPPacket::ReceiverReport { ssrc, reports } => {
                body.put_u32(*ssrc);
                reports.iter().for_each(|r| r.write(&mut body));
                reports.len()
            }
            RTCPPacket::SourceDescription { chunks } => {
                for (ssrc, items) in chunks {
                    let start = body.len();
                    body.put_u32(*ssrc);
                    for (kind, value) in items {
                        let value = &value.as_bytes()[..value.len().min(255)];
                        body.put_u8(*kind);
                        body.put_u8(value.len() as u8);
                        body.put_slice(value);
                    }
                    body.put_u8(0);
                    while (body.len() - start) % 4 != 0 {
                        body.put_u8(0);
                    }
                }
                chunks.len()
            }
            RTCPPacket::Goodbye { sources, reason } => {
                sources.iter().for_each(|s| body.put_u32(*s));
                if let Some(reason) = reason {
                    let reason = &reason.as_bytes()[..reason.len().min(255)];
                    body.put_u8(reason.len() as u8);
                    body.put_slice(reason);
                    while body.len() % 4 != 0 {
                        body.put_u8(0);
                    }
                }
                sources.len()
            }
            RTCPPacket::ApplicationDefined { ssrc, name, data } => {
                body.put_u32(*ssrc);
                body.put_slice(name);
                body.put_slice(data);
                while body.len() % 4 != 0 {
                    body.put_u8(0);
                }
                0
            }
        };

        let pt = match self.packet_type() {
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Goodbye => 203,
            PacketType::ApplicationDefined => 204,
        };
        let mut out = BytesMut::with_capacity(4 + body.len());
        out.put_u8(0x80 | (count.min(31) as u8));
        out.put_u8(pt);
        out.put_u16((body.len() / 4) as u16);
        out.put_slice(&body);
        out.freeze()
    }
}

/// Get current NTP timestamp (64-bit fixed point, seconds since 1900)
pub fn get_ntp_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let ntp_seconds = now.as_secs() + NTP_UNIX_OFFSET;
    let ntp_fraction = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000;

    (ntp_seconds << 32) | ntp_fraction
}

/// Seconds between 1900-01-01 and 1970-01-01.
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Converts a 64-bit NTP timestamp to milliseconds since 1900.
pub fn ntp_to_millis(ntp: u64) -> u64 {
    (ntp >> 32) * 1000 + (((ntp & 0xFFFF_FFFF) * 1000) >> 32)
}

/// Middle 32 bits of an NTP timestamp, as carried in LSR fields.
pub fn ntp_middle(ntp: u64) -> u32 {
    (ntp >> 16) as u32
}

#[cfg(test)]
mod tests;
