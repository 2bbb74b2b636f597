use std::collections::HashMap;
use std::fmt;

/// Parsed `Transport` header.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportInfo {
    /// Transport spec, such as `RTP/AVP/TCP`
    pub protocol: String,
    /// Unicast or multicast
    pub cast_type: CastType,
    /// Interleaved RTP/RTCP channel pair, for RTP over the RTSP connection
    pub interleaved: Option<(u8, u8)>,
    /// Client RTP/RTCP ports
    pub client_port: Option<(u16, u16)>,
    /// Server RTP/RTCP ports
    pub server_port: Option<(u16, u16)>,
    /// Sender SSRC, hexadecimal on the wire
    pub ssrc: Option<u32>,
    /// `mode` parameter
    pub mode: Option<String>,
    /// Parameters not recognized above
    pub extra_params: HashMap<String, Option<String>>,
}

/// Delivery of a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum CastType {
    /// `unicast`
    Unicast,
    /// `multicast`
    Multicast,
}

fn parse_pair<T: std::str::FromStr>(value: &str) -> Option<(T, T)> {
    let (a, b) = value.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

impl TransportInfo {
    fn empty(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            cast_type: CastType::Unicast,
            interleaved: None,
            client_port: None,
            server_port: None,
            ssrc: None,
            mode: None,
            extra_params: HashMap::new(),
        }
    }

    /// `RTP/AVP/TCP;unicast;interleaved=<rtp>-<rtcp>`
    pub fn new_interleaved(rtp_channel: u8) -> Self {
        let mut info = Self::empty("RTP/AVP/TCP");
        info.interleaved = Some((rtp_channel, rtp_channel.wrapping_add(1)));
        info
    }

    /// Parses a transport string. Only the first of several comma separated
    /// alternatives is considered.
    pub fn parse(transport: &str) -> Option<Self> {
        let first = transport.split(',').next()?.trim();
        let mut parts = first.split(';');
        let protocol = parts.next()?.trim();
        if protocol.is_empty() {
            return None;
        }
        let mut info = Self::empty(protocol);

        for part in parts {
            let part = part.trim();
            match part.split_once('=') {
                None if part == "unicast" => info.cast_type = CastType::Unicast,
                None if part == "multicast" => info.cast_type = CastType::Multicast,
                None => {
                    info.extra_params.insert(part.to_string(), None);
                }
                Some(("interleaved", value)) => {
                    info.interleaved = parse_pair(value).or_else(|| {
                        // A single channel implies the next one for RTCP.
                        let rtp: u8 = value.trim().parse().ok()?;
                        Some((rtp, rtp.wrapping_add(1)))
                    });
                }
                Some(("client_port", value)) => info.client_port = parse_pair(value),
                Some(("server_port", value)) => info.server_port = parse_pair(value),
                Some(("ssrc", value)) => {
                    info.ssrc = u32::from_str_radix(value.trim().trim_start_matches("0x"), 16).ok();
                }
                Some(("mode", value)) => info.mode = Some(value.trim_matches('"').to_string()),
                Some((key, value)) => {
                    info.extra_params.insert(key.to_string(), Some(value.to_string()));
                }
            }
        }

        Some(info)
    }
}

impl fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.protocol)?;
        f.write_str(match self.cast_type {
            CastType::Unicast => ";unicast",
            CastType::Multicast => ";multicast",
        })?;
        if let Some((rtp, rtcp)) = self.interleaved {
            write!(f, ";interleaved={}-{}", rtp, rtcp)?;
        }
        if let Some((rtp, rtcp)) = self.client_port {
            write!(f, ";client_port={}-{}", rtp, rtcp)?;
        }
        if let Some((rtp, rtcp)) = self.server_port {
            write!(f, ";server_port={}-{}", rtp, rtcp)?;
        }
        if let Some(ssrc) = self.ssrc {
            write!(f, ";ssrc={:08X}", ssrc)?;
        }
        if let Some(ref mode) = self.mode {
            write!(f, ";mode={}", mode)?;
        }
        for (key, value) in &self.extra_params {
            match value {
                Some(val) => write!(f, ";{}={}", key, val)?,
                None => write!(f, ";{}", key)?,
            }
        }
        Ok(())
    }
}
