use log::debug;
use std::collections::HashMap;
use std::str::FromStr;

use crate::av::{MediaKind, Track};
use crate::{PipeError, Result};

/// Tracks and session-level control extracted from a description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDescription {
    /// `s=` line
    pub session_name: Option<String>,
    /// Session-level `a=control`
    pub control: Option<String>,
    /// One entry per supported `m=` section, in order
    pub tracks: Vec<Track>,
}

/// Maps a session description body to tracks.
pub trait DescriptionParser: Send {
    /// Parses a description body.
    fn parse(&self, text: &str) -> Result<SessionDescription>;
}

/// Minimal SDP reader: `m=`, `a=rtpmap`, `a=fmtp` and `a=control`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdpParser;

struct MediaSection {
    kind: MediaKind,
    payload_type: u8,
    attributes: HashMap<String, String>,
}

/// Static payload types from RFC 3551 that need no `rtpmap`.
fn static_payload(pt: u8) -> Option<(&'static str, u32, Option<u16>)> {
    match pt {
        0 => Some(("PCMU", 8000, Some(1))),
        8 => Some(("PCMA", 8000, Some(1))),
        14 => Some(("MPA", 90000, None)),
        26 => Some(("JPEG", 90000, None)),
        _ => None,
    }
}

impl MediaSection {
    fn into_track(self, index: usize) -> Result<Track> {
        let (encoding, clock_rate, channels) = match self.attributes.get("rtpmap") {
            Some(rtpmap) => {
                // "96 H264/90000" or "97 MPEG4-GENERIC/44100/2"
                let spec = rtpmap
                    .split_once(' ')
                    .map(|(_, s)| s.trim())
                    .ok_or_else(|| PipeError::Protocol(format!("bad rtpmap: {}", rtpmap)))?;
                let mut parts = spec.split('/');
                let encoding = parts.next().unwrap_or_default().to_string();
                let clock_rate = parts
                    .next()
                    .ok_or_else(|| {
                        PipeError::Protocol(format!("rtpmap without clock rate: {}", rtpmap))
                    })
                    .and_then(|r| Ok(u32::from_str(r.trim())?))?;
                let channels = parts.next().and_then(|c| c.trim().parse().ok());
                (encoding, clock_rate, channels)
            }
            None => {
                let (name, rate, channels) = static_payload(self.payload_type).ok_or_else(|| {
                    PipeError::Protocol(format!("no rtpmap for payload type {}", self.payload_type))
                })?;
                (name.to_string(), rate, channels)
            }
        };

        let mut track = Track::new(index, self.kind, self.payload_type, &encoding, clock_rate);
        track.channels = channels;

        if let Some(fmtp) = self.attributes.get("fmtp") {
            let params = fmtp.split_once(' ').map(|(_, p)| p).unwrap_or_default();
            for param in params.split(';') {
                if let Some((key, value)) = param.trim().split_once('=') {
                    track = track.with_fmtp(key.trim(), value.trim());
                }
            }
        }
        if let Some(control) = self.attributes.get("control") {
            track = track.with_control(control);
        }
        Ok(track)
    }
}

impl DescriptionParser for SdpParser {
    fn parse(&self, content: &str) -> Result<SessionDescription> {
        let mut sdp = SessionDescription::default();
        let mut sections: Vec<MediaSection> = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Each line must be of the form <type>=<value>
            let (typ, value) = match line.split_once('=') {
                Some((t, v)) if t.len() == 1 => (t, v.trim()),
                _ => return Err(PipeError::Protocol(format!("invalid SDP line: {}", line))),
            };

            match (typ, sections.last_mut()) {
                ("s", None) => sdp.session_name = Some(value.to_string()),
                ("m", _) => {
                    // <media> <port> <proto> <fmt> ...
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() < 4 {
                        return Err(PipeError::Protocol("invalid media description".into()));
                    }
                    sections.push(MediaSection {
                        kind: MediaKind::parse(parts[0]),
                        payload_type: u8::from_str(parts[3])?,
                        attributes: HashMap::new(),
                    });
                }
                ("a", section) => {
                    let (name, val) = value.split_once(':').unwrap_or((value, ""));
                    match section {
                        Some(media) => {
                            // Keep the attributes of the first payload type only.
                            let first = !media.attributes.contains_key(name);
                            let own_pt = val
                                .split_whitespace()
                                .next()
                                .and_then(|pt| pt.parse::<u8>().ok())
                                .map_or(true, |pt| pt == media.payload_type);
                            if first && (own_pt || !matches!(name, "rtpmap" | "fmtp")) {
                                media.attributes.insert(name.to_string(), val.to_string());
                            }
                        }
                        None if name == "control" => sdp.control = Some(val.to_string()),
                        None => {}
                    }
                }
                _ => {}
            }
        }

        for (index, section) in sections.into_iter().enumerate() {
            let track = section.into_track(index)?;
            debug!(
                "track {}: {:?} {} pt={} clock={}",
                index, track.kind, track.encoding, track.payload_type, track.clock_rate
            );
            sdp.tracks.push(track);
        }

        if sdp.tracks.is_empty() {
            return Err(PipeError::Protocol("no media sections found in SDP".into()));
        }
        Ok(sdp)
    }
}

/// Joins a control attribute onto a base URL.
///
/// Absolute URLs are kept, `*` means the base itself, anything else is
/// appended with a single `/`.
pub fn resolve_control(base: &str, control: &str) -> String {
    if control.contains("://") {
        control.to_string()
    } else if control.is_empty() || control == "*" {
        base.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            control.trim_start_matches('/')
        )
    }
}
