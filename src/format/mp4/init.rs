use bytes::Bytes;
use log::{debug, warn};

use super::boxes::{write_descriptor, BoxWriter, UNITY_MATRIX};
use crate::av::{CodecType, MediaKind, Track};
use crate::codec::aac::{parse_config_hex, synthesize_config, AudioSpecificConfig};
use crate::codec::h264::{parse_sprop_parameter_sets, parse_sps};

/// Movie timescale; tracks carry their own.
const MOVIE_TIMESCALE: u32 = 1000;

/// How a track's samples are described in `stsd`.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEntry {
    /// `avc1` with an `avcC` built from `sprop-parameter-sets`
    Avc {
        /// First SPS, when known
        sps: Option<Bytes>,
        /// First PPS, when known
        pps: Option<Bytes>,
        /// Width from the SPS, 0 if unknown
        width: u16,
        /// Height from the SPS, 0 if unknown
        height: u16,
    },
    /// `mp4a` with an `esds` carrying the AudioSpecificConfig
    Aac {
        /// Decoded AudioSpecificConfig
        config: AudioSpecificConfig,
        /// Channel count for the sample entry
        channels: u16,
        /// Sampling rate in Hz
        sample_rate: u32,
    },
    /// Audio entry with no codec box, such as `ulaw` and `alaw`
    Audio {
        /// Sample entry type
        fourcc: [u8; 4],
        /// Channel count for the sample entry
        channels: u16,
    },
    /// Visual entry with no codec box
    Visual {
        /// Sample entry type
        fourcc: [u8; 4],
    },
}

/// Everything the muxer needs to describe one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescription {
    /// `tkhd`/`tfhd` track id, the track index plus one
    pub track_id: u32,
    /// RTP payload type of the track
    pub payload_type: u8,
    /// Audio or video
    pub kind: MediaKind,
    /// Codec
    pub codec: CodecType,
    /// Media timescale, the RTP clock rate
    pub timescale: u32,
    /// `trex` default, also the fallback duration of a lone last sample
    pub default_duration: u32,
    /// `stsd` entry
    pub entry: SampleEntry,
}

impl TrackDescription {
    /// Describes a negotiated track.
    pub fn from_track(track: &Track) -> Self {
        let timescale = track.clock_rate.max(1);
        let codec = track.codec();
        let channels = track.channels.unwrap_or(1).max(1);

        let (entry, default_duration) = match codec {
            CodecType::H264 => (avc_entry(track), timescale / 25),
            CodecType::AAC => match aac_config(track) {
                Some(config) => {
                    let channels = match config.channel_configuration {
                        0 => channels,
                        n => n as u16,
                    };
                    let sample_rate = config.sample_rate().unwrap_or(timescale);
                    (
                        SampleEntry::Aac {
                            config,
                            channels,
                            sample_rate,
                        },
                        1024,
                    )
                }
                None => (
                    SampleEntry::Audio {
                        fourcc: fourcc(&track.encoding),
                        channels,
                    },
                    1024,
                ),
            },
            CodecType::PCMU => (
                SampleEntry::Audio {
                    fourcc: *b"ulaw",
                    channels,
                },
                timescale / 50,
            ),
            CodecType::PCMA => (
                SampleEntry::Audio {
                    fourcc: *b"alaw",
                    channels,
                },
                timescale / 50,
            ),
            CodecType::Unknown if track.kind == MediaKind::Audio => (
                SampleEntry::Audio {
                    fourcc: fourcc(&track.encoding),
                    channels,
                },
                timescale / 50,
            ),
            CodecType::Unknown => (
                SampleEntry::Visual {
                    fourcc: fourcc(&track.encoding),
                },
                timescale / 25,
            ),
        };

        Self {
            track_id: track.index as u32 + 1,
            payload_type: track.payload_type,
            kind: track.kind,
            codec,
            timescale,
            default_duration: default_duration.max(1),
            entry,
        }
    }

    /// Whether this is a video track.
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// RFC 6381 codec string.
    pub fn codec_string(&self) -> String {
        match &self.entry {
            SampleEntry::Avc { sps: Some(sps), .. } if sps.len() >= 4 => {
                format!("avc1.{:02X}{:02X}{:02X}", sps[1], sps[2], sps[3])
            }
            SampleEntry::Avc { .. } => "avc1.42C01E".to_string(),
            SampleEntry::Aac { config, .. } => {
                let object_type = config.raw.first().map_or(2, |b| b >> 3);
                format!("mp4a.40.{}", object_type)
            }
            SampleEntry::Audio { fourcc, .. } | SampleEntry::Visual { fourcc } => {
                String::from_utf8_lossy(fourcc).trim_end().to_string()
            }
        }
    }
}

fn fourcc(encoding: &str) -> [u8; 4] {
    let mut code = *b"    ";
    for (slot, byte) in code.iter_mut().zip(encoding.to_ascii_lowercase().bytes()) {
        *slot = byte;
    }
    code
}

fn avc_entry(track: &Track) -> SampleEntry {
    let (sps, pps) = match track.fmtp("sprop-parameter-sets").map(parse_sprop_parameter_sets) {
        Some(Ok((sps, pps))) => (sps.into_iter().next(), pps.into_iter().next()),
        Some(Err(e)) => {
            warn!("track {}: {}", track.index, e);
            (None, None)
        }
        None => {
            debug!("track {}: no sprop-parameter-sets, expecting in-band SPS/PPS", track.index);
            (None, None)
        }
    };
    let (width, height) = sps
        .as_ref()
        .and_then(|sps| parse_sps(sps).ok())
        .map_or((0, 0), |info| (info.width as u16, info.height as u16));
    SampleEntry::Avc {
        sps,
        pps,
        width,
        height,
    }
}

fn aac_config(track: &Track) -> Option<AudioSpecificConfig> {
    if let Some(hex) = track.fmtp("config") {
        match parse_config_hex(hex) {
            Ok(config) => return Some(config),
            Err(e) => warn!("track {}: {}", track.index, e),
        }
    }
    let channels = track.channels.unwrap_or(1).min(15) as u8;
    synthesize_config(track.clock_rate, channels)
        .map_err(|e| warn!("track {}: {}", track.index, e))
        .ok()
}

/// MIME type for the whole presentation, as a media source would want it.
pub fn mime_type(tracks: &[TrackDescription]) -> String {
    let container = if tracks.iter().any(TrackDescription::is_video) {
        "video/mp4"
    } else {
        "audio/mp4"
    };
    let codecs: Vec<String> = tracks.iter().map(TrackDescription::codec_string).collect();
    format!("{}; codecs=\"{}\"", container, codecs.join(", "))
}

/// Serializes `ftyp` and an empty-sample-table `moov` for fragmented output.
pub fn init_segment(tracks: &[TrackDescription]) -> Bytes {
    let mut w = BoxWriter::new();

    w.begin(b"ftyp")
        .bytes(b"isom")
        .u32(0x200)
        .bytes(b"isom")
        .bytes(b"iso5")
        .bytes(b"iso6")
        .bytes(b"mp41");
    if tracks.iter().any(|t| t.codec == CodecType::H264) {
        w.bytes(b"avc1");
    }
    w.end();

    w.begin(b"moov");
    w.begin_full(b"mvhd", 0, 0)
        .u32(0) // creation time
        .u32(0) // modification time
        .u32(MOVIE_TIMESCALE)
        .u32(0) // duration unknown while live
        .u32(0x0001_0000) // rate 1.0
        .u16(0x0100) // volume 1.0
        .zeros(10);
    for m in UNITY_MATRIX {
        w.u32(m);
    }
    w.zeros(24)
        .u32(tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1)
        .end();

    for track in tracks {
        write_trak(&mut w, track);
    }

    w.begin(b"mvex");
    for track in tracks {
        w.begin_full(b"trex", 0, 0)
            .u32(track.track_id)
            .u32(1) // sample description index
            .u32(track.default_duration)
            .u32(0) // default size
            .u32(0) // default flags
            .end();
    }
    w.end();

    w.end();
    w.finish()
}

fn write_trak(w: &mut BoxWriter, track: &TrackDescription) {
    let (width, height) = match track.entry {
        SampleEntry::Avc { width, height, .. } => (width as u32, height as u32),
        _ => (0, 0),
    };
    let audio = !track.is_video();

    w.begin(b"trak");
    w.begin_full(b"tkhd", 0, 0x000003)
        .u32(0)
        .u32(0)
        .u32(track.track_id)
        .u32(0) // reserved
        .u32(0) // duration
        .zeros(8)
        .u16(0) // layer
        .u16(0) // alternate group
        .u16(if audio { 0x0100 } else { 0 })
        .u16(0);
    for m in UNITY_MATRIX {
        w.u32(m);
    }
    w.u32(width << 16).u32(height << 16).end();

    w.begin(b"mdia");
    w.begin_full(b"mdhd", 0, 0)
        .u32(0)
        .u32(0)
        .u32(track.timescale)
        .u32(0)
        .u16(0x55C4) // "und"
        .u16(0)
        .end();
    let (handler, name): (&[u8; 4], &[u8]) = if audio {
        (b"soun", &b"SoundHandler\0"[..])
    } else {
        (b"vide", &b"VideoHandler\0"[..])
    };
    w.begin_full(b"hdlr", 0, 0)
        .u32(0)
        .bytes(handler)
        .zeros(12)
        .bytes(name)
        .end();

    w.begin(b"minf");
    if audio {
        w.begin_full(b"smhd", 0, 0).u16(0).u16(0).end();
    } else {
        w.begin_full(b"vmhd", 0, 1).u16(0).zeros(6).end();
    }
    w.begin(b"dinf");
    w.begin_full(b"dref", 0, 0).u32(1);
    w.begin_full(b"url ", 0, 1).end();
    w.end().end();

    w.begin(b"stbl");
    w.begin_full(b"stsd", 0, 0).u32(1);
    write_sample_entry(w, track);
    w.end();
    w.begin_full(b"stts", 0, 0).u32(0).end();
    w.begin_full(b"stsc", 0, 0).u32(0).end();
    w.begin_full(b"stsz", 0, 0).u32(0).u32(0).end();
    w.begin_full(b"stco", 0, 0).u32(0).end();
    w.end(); // stbl
    w.end(); // minf
    w.end(); // mdia
    w.end(); // trak
}

fn begin_visual_entry(w: &mut BoxWriter, fourcc: &[u8; 4], width: u16, height: u16) {
    w.begin(fourcc)
        .zeros(6)
        .u16(1) // data reference index
        .zeros(16)
        .u16(width)
        .u16(height)
        .u32(0x0048_0000) // 72 dpi
        .u32(0x0048_0000)
        .u32(0)
        .u16(1) // frame count
        .zeros(32) // compressor name
        .u16(0x0018)
        .u16(0xFFFF);
}

fn begin_audio_entry(w: &mut BoxWriter, fourcc: &[u8; 4], channels: u16, sample_rate: u32) {
    w.begin(fourcc)
        .zeros(6)
        .u16(1)
        .zeros(8)
        .u16(channels)
        .u16(16) // sample size
        .u16(0)
        .u16(0)
        .u32(sample_rate.min(0xFFFF) << 16);
}

fn write_sample_entry(w: &mut BoxWriter, track: &TrackDescription) {
    match &track.entry {
        SampleEntry::Avc {
            sps,
            pps,
            width,
            height,
        } => {
            begin_visual_entry(w, b"avc1", *width, *height);
            let profile = match sps {
                Some(sps) if sps.len() >= 4 => [sps[1], sps[2], sps[3]],
                _ => [0x42, 0xC0, 0x1E],
            };
            w.begin(b"avcC")
                .u8(1)
                .bytes(&profile)
                .u8(0xFF); // 4-byte NAL lengths
            match sps {
                Some(sps) => {
                    w.u8(0xE1).u16(sps.len() as u16).bytes(sps);
                }
                None => {
                    w.u8(0xE0);
                }
            }
            match pps {
                Some(pps) => {
                    w.u8(1).u16(pps.len() as u16).bytes(pps);
                }
                None => {
                    w.u8(0);
                }
            }
            w.end();
            w.end();
        }
        SampleEntry::Aac {
            config,
            channels,
            sample_rate,
        } => {
            begin_audio_entry(w, b"mp4a", *channels, *sample_rate);

            let mut specific = BoxWriter::new();
            write_descriptor(&mut specific, 0x05, &config.raw);
            let mut decoder = BoxWriter::new();
            decoder
                .u8(0x40) // MPEG-4 audio
                .u8(0x15) // audio stream
                .bytes(&[0, 0, 0]) // buffer size
                .u32(0)
                .u32(0)
                .bytes(&specific.finish());
            let mut es = BoxWriter::new();
            es.u16(track.track_id as u16).u8(0);
            write_descriptor(&mut es, 0x04, &decoder.finish());
            write_descriptor(&mut es, 0x06, &[0x02]);

            w.begin_full(b"esds", 0, 0);
            write_descriptor(w, 0x03, &es.finish());
            w.end();
            w.end();
        }
        SampleEntry::Audio { fourcc, channels } => {
            begin_audio_entry(w, fourcc, *channels, track.timescale);
            w.end();
        }
        SampleEntry::Visual { fourcc } => {
            begin_visual_entry(w, fourcc, 0, 0);
            w.end();
        }
    }
}
