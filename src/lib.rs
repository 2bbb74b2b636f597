#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # rtspipe - RTSP to fragmented MP4
//!
//! `rtspipe` pulls a live stream over RTSP with interleaved RTP/RTCP,
//! rebuilds access units from the RTP payloads and re-packages them as
//! fragmented ISO-BMFF segments that a media source buffer, a file or a
//! network relay can consume.
//!
//! ## Features
//!
//! - RTSP/1.0 session state machine: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE,
//!   TEARDOWN, Basic/Digest authentication, keepalives and receiver reports
//! - RTP/RTCP packet views and serialization
//! - Depacketizers for H.264 (single NAL, STAP-A, FU-A), AAC (RFC 3640) and
//!   payloads that need no reassembly
//! - Fragmenting MP4 muxer with decode-time continuity and bounded reordering
//! - Buffered, file and relay sinks
//!
//! Every stage is a [`pipeline::Component`]; stages are chained into a
//! [`pipeline::Pipeline`] and driven by [`format::rtsp::RtspClient`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use rtspipe::config::Config;
//! use rtspipe::format::depay::{AacDepacketizer, H264Depacketizer};
//! use rtspipe::format::mp4::Mp4Muxer;
//! use rtspipe::format::rtsp::{RtspClient, RtspSession, TcpTransport};
//! use rtspipe::sink::{FileSink, SinkComponent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load();
//!     let url = url::Url::parse(&config.rtsp_url)?;
//!     let transport = TcpTransport::connect_url(&url).await?;
//!     let session = RtspSession::from_config(&config)?;
//!
//!     let mut client = RtspClient::new(transport, session)
//!         .then(H264Depacketizer::new())
//!         .then(AacDepacketizer::new())
//!         .then(Mp4Muxer::new(config.mux.clone()))
//!         .then(SinkComponent::new(FileSink::create("out.mp4").await?));
//!
//!     let handle = client.handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!         let _ = handle.teardown().await;
//!     });
//!     client.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `pipeline`: envelopes, components and the bidirectional pipeline
//! - `format`: RTP/RTCP, RTSP, depacketizers and the MP4 muxer
//! - `sink`: consumers of the muxer's segments
//! - `av`: tracks and access units
//! - `codec`: H.264 SPS and AAC AudioSpecificConfig parsing
//! - `config`: runtime configuration
//! - `error`: the crate error type
//! - `utils`: bit-level reading

/// Tracks and access units
pub mod av;

/// Codec parameter parsing
pub mod codec;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// RTP/RTCP, RTSP, depacketizers and the MP4 muxer
pub mod format;

/// Envelopes, components and the pipeline that connects them
pub mod pipeline;

/// Segment consumers
pub mod sink;

/// Common utilities and helper functions
pub mod utils;

pub use error::{PipeError, Result};
