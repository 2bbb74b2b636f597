//! RTSP client: a sans-IO session that negotiates and demultiplexes
//! interleaved media, and a driver that runs it over a byte transport.

/// Basic and Digest authentication
pub mod auth;
/// Client driver over a transport
pub mod client;
/// Byte transports
pub mod connection;
/// Control connection framing
pub mod parser;
/// Outbound requests
pub mod request;
/// Session descriptions
pub mod sdp;
/// Session state machine
pub mod session;
/// Per-track reception statistics
pub mod stats;
/// `Transport` header
pub mod transport;

pub use auth::{Authenticator, Credentials, HttpAuthenticator};
pub use client::{ClientHandle, RtspClient};
pub use connection::{StreamTransport, TcpTransport, Transport};
pub use request::Method;
pub use sdp::{DescriptionParser, SdpParser, SessionDescription};
pub use session::{RtspSession, SessionHandle, SessionState};
pub use stats::ReceptionStats;
pub use transport::{CastType, TransportInfo};
