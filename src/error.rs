use std::num::ParseIntError;
use thiserror::Error;

/// Errors produced anywhere in the ingest pipeline.
#[derive(Error, Debug)]
pub enum PipeError {
    /// I/O failure on a transport or file sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed RTSP message or unmatched CSeq. Only the affected exchange is lost.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection loss or an unusable transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed RTP, RTCP or NAL payload.
    #[error("media error: {0}")]
    Media(String),

    /// Decode-time violation while building fragments.
    #[error("mux error: {0}")]
    Mux(String),

    /// The server rejected our credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// Session establishment or keepalive failed for good.
    #[error("session error: {0}")]
    Session(String),

    /// Misuse of the pipeline API (bad stage index, missing handler, ...).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Structurally invalid input that does not fit another category.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Numeric header or attribute failed to parse.
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl PipeError {
    /// Whether the error tears the session down.
    ///
    /// Protocol, media and mux errors are recovered locally: the exchange or the
    /// access unit is dropped and the pipeline keeps flowing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipeError::Io(_)
                | PipeError::Transport(_)
                | PipeError::Auth(_)
                | PipeError::Session(_)
                | PipeError::Pipeline(_)
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipeError>;
