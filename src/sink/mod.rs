//! Where the muxer's segments end up.
//!
//! A [`Sink`] only sees finished ISO-BMFF segments; [`SinkComponent`] adapts
//! one to the pipeline so it can sit at the tail of a chain.

mod buffered;
mod file;
mod relay;

pub use buffered::BufferedSink;
pub use file::FileSink;
pub use relay::RelaySink;

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use crate::pipeline::{Component, Envelope, Outputs, Segment};
use crate::Result;

/// Consumer of fragmented MP4 output.
#[async_trait]
pub trait Sink: Send {
    /// Appends one init or media segment. Returns once the segment is accepted.
    async fn append_segment(&mut self, segment: &Segment) -> Result<()>;

    /// No more segments will follow.
    async fn end_of_stream(&mut self) -> Result<()>;

    /// Presentation time the consumer has reached.
    fn current_position(&self) -> Duration;
}

/// Pipeline stage feeding [`Envelope::Isom`] segments into a [`Sink`].
///
/// Segments are consumed here; everything else continues downstream,
/// including the end-of-stream marker once the sink has been told.
#[derive(Debug)]
pub struct SinkComponent<S> {
    sink: S,
    ended: bool,
}

impl<S: Sink> SinkComponent<S> {
    /// Wraps a sink.
    pub fn new(sink: S) -> Self {
        Self { sink, ended: false }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwraps the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    async fn finish(&mut self) -> Result<()> {
        if !self.ended {
            self.ended = true;
            debug!("sink reached end of stream at {:?}", self.sink.current_position());
            self.sink.end_of_stream().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Sink> Component for SinkComponent<S> {
    fn name(&self) -> &str {
        "sink"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Isom(segment) => self.sink.append_segment(&segment).await?,
            Envelope::EndOfStream => {
                self.finish().await?;
                out.forward(Envelope::EndOfStream);
            }
            other => out.forward(other),
        }
        Ok(())
    }

    async fn close(&mut self, _out: &mut Outputs) -> Result<()> {
        self.finish().await
    }
}
