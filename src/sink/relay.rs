use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink as ByteSink, SinkExt};
use log::debug;
use std::fmt::Display;
use std::time::Duration;

use super::Sink;
use crate::pipeline::Segment;
use crate::{PipeError, Result};

/// Relays segment bytes to any `futures::Sink<Bytes>`, such as a framed
/// socket or a channel feeding a network server.
#[derive(Debug)]
pub struct RelaySink<S> {
    inner: S,
    position: Duration,
    sent: usize,
}

impl<S> RelaySink<S>
where
    S: ByteSink<Bytes> + Unpin + Send,
    S::Error: Display,
{
    /// Relays segments into `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            position: Duration::ZERO,
            sent: 0,
        }
    }

    /// Segments relayed so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

#[async_trait]
impl<S> Sink for RelaySink<S>
where
    S: ByteSink<Bytes> + Unpin + Send,
    S::Error: Display,
{
    async fn append_segment(&mut self, segment: &Segment) -> Result<()> {
        self.inner
            .send(segment.data.clone())
            .await
            .map_err(|e| PipeError::Transport(format!("relay: {}", e)))?;
        self.sent += 1;
        self.position = self.position.max(Duration::from_secs_f64(segment.end_seconds()));
        Ok(())
    }

    async fn end_of_stream(&mut self) -> Result<()> {
        debug!("relay closing after {} segment(s)", self.sent);
        self.inner
            .close()
            .await
            .map_err(|e| PipeError::Transport(format!("relay: {}", e)))
    }

    fn current_position(&self) -> Duration {
        self.position
    }
}
