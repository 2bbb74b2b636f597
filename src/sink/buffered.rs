use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::Sink;
use crate::config::SinkConfig;
use crate::pipeline::Segment;
use crate::{PipeError, Result};

#[derive(Debug, Default)]
struct BufferState {
    init: Option<Segment>,
    segments: VecDeque<Segment>,
    position: Duration,
    appends: usize,
    evicted: usize,
    ended: bool,
}

/// In-memory segment buffer standing in for a media presentation element.
///
/// Clones share the same buffer: the pipeline appends through one while the
/// player reads and reports its position through another. Every
/// `trim_interval` appends, media ending more than `retention` behind the
/// reported position is evicted.
#[derive(Debug, Clone)]
pub struct BufferedSink {
    state: Arc<Mutex<BufferState>>,
    config: SinkConfig,
}

impl BufferedSink {
    /// An empty buffer.
    pub fn new(config: SinkConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState::default())),
            config,
        }
    }

    /// The init segment, once received.
    pub fn init_segment(&self) -> Option<Segment> {
        self.state.lock().init.clone()
    }

    /// Media segments still buffered, oldest first.
    pub fn segments(&self) -> Vec<Segment> {
        self.state.lock().segments.iter().cloned().collect()
    }

    /// Buffered media range in seconds, `None` when empty.
    pub fn buffered(&self) -> Option<(f64, f64)> {
        let state = self.state.lock();
        let start = state.segments.iter().map(Segment::start_seconds).reduce(f64::min)?;
        let end = state.segments.iter().map(Segment::end_seconds).reduce(f64::max)?;
        Some((start, end))
    }

    /// Called by the reader as playback advances.
    pub fn set_position(&self, position: Duration) {
        self.state.lock().position = position;
    }

    /// Whether the stream has ended.
    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Segments evicted so far.
    pub fn evicted(&self) -> usize {
        self.state.lock().evicted
    }

    fn trim(state: &mut BufferState, retention: Duration) {
        let Some(horizon) = state.position.checked_sub(retention) else {
            return;
        };
        let horizon = horizon.as_secs_f64();
        let before = state.segments.len();
        state.segments.retain(|s| s.end_seconds() > horizon);
        let removed = before - state.segments.len();
        if removed > 0 {
            state.evicted += removed;
            debug!("evicted {} segment(s) ending before {:.3}s", removed, horizon);
        }
    }
}

#[async_trait]
impl Sink for BufferedSink {
    async fn append_segment(&mut self, segment: &Segment) -> Result<()> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(PipeError::Pipeline("append after end of stream".into()));
        }
        if segment.is_init() {
            if state.init.is_some() {
                info!("replacing init segment");
            }
            state.init = Some(segment.clone());
            return Ok(());
        }

        state.segments.push_back(segment.clone());
        state.appends += 1;
        if self.config.trim_interval > 0 && state.appends % self.config.trim_interval == 0 {
            Self::trim(&mut state, self.config.retention);
        }
        Ok(())
    }

    async fn end_of_stream(&mut self) -> Result<()> {
        self.state.lock().ended = true;
        Ok(())
    }

    fn current_position(&self) -> Duration {
        self.state.lock().position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SegmentKind;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn fragment(seq: u32, start_secs: u64) -> Segment {
        Segment {
            kind: SegmentKind::Fragment,
            data: Bytes::from_static(b"moof"),
            sequence_number: seq,
            track_id: 1,
            base_decode_time: start_secs * 1000,
            timescale: 1000,
            sample_count: 1,
            duration: 1000,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn test_trims_behind_position_on_interval() {
        let config = SinkConfig {
            trim_interval: 4,
            retention: Duration::from_secs(2),
        };
        let mut sink = BufferedSink::new(config);
        let reader = sink.clone();
        reader.set_position(Duration::from_secs(5));

        for i in 0..3 {
            sink.append_segment(&fragment(i + 1, i as u64)).await.unwrap();
        }
        // Not yet at the interval.
        assert_eq!(reader.segments().len(), 3);

        sink.append_segment(&fragment(4, 3)).await.unwrap();
        // [0,1) [1,2) [2,3) end at or before 5 - 2 = 3s; [3,4) stays.
        let kept: Vec<u32> = reader.segments().iter().map(|s| s.sequence_number).collect();
        assert_eq!(kept, vec![4]);
        assert_eq!(reader.evicted(), 3);
        assert_eq!(reader.buffered(), Some((3.0, 4.0)));
    }

    #[tokio::test]
    async fn test_nothing_trimmed_near_start() {
        let config = SinkConfig {
            trim_interval: 1,
            retention: Duration::from_secs(10),
        };
        let mut sink = BufferedSink::new(config);
        sink.set_position(Duration::from_secs(3));
        sink.append_segment(&fragment(1, 0)).await.unwrap();
        assert_eq!(sink.segments().len(), 1);
        assert_eq!(sink.current_position(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_rejects_append_after_end() {
        let mut sink = BufferedSink::new(SinkConfig::default());
        let init = Segment::init(Bytes::from_static(b"ftyp"), "video/mp4".into());
        sink.append_segment(&init).await.unwrap();
        assert_eq!(sink.buffered(), None);
        sink.end_of_stream().await.unwrap();
        assert!(sink.append_segment(&fragment(1, 0)).await.is_err());
    }
}
