use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::Sink;
use crate::pipeline::Segment;
use crate::Result;

/// Writes the init segment and every fragment, in arrival order, to one file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
    written: u64,
    position: Duration,
}

impl FileSink {
    /// Creates or truncates `path`.
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::create(&path).await?;
        info!("recording to {}", path.display());
        Ok(Self {
            path,
            file,
            written: 0,
            position: Duration::ZERO,
        })
    }

    /// Where the recording goes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn append_segment(&mut self, segment: &Segment) -> Result<()> {
        self.file.write_all(&segment.data).await?;
        self.written += segment.data.len() as u64;
        let end = Duration::from_secs_f64(segment.end_seconds());
        self.position = self.position.max(end);
        Ok(())
    }

    async fn end_of_stream(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        info!("wrote {} bytes to {}", self.written, self.path.display());
        Ok(())
    }

    fn current_position(&self) -> Duration {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SegmentKind;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_writes_segments_in_order() {
        let path =
            std::env::temp_dir().join(format!("rtspipe-file-sink-{}.mp4", std::process::id()));
        let mut sink = FileSink::create(&path).await.unwrap();

        let init = Segment::init(Bytes::from_static(b"INIT"), "audio/mp4".into());
        let fragment = Segment {
            kind: SegmentKind::Fragment,
            data: Bytes::from_static(b"FRAG"),
            sequence_number: 1,
            track_id: 1,
            base_decode_time: 0,
            timescale: 8000,
            sample_count: 2,
            duration: 16000,
            mime_type: None,
        };
        sink.append_segment(&init).await.unwrap();
        sink.append_segment(&fragment).await.unwrap();
        sink.end_of_stream().await.unwrap();

        assert_eq!(sink.written(), 8);
        assert_eq!(sink.current_position(), Duration::from_secs(2));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"INITFRAG".to_vec());
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
