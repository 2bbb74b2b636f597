use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::{PipeError, Result};

/// Default RTSP port.
pub const DEFAULT_PORT: u16 = 554;

/// Duplex byte channel carrying the RTSP connection.
#[async_trait]
pub trait Transport: Send {
    /// Writes and flushes `data`.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Reads whatever is available; `Ok(0)` means the peer closed.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Shuts the write side down.
    async fn close(&mut self) -> Result<()>;
}

/// [`Transport`] over any tokio byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S> {
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf).await?)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// RTSP over TCP.
pub type TcpTransport = StreamTransport<TcpStream>;

impl StreamTransport<TcpStream> {
    /// Connects to `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| PipeError::Transport(format!("failed to connect to {}: {}", addr, e)))?;

        stream.set_nodelay(true)?;
        debug!("connected to {}", addr);
        Ok(Self::new(stream))
    }

    /// Connects to the host and port of an `rtsp://` URL.
    pub async fn connect_url(url: &Url) -> Result<Self> {
        if url.scheme() != "rtsp" {
            return Err(PipeError::Transport("URL scheme is not 'rtsp'".into()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| PipeError::Transport("no host in URL".into()))?;
        Self::connect(host, url.port().unwrap_or(DEFAULT_PORT)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_stream_transport_round_trip() {
        let mock = Builder::new()
            .write(b"OPTIONS * RTSP/1.0\r\n")
            .read(b"RTSP/1.0 200 OK\r\n")
            .build();
        let mut transport = StreamTransport::new(mock);

        transport.write_all(b"OPTIONS * RTSP/1.0\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"RTSP/1.0 200 OK\r\n");
        // The mock is exhausted, which reads as end of stream.
        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_other_schemes() {
        let url = Url::parse("http://example.com/").unwrap();
        assert!(matches!(
            TcpTransport::connect_url(&url).await,
            Err(PipeError::Transport(_))
        ));
    }
}
