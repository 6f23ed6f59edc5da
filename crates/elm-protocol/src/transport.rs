//! Byte-Stream Transports
//!
//! Sessions see their connection only through these traits. A transport is
//! split once into a reader kept by the REPL and a writer that moves into the
//! monitor task while one is running.

use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Delay before retrying a write the transport could not accept
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(10);

#[async_trait]
pub trait TransportReader: Send {
    /// Read up to `buf.len()` bytes.
    ///
    /// Waits at most `timeout` (forever when `None`); `Ok(0)` means nothing
    /// arrived in time. End of stream is [`TransportError::Closed`].
    async fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, TransportError>;
}

#[async_trait]
pub trait TransportWriter: Send {
    /// Write some prefix of `data`; a short count means "retry the rest later"
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Tear down the write side. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A duplex connection serving one session
pub trait Transport: Send {
    /// Human-readable origin, e.g. `tcp:10.0.0.2:50123`
    fn label(&self) -> &str;

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// Write all of `data`, retrying short writes after a brief pause
pub async fn write_all(writer: &mut dyn TransportWriter, mut data: &[u8]) -> Result<(), TransportError> {
    while !data.is_empty() {
        let written = writer.write(data).await?;
        if written == 0 {
            tokio::time::sleep(WRITE_RETRY_DELAY).await;
            continue;
        }
        data = &data[written.min(data.len())..];
    }
    Ok(())
}

/// Transport over any tokio stream (TCP socket, serial port, in-memory pipe)
pub struct StreamTransport<S> {
    label: String,
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(label: impl Into<String>, stream: S) -> Self {
        Self {
            label: label.into(),
            stream,
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            Box::new(StreamReader { inner: read }),
            Box::new(StreamWriter {
                inner: write,
                closed: false,
            }),
        )
    }
}

struct StreamReader<S> {
    inner: ReadHalf<S>,
}

#[async_trait]
impl<S> TransportReader for StreamReader<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, TransportError> {
        let read = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.read(buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(0),
            },
            None => self.inner.read(buf).await?,
        };
        if read == 0 && !buf.is_empty() {
            return Err(TransportError::Closed);
        }
        Ok(read)
    }
}

struct StreamWriter<S> {
    inner: WriteHalf<S>,
    closed: bool,
}

#[async_trait]
impl<S> TransportWriter for StreamWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let written = self.inner.write(data).await?;
        self.inner.flush().await?;
        Ok(written)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.inner.shutdown().await?;
        }
        Ok(())
    }
}
