//! # ESS Link Session
//!
//! This module owns the byte-stream link to the controller: opening the serial
//! port, the non-blocking read used by the polling loop, and CR-LF terminated
//! line writes used by the command path.
//!
//! The session is split into an independent [`SessionReader`] and
//! [`SessionWriter`] so the polling task can own the read direction while
//! commands write concurrently; each `write_line` call puts one whole line on
//! the wire.

use crate::constants::{DEFAULT_BAUDRATE, DEFAULT_SERIAL_TIMEOUT, LINE_TERMINATOR, READ_CHUNK_SIZE};
use crate::error::{EssError, Result};
use bytes::{Bytes, BytesMut};
use log::{info, trace};
use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio_serial::SerialPortBuilderExt;

/// Anything the session can run over: a serial stream, or a mock in tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

type BoxedTransport = Box<dyn Transport>;

/// Configuration for serial connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: DEFAULT_BAUDRATE,
            timeout: DEFAULT_SERIAL_TIMEOUT,
        }
    }
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// An open link to one controller.
pub struct LinkSession {
    endpoint: String,
    transport: BoxedTransport,
}

impl LinkSession {
    /// Opens the serial port at `endpoint` (8N1).
    ///
    /// Must be called from within a tokio runtime. Failures are returned as
    /// [`EssError::Connect`] and never retried.
    pub fn open(endpoint: &str, config: &SerialConfig) -> Result<Self> {
        let port = tokio_serial::new(endpoint, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| EssError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        info!("Opened {endpoint} at {} baud", config.baudrate);
        Ok(Self::from_transport(endpoint, port))
    }

    /// Wraps an already-open transport.
    pub fn from_transport(endpoint: &str, transport: impl Transport) -> Self {
        LinkSession {
            endpoint: endpoint.to_string(),
            transport: Box::new(transport),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Splits into independently owned read and write directions.
    pub fn into_split(self) -> (SessionReader, SessionWriter) {
        let (read, write) = tokio::io::split(self.transport);
        (SessionReader { inner: read }, SessionWriter { inner: write })
    }
}

/// Read direction of a session.
pub struct SessionReader {
    inner: ReadHalf<BoxedTransport>,
}

impl SessionReader {
    /// Returns every byte that is ready right now, possibly none. Never waits for data.
    ///
    /// Reads repeatedly until the link has nothing more, so a backlog is drained
    /// in one call. A zero-length read is reported as "nothing available", not
    /// as end of stream.
    pub async fn read_available(&mut self) -> Result<Bytes> {
        let mut received = BytesMut::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = self.read_chunk(&mut chunk).await?;
            if n == 0 {
                break;
            }
            trace!("rx {}", hex::encode(&chunk[..n]));
            received.extend_from_slice(&chunk[..n]);
        }
        Ok(received.freeze())
    }

    /// One non-blocking read; `Pending` counts as zero bytes.
    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize> {
        let reader = &mut self.inner;
        let n = poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut *chunk);
            match Pin::new(&mut *reader).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.filled().len())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Ready(Ok(0)),
            }
        })
        .await?;
        Ok(n)
    }
}

/// Write direction of a session.
pub struct SessionWriter {
    inner: WriteHalf<BoxedTransport>,
}

impl SessionWriter {
    /// Writes `text` followed by CR-LF and flushes.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = BytesMut::with_capacity(text.len() + LINE_TERMINATOR.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(LINE_TERMINATOR.as_bytes());

        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        trace!("tx {}", hex::encode(&line));
        Ok(())
    }

    /// Shuts the write direction down; errors are irrelevant at this point.
    pub async fn close(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}
