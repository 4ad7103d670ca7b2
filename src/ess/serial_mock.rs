//! Mock serial port implementation for testing
//!
//! This module provides a mock serial port that can be used to exercise the
//! link session and polling loop without a controller attached. Clones share
//! their buffers, so a test keeps one clone to script the "device" side while
//! the engine owns the other.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Mock serial port that simulates bidirectional communication
#[derive(Clone, Default)]
pub struct MockSerialPort {
    /// Data written to the port (outgoing)
    tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Data to be read from the port (incoming)
    rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Error returned by the next read
    next_read_error: Arc<Mutex<Option<io::Error>>>,
    /// Error returned by the next write
    next_write_error: Arc<Mutex<Option<io::Error>>>,
    /// Largest number of bytes handed out per read (0 = unlimited)
    max_read_chunk: Arc<AtomicUsize>,
    read_calls: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        lock(&self.rx_buffer).extend(data);
    }

    /// Queue a line as the controller would send it (CR-LF appended)
    pub fn queue_line(&self, line: &str) {
        self.queue_rx_data(line.as_bytes());
        self.queue_rx_data(b"\r\n");
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        lock(&self.tx_buffer).clone()
    }

    /// Written data split into lines, terminators removed
    pub fn sent_lines(&self) -> Vec<String> {
        let tx = String::from_utf8_lossy(&self.get_tx_data()).into_owned();
        tx.split_terminator("\r\n").map(str::to_string).collect()
    }

    /// Bytes still waiting to be read
    pub fn pending_rx(&self) -> usize {
        lock(&self.rx_buffer).len()
    }

    /// Clear all buffers
    pub fn clear(&self) {
        lock(&self.tx_buffer).clear();
        lock(&self.rx_buffer).clear();
    }

    /// Set an error to be returned on the next read
    pub fn set_next_read_error(&self, error: io::Error) {
        *lock(&self.next_read_error) = Some(error);
    }

    /// Set an error to be returned on the next write
    pub fn set_next_write_error(&self, error: io::Error) {
        *lock(&self.next_write_error) = Some(error);
    }

    /// Deliver at most `bytes` per read, to simulate a slow link
    pub fn set_max_read_chunk(&self, bytes: usize) {
        self.max_read_chunk.store(bytes, Ordering::SeqCst);
    }

    /// Number of `poll_read` calls so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `poll_write` calls so far
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

// Implement AsyncRead for MockSerialPort
impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.next_read_error).take() {
            return Poll::Ready(Err(error));
        }

        let mut rx = lock(&self.rx_buffer);
        let mut available = rx.len().min(buf.remaining());
        let max_chunk = self.max_read_chunk.load(Ordering::SeqCst);
        if max_chunk > 0 {
            available = available.min(max_chunk);
        }

        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }

        // An empty read means "nothing yet", never end of stream
        Poll::Ready(Ok(()))
    }
}

// Implement AsyncWrite for MockSerialPort
impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.next_write_error).take() {
            return Poll::Ready(Err(error));
        }

        lock(&self.tx_buffer).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
