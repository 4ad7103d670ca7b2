//! CR-LF line reassembly.
//!
//! Reads from the link come back in arbitrary chunks: a chunk may hold no line
//! terminator, several, or end between the `\r` and the `\n`. [`LineBuffer`]
//! accumulates bytes and only hands out complete lines, keeping the trailing
//! partial line for the next read.

use bytes::{Buf, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Accumulates received bytes and yields complete CR-LF terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a received chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete line, without its terminator.
    ///
    /// The link is ASCII; bytes outside ASCII are dropped.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.windows(CRLF.len()).position(|w| w == CRLF)?;
        let line = self.pending.split_to(end);
        self.pending.advance(CRLF.len());
        Some(line.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect())
    }

    /// Removes and returns every complete line currently buffered.
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Bytes of the incomplete trailing line.
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partial_line_is_kept() {
        let mut buf = LineBuffer::new();
        buf.extend(b"BAT:7");
        assert!(buf.drain_lines().is_empty());
        buf.extend(b"5,STATE:1\r\nhel");
        assert_eq!(buf.drain_lines(), vec!["BAT:75,STATE:1".to_string()]);
        assert_eq!(buf.remainder(), b"hel");
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut buf = LineBuffer::new();
        buf.extend(b"S\r");
        assert!(buf.next_line().is_none());
        buf.extend(b"\nL01\r\n");
        assert_eq!(buf.drain_lines(), vec!["S".to_string(), "L01".to_string()]);
        assert!(buf.remainder().is_empty());
    }

    #[test]
    fn test_empty_lines_and_bare_newlines() {
        let mut buf = LineBuffer::new();
        buf.extend(b"\r\na\nb\r\n");
        // A bare LF does not terminate a line
        assert_eq!(buf.drain_lines(), vec!["".to_string(), "a\nb".to_string()]);
    }

    #[test]
    fn test_non_ascii_dropped() {
        let mut buf = LineBuffer::new();
        buf.extend(b"BAT:\xff10\r\n");
        assert_eq!(buf.next_line().as_deref(), Some("BAT:10"));
    }

    fn lines_for(stream: &[u8], cuts: &[usize]) -> (Vec<String>, Vec<u8>) {
        let mut buf = LineBuffer::new();
        let mut lines = Vec::new();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&stream.len())) {
            let cut = cut.clamp(start, stream.len());
            buf.extend(&stream[start..cut]);
            lines.extend(buf.drain_lines());
            start = cut;
        }
        (lines, buf.remainder().to_vec())
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_lines(
            parts in proptest::collection::vec("[A-Z0-9:,\r\n]{0,12}", 0..8),
            mut cuts in proptest::collection::vec(0usize..120, 0..10),
        ) {
            let stream: Vec<u8> = parts.concat().into_bytes();
            cuts.sort_unstable();

            let whole = lines_for(&stream, &[]);
            let chunked = lines_for(&stream, &cuts);
            prop_assert_eq!(&whole, &chunked);

            let bytewise: Vec<usize> = (1..stream.len()).collect();
            prop_assert_eq!(whole, lines_for(&stream, &bytewise));
        }
    }
}
