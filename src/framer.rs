//! Newline-delimited frame extraction.
//!
//! Bytes read from a connection are appended to a per-connection buffer.
//! Each `\n` terminates one frame; the bytes before it are trimmed of
//! surrounding whitespace and returned. Whitespace-only frames are skipped.
//! Bytes after the last delimiter stay buffered until more data arrives.
//!
//! There is no maximum frame size. The read chunk size bounds how much is
//! appended per read, not how large a frame may grow.

use bytes::{Buf, BytesMut};

/// Default number of bytes requested per socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Per-connection frame buffer
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    /// Leading bytes of `buffer` already known to hold no delimiter
    scanned: usize,
}

impl LineFramer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Append a chunk read from the socket
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete, non-empty frame.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the JSON decoder
    /// reports it as a malformed frame.
    ///
    /// Each buffered byte is searched for the delimiter once, however many
    /// reads a frame spans.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n')
            else {
                self.scanned = self.buffer.len();
                return None;
            };
            let line = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(1);
            self.scanned = 0;

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    /// Number of buffered bytes not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<String> {
        std::iter::from_fn(|| framer.next_frame()).collect()
    }

    #[test]
    fn test_single_frame() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        framer.extend(b"{\"command\":\"ping\"}\n");

        assert_eq!(drain(&mut framer), vec!["{\"command\":\"ping\"}"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        framer.extend(b"{\"command\":");
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.pending(), 11);

        framer.extend(b"\"ping\"}\n{\"comm");
        assert_eq!(drain(&mut framer), vec!["{\"command\":\"ping\"}"]);
        assert_eq!(framer.pending(), 6);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        framer.extend(b"one\ntwo\nthree\n");

        assert_eq!(drain(&mut framer), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_and_whitespace_frames_skipped() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        framer.extend(b"\n   \n\t\r\n  one  \r\n\n");

        assert_eq!(drain(&mut framer), vec!["one"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_frame_larger_than_read_chunk() {
        let mut framer = LineFramer::with_capacity(8);
        let payload = "x".repeat(DEFAULT_READ_BUFFER_SIZE * 3);
        for chunk in payload.as_bytes().chunks(DEFAULT_READ_BUFFER_SIZE) {
            framer.extend(chunk);
            assert!(framer.next_frame().is_none());
        }
        framer.extend(b"\n");

        assert_eq!(framer.next_frame().unwrap().len(), payload.len());
    }

    #[test]
    fn test_large_frame_scanned_once() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        let payload = vec![b'y'; 4 * 1024 * 1024];
        for chunk in payload.chunks(DEFAULT_READ_BUFFER_SIZE) {
            framer.extend(chunk);
            assert!(framer.next_frame().is_none());
            assert_eq!(framer.scanned, framer.pending());
        }

        framer.extend(b"\nnext");
        assert_eq!(framer.next_frame().unwrap().len(), payload.len());
        assert_eq!(framer.scanned, 0);
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.scanned, 4);

        framer.extend(b"\n");
        assert_eq!(framer.next_frame().as_deref(), Some("next"));
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut framer = LineFramer::with_capacity(DEFAULT_READ_BUFFER_SIZE);
        let mut frames = Vec::new();
        for byte in b"ab\ncd\n" {
            framer.extend(std::slice::from_ref(byte));
            frames.extend(drain(&mut framer));
        }

        assert_eq!(frames, vec!["ab", "cd"]);
    }
}
