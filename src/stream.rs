//! Pull-based byte streams used to assemble keyfile contributions.
//!
//! Mirrors `std::io::Read`'s contract (0 == EOF, short reads allowed)
//! rather than inventing a parallel abstraction, so `FileStream` is a
//! thin wrapper over `std::fs::File` and any `std::io::Read` can be
//! boxed into a `KeyfileStream` with `FileStream::from_reader`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use zeroize::Zeroize;

/// A source of bytes for pool mixing. Implementors behave like
/// `std::io::Read`: a `Ok(0)` return means end of stream, and a read
/// may return fewer bytes than the buffer holds without that meaning EOF.
pub trait KeyfileStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// An in-memory byte source, used for decrypted token plaintext and for
/// the literal tail bytes that follow a token-decrypted head.
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryStream { data, pos: 0 }
    }
}

impl KeyfileStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl MemoryStream {
    /// The wipe `Drop` performs, factored out so it is exercised
    /// directly by a test rather than only by inference from `Drop`
    /// running during deallocation (reading memory after real
    /// deallocation would itself be undefined behavior).
    fn wipe(&mut self) {
        self.data.zeroize();
    }
}

/// Token plaintext and bluekey staging buffers alike pass through a
/// `MemoryStream`; zeroizing it on drop is what makes testable property
/// 7 (secret buffers are all-zero once `Apply` returns) hold without
/// every call site having to remember to wipe its own copy.
impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// A plain filesystem keyfile.
pub struct FileStream {
    inner: File,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileStream {
            inner: File::open(path)?,
        })
    }

    pub fn from_reader(inner: File) -> Self {
        FileStream { inner }
    }
}

impl KeyfileStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Concatenates a sequence of sub-streams in order, exactly as if they
/// were one continuous stream. A sub-stream that returns a short read
/// or a zero-length read before exhausting the buffer does not end the
/// pipeline; only a genuine EOF (`Ok(0)`) advances to the next
/// sub-stream, and the pipeline itself ends only once every sub-stream
/// has reported EOF.
#[derive(Default)]
pub struct PipelineStream {
    streams: VecDeque<Box<dyn KeyfileStream>>,
}

impl PipelineStream {
    pub fn new() -> Self {
        PipelineStream {
            streams: VecDeque::new(),
        }
    }

    pub fn add_stream(&mut self, stream: Box<dyn KeyfileStream>) {
        self.streams.push_back(stream);
    }
}

impl KeyfileStream for PipelineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(front) = self.streams.front_mut() {
            let n = front.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.streams.pop_front();
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_fully(mut s: impl KeyfileStream, chunk_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = s.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn filled(len: usize) -> Vec<u8> {
        (1..=len as u8).collect()
    }

    // Ported from PipelineStreamTest.cpp's EmptyTest.
    #[test]
    fn empty_pipeline_reads_nothing() {
        let mut s = PipelineStream::new();
        let mut buf = [0u8; 1];
        assert_eq!(s.read(&mut buf).unwrap(), 0);
    }

    // ZeroLengthStreamsTest: a single one-byte stream reads in full.
    #[test]
    fn single_stream_reads_all_bytes() {
        let mut s = PipelineStream::new();
        s.add_stream(Box::new(MemoryStream::new(filled(1))));
        assert_eq!(read_fully(s, 10).len(), 1);
    }

    // MultipleZeroLengthStreams: two one-byte streams concatenate.
    #[test]
    fn two_small_streams_concatenate() {
        let mut s = PipelineStream::new();
        s.add_stream(Box::new(MemoryStream::new(filled(1))));
        s.add_stream(Box::new(MemoryStream::new(filled(1))));
        assert_eq!(read_fully(s, 10).len(), 2);
    }

    // LastZeroLengthStreamTest: a ten-byte stream followed by a one-byte stream.
    #[test]
    fn trailing_small_stream_is_not_dropped() {
        let mut s = PipelineStream::new();
        s.add_stream(Box::new(MemoryStream::new(filled(10))));
        s.add_stream(Box::new(MemoryStream::new(filled(1))));
        assert_eq!(read_fully(s, 10).len(), 11);
    }

    // ReadWholeSubstreamAtOnceTest: buffer larger than either sub-stream.
    #[test]
    fn whole_substreams_read_at_once() {
        let mut s = PipelineStream::new();
        s.add_stream(Box::new(MemoryStream::new(filled(10))));
        s.add_stream(Box::new(MemoryStream::new(filled(5))));
        assert_eq!(read_fully(s, 20).len(), 15);
    }

    // Testable property 7: secret buffers are zero once `Apply` (or, here,
    // the Drop impl it relies on) is done with them.
    #[test]
    fn memory_stream_zeroizes_its_buffer_on_drop() {
        let mut stream = MemoryStream::new(vec![0xAAu8; 32]);
        // `wipe` is the exact (and only) method `Drop::drop` calls, so
        // calling it here exercises Drop's actual wipe logic rather
        // than reimplementing the assertion against a bare zeroize()
        // call; reading the buffer after a real deallocation would
        // itself be undefined behavior, which is why this stops short
        // of inspecting memory past an actual `drop(stream)`.
        stream.wipe();
        assert!(stream.data.iter().all(|&b| b == 0));
        drop(stream);
    }

    // ReadSubstreamByPartsTest: one byte at a time across the boundary.
    #[test]
    fn substreams_read_one_byte_at_a_time() {
        let mut s = PipelineStream::new();
        s.add_stream(Box::new(MemoryStream::new(filled(10))));
        s.add_stream(Box::new(MemoryStream::new(filled(1))));
        assert_eq!(read_fully(s, 1).len(), 11);
    }
}
