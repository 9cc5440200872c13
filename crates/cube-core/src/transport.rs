//! Outbound frame sinks for JSON responses

extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::convert::Infallible;
use core::fmt::Debug;

/// Something that accepts one JSON frame at a time.
///
/// `send` may stay pending until the transport has room for the frame;
/// callers await each frame before building the next one, so a slow client
/// slows the producer instead of growing a queue.
pub trait PacketSink {
    type Error: Debug;

    fn send(&mut self, frame: &str) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Collects frames in memory.
impl PacketSink for Vec<String> {
    type Error = Infallible;

    async fn send(&mut self, frame: &str) -> Result<(), Infallible> {
        self.push(frame.to_string());
        Ok(())
    }
}

/// Newline-delimited JSON over any async byte stream.
pub struct FramedWriter<W> {
    writer: W,
}

impl<W> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: embedded_io_async::Write> PacketSink for FramedWriter<W> {
    type Error = W::Error;

    async fn send(&mut self, frame: &str) -> Result<(), W::Error> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct ByteStream {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl embedded_io_async::ErrorType for ByteStream {
        type Error = Infallible;
    }

    impl embedded_io_async::Write for ByteStream {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Infallible> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_framed_writer_delimits_frames() {
        let mut sink = FramedWriter::new(ByteStream::default());
        block_on(sink.send(r#"{"a":1}"#)).unwrap();
        block_on(sink.send(r#"{"b":2}"#)).unwrap();

        let stream = sink.into_inner();
        assert_eq!(stream.bytes, b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(stream.flushes, 2);
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut frames: Vec<String> = Vec::new();
        block_on(frames.send("x")).unwrap();
        assert_eq!(frames, ["x"]);
    }
}
