//! Bridges an async `Stream` of byte chunks into a synchronous `Read`.
//!
//! The archive is downloaded from object storage with async code, but every supported decoder
//! (`tar`, `zip`, gzip) operates on blocking `std::io::Read`.  This is the seam between the two
//! worlds: the download side stays parallel and async, the decoding side runs on a blocking
//! worker thread and just sees an ordinary reader.

use crate::Result;
use bytes::{buf::Reader, Buf, Bytes};
use futures::{Stream, StreamExt};
use std::{io::Read, pin::Pin};

/// Given a [`Stream`] impl that yields chunks of bytes, produce a [`Read`] implementation that
/// will expose those very same bytes for blocking reads.
///
/// NOTE: The resulting [`std::io::Read`] implementation will panic if any of its `read_*` methods
/// are called from an async context, like in a block of async code.  Blocking reads must be
/// performed in a blocking worker thread, using [`tokio::task::spawn_blocking`].
pub(crate) fn stream_as_reader<S>(stream: S) -> impl Read + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let handle = tokio::runtime::Handle::current();

    TryStreamReader {
        buffer: None,
        stream: Box::pin(stream),
        handle,
    }
}

struct TryStreamReader {
    buffer: Option<Reader<Bytes>>,
    stream: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    handle: tokio::runtime::Handle,
}

impl Read for TryStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // If there's an existing buffer of data left over from a prior read, try to satisfy the
        // read request that way
        if let Some(mut buffer) = self.buffer.take() {
            if buffer.get_ref().remaining() > 0 {
                // Satisfy the read request using this buffer.
                //
                // Note it's possible that `buf` is bigger than the available bytes in the buffer.
                // The spec for `Read` doesn't require filling `buf`, so keep the code simple and
                // return a short read.
                let bytes_read = buffer.read(buf)?;

                // If there's anything left in the buffer, put it back for use the next time
                if buffer.get_ref().remaining() > 0 {
                    self.buffer = Some(buffer);
                }

                return Ok(bytes_read);
            }
        }

        // No existing buffer, so pull the next one from the stream
        match self.handle.block_on(async { self.stream.next().await }) {
            None => {
                // The end of the stream.  That means EOF as far as the reader is concerned
                Ok(0)
            }
            Some(Err(e)) => {
                // The async download task reported an error result, so this needs to be reported
                // back to the decoder.  Unfortunately the `std::io` error type is not that
                // flexible so this is going to be ugly
                Err(std::io::Error::new(std::io::ErrorKind::Other, e))
            }
            Some(Ok(bytes)) => {
                // Got the next buffer full of data.  Satisfy this read from it, and if there's
                // anything left over after that, store it for the next read
                let mut buffer = bytes.reader();

                let bytes_read = buffer.read(buf)?;

                if buffer.get_ref().remaining() > 0 {
                    self.buffer = Some(buffer);
                }

                Ok(bytes_read)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::io::Cursor;

    /// Exercise `TryStreamReader` with in-memory buffers: generate a big random buffer, yield it
    /// in randomly-sized chunks through a stream, then read it back from the `Read` impl in
    /// different randomly-sized reads.  Input and output must match exactly.
    #[tokio::test]
    async fn read_from_stream() {
        const TEST_DATA_SIZE: usize = 2_000_000;
        const MAX_READ_SIZE: usize = TEST_DATA_SIZE / 10;
        const MIN_READ_SIZE: usize = 1;

        let mut test_data = vec![0u8; TEST_DATA_SIZE];
        let mut rand = rand::thread_rng();

        rand.fill(&mut test_data[..]);

        // Break the data into randomly sized chunks for the stream to yield
        let mut chunks = Vec::new();
        let mut cursor = Cursor::new(test_data.clone());

        while cursor.position() < TEST_DATA_SIZE as u64 {
            let mut chunk = vec![0u8; rand.gen_range(MIN_READ_SIZE..MAX_READ_SIZE)];

            let bytes_read = cursor.read(&mut chunk[..]).unwrap();
            chunk.truncate(bytes_read);

            chunks.push(Bytes::from(chunk));
        }

        let stream = futures::stream::iter(chunks.into_iter().map(Result::<_>::Ok));
        let mut reader = stream_as_reader(stream);

        // Reads block via `Handle::block_on`, so they must happen off the async worker threads;
        // doing them in an async task would panic, which conveniently enforces the rule
        let read_data = tokio::task::spawn_blocking(move || {
            let mut rand = rand::thread_rng();
            let mut read_data = Vec::with_capacity(TEST_DATA_SIZE);

            while read_data.len() < TEST_DATA_SIZE {
                let mut chunk = vec![0u8; rand.gen_range(MIN_READ_SIZE..MAX_READ_SIZE)];

                let bytes_read = reader.read(&mut chunk[..]).unwrap();
                assert!(bytes_read > 0);

                read_data.extend_from_slice(&chunk[0..bytes_read]);
            }

            // Everything is consumed, so the next read must report EOF
            let mut dummy = vec![0u8; 100];
            assert_eq!(0, reader.read(&mut dummy[..]).unwrap());

            read_data
        })
        .await
        .unwrap();

        assert_eq!(test_data, read_data);
    }

    /// An error yielded by the stream must surface as a read error, not EOF
    #[tokio::test]
    async fn stream_error_becomes_read_error() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"good")),
            Err(crate::error::StorageSnafu {
                message: "connection reset".to_string(),
            }
            .build()),
        ]);

        let mut reader = stream_as_reader(stream);

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; 16];

            let n = reader.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"good");

            let err = reader.read(&mut buf).unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::Other);
        })
        .await
        .unwrap();
    }
}
