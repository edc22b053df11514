//! A helper which regroups an arbitrary stream of byte chunks into [`MultipartChunk`]s of a fixed
//! part size, yielding them on a channel for some upload worker to consume.
//!
//! The entry pipeline produces decompressed data in small chunks (whatever the decoder hands
//! over), but object storage multipart uploads want parts of several MiB.  The regrouping runs as
//! its own async task so the upload worker can have multiple part uploads in flight while more
//! data is still arriving.
//!
//! Errors on the input stream are passed through.  That is the mechanism by which a quota breach
//! detected on the read side aborts the upload of that one entry: the uploader sees the error in
//! place of a part, abandons the upload, and never completes a partial object.

use crate::Result;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(crate) struct MultipartChunk {
    /// The part number of the chunk starting from 0.
    pub part_number: usize,

    /// The contents of this chunk
    pub data: Bytes,
}

/// Spawn an async task which reads `source` to completion, accumulating the bytes into
/// [`MultipartChunk`]s of `part_size` bytes (except possibly the final part), and yields them on
/// the returned channel.
///
/// The channel depth bounds how far the regrouping may run ahead of the consumer, which in turn
/// bounds memory usage at `channel_depth * part_size` plus one part being accumulated.
///
/// The first error on `source` is forwarded on the channel and ends the task; no further parts
/// are produced after an error.
pub(crate) fn into_parts<S>(
    source: S,
    part_size: usize,
    channel_depth: usize,
) -> mpsc::Receiver<Result<MultipartChunk>>
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let (parts_sender, parts_receiver) = mpsc::channel(channel_depth);

    tokio::spawn(async move {
        let mut source = Box::pin(source);
        let mut buffer = BytesMut::with_capacity(part_size);
        let mut part_number = 0usize;

        loop {
            match source.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);

                    // A single input chunk can complete more than one part
                    while buffer.len() >= part_size {
                        let data = buffer.split_to(part_size).freeze();

                        let chunk = MultipartChunk { part_number, data };
                        part_number += 1;

                        // If sending fails the consumer was dropped, probably because the upload
                        // already failed.  Nothing left to do but stop.
                        if parts_sender.send(Ok(chunk)).await.is_err() {
                            warn!("parts receiver was dropped; abandoning the regrouping task");
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!("input stream reported an error; forwarding to the uploader");
                    let _ = parts_sender.send(Err(e)).await;
                    return;
                }
                None => {
                    // End of input.  Whatever is accumulated becomes the final, possibly short,
                    // part.  A zero-byte object produces no parts at all.
                    if !buffer.is_empty() {
                        let chunk = MultipartChunk {
                            part_number,
                            data: buffer.freeze(),
                        };

                        if parts_sender.send(Ok(chunk)).await.is_err() {
                            warn!("parts receiver was dropped; final part is lost");
                        }
                    }

                    debug!("input stream finished; regrouping task exiting");
                    return;
                }
            }
        }
    });

    parts_receiver
}
