//! Implementation of the archive ingestion job.
//!
//! The caller starts with [`IngestArchiveJobBuilder`], either from a storage notification event
//! or from explicitly provided storage/queue handles, then calls
//! [`IngestArchiveJobBuilder::build`] to construct an [`IngestArchiveJob`].  A call to
//! [`IngestArchiveJob::run`] actually performs the job.  Progress is reported via a
//! caller-provided implementation of the [`IngestProgressCallback`] trait.
//!
//! Archive formats are sequential, so entry discovery can't be parallelized: the decoder yields
//! entries one at a time and each entry's bytes must be consumed before the next entry becomes
//! visible.  Parallelism is employed where it's actually available, on the upload side.  The
//! reading of the archive happens in a blocking task (the decoders only speak blocking I/O); each
//! eligible entry's decompressed bytes are pumped over a bounded channel to an async upload task,
//! and while that upload settles, the reader is already decoding the next entries.  How many
//! uploads may be in flight at once is bounded by an admission gate, regardless of how many
//! entries the archive contains.
//!
//! Quota enforcement happens where the decompressed bytes materialize, between the decoder and
//! the upload: every chunk is charged against the per-entry and whole-job limits before it is
//! forwarded, so a hostile archive is stopped while its bytes are in flight, not after.
use crate::archive::{
    read_archive_entries, ArchiveEntry, ArchiveFormat, CountingReader, EntryKind, EntrySink,
};
use crate::limiter::{UploadLimiter, UploadPermit};
use crate::objstore::{Bucket, ObjectStorageFactory};
use crate::quota::{ByteCharge, QuotaState};
use crate::queue::{ConversionJobMessage, SqsWorkQueue, WorkQueue};
use crate::{
    ArchiveJob, Config, EntryOutcome, IngestError, JobResult, Result, SkipReason, UploadEvent,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use snafu::prelude::*;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument};

/// File extensions accepted as image entries, compared case-insensitively.
///
/// Anything else in the archive is skipped, not failed; photographers' archives routinely carry
/// sidecar files, readme files, and OS droppings.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// How many bytes are read from the decoder per chunk.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Depth of the per-entry chunk channel between the reader and an entry's upload task.
///
/// Together with `READ_CHUNK_SIZE` this bounds how far the reader may run ahead of a slow
/// upload on a single entry.
const CHUNK_QUEUE_DEPTH: usize = 4;

/// Depth of the entry event channel between the reader and the upload processor.
const ENTRY_QUEUE_DEPTH: usize = 16;

fn is_image_file(path: &str) -> bool {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);

    match name.rsplit_once('.') {
        Some((_, extension)) => IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| extension.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// A trait which callers can implement to get detailed progress updates as the ingestion
/// operation is progressing.
///
/// All methods have default no-op implementations so callers only implement what they care
/// about.
#[allow(unused_variables)]
pub trait IngestProgressCallback: Sync + Send {
    /// The ingestion is now starting.  `archive_size` is the compressed size of the source
    /// archive object.
    fn ingest_starting(&self, archive_size: u64) {}

    /// Some raw bytes of the archive have been read from object storage.
    ///
    /// This measures the compressed stream, entry data and container metadata alike.
    fn archive_bytes_read(&self, bytes: usize) {}

    /// An entry was skipped (directory, non-image, unsafe path).  Skips are normal.
    fn entry_skipped(&self, path: &str, reason: SkipReason) {}

    /// An entry passed classification and sanitization and its upload is starting.
    ///
    /// `declared_size` is the size from the entry's header, which is not trustworthy.
    fn entry_upload_starting(&self, staging_key: &str, declared_size: u64) {}

    /// A chunk of an entry's decompressed data has been handed to the uploader.
    fn entry_bytes_uploaded(&self, staging_key: &str, bytes: usize) {}

    /// The entry has been staged in its entirety.
    fn entry_uploaded(&self, staging_key: &str, bytes: u64) {}

    /// The entry failed (quota breach or upload error).  The rest of the job continues.
    fn entry_failed(&self, path: &str, error: &IngestError) {}

    /// A conversion job message for the given staged object was posted downstream.
    fn conversion_job_sent(&self, staging_key: &str) {}

    /// The whole job has finished and every upload has settled.
    fn ingest_finished(&self, result: &JobResult) {}
}

#[derive(Debug)]
pub struct IngestArchiveJobBuilder {
    config: Config,
    job: ArchiveJob,
    source_bucket: Box<dyn Bucket>,
    staging_bucket: Box<dyn Bucket>,
    queue: Box<dyn WorkQueue>,
}

impl IngestArchiveJobBuilder {
    /// Construct a builder straight from the storage notification that triggered the job,
    /// resolving the buckets and the conversion queue from the configuration.
    pub async fn from_event(config: Config, event: &UploadEvent) -> Result<Self> {
        let job = ArchiveJob::from_event(event)?;

        let queue_url = config
            .conversion_queue_url
            .as_ref()
            .ok_or_else(|| crate::error::QueueUrlMissingSnafu {}.build())?
            .to_string();

        let objstore = ObjectStorageFactory::instance(config.clone()).s3().await;

        let source_bucket = objstore.open_bucket(&job.container_name).await?;

        let staging_bucket = match &config.staging_container {
            Some(name) if name != &job.container_name => objstore.open_bucket(name).await?,
            _ => source_bucket.clone(),
        };

        let queue = Box::new(SqsWorkQueue::new(queue_url).await);

        Ok(Self {
            config,
            job,
            source_bucket,
            staging_bucket,
            queue,
        })
    }

    /// Construct a builder from explicitly provided storage and queue handles.
    ///
    /// This is the seam for callers that already hold handles, and for tests running against
    /// non-S3 implementations.
    pub fn new(
        config: Config,
        job: ArchiveJob,
        source_bucket: Box<dyn Bucket>,
        staging_bucket: Box<dyn Bucket>,
        queue: Box<dyn WorkQueue>,
    ) -> Self {
        Self {
            config,
            job,
            source_bucket,
            staging_bucket,
            queue,
        }
    }

    pub async fn build(self) -> Result<IngestArchiveJob> {
        let format = ArchiveFormat::for_key(&self.job.object_key).ok_or_else(|| {
            crate::error::ArchiveFormatUnknownSnafu {
                key: self.job.object_key.clone(),
            }
            .build()
        })?;

        // Validate the source archive exists by actually getting its metadata
        let archive_size = self
            .source_bucket
            .get_object_size(self.job.object_key.clone())
            .await?;

        Ok(IngestArchiveJob {
            config: self.config,
            job: self.job,
            format,
            archive_size,
            source_bucket: self.source_bucket,
            staging_bucket: self.staging_bucket,
            queue: self.queue,
        })
    }
}

#[derive(Debug)]
pub struct IngestArchiveJob {
    config: Config,
    job: ArchiveJob,
    format: ArchiveFormat,
    archive_size: u64,
    source_bucket: Box<dyn Bucket>,
    staging_bucket: Box<dyn Bucket>,
    queue: Box<dyn WorkQueue>,
}

impl IngestArchiveJob {
    /// The compressed size of the archive that is to be ingested.
    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    /// The parsed identity of this ingestion run.
    pub fn job(&self) -> &ArchiveJob {
        &self.job
    }

    /// Alternative to [`Self::run`] which doesn't require a [`IngestProgressCallback`]
    /// implementation, for callers that do not care about progress information.
    pub async fn run_without_progress(self) -> Result<JobResult> {
        // A dummy impl of IngestProgressCallback that doesn't do anything with any of the
        // progress updates
        struct NoProgress {}
        impl IngestProgressCallback for NoProgress {}

        self.run(NoProgress {}).await
    }

    /// Run the job, returning only when every entry has been read and every dispatched upload
    /// has settled.
    ///
    /// Fails only for the job-fatal conditions: the archive cannot be opened or read, the entry
    /// count quota is exceeded, or the total-bytes quota is exceeded.  Per-entry problems are
    /// recorded in the returned [`JobResult`] instead.  Even when the job fails, outstanding
    /// uploads are allowed to settle first, so staging never contains an object the accounting
    /// doesn't know about.
    pub async fn run<Progress>(self, progress: Progress) -> Result<JobResult>
    where
        Progress: IngestProgressCallback + 'static,
    {
        let span = info_span!("run", job = %self.job, format = ?self.format);

        async move {
            info!(
                archive_size = self.archive_size,
                limits = ?self.config.quota_limits(),
                max_concurrent_uploads = self.config.max_concurrent_uploads,
                "Starting archive ingestion job"
            );

            let progress: Arc<dyn IngestProgressCallback> = Arc::new(progress);

            progress.ingest_starting(self.archive_size);

            let quota = Arc::new(QuotaState::new(self.config.quota_limits()));
            let limiter = UploadLimiter::new(self.config.max_concurrent_uploads);

            // Open a streaming read of the archive object and put a blocking `Read` facade on
            // top for the decoder
            let chunks = self
                .source_bucket
                .read_object(self.job.object_key.clone())
                .await?;
            let reader = CountingReader::new(
                crate::async_bridge::stream_as_reader(ReceiverStream::new(chunks)),
                progress.clone(),
            );

            let (entry_sender, entry_receiver) = mpsc::channel(ENTRY_QUEUE_DEPTH);

            // The decoding of archive entries is a blocking operation.  Start a blocking task
            // to do that now.
            let reader_span = info_span!("read_archive_entries_blocking");
            let reader_fut = {
                let mut pipeline = EntryPipeline {
                    quota: Arc::clone(&quota),
                    staging_root: self.job.staging_root(&self.config.staging_prefix),
                    progress: progress.clone(),
                    entry_sender,
                };
                let format = self.format;

                tokio::task::spawn_blocking(move || {
                    let _guard = reader_span.enter();

                    debug!("Starting blocking archive read task");

                    match read_archive_entries(format, reader, &mut pipeline) {
                        Ok(()) => {
                            debug!("Blocking archive read task completing successfully");

                            Ok(())
                        }
                        Err(e) => {
                            error!(err = ?e, "Blocking archive read task failed");

                            Err(e)
                        }
                    }
                })
            };

            // Start an async task that admits entry uploads through the limiter and collects
            // every entry's outcome
            let processor_fut = {
                let limiter = limiter.clone();
                let staging_bucket = self.staging_bucket.clone();
                let progress = progress.clone();

                tokio::spawn(async move {
                    debug!("Starting entry upload processor task");

                    Self::process_entries(limiter, staging_bucket, progress, entry_receiver).await
                })
            };

            // Wait for both tasks to finish and only then look at results.  This matters when
            // the reader fails job-fatally mid-stream: already-admitted uploads are not
            // abandoned, they settle (successfully or not) and their outcomes are folded into
            // the accounting before the failure is reported.
            let (reader_result, processor_result) = futures::join!(reader_fut, processor_fut);
            let reader_result =
                reader_result.with_context(|_| crate::error::SpawnBlockingSnafu {})?;
            let outcomes = processor_result.with_context(|_| crate::error::SpawnSnafu {})??;

            let mut uploaded = 0usize;
            let mut skipped = 0usize;
            let mut failed = 0usize;
            let mut staged_keys = Vec::new();

            for outcome in &outcomes {
                match outcome {
                    EntryOutcome::Uploaded { staging_key, .. } => {
                        uploaded += 1;
                        staged_keys.push(staging_key.clone());
                    }
                    EntryOutcome::Skipped { .. } => skipped += 1,
                    EntryOutcome::Failed { .. } => failed += 1,
                }
            }

            let result = JobResult {
                entries_seen: quota.entries_seen(),
                uploaded,
                skipped,
                failed,
                total_bytes: quota.total_bytes(),
                limits: quota.limits(),
                staged_keys,
                outcomes,
            };

            if let Err(e) = reader_result {
                // Job-fatal.  The summary is still surfaced so the partial state is observable;
                // the source object is left in place so the platform can retry the whole job.
                error!(
                    entries_seen = result.entries_seen,
                    uploaded = result.uploaded,
                    skipped = result.skipped,
                    failed = result.failed,
                    total_bytes = result.total_bytes,
                    err = ?e,
                    "Ingestion job failed"
                );

                return Err(e);
            }

            // Every upload has settled; hand the staged inventory to the conversion stage
            Self::notify_staged(
                self.queue,
                self.staging_bucket.name(),
                &result.staged_keys,
                &progress,
                self.config.max_concurrent_requests,
            )
            .await?;

            if result.degraded() {
                warn!(failed = result.failed, "Ingestion job finished with failed entries");
            }

            info!(
                entries_seen = result.entries_seen,
                uploaded = result.uploaded,
                skipped = result.skipped,
                failed = result.failed,
                total_bytes = result.total_bytes,
                "Finished ingestion job"
            );

            progress.ingest_finished(&result);

            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Async worker task that receives entry events from the blocking reader, admits uploads
    /// through the limiter in arrival order, and records every entry's outcome.
    ///
    /// Returns once the reader has hung up *and* every dispatched upload has settled.
    async fn process_entries(
        limiter: UploadLimiter,
        staging_bucket: Box<dyn Bucket>,
        progress: Arc<dyn IngestProgressCallback>,
        mut entry_receiver: mpsc::Receiver<EntryEvent>,
    ) -> Result<Vec<EntryOutcome>> {
        let mut outcomes = Vec::new();
        let mut uploads: JoinSet<EntryOutcome> = JoinSet::new();

        while let Some(event) = entry_receiver.recv().await {
            match event {
                EntryEvent::Skipped { path, reason } => {
                    outcomes.push(EntryOutcome::Skipped { path, reason });
                }
                EntryEvent::Upload(entry_upload) => {
                    // Harvest whatever already finished before waiting on admission
                    while let Some(result) = uploads.try_join_next() {
                        outcomes.push(result.with_context(|_| crate::error::SpawnSnafu {})?);
                    }

                    // FIFO: entries wait for admission in discovery order
                    let permit = limiter.acquire().await;

                    let staging_bucket = staging_bucket.clone();
                    let progress = progress.clone();

                    uploads.spawn(Self::upload_entry(
                        permit,
                        staging_bucket,
                        progress,
                        entry_upload,
                    ));
                }
            }
        }

        // The reader is done, successfully or not; every outstanding upload still gets to
        // settle and report its outcome
        while let Some(result) = uploads.join_next().await {
            outcomes.push(result.with_context(|_| crate::error::SpawnSnafu {})?);
        }

        debug!(
            outcomes = outcomes.len(),
            "Entry sender dropped; no more entries to process"
        );

        Ok(outcomes)
    }

    /// Upload one entry's decompressed byte stream to its staging key.
    ///
    /// Holds `permit` for the duration; the permit drops (and admits the next waiter) on every
    /// exit path.  Never returns an error: failures become the entry's recorded outcome.
    async fn upload_entry(
        permit: UploadPermit,
        staging_bucket: Box<dyn Bucket>,
        progress: Arc<dyn IngestProgressCallback>,
        entry_upload: EntryUpload,
    ) -> EntryOutcome {
        let EntryUpload {
            path,
            staging_key,
            declared_size,
            chunks,
        } = entry_upload;

        let span = debug_span!("upload_entry", %staging_key);

        let outcome = async {
            progress.entry_upload_starting(&staging_key, declared_size);

            // The declared size is untrusted, but as a size hint a lie costs nothing worse
            // than a suboptimal multipart part size
            let size_hint = (declared_size > 0).then_some(declared_size);

            let chunk_stream = {
                let progress = progress.clone();
                let staging_key = staging_key.clone();

                ReceiverStream::new(chunks)
                    .map(move |chunk| {
                        if let Ok(bytes) = &chunk {
                            progress.entry_bytes_uploaded(&staging_key, bytes.len());
                        }
                        chunk
                    })
                    .boxed()
            };

            match staging_bucket
                .upload_object(staging_key.clone(), chunk_stream, size_hint)
                .await
            {
                Ok(bytes) => {
                    debug!(bytes, "Entry staged");
                    progress.entry_uploaded(&staging_key, bytes);

                    EntryOutcome::Uploaded { staging_key, bytes }
                }
                Err(error) => {
                    warn!(err = ?error, %path, "Entry upload failed; sibling entries are unaffected");
                    progress.entry_failed(&path, &error);

                    EntryOutcome::Failed { path, error }
                }
            }
        }
        .instrument(span)
        .await;

        drop(permit);

        outcome
    }

    /// Deliver one conversion job message per staged object.
    async fn notify_staged(
        queue: Box<dyn WorkQueue>,
        container_name: &str,
        staged_keys: &[String],
        progress: &Arc<dyn IngestProgressCallback>,
        max_concurrent: usize,
    ) -> Result<()> {
        let sends = staged_keys.iter().map(|key| {
            let queue = queue.clone();
            let message = ConversionJobMessage {
                container_name: container_name.to_string(),
                object_key: key.clone(),
            };

            async move {
                queue.send_conversion_job(&message).await?;

                Ok::<_, IngestError>(message.object_key)
            }
        });

        let mut sends = futures::stream::iter(sends).buffer_unordered(max_concurrent);

        while let Some(result) = sends.next().await {
            let key = result?;
            progress.conversion_job_sent(&key);
        }

        Ok(())
    }
}

/// One eligible entry handed from the blocking reader to the upload processor.
struct EntryUpload {
    /// The entry's internal path, for outcome records and logs
    path: String,

    /// The staging key the entry will be written under
    staging_key: String,

    /// Untrusted header-declared size, used only as an upload size hint
    declared_size: u64,

    /// The entry's decompressed bytes, pumped by the reader chunk by chunk.
    ///
    /// A quota breach or read failure arrives as an `Err` in place of a chunk, which makes the
    /// upload of exactly this entry fail without touching its siblings.
    chunks: mpsc::Receiver<Result<Bytes>>,
}

enum EntryEvent {
    Skipped { path: String, reason: SkipReason },
    Upload(EntryUpload),
}

/// The per-entry state machine, driven by the blocking archive walk.
///
/// For each entry in discovery order: quota admission, classification, path sanitization, then
/// quota-gated streaming to the entry's upload task.  Skips drain the entry's bytes without
/// counting them; failed entries drain with the bytes still charged against the job-wide total.
struct EntryPipeline {
    quota: Arc<QuotaState>,
    staging_root: String,
    progress: Arc<dyn IngestProgressCallback>,
    entry_sender: mpsc::Sender<EntryEvent>,
}

impl EntrySink for EntryPipeline {
    fn on_entry(&mut self, entry: ArchiveEntry<'_>) -> Result<()> {
        let path = String::from_utf8_lossy(&entry.raw_path).into_owned();

        let span = debug_span!("Processing archive entry", path = %path, declared_size = entry.declared_size);
        let _guard = span.enter();

        // Every discovered record counts against the entry quota, directories included; the
        // cap bounds hostile archives and an archive of 100k empty directories is exactly that
        if self.quota.admit_entry().is_err() {
            let limit = self.quota.limits().max_entries;
            error!(limit, "Archive exceeds the entry count limit");

            return crate::error::TooManyEntriesSnafu { limit }.fail();
        }

        match entry.kind {
            EntryKind::Directory => return self.skip(entry, path, SkipReason::Directory),
            EntryKind::Other => return self.skip(entry, path, SkipReason::NonRegular),
            EntryKind::File => {}
        }

        if !is_image_file(&path) {
            return self.skip(entry, path, SkipReason::NotImage);
        }

        // Derive the bare name first, then join it onto the staging root; the second pass
        // double-checks the joined form so the two sanitizer functions stay in agreement
        let staging_key = match crate::sanitize::safe_base_name(&entry.raw_path)
            .and_then(|name| crate::sanitize::safe_destination_key(&self.staging_root, name.as_bytes()))
        {
            Some(key) => key,
            None => return self.skip(entry, path, SkipReason::UnsafePath),
        };

        self.stream_entry(entry, path, staging_key)
    }
}

impl EntryPipeline {
    /// Record a skipped entry, draining its payload so the archive stream can advance.
    ///
    /// Skipped bytes deliberately don't count toward the byte quotas.
    fn skip(&mut self, entry: ArchiveEntry<'_>, path: String, reason: SkipReason) -> Result<()> {
        let drained = std::io::copy(entry.reader, &mut std::io::sink())
            .context(crate::error::ArchiveReadSnafu)?;

        debug!(%path, %reason, drained, "Skipping entry");
        self.progress.entry_skipped(&path, reason);

        self.send_event(EntryEvent::Skipped { path, reason })
    }

    /// Pump one eligible entry's decompressed bytes to its upload task, charging every chunk
    /// against the quotas on the way through.
    fn stream_entry(
        &mut self,
        entry: ArchiveEntry<'_>,
        path: String,
        staging_key: String,
    ) -> Result<()> {
        let (chunk_sender, chunk_receiver) = mpsc::channel(CHUNK_QUEUE_DEPTH);

        // Announce the upload before pumping: the processor admits it through the limiter and
        // starts consuming, while this thread blocks on the bounded channel for backpressure
        self.send_event(EntryEvent::Upload(EntryUpload {
            path: path.clone(),
            staging_key,
            declared_size: entry.declared_size,
            chunks: chunk_receiver,
        }))?;

        let mut entry_bytes = 0u64;

        loop {
            let mut buf = BytesMut::zeroed(READ_CHUNK_SIZE);

            let bytes_read = match entry.reader.read(&mut buf) {
                Ok(bytes_read) => bytes_read,
                Err(e) => {
                    // The archive stream itself is broken.  Fail this entry's upload, then the
                    // job; there is no way to reach the entries behind a corrupt stream.
                    let _ = chunk_sender.blocking_send(Err(crate::error::EntryAbandonedSnafu {
                        path: path.clone(),
                    }
                    .build()));

                    return Err(e).context(crate::error::ArchiveReadSnafu);
                }
            };

            if bytes_read == 0 {
                break;
            }

            buf.truncate(bytes_read);

            match self.quota.charge_entry_bytes(entry_bytes, bytes_read as u64) {
                ByteCharge::Ok => {
                    entry_bytes += bytes_read as u64;

                    if chunk_sender.blocking_send(Ok(buf.freeze())).is_err() {
                        // The upload side gave up on this entry (its upload already failed).
                        // Drain the remainder so the archive can advance to the next entry.
                        debug!(%path, "Upload task dropped the chunk receiver; draining the rest of the entry");

                        return self.drain_discarded(entry.reader);
                    }
                }
                ByteCharge::FileTooLarge => {
                    let limit = self.quota.limits().max_file_bytes;
                    warn!(%path, limit, "Entry exceeds the per-file size limit; failing this entry only");

                    let _ = chunk_sender.blocking_send(Err(crate::error::FileSizeExceededSnafu {
                        path: path.clone(),
                        limit,
                    }
                    .build()));

                    return self.drain_discarded(entry.reader);
                }
                ByteCharge::TotalTooLarge => {
                    let limit = self.quota.limits().max_total_bytes;
                    error!(limit, "Archive exceeds the total size limit");

                    let _ = chunk_sender.blocking_send(Err(crate::error::EntryAbandonedSnafu {
                        path: path.clone(),
                    }
                    .build()));

                    return crate::error::TotalSizeExceededSnafu { limit }.fail();
                }
            }
        }

        Ok(())
    }

    /// Drain the remainder of a failed entry.  The bytes still charge the job-wide total, so a
    /// hostile archive can't stream unbounded data through the failure path.
    fn drain_discarded(&self, reader: &mut dyn Read) -> Result<()> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buf)
                .context(crate::error::ArchiveReadSnafu)?;

            if bytes_read == 0 {
                return Ok(());
            }

            if let ByteCharge::TotalTooLarge = self.quota.charge_discarded(bytes_read as u64) {
                let limit = self.quota.limits().max_total_bytes;
                error!(limit, "Archive exceeds the total size limit");

                return crate::error::TotalSizeExceededSnafu { limit }.fail();
            }
        }
    }

    fn send_event(&self, event: EntryEvent) -> Result<()> {
        if self.entry_sender.blocking_send(event).is_err() {
            // The processor task dropped the receiver, which only happens if it failed
            debug!("Entry event receiver dropped; aborting the blocking reader task");

            return crate::error::IngestAbortedSnafu {}.fail();
        }

        Ok(())
    }
}
