//! In-memory implementations of the snapstage storage and queue seams.
//!
//! Tests run entire ingestion jobs against these, so every scenario (quota breaches, upload
//! failures, concurrency bounds) is exercised end to end without any network or external
//! processes involved.
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use snapstage::error::Result;
use snapstage::objstore::Bucket;
use snapstage::queue::{ConversionJobMessage, WorkQueue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Chunk size used when serving object reads, deliberately small so multi-chunk code paths get
/// exercised even by modest test objects
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// An in-memory [`Bucket`] implementation.
///
/// Beyond storing objects, it instruments uploads (in-flight gauge with a recorded peak, an
/// optional artificial delay to force uploads to overlap) and can inject upload failures for
/// keys containing a given fragment.
#[derive(Clone)]
pub struct MemoryBucket {
    inner: Arc<MemoryBucketInner>,
}

struct MemoryBucketInner {
    name: String,
    objects: Mutex<HashMap<String, Bytes>>,
    upload_delay: Mutex<Duration>,
    fail_fragments: Mutex<Vec<String>>,
    uploads_in_flight: AtomicUsize,
    peak_uploads_in_flight: AtomicUsize,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryBucketInner {
                name: name.into(),
                objects: Mutex::new(HashMap::new()),
                upload_delay: Mutex::new(Duration::ZERO),
                fail_fragments: Mutex::new(Vec::new()),
                uploads_in_flight: AtomicUsize::new(0),
                peak_uploads_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Delay every upload by `delay` before its chunks are consumed, so that uploads of entries
    /// discovered close together actually overlap in time.
    pub fn set_upload_delay(&self, delay: Duration) {
        *self.inner.upload_delay.lock().unwrap() = delay;
    }

    /// Make any upload whose key contains `fragment` fail with a storage error.
    pub fn fail_uploads_containing(&self, fragment: impl Into<String>) {
        self.inner.fail_fragments.lock().unwrap().push(fragment.into());
    }

    /// Put an object directly into the store, bypassing the instrumented upload path.
    pub fn insert_object(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.inner
            .objects
            .lock()
            .unwrap()
            .insert(key.into(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.inner.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.lock().unwrap().len()
    }

    /// The highest number of uploads that were ever in flight at the same time.
    pub fn peak_concurrent_uploads(&self) -> usize {
        self.inner.peak_uploads_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, key: &str) -> bool {
        self.inner
            .fail_fragments
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| key.contains(fragment))
    }
}

/// RAII guard for the in-flight upload gauge
struct InFlightGuard<'a> {
    inner: &'a MemoryBucketInner,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a MemoryBucketInner) -> Self {
        let now = inner.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_uploads_in_flight.fetch_max(now, Ordering::SeqCst);

        Self { inner }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn get_object_size(&self, key: String) -> Result<u64> {
        match self.object(&key) {
            Some(data) => Ok(data.len() as u64),
            None => snapstage::error::ObjectNotFoundSnafu {
                bucket: self.inner.name.clone(),
                key,
            }
            .fail(),
        }
    }

    async fn read_object(&self, key: String) -> Result<mpsc::Receiver<Result<Bytes>>> {
        let data = match self.object(&key) {
            Some(data) => data,
            None => {
                return snapstage::error::ObjectNotFoundSnafu {
                    bucket: self.inner.name.clone(),
                    key,
                }
                .fail();
            }
        };

        let (sender, receiver) = mpsc::channel(4);

        tokio::spawn(async move {
            let mut offset = 0usize;

            while offset < data.len() {
                let end = (offset + READ_CHUNK_SIZE).min(data.len());
                let chunk = data.slice(offset..end);
                offset = end;

                if sender.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
        });

        Ok(receiver)
    }

    async fn put_object(&self, key: String, data: Bytes) -> Result<()> {
        if self.should_fail(&key) {
            return snapstage::error::StorageSnafu {
                message: format!("injected failure writing '{key}'"),
            }
            .fail();
        }

        self.insert_object(key, data);

        Ok(())
    }

    async fn upload_object(
        &self,
        key: String,
        mut chunks: BoxStream<'static, Result<Bytes>>,
        _size_hint: Option<u64>,
    ) -> Result<u64> {
        let _guard = InFlightGuard::enter(&self.inner);

        let delay = *self.inner.upload_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        // Collect the whole stream first; an error anywhere means nothing gets stored, matching
        // the abort semantics of a real multi-part upload
        let mut data = Vec::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            data.extend_from_slice(&chunk);
        }

        if self.should_fail(&key) {
            return snapstage::error::StorageSnafu {
                message: format!("injected failure uploading '{key}'"),
            }
            .fail();
        }

        let len = data.len() as u64;
        self.insert_object(key, data);

        Ok(len)
    }
}

impl std::fmt::Debug for MemoryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucket")
            .field("name", &self.inner.name)
            .field("objects", &self.object_count())
            .finish()
    }
}

/// An in-memory [`WorkQueue`] implementation which just records every message it's given.
#[derive(Clone, Default)]
pub struct MemoryWorkQueue {
    messages: Arc<Mutex<Vec<ConversionJobMessage>>>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ConversionJobMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn send_conversion_job(&self, message: &ConversionJobMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());

        Ok(())
    }
}

impl std::fmt::Debug for MemoryWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWorkQueue")
            .field("messages", &self.messages.lock().unwrap().len())
            .finish()
    }
}
