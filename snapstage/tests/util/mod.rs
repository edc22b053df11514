//! Shared fixture plumbing: an ingestion job wired to in-memory storage and queue.
use snapstage::{ArchiveJob, Config, IngestArchiveJob, IngestArchiveJobBuilder, UploadEvent};
use snapstage_testing::memory::{MemoryBucket, MemoryWorkQueue};

pub const SOURCE_CONTAINER: &str = "photo-uploads";
pub const STAGING_CONTAINER: &str = "photo-staging";

/// The staging root every test job's staged keys land under, per the default config's
/// `staging` prefix and the tenant/user/job segments of [`TestHarness::source_key`]
pub const STAGING_ROOT: &str = "staging/acme/1042/b2f41c";

pub struct TestHarness {
    pub source: MemoryBucket,
    pub staging: MemoryBucket,
    pub queue: MemoryWorkQueue,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        snapstage_testing::logging::init();

        Self {
            source: MemoryBucket::new(SOURCE_CONTAINER),
            staging: MemoryBucket::new(STAGING_CONTAINER),
            queue: MemoryWorkQueue::new(),
            config: Config::default(),
        }
    }

    /// The canonical well-formed source key for an archive named `file_name`
    pub fn source_key(file_name: &str) -> String {
        format!("uploads/acme/1042/b2f41c/{file_name}")
    }

    /// Store `archive_bytes` as the source object and build a job for it
    pub async fn job_for(
        &self,
        file_name: &str,
        archive_bytes: Vec<u8>,
    ) -> snapstage::Result<IngestArchiveJob> {
        let key = Self::source_key(file_name);
        self.source.insert_object(&key, archive_bytes);

        self.job_for_key(&key).await
    }

    /// Build a job for an already-stored (or deliberately missing) source key
    pub async fn job_for_key(&self, key: &str) -> snapstage::Result<IngestArchiveJob> {
        let event = UploadEvent {
            container_name: SOURCE_CONTAINER.to_string(),
            object_key: key.to_string(),
            size: 0,
        };
        let job = ArchiveJob::from_event(&event)?;

        IngestArchiveJobBuilder::new(
            self.config.clone(),
            job,
            Box::new(self.source.clone()),
            Box::new(self.staging.clone()),
            Box::new(self.queue.clone()),
        )
        .build()
        .await
    }
}
