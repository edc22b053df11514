//! The object storage seam: everything the ingestion pipeline needs from a storage back-end,
//! behind dyn traits so the concrete technology is swappable (and so tests can run against an
//! in-memory implementation).
use crate::{Config, Result};
use bytes::Bytes;
use dyn_clone::DynClone;
use futures::stream::BoxStream;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

mod s3;

/// An object storage system like S3.
///
/// Not all object storage systems expose an S3-compatible API, so to ensure we can add support
/// for other systems in the future, the object storage implementation is abstracted behind a
/// trait.
///
/// Use [`ObjectStorageFactory`] to create an instance of this trait.
///
/// Note that all implementations are trivially cloneable such that the cost of a clone is the
/// cost of increasing the ref count on an `Arc`
#[async_trait::async_trait]
pub trait ObjectStorage: DynClone + std::fmt::Debug + Sync + Send + 'static {
    /// Given a URL that contains a bucket and might also contain an object key, extract both
    /// components.
    ///
    /// Fails if the URL is not valid for this object storage technology.  Also fails if the
    /// specified bucket doesn't exist.  Does not verify that the object key exists.
    async fn parse_url(&self, url: &Url) -> Result<(Box<dyn Bucket>, Option<String>)>;

    /// Open the named bucket, validating that it exists and is accessible.
    async fn open_bucket(&self, name: &str) -> Result<Box<dyn Bucket>>;
}

dyn_clone::clone_trait_object!(ObjectStorage);

/// A bucket (in platform-neutral terms, a container) in which the object storage system stores
/// named objects.
///
/// Note that all implementations are trivially cloneable such that the cost of a clone is the
/// cost of increasing the ref count on an `Arc`
#[async_trait::async_trait]
pub trait Bucket: DynClone + std::fmt::Debug + Sync + Send + 'static {
    fn name(&self) -> &str;

    /// Query the size of the specified object.
    ///
    /// Also serves as the existence check when a job is built.
    async fn get_object_size(&self, key: String) -> Result<u64>;

    /// Read the entire object as a stream of chunks of bytes.
    ///
    /// The receiver yields chunks in object order until the object is exhausted or an error is
    /// reported.  Reading is sequential; the archive stream this feeds can only be consumed once
    /// anyway.
    async fn read_object(&self, key: String) -> Result<mpsc::Receiver<Result<Bytes>>>;

    /// Upload a small object directly without any multi-part chunking or fancy asynchrony.
    async fn put_object(&self, key: String, data: Bytes) -> Result<()>;

    /// Upload an object from a stream of chunks, without knowing the total size up front.
    ///
    /// The upload is genuinely streaming: it progresses as chunks arrive, using multi-part
    /// transfers for anything bigger than a single part, so objects larger than available
    /// memory are fine.  `size_hint` is used only to pick a part size that keeps the part count
    /// within the storage system's limits; it may be absent or wrong.
    ///
    /// If the stream yields an error, the upload is aborted: any multi-part upload in progress is
    /// abandoned server-side, no object is written under `key`, and the error is returned.  This
    /// is how an upstream quota breach cancels exactly one entry's upload.
    ///
    /// On success, returns the total number of bytes written.
    async fn upload_object(
        &self,
        key: String,
        chunks: BoxStream<'static, Result<Bytes>>,
        size_hint: Option<u64>,
    ) -> Result<u64>;
}

dyn_clone::clone_trait_object!(Bucket);

/// Singleton type which constructs [`ObjectStorage`] implementations on demand.
///
/// Note that each implementation is also a singleton, so no more than one instance will ever be
/// created.
#[derive(Debug)]
pub struct ObjectStorageFactory {
    config: Config,
}

impl ObjectStorageFactory {
    /// Get the ObjectStorageFactory instance, creating it if it doesn't already exist.
    ///
    /// Note that the `config` argument is ignored if a factory instance was previously created
    /// with a prior call to this method.  It's not possible to have multiple configurations in
    /// use in a single process.
    pub fn instance(config: Config) -> Arc<Self> {
        static INSTANCE: OnceCell<Arc<ObjectStorageFactory>> = OnceCell::new();

        INSTANCE
            .get_or_init(move || Arc::new(Self { config }))
            .clone()
    }

    /// Given the URL to an object storage bucket, prefix, or object, determine which
    /// implementation handles that particular object storage technology and return an instance
    /// of it.
    ///
    /// If the URL isn't recognized, an error is returned
    #[allow(clippy::wrong_self_convention)] // For a factory object I think it's obvious what this means
    pub async fn from_url(&self, url: &Url) -> Result<Box<dyn ObjectStorage>> {
        if url.scheme() == "s3" {
            Ok(self.s3().await)
        } else {
            crate::error::UnsupportedObjectStorageSnafu { url: url.clone() }.fail()
        }
    }

    /// Return a [`ObjectStorage`] implementation for S3 or an S3-compatible API
    pub async fn s3(&self) -> Box<dyn ObjectStorage> {
        // NOTE: Earlier versions of this code used a `OnceCell` object to lazily create just one
        // `S3` instance for the entire process.  This unfortunately won't work in cases where
        // multiple tokio runtimes are in use, such as for example in Rust tests.  Each `Client`
        // object in the AWS SDK holds on to some `hyper` resources which are tied to the runtime,
        // and if the runtime is dropped and these resources are subsequently used, then a panic
        // can happen.  So, every call to `s3` will make a new `ObjectStorage` instance.  Sad.
        //
        // The bug in question is https://github.com/hyperium/hyper/issues/2892, and it seems not
        // likely to be fixed any time soon.
        Box::new(s3::S3::new(self.config.clone()).await)
    }
}
