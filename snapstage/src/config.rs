use url::Url;

/// The configuration settings that control the behavior of archive ingestion.
///
/// The three quota settings exist specifically to bound worst-case resource consumption from a
/// hostile or malformed archive, so they are always enforced; they can be raised or lowered but
/// not disabled.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
pub struct Config {
    /// Use a custom S3 endpoint instead of AWS.
    ///
    /// Use this to operate on a non-Amazon S3-compatible service.  If this is set, the AWS region
    /// is ignored.
    #[cfg_attr(feature = "clap", clap(long, global = true, value_name = "URL"))]
    pub s3_endpoint: Option<Url>,

    /// The maximum number of entry uploads that may be in flight at once.
    ///
    /// Entries are discovered sequentially from the archive, but the upload of an extracted image
    /// keeps running while later entries are being read.  This bounds how many of those uploads
    /// may run concurrently, regardless of how many entries the archive contains.
    #[cfg_attr(feature = "clap", clap(long, default_value = "3", global = true))]
    pub max_concurrent_uploads: usize,

    /// The maximum number of entries an archive may contain.
    ///
    /// Exceeding this limit fails the whole ingestion job.
    #[cfg_attr(feature = "clap", clap(long, default_value = "5000", global = true))]
    pub max_archive_entries: usize,

    /// The maximum uncompressed size of a single archive entry.
    ///
    /// An entry whose decompressed byte stream exceeds this limit fails, but the rest of the
    /// archive is still processed.  The limit is enforced against the bytes actually streamed,
    /// never against the size declared in the entry's header.
    ///
    /// Can be specified as an integer, ie "1000000", or with a suffix ie "10MB".
    #[cfg_attr(feature = "clap", clap(long, default_value = "50MiB", global = true))]
    pub max_file_size: byte_unit::Byte,

    /// The maximum total uncompressed size of all archive entries combined.
    ///
    /// Exceeding this limit fails the whole ingestion job.
    ///
    /// Can be specified as an integer, ie "1000000", or with a suffix ie "10GB".
    #[cfg_attr(feature = "clap", clap(long, default_value = "10GiB", global = true))]
    pub max_total_size: byte_unit::Byte,

    /// The key prefix under which staged images are written.
    ///
    /// Each staged image gets the key
    /// `{staging_prefix}/{tenant}/{user}/{job}/{file name}`.
    #[cfg_attr(feature = "clap", clap(long, default_value = "staging", global = true))]
    pub staging_prefix: String,

    /// The container (bucket) in which staged images are written.
    ///
    /// If not set, staged images are written to the same container the archive was uploaded to.
    #[cfg_attr(feature = "clap", clap(long, global = true, value_name = "NAME"))]
    pub staging_container: Option<String>,

    /// The URL of the work queue which receives one conversion job message per staged image.
    #[cfg_attr(feature = "clap", clap(long, global = true, value_name = "URL"))]
    pub conversion_queue_url: Option<Url>,

    /// The part size used for multipart transfers of individual objects.
    ///
    /// Objects small enough to fit in a single part are uploaded with one plain request instead.
    ///
    /// Can be specified as an integer, ie "1000000", or with a suffix ie "10MB".
    ///
    /// Note that the maximum number of parts in an upload is 10,000, so for very large objects
    /// this part size may be overridden if it's smaller than 1/10,000th of the size of the
    /// object.
    #[cfg_attr(feature = "clap", clap(long, default_value = "8MiB", global = true))]
    pub multipart_chunk_size: byte_unit::Byte,

    /// The maximum number of concurrent requests to the bucket when performing transfers.
    ///
    /// In case of multipart transfers, each chunk counts as a separate request.  This is separate
    /// from `max_concurrent_uploads`, which bounds whole-entry uploads.
    #[cfg_attr(feature = "clap", clap(long, default_value = "10", global = true))]
    pub max_concurrent_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        // XXX: Unfortunately this is duplicated here and in the `clap` attributes, unfortunately I
        // can't find a better way unless we unconditionally take a clap dependency in the lib
        // crate which I'm not willing to do
        Self {
            s3_endpoint: None,
            max_concurrent_uploads: 3,
            max_archive_entries: 5000,
            max_file_size: byte_unit::Byte::from_bytes(50 * 1024 * 1024),
            max_total_size: byte_unit::Byte::from_bytes(10 * 1024 * 1024 * 1024),
            staging_prefix: "staging".to_string(),
            staging_container: None,
            conversion_queue_url: None,
            multipart_chunk_size: byte_unit::Byte::from_bytes(8 * 1024 * 1024),
            max_concurrent_requests: 10,
        }
    }
}

impl Config {
    /// The quota limits in effect under this config.
    pub fn quota_limits(&self) -> crate::QuotaLimits {
        crate::QuotaLimits {
            max_entries: self.max_archive_entries,
            max_file_bytes: self.max_file_size.get_bytes() as u64,
            max_total_bytes: self.max_total_size.get_bytes() as u64,
        }
    }
}
