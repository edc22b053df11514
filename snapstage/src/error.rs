use snafu::prelude::*;
use url::Url;

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    #[snafu(display("The URL '{url}' doesn't correspond to any supported object storage technology.  Supported URL schemes are: s3"))]
    UnsupportedObjectStorage { url: Url },

    #[snafu(display("The S3 URL '{url}' is missing the bucket name"))]
    MissingBucket { url: Url },

    #[snafu(display(
        "The source key '{key}' doesn't match the expected '{{prefix}}/{{tenant}}/{{user}}/{{job}}/{{file}}' layout"
    ))]
    ArchiveKeyInvalid { key: String },

    #[snafu(display(
        "The archive '{key}' has an unrecognized extension; supported formats are .zip, .tar, .tar.gz, and .tgz"
    ))]
    ArchiveFormatUnknown { key: String },

    #[snafu(display(
        "The S3 bucket '{bucket}' either doesn't exist, or your IAM identity is not granted access"
    ))]
    BucketInvalidOrNotAccessible {
        bucket: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::head_bucket::HeadBucketError,
        >,
    },

    #[snafu(display("Error getting metadata about object '{key}' on S3 bucket '{bucket}'"))]
    HeadObject {
        bucket: String,
        key: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::head_object::HeadObjectError,
        >,
    },

    #[snafu(display("The object '{key}' doesn't exist in bucket '{bucket}'"))]
    ObjectNotFound { bucket: String, key: String },

    #[snafu(display("Error reading object '{key}' on S3 bucket '{bucket}'"))]
    GetObject {
        bucket: String,
        key: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::get_object::GetObjectError,
        >,
    },

    #[snafu(display("Error reading byte stream of object '{key}' on S3 bucket '{bucket}'"))]
    ReadByteStream {
        bucket: String,
        key: String,
        source: aws_smithy_types::byte_stream::error::Error,
    },

    #[snafu(display("Error writing object '{key}' on S3 bucket '{bucket}'"))]
    PutObject {
        bucket: String,
        key: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::put_object::PutObjectError,
        >,
    },

    #[snafu(display("Error starting multi-part upload of object '{key}' on S3 bucket '{bucket}'"))]
    CreateMultipartUpload {
        bucket: String,
        key: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadError,
        >,
    },

    #[snafu(display(
        "Error uploading part {part_number} of object '{key}' on S3 bucket '{bucket}'"
    ))]
    UploadPart {
        bucket: String,
        key: String,
        part_number: usize,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::upload_part::UploadPartError,
        >,
    },

    #[snafu(display("Error completing multi-part upload of object '{key}' on S3 bucket '{bucket}'"))]
    CompleteMultipartUpload {
        bucket: String,
        key: String,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadError,
        >,
    },

    #[snafu(display("Error reading an entry from the archive"))]
    ArchiveRead { source: std::io::Error },

    #[snafu(display("Error reading a zip entry from the archive"))]
    ZipRead { source: zip::result::ZipError },

    #[snafu(display("The archive contains more than {limit} entries"))]
    TooManyEntries { limit: usize },

    #[snafu(display(
        "The archive's uncompressed contents exceed the {limit} byte total size limit"
    ))]
    TotalSizeExceeded { limit: u64 },

    #[snafu(display("The entry '{path}' exceeds the {limit} byte per-file size limit"))]
    FileSizeExceeded { path: String, limit: u64 },

    #[snafu(display(
        "The upload of entry '{path}' was abandoned because the archive read side failed"
    ))]
    EntryAbandoned { path: String },

    #[snafu(display("Archive ingestion was aborted because the upload processor stopped"))]
    IngestAborted {},

    #[snafu(display("No conversion queue URL is configured"))]
    QueueUrlMissing {},

    #[snafu(display("Error serializing the conversion job message for '{key}'"))]
    SerializeMessage {
        key: String,
        source: serde_json::Error,
    },

    #[snafu(display("Error sending a conversion job message to the queue '{queue_url}'"))]
    SendConversionJob {
        queue_url: String,
        source: aws_sdk_sqs::error::SdkError<
            aws_sdk_sqs::operation::send_message::SendMessageError,
        >,
    },

    #[snafu(display("Error in storage back-end: {message}"))]
    Storage { message: String },

    #[snafu(display("Error spawning blocking task"))]
    SpawnBlocking { source: tokio::task::JoinError },

    #[snafu(display("Error spawning async task"))]
    Spawn { source: tokio::task::JoinError },
}
