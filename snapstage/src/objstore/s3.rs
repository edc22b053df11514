use super::{Bucket, ObjectStorage};
use crate::{Config, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_types::region::Region;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use snafu::{prelude::*, IntoError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, instrument, warn, Instrument};
use url::Url;

/// Implementation of [`ObjectStorage`] for S3 and S3-compatible APIs
#[derive(Clone)]
pub(super) struct S3 {
    inner: Arc<S3Inner>,
}
struct S3Inner {
    config: Config,
    client: aws_sdk_s3::Client,
}

impl S3 {
    pub(super) async fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(S3Inner {
                client: make_s3_client(&config, None).await,
                config,
            }),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3 {
    async fn parse_url(&self, url: &Url) -> Result<(Box<dyn Bucket>, Option<String>)> {
        // S3 URLs are of the form:
        // s3://bucket/path
        // In URL terms, the `bucket` part is considered the host name.
        let bucket = url
            .host_str()
            .ok_or_else(|| crate::error::MissingBucketSnafu { url: url.clone() }.build())?;

        let bucket = self.open_bucket(bucket).await?;

        let key = match url_path_to_s3_path(url.path()) {
            "" => None,
            key => Some(key.to_string()),
        };

        Ok((bucket, key))
    }

    async fn open_bucket(&self, name: &str) -> Result<Box<dyn Bucket>> {
        Ok(Box::new(S3Bucket::new(self, name).await?))
    }
}

impl std::fmt::Debug for S3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S3")
    }
}

#[derive(Clone)]
struct S3Bucket {
    inner: Arc<S3BucketInner>,
}
struct S3BucketInner {
    name: String,

    config: Config,

    /// The region this bucket is located in, if it's different from the region specified in the
    /// AWS SDK config.
    ///
    /// If a bucket is in a different region, then we need to use a different
    /// [`aws_sdk_s3::Client`] instance to talk to the S3 APIs when dealing with that bucket.
    #[allow(dead_code)]
    region: Option<String>,

    /// The client to use to operate on this bucket.
    client: aws_sdk_s3::Client,
}

impl S3Bucket {
    /// Construct a new instance and validate that the current client has access to the bucket.
    ///
    /// If there is no access to the bucket then fail with an error
    async fn new(objstore: &S3, name: &str) -> Result<Self> {
        debug!(bucket = name, "Validating access to bucket");

        let mut client = objstore.inner.client.clone();

        // If the bucket is in a different region, `head_bucket` will fail and the error will
        // include a header telling us the correct region.  Look for that and handle it properly.
        let region = if let Some(region) = Self::validate_access_and_region(&client, name).await? {
            // This bucket is in a different region.  Oops.
            debug!(bucket = name, %region, "Bucket is in another region; repeating access validation in the correct region");

            client = make_s3_client(&objstore.inner.config, region.clone()).await;

            // Repeat the validation again.
            // This can fail if we don't have access, but if it reports again that the region is
            // wrong then something has gone really wrong, or (more likely) there's a bug in our
            // code.
            assert_eq!(
                Self::validate_access_and_region(&client, name).await?,
                None,
                "S3 has already redirected us to another region once before"
            );

            Some(region)
        } else {
            // Bucket is in the default region so no override needed
            None
        };

        debug!(bucket = name, ?region, "Access to bucket is confirmed");

        Ok(Self {
            inner: Arc::new(S3BucketInner {
                name: name.to_string(),
                config: objstore.inner.config.clone(),
                region,
                client,
            }),
        })
    }

    /// Perform a HEAD on the bucket to check access.
    ///
    /// If the HEAD check passes, it means the client's configured region is correct, the
    /// configured credentials have access to the bucket, and all is well.  In that case this
    /// function returns `Ok(None)`
    ///
    /// If the HEAD check fails with an error that indicates the bucket is in a different region,
    /// then this will return `Ok(Some($region))`, and the check should be repeated again in that
    /// region.
    ///
    /// If the HEAD check fails for any other error, most likely because the bucket doesn't exist
    /// or the credentials don't have access to it, then this returns the corresponding error.
    async fn validate_access_and_region(
        client: &aws_sdk_s3::Client,
        name: &str,
    ) -> Result<Option<String>> {
        if let Err(e) = client.head_bucket().bucket(name).send().await {
            if let SdkError::ServiceError(context) = &e {
                let response = context.raw();
                if response.status().as_u16() == 301 {
                    if let Some(region) = response.headers().get("x-amz-bucket-region") {
                        // This is AWS's way of telling us we have the right bucket, but it is in
                        // another region so we should use the appropriate region endpoint
                        return Ok(Some(region.to_string()));
                    }
                }
            };

            Err(crate::error::BucketInvalidOrNotAccessibleSnafu {
                bucket: name.to_string(),
            }
            .into_error(e))
        } else {
            Ok(None)
        }
    }

    /// Pick the multi-part part size for an upload.
    ///
    /// One constraint is that the total number of parts must be no more than 10,000.  That's why
    /// the size hint matters; if using the configured part size would produce close to or more
    /// than 10K parts, then we need to use a larger part size.
    fn part_size(&self, key: &str, size_hint: Option<u64>) -> usize {
        let configured = self.inner.config.multipart_chunk_size.get_bytes() as usize;

        match size_hint {
            None => configured,
            Some(size_hint) => {
                if (size_hint + configured as u64 - 1) / configured as u64 <= 10_000 {
                    configured
                } else {
                    // Wow this is a very large object.  We're going to have to override the part
                    // size to keep the part count under 10K
                    let new_part_size = (size_hint / 10_000) as usize;
                    warn!(%key, size_hint, configured, new_part_size,
                        "Object size hint is so large that the configured part size will be overridden to keep the total part count under 10K");

                    new_part_size
                }
            }
        }
    }

    /// Upload the object identified by `key` using the S3 multipart upload APIs, consuming parts
    /// from `parts` as they are produced.
    ///
    /// The first part has already been received by the caller (that's how it decided multi-part
    /// was warranted) and is passed back in through `first_parts`.
    ///
    /// On any failure, including an error yielded by the parts stream itself, the multi-part
    /// upload is aborted server-side so no partial object is ever completed.
    #[instrument(skip(self, first_parts, parts), fields(bucket = %self.inner.name))]
    async fn multipart_upload(
        &self,
        key: String,
        first_parts: Vec<Result<crate::writers::MultipartChunk>>,
        parts: mpsc::Receiver<Result<crate::writers::MultipartChunk>>,
    ) -> Result<u64> {
        let response = self
            .inner
            .client
            .create_multipart_upload()
            .bucket(&self.inner.name)
            .key(&key)
            .send()
            .await
            .with_context(|_| crate::error::CreateMultipartUploadSnafu {
                bucket: self.inner.name.clone(),
                key: key.clone(),
            })?;
        let upload_id = response
            .upload_id()
            .expect("BUG: multi-part uploads always have upload ID")
            .to_string();

        let result = self
            .upload_parts(&key, &upload_id, first_parts, parts)
            .await;

        if let Err(e) = &result {
            // Before reporting this error, clean up the remains of the multi-part upload
            error!(err = ?e, bucket = %self.inner.name, %key, %upload_id,
                "Multi-part upload failed; aborting multi-part upload on server side");

            if let Err(e) = self
                .inner
                .client
                .abort_multipart_upload()
                .bucket(&self.inner.name)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                error!(err = ?e, bucket = %self.inner.name, %key, %upload_id,
                    "Error aborting multi-part upload.  This will remain on the server forever unless there's a lifecycle policy configured");
            }
        }

        result
    }

    /// The inner part-uploading loop of [`Self::multipart_upload`], separated out so its caller
    /// can abort the upload on any error.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_parts: Vec<Result<crate::writers::MultipartChunk>>,
        parts: mpsc::Receiver<Result<crate::writers::MultipartChunk>>,
    ) -> Result<u64> {
        let parts = futures::stream::iter(first_parts).chain(ReceiverStream::new(parts));

        let part_futs = parts.map(|result| {
            let me = self.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();

            async move {
                let chunk = result?;

                // Our regrouping code numbers parts from 0, but the S3 API expects them to be
                // numbered from 1
                let part_number = chunk.part_number + 1;
                let chunk_size = chunk.data.len();

                let span = tracing::debug_span!("upload part", part_number, chunk_size);

                async move {
                    debug!("Uploading multi-part chunk");

                    let response = me
                        .inner
                        .client
                        .upload_part()
                        .bucket(me.inner.name.clone())
                        .key(&key)
                        .upload_id(upload_id)
                        .part_number(part_number as i32)
                        .body(ByteStream::from(chunk.data))
                        .send()
                        .await
                        .with_context(|_| crate::error::UploadPartSnafu {
                            bucket: me.inner.name.clone(),
                            key: key.clone(),
                            part_number,
                        })?;

                    let e_tag = response
                        .e_tag()
                        .expect("BUG: uploaded part missing etag")
                        .to_string();

                    debug!(%e_tag, "Uploaded multi-part chunk");

                    // Once all of the uploads are done we must provide the information about each
                    // part to the CompleteMultipartUpload call, so retain the key bits here
                    let completed_part = CompletedPart::builder()
                        .e_tag(e_tag)
                        .part_number(part_number as i32)
                        .build();

                    Ok((chunk_size, completed_part))
                }
                .instrument(span)
                .await
            }
        });

        debug!("Commencing multi-part upload");

        // Use the magic of `buffer_unordered` to poll these part uploading futures up to a
        // maximum concurrency level to honor the configured max parallel requests
        let mut uploaded_parts =
            part_futs.buffer_unordered(self.inner.config.max_concurrent_requests);

        let mut total_bytes = 0u64;
        let mut total_parts = 0usize;
        let mut completed_parts = Vec::new();

        while let Some(result) = uploaded_parts.next().await {
            let (chunk_size, completed_part) = result?;

            total_bytes += chunk_size as u64;
            total_parts += 1;

            completed_parts.push(completed_part);
        }

        debug!(
            total_parts,
            total_bytes, "All parts uploaded; completing multi-part upload"
        );

        // AWS requires that the parts be listed in ascending part number order, even though they
        // are all tied together with a unique upload ID.  `buffer_unordered` completes them in
        // whatever order the network felt like, so sort.
        completed_parts.sort_unstable_by_key(|part| part.part_number());

        self.inner
            .client
            .complete_multipart_upload()
            .bucket(&self.inner.name)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .with_context(|_| crate::error::CompleteMultipartUploadSnafu {
                bucket: self.inner.name.clone(),
                key: key.to_string(),
            })?;

        Ok(total_bytes)
    }
}

#[async_trait::async_trait]
impl Bucket for S3Bucket {
    fn name(&self) -> &str {
        &self.inner.name
    }

    #[instrument(skip(self), fields(bucket = %self.inner.name))]
    async fn get_object_size(&self, key: String) -> Result<u64> {
        let key = url_path_to_s3_path(&key);

        let metadata = self
            .inner
            .client
            .head_object()
            .bucket(&self.inner.name)
            .key(key)
            .send()
            .await
            .with_context(|_| crate::error::HeadObjectSnafu {
                bucket: self.inner.name.clone(),
                key: key.to_string(),
            })?;

        Ok(metadata.content_length().unwrap_or_default() as u64)
    }

    #[instrument(skip(self), fields(bucket = %self.inner.name))]
    async fn read_object(&self, key: String) -> Result<mpsc::Receiver<Result<Bytes>>> {
        debug!("Reading object as a stream of chunks");

        let key = url_path_to_s3_path(&key).to_string();

        let response = self
            .inner
            .client
            .get_object()
            .bucket(&self.inner.name)
            .key(&key)
            .send()
            .await
            .with_context(|_| crate::error::GetObjectSnafu {
                bucket: self.inner.name.clone(),
                key: key.clone(),
            })?;

        let (chunks_sender, chunks_receiver) =
            mpsc::channel(self.inner.config.max_concurrent_requests);

        let bucket = self.inner.name.clone();

        tokio::spawn(async move {
            let mut body = response.body;

            loop {
                let result = body
                    .try_next()
                    .await
                    .with_context(|_| crate::error::ReadByteStreamSnafu {
                        bucket: bucket.clone(),
                        key: key.clone(),
                    });

                match result {
                    Ok(Some(bytes)) => {
                        if chunks_sender.send(Ok(bytes)).await.is_err() {
                            // The reader side hung up; it has no more use for the object
                            debug!("chunks receiver dropped; abandoning object read");
                            break;
                        }
                    }
                    Ok(None) => {
                        // End of the object
                        break;
                    }
                    Err(e) => {
                        let _ = chunks_sender.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        Ok(chunks_receiver)
    }

    #[instrument(skip(self, data), fields(bucket = %self.inner.name, len = data.len()))]
    async fn put_object(&self, key: String, data: Bytes) -> Result<()> {
        let key = url_path_to_s3_path(&key);

        self.inner
            .client
            .put_object()
            .bucket(&self.inner.name)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|_| crate::error::PutObjectSnafu {
                bucket: self.inner.name.clone(),
                key: key.to_string(),
            })?;

        Ok(())
    }

    #[instrument(skip(self, chunks), fields(bucket = %self.inner.name))]
    async fn upload_object(
        &self,
        key: String,
        chunks: BoxStream<'static, Result<Bytes>>,
        size_hint: Option<u64>,
    ) -> Result<u64> {
        let key = url_path_to_s3_path(&key).to_string();
        let part_size = self.part_size(&key, size_hint);

        let mut parts =
            crate::writers::into_parts(chunks, part_size, self.inner.config.max_concurrent_requests);

        // Peek at up to two parts to decide between a single PUT and a multi-part upload without
        // ever buffering more than one part's worth of data
        let first = match parts.recv().await {
            None => {
                // The stream ended with no data at all; stage an empty object
                debug!(%key, "Uploading empty object");
                self.put_object(key, Bytes::new()).await?;
                return Ok(0);
            }
            Some(Err(e)) => {
                // The stream failed before producing anything; nothing was written
                return Err(e);
            }
            Some(Ok(first)) => first,
        };

        match parts.recv().await {
            None => {
                // The whole object fits in one part, so there's no value in the multi-part dance
                debug!(%key, len = first.data.len(), "Uploading object in a single request");

                let len = first.data.len() as u64;
                self.put_object(key, first.data).await?;

                Ok(len)
            }
            second => {
                let second = second.expect("BUG: the None arm was matched above");

                self.multipart_upload(key, vec![Ok(first), second], parts)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Bucket")
            .field("name", &self.inner.name)
            .field("region", &self.inner.region)
            .field("client", &"<...>")
            .finish()
    }
}

/// Paths from URLs like `s3://bucket/prefix/object` always start with `/`, but that's not
/// actually part of the S3 object key.  Fix such paths.
///
/// Technically, the URL path *is* started by `/`, but S3's API doesn't work that way, it regards
/// the `/` as a separator or delimiter which splits the bucket name and the object key.
fn url_path_to_s3_path(key: &str) -> &str {
    if let Some(stripped) = key.strip_prefix('/') {
        stripped
    } else {
        key
    }
}

/// Create a new AWS SDK S3 client, using either an explicit region or the default configuration
/// deduced from the environment
async fn make_s3_client(config: &Config, region: impl Into<Option<String>>) -> aws_sdk_s3::Client {
    let region = region.into();

    let region_provider = if let Some(region) = region {
        RegionProviderChain::first_try(Region::new(region))
    } else {
        // No explicit region; use the environment
        RegionProviderChain::default_provider().or_else("us-east-1")
    };
    let aws_config = aws_config::from_env().region(region_provider).load().await;

    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if let Some(s3_endpoint) = &config.s3_endpoint {
        // Custom S3-compatible services generally don't support virtual-host style bucket
        // addressing, so force path style when an endpoint override is in use
        s3_config_builder = s3_config_builder
            .endpoint_url(s3_endpoint.to_string())
            .force_path_style(true);
    }

    aws_sdk_s3::Client::from_conf(s3_config_builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_paths_lose_their_leading_slash() {
        assert_eq!(url_path_to_s3_path("/uploads/a.zip"), "uploads/a.zip");
        assert_eq!(url_path_to_s3_path("uploads/a.zip"), "uploads/a.zip");
        assert_eq!(url_path_to_s3_path(""), "");
    }
}
