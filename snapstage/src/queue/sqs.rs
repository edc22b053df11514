use super::{ConversionJobMessage, WorkQueue};
use crate::Result;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Implementation of [`WorkQueue`] backed by AWS SQS.
#[derive(Clone)]
pub struct SqsWorkQueue {
    inner: Arc<SqsWorkQueueInner>,
}

struct SqsWorkQueueInner {
    queue_url: String,
    client: aws_sdk_sqs::Client,
}

impl SqsWorkQueue {
    /// Construct a queue handle from the environment's AWS configuration and a queue URL.
    pub async fn new(queue_url: impl Into<String>) -> Self {
        let aws_config = aws_config::from_env().load().await;

        Self {
            inner: Arc::new(SqsWorkQueueInner {
                queue_url: queue_url.into(),
                client: aws_sdk_sqs::Client::new(&aws_config),
            }),
        }
    }
}

#[async_trait::async_trait]
impl WorkQueue for SqsWorkQueue {
    #[instrument(skip(self), fields(queue_url = %self.inner.queue_url))]
    async fn send_conversion_job(&self, message: &ConversionJobMessage) -> Result<()> {
        let body = serde_json::to_string(message).with_context(|_| {
            crate::error::SerializeMessageSnafu {
                key: message.object_key.clone(),
            }
        })?;

        self.inner
            .client
            .send_message()
            .queue_url(&self.inner.queue_url)
            .message_body(body)
            .send()
            .await
            .with_context(|_| crate::error::SendConversionJobSnafu {
                queue_url: self.inner.queue_url.clone(),
            })?;

        debug!(key = %message.object_key, "Posted conversion job");

        Ok(())
    }
}

impl std::fmt::Debug for SqsWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsWorkQueue")
            .field("queue_url", &self.inner.queue_url)
            .field("client", &"<...>")
            .finish()
    }
}
