//! The work queue seam: how staged images are handed to the downstream conversion stage.
//!
//! From the conversion stage's perspective each message is an ordinary single-image job; nothing
//! in the message betrays that the image arrived inside an archive.
use crate::Result;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

mod sqs;

pub use sqs::SqsWorkQueue;

/// One conversion job: enough context for the conversion stage to fetch and process a staged
/// image independently.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJobMessage {
    /// The container the staged image lives in
    pub container_name: String,

    /// The staged image's object key
    pub object_key: String,
}

/// A work queue to which conversion jobs are posted, one message per staged object.
///
/// Note that all implementations are trivially cloneable such that the cost of a clone is the
/// cost of increasing the ref count on an `Arc`
#[async_trait::async_trait]
pub trait WorkQueue: DynClone + std::fmt::Debug + Sync + Send + 'static {
    /// Deliver one conversion job message to the queue.
    async fn send_conversion_job(&self, message: &ConversionJobMessage) -> Result<()>;
}

dyn_clone::clone_trait_object!(WorkQueue);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_camel_case_fields() {
        let message = ConversionJobMessage {
            container_name: "photo-staging".to_string(),
            object_key: "staging/acme/1042/b2f41c/img_001.jpg".to_string(),
        };

        let json = serde_json::to_string(&message).unwrap();

        assert_eq!(
            json,
            r#"{"containerName":"photo-staging","objectKey":"staging/acme/1042/b2f41c/img_001.jpg"}"#
        );
    }
}
