//! The object-storage notification that triggers an ingestion job, and the job identity parsed
//! out of it.
use crate::Result;
use serde::{Deserialize, Serialize};

/// An "object created" notification for an uploaded archive, as delivered by the object storage
/// platform's event integration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    /// The container (bucket) the archive was uploaded to
    pub container_name: String,

    /// The full key of the uploaded archive object
    pub object_key: String,

    /// The size of the archive object as reported by the notification.
    ///
    /// This is the *compressed* size and is informational only; none of the quota enforcement
    /// trusts it.
    #[serde(default)]
    pub size: u64,
}

/// The identity of one ingestion run, parsed from the source object key.
///
/// Source keys encode `{prefix}/{tenantCode}/{userId}/{jobId}/{fileName}` and the segments are
/// parsed positionally.  The struct is immutable for the lifetime of the job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveJob {
    /// The container holding the source archive
    pub container_name: String,

    /// The full key of the source archive object
    pub object_key: String,

    /// The tenant (photographer organization) code from the source key
    pub tenant_code: String,

    /// The uploading user's identifier from the source key
    pub user_id: String,

    /// The upload job identifier from the source key
    pub job_id: String,

    /// The bare file name of the archive itself
    pub file_name: String,
}

impl ArchiveJob {
    /// Parse the job identity out of an upload notification.
    ///
    /// Fails if the object key doesn't have exactly the five expected path segments, or if any
    /// segment is empty.
    pub fn from_event(event: &UploadEvent) -> Result<Self> {
        let segments: Vec<&str> = event.object_key.split('/').collect();

        let (tenant_code, user_id, job_id, file_name) = match segments.as_slice() {
            [_prefix, tenant, user, job, file]
                if segments.iter().all(|segment| !segment.is_empty()) =>
            {
                (*tenant, *user, *job, *file)
            }
            _ => {
                return crate::error::ArchiveKeyInvalidSnafu {
                    key: event.object_key.clone(),
                }
                .fail();
            }
        };

        Ok(Self {
            container_name: event.container_name.clone(),
            object_key: event.object_key.clone(),
            tenant_code: tenant_code.to_string(),
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
        })
    }

    /// The key prefix under which this job's staged images are written.
    ///
    /// Deliberately deterministic per (tenant, user, job) so that re-processing the same archive
    /// overwrites its own staging objects rather than duplicating them.
    pub fn staging_root(&self, staging_prefix: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            staging_prefix.trim_end_matches('/'),
            self.tenant_code,
            self.user_id,
            self.job_id
        )
    }
}

impl std::fmt::Display for ArchiveJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} (tenant {}, user {}, job {})",
            self.container_name, self.object_key, self.tenant_code, self.user_id, self.job_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;
    use assert_matches::assert_matches;

    fn event(key: &str) -> UploadEvent {
        UploadEvent {
            container_name: "photo-uploads".to_string(),
            object_key: key.to_string(),
            size: 1024,
        }
    }

    #[test]
    fn parses_well_formed_key() {
        let job = ArchiveJob::from_event(&event("uploads/acme/1042/b2f41c/batch.zip")).unwrap();

        assert_eq!(job.tenant_code, "acme");
        assert_eq!(job.user_id, "1042");
        assert_eq!(job.job_id, "b2f41c");
        assert_eq!(job.file_name, "batch.zip");
    }

    #[test]
    fn rejects_malformed_keys() {
        for key in [
            "batch.zip",
            "uploads/acme/batch.zip",
            "uploads/acme/1042/b2f41c/extra/batch.zip",
            "uploads//1042/b2f41c/batch.zip",
            "",
        ] {
            assert_matches!(
                ArchiveJob::from_event(&event(key)),
                Err(IngestError::ArchiveKeyInvalid { .. }),
                "key '{key}' should have been rejected"
            );
        }
    }

    #[test]
    fn staging_root_is_deterministic() {
        let job = ArchiveJob::from_event(&event("uploads/acme/1042/b2f41c/batch.zip")).unwrap();

        assert_eq!(job.staging_root("staging"), "staging/acme/1042/b2f41c");
        assert_eq!(job.staging_root("staging/"), "staging/acme/1042/b2f41c");
    }

    #[test]
    fn event_json_round_trip() {
        let json = r#"{"containerName":"photo-uploads","objectKey":"uploads/acme/1/2/a.zip","size":42}"#;

        let event: UploadEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.container_name, "photo-uploads");
        assert_eq!(event.object_key, "uploads/acme/1/2/a.zip");
        assert_eq!(event.size, 42);
    }
}
