//! Per-entry outcomes and the aggregated result of one ingestion job.
use crate::{IngestError, QuotaLimits};

/// Why an entry was skipped rather than staged.
///
/// Skips are ordinary, expected outcomes.  They are recorded and logged at debug level but are
/// never treated as errors and never fail the job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The entry is a directory record
    Directory,

    /// The entry is not a regular file (symlink, device node, etc)
    NonRegular,

    /// The entry's file extension is not on the image allow-list
    NotImage,

    /// The entry's internal path failed sanitization (traversal, absolute, NUL, ...)
    UnsafePath,
}

impl SkipReason {
    pub fn name(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::NonRegular => "non-regular",
            Self::NotImage => "not an image",
            Self::UnsafePath => "unsafe path",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The recorded fate of one archive entry.  Every entry the reader surfaces produces exactly one
/// of these.
#[derive(Debug)]
pub enum EntryOutcome {
    /// The entry was staged successfully
    Uploaded {
        /// The staging key the image was written under
        staging_key: String,

        /// The number of decompressed bytes uploaded
        bytes: u64,
    },

    /// The entry was skipped; skips never degrade the job outcome
    Skipped {
        /// The entry's internal path as reported by the archive (lossy if not UTF-8)
        path: String,
        reason: SkipReason,
    },

    /// The entry failed (per-file quota breach or upload I/O error); the job continues
    Failed {
        path: String,
        error: IngestError,
    },
}

/// The aggregated result of one ingestion job.
///
/// The `staged_keys` list is the sole payload handed to the downstream notifier.  Keys appear in
/// upload-completion order, which is not guaranteed to match discovery order; downstream
/// consumers must not depend on the ordering.
#[derive(Debug)]
pub struct JobResult {
    /// Total entries discovered in the archive, directories included
    pub entries_seen: usize,

    /// Entries staged successfully
    pub uploaded: usize,

    /// Entries skipped (directories, non-images, unsafe paths)
    pub skipped: usize,

    /// Entries that failed without failing the job
    pub failed: usize,

    /// Cumulative decompressed bytes charged against the total-size quota
    pub total_bytes: u64,

    /// The quota limits that were in effect
    pub limits: QuotaLimits,

    /// Staging keys of every uploaded entry, in completion order
    pub staged_keys: Vec<String>,

    /// The full per-entry record backing the counts above
    pub outcomes: Vec<EntryOutcome>,
}

impl JobResult {
    /// True when at least one entry failed.  The job still completed, but the caller may want to
    /// surface the partial failure.
    pub fn degraded(&self) -> bool {
        self.failed > 0
    }
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries seen, {} uploaded, {} skipped, {} failed ({} bytes streamed)",
            self.entries_seen, self.uploaded, self.skipped, self.failed, self.total_bytes
        )
    }
}
