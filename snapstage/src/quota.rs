//! Hard resource quotas enforced while archive bytes are in flight.
//!
//! The limits exist to bound worst-case resource consumption from a hostile archive (an archive
//! bomb, or simply an enormous upload), so all accounting is done against the bytes actually
//! streamed out of the decoder.  Sizes declared in entry headers are never trusted.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// The three hard limits in effect for one ingestion job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Maximum number of entries the archive may contain
    pub max_entries: usize,

    /// Maximum uncompressed size of a single entry
    pub max_file_bytes: u64,

    /// Maximum cumulative uncompressed size of all entries
    pub max_total_bytes: u64,
}

/// The verdict for one streamed chunk of entry data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ByteCharge {
    /// The chunk fits within all limits
    Ok,

    /// The chunk pushed this entry past the per-file limit.  Only this entry fails.
    FileTooLarge,

    /// The chunk pushed the whole job past the total limit.  The job fails.
    TotalTooLarge,
}

/// Per-job quota counters, shared by handle across every concurrently running entry task.
///
/// All mutation goes through atomic operations; a chunk is charged with a single atomic add, so
/// the shared total is a linearizable sum of every chunk counted so far no matter which entry
/// task charged it.  Double counting and lost updates are both impossible by construction.
#[derive(Debug)]
pub(crate) struct QuotaState {
    limits: QuotaLimits,
    entries_seen: AtomicUsize,
    total_bytes: AtomicU64,
}

impl QuotaState {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            entries_seen: AtomicUsize::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Admit the next discovered entry, counting it against the entry-count limit.
    ///
    /// Every entry surfaced by the archive reader is admitted through here exactly once,
    /// directories included.  Returns the 1-based count of entries seen so far, or `Err` when the
    /// archive has more entries than allowed, which fails the whole job.
    pub fn admit_entry(&self) -> Result<usize, ()> {
        let seen = self.entries_seen.fetch_add(1, Ordering::SeqCst) + 1;

        if seen > self.limits.max_entries {
            Err(())
        } else {
            Ok(seen)
        }
    }

    /// Charge one streamed chunk of an entry's decompressed data.
    ///
    /// `entry_bytes_so_far` is the entry-local count *before* this chunk; the caller owns that
    /// counter since no other task streams the same entry.  The shared total is charged
    /// unconditionally (the bytes have already been produced by the decoder), then the limits are
    /// evaluated with the job-fatal total breach taking priority over the entry-fatal file
    /// breach.
    pub fn charge_entry_bytes(&self, entry_bytes_so_far: u64, chunk_len: u64) -> ByteCharge {
        let total = self.total_bytes.fetch_add(chunk_len, Ordering::SeqCst) + chunk_len;

        if total > self.limits.max_total_bytes {
            ByteCharge::TotalTooLarge
        } else if entry_bytes_so_far + chunk_len > self.limits.max_file_bytes {
            ByteCharge::FileTooLarge
        } else {
            ByteCharge::Ok
        }
    }

    /// Charge decompressed bytes that are being discarded after an entry already failed its
    /// per-file limit.
    ///
    /// The remainder of a failed entry still has to be drained to advance the archive stream, and
    /// those bytes still count against the job-wide total so that a hostile archive can't stream
    /// unbounded data through the failure path.  The per-file limit is not re-evaluated since the
    /// entry has already failed.
    pub fn charge_discarded(&self, chunk_len: u64) -> ByteCharge {
        let total = self.total_bytes.fetch_add(chunk_len, Ordering::SeqCst) + chunk_len;

        if total > self.limits.max_total_bytes {
            ByteCharge::TotalTooLarge
        } else {
            ByteCharge::Ok
        }
    }

    pub fn entries_seen(&self) -> usize {
        self.entries_seen.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }
}
