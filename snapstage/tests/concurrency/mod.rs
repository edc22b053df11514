//! Concurrency behavior: the admission gate bounds in-flight uploads, and outstanding uploads
//! settle even when the job fails mid-stream.
use crate::util::TestHarness;
use assert_matches::assert_matches;
use more_asserts::{assert_gt, assert_le};
use snapstage::IngestError;
use snapstage_testing::archive::{build_zip, TestEntry};
use std::time::Duration;

/// However many entries the archive contains, the number of simultaneously in-flight uploads
/// never exceeds the configured concurrency.
#[tokio::test(flavor = "multi_thread")]
async fn in_flight_uploads_never_exceed_the_limit() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_concurrent_uploads = 2;

    // Delay each upload so that uploads of consecutively discovered entries genuinely overlap
    harness.staging.set_upload_delay(Duration::from_millis(10));

    let entries: Vec<TestEntry> = (0..12)
        .map(|i| TestEntry::file(format!("img_{i:02}.jpg"), 2048))
        .collect();

    let job = harness.job_for("many.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.uploaded, 12);
    assert_le!(harness.staging.peak_concurrent_uploads(), 2);

    // Sanity check on the instrumentation itself: with a dozen delayed uploads the gate should
    // actually have been contended, otherwise this test proves nothing
    assert_gt!(harness.staging.peak_concurrent_uploads(), 1);

    Ok(())
}

/// When a job-fatal breach is detected mid-stream, uploads that were already admitted are not
/// abandoned; they settle before the job reports failure.
#[tokio::test(flavor = "multi_thread")]
async fn admitted_uploads_settle_before_a_fatal_breach_is_reported() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_archive_entries = 4;
    harness.config.max_concurrent_uploads = 2;
    harness.staging.set_upload_delay(Duration::from_millis(10));

    let entries: Vec<TestEntry> = (0..6)
        .map(|i| TestEntry::file(format!("img_{i}.jpg"), 2048))
        .collect();

    let job = harness.job_for("fatal.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await;

    assert_matches!(result, Err(IngestError::TooManyEntries { limit: 4 }));

    // Every admitted entry's upload ran to completion before the failure was reported; nothing
    // was left dangling half-written
    assert_eq!(harness.staging.object_count(), 4);

    Ok(())
}
