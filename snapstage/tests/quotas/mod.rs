//! Quota enforcement scenarios: entry count, per-file bytes, and total bytes, all enforced
//! against the bytes actually streamed out of the decoder.
use crate::util::{TestHarness, STAGING_ROOT};
use assert_matches::assert_matches;
use more_asserts::assert_le;
use snapstage::IngestError;
use snapstage_testing::archive::{build_zip, TestEntry};

/// An archive with one entry more than allowed fails job-fatally, but the entries admitted
/// before the breach still settle and are accounted for.
#[tokio::test(flavor = "multi_thread")]
async fn entry_count_breach_is_job_fatal() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_archive_entries = 5;

    let entries: Vec<TestEntry> = (0..6)
        .map(|i| TestEntry::file(format!("img_{i}.jpg"), 1024))
        .collect();

    let job = harness.job_for("toomany.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await;

    assert_matches!(result, Err(IngestError::TooManyEntries { limit: 5 }));

    // The five admitted entries were allowed to settle; the sixth was never admitted
    assert_eq!(harness.staging.object_count(), 5);

    // A failed job announces nothing downstream; the whole job is retried instead
    assert!(harness.queue.messages().is_empty());

    Ok(())
}

/// Breaching the whole-job byte limit mid-entry fails the job; entries fully streamed before the
/// breach still settle.
#[tokio::test(flavor = "multi_thread")]
async fn total_size_breach_is_job_fatal() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_total_size = byte_unit::Byte::from_bytes(100 * 1024);

    let entries: Vec<TestEntry> = (0..4)
        .map(|i| TestEntry::file(format!("img_{i}.jpg"), 40 * 1024))
        .collect();

    let job = harness.job_for("toobig.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await;

    assert_matches!(result, Err(IngestError::TotalSizeExceeded { .. }));

    // Entries 0 and 1 (80 KiB cumulative) fit; entry 2 breached mid-stream and entry 3 was
    // never read
    assert_eq!(harness.staging.object_count(), 2);
    assert!(harness.queue.messages().is_empty());

    Ok(())
}

/// One oversized entry fails alone; its siblings upload and the job succeeds overall.
#[tokio::test(flavor = "multi_thread")]
async fn per_file_breach_fails_entry_only() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_file_size = byte_unit::Byte::from_bytes(50 * 1024);

    let entries = vec![
        TestEntry::file("ok_1.jpg", 20 * 1024),
        TestEntry::file("huge.jpg", 60 * 1024),
        TestEntry::file("ok_2.jpg", 20 * 1024),
    ];

    let job = harness.job_for("onehuge.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.entries_seen, 3);
    assert_eq!(result.uploaded, 2);
    assert_eq!(result.failed, 1);
    assert!(result.degraded());

    // The oversized entry's recorded failure names the per-file limit
    let failure = result
        .outcomes
        .iter()
        .find_map(|outcome| match outcome {
            snapstage::EntryOutcome::Failed { path, error } => Some((path, error)),
            _ => None,
        })
        .expect("the oversized entry should have a failure record");
    assert_eq!(failure.0, "huge.jpg");
    assert_matches!(failure.1, IngestError::FileSizeExceeded { .. });

    // Nothing of the oversized entry reached staging
    assert!(harness.staging.object(&format!("{STAGING_ROOT}/huge.jpg")).is_none());
    assert_eq!(harness.staging.object_count(), 2);

    // The drained remainder of the failed entry still counts toward the streamed total
    assert_eq!(result.total_bytes, 100 * 1024);

    // Only the two staged entries are announced
    assert_eq!(harness.queue.messages().len(), 2);

    Ok(())
}

/// The quotas trip on decompressed bytes, so a tiny archive that inflates enormously (an archive
/// bomb) is stopped regardless of its compressed size.
#[tokio::test(flavor = "multi_thread")]
async fn archive_bomb_trips_total_quota() -> crate::Result<()> {
    let mut harness = TestHarness::new();
    harness.config.max_total_size = byte_unit::Byte::from_bytes(8 * 1024 * 1024);

    // Runs of zeroes compress to nearly nothing: ~15 MiB decompressed, a few KiB compressed
    let entries: Vec<TestEntry> = (0..3)
        .map(|i| TestEntry::file_with_data(format!("zeros_{i}.jpg"), vec![0u8; 5 * 1024 * 1024]))
        .collect();

    let archive = build_zip(&entries);
    assert_le!(archive.len(), 100 * 1024, "the bomb should compress tightly");

    let job = harness.job_for("bomb.zip", archive).await?;
    let result = job.run_without_progress().await;

    assert_matches!(result, Err(IngestError::TotalSizeExceeded { .. }));

    Ok(())
}

/// The streamed total in the result reflects every counted byte, while skipped entries' drained
/// bytes deliberately stay uncounted.
#[tokio::test(flavor = "multi_thread")]
async fn skipped_entries_do_not_charge_quotas() -> crate::Result<()> {
    let mut harness = TestHarness::new();

    // A total cap smaller than the skipped payload: if skip-drains were charged, this job
    // would fail
    harness.config.max_total_size = byte_unit::Byte::from_bytes(64 * 1024);

    let entries = vec![
        TestEntry::file("sidecar.xmp", 100 * 1024),
        TestEntry::file("keeper.jpg", 30 * 1024),
    ];

    let job = harness.job_for("sidecar.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.uploaded, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.total_bytes, 30 * 1024);

    Ok(())
}
