//! End-to-end ingestion scenarios over in-memory storage: classification, sanitization, staging,
//! and downstream notification.
use crate::util::{TestHarness, STAGING_CONTAINER, STAGING_ROOT};
use assert_matches::assert_matches;
use snapstage::{EntryOutcome, IngestError, SkipReason};
use snapstage_testing::archive::{build_tar, build_tar_gz, build_zip, sha256, TestEntry};

/// The canonical mixed archive: 7 images, 2 text files, 1 directory, all within quota.
/// Exactly the image entries get staged, and the conversion queue gets exactly one message per
/// staged object.
#[tokio::test(flavor = "multi_thread")]
async fn mixed_zip_archive_stages_images_and_notifies() -> crate::Result<()> {
    let harness = TestHarness::new();

    let mut entries = vec![TestEntry::directory("wedding/")];
    for i in 0..7 {
        entries.push(TestEntry::file(format!("wedding/img_{i:03}.jpg"), 10 * 1024));
    }
    entries.push(TestEntry::file_with_data("wedding/notes.txt", "call the bride"));
    entries.push(TestEntry::file_with_data("wedding/README.txt", "delivery info"));

    let job = harness.job_for("batch.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.entries_seen, 10);
    assert_eq!(result.uploaded, 7);
    assert_eq!(result.skipped, 3);
    assert_eq!(result.failed, 0);
    assert!(!result.degraded());

    // One staged object per image entry, all under the job's staging root
    assert_eq!(result.staged_keys.len(), 7);
    assert_eq!(harness.staging.object_count(), 7);
    for key in &result.staged_keys {
        assert!(
            key.starts_with(STAGING_ROOT),
            "staged key '{key}' escaped the staging root"
        );
    }

    // Staged bytes must be exactly what went into the archive
    for entry in &entries {
        if let TestEntry::File { path, data } = entry {
            if !path.ends_with(".jpg") {
                continue;
            }

            let base_name = path.rsplit('/').next().unwrap();
            let staged = harness
                .staging
                .object(&format!("{STAGING_ROOT}/{base_name}"))
                .expect("image entry should have been staged");

            assert_eq!(sha256(&staged), sha256(data), "contents of '{path}' corrupted");
        }
    }

    // Exactly one conversion message per staged object, addressed at the staging container
    let messages = harness.queue.messages();
    assert_eq!(messages.len(), 7);

    let mut notified: Vec<&str> = messages.iter().map(|m| m.object_key.as_str()).collect();
    let mut staged: Vec<&str> = result.staged_keys.iter().map(String::as_str).collect();
    notified.sort();
    staged.sort();
    assert_eq!(notified, staged);

    for message in &messages {
        assert_eq!(message.container_name, STAGING_CONTAINER);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn tar_archives_are_supported() -> crate::Result<()> {
    let harness = TestHarness::new();

    let entries = vec![
        TestEntry::file("a.jpg", 2048),
        TestEntry::file("b.png", 2048),
    ];

    let job = harness.job_for("batch.tar", build_tar(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.uploaded, 2);
    assert_eq!(harness.staging.object_count(), 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn gzipped_tar_archives_are_supported() -> crate::Result<()> {
    let harness = TestHarness::new();

    let entries = vec![
        TestEntry::file("a.jpg", 2048),
        TestEntry::file("b.tiff", 2048),
    ];

    let job = harness.job_for("batch.tar.gz", build_tar_gz(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.uploaded, 2);
    assert_eq!(harness.staging.object_count(), 2);

    Ok(())
}

/// Traversal, absolute, and NUL-carrying paths are skipped, and nothing is ever written outside
/// the staging root.
#[tokio::test(flavor = "multi_thread")]
async fn hostile_paths_are_skipped_not_staged() -> crate::Result<()> {
    let harness = TestHarness::new();

    // The zip writer stores entry names verbatim, which is exactly what a hostile archive
    // would carry.  (The tar builder refuses to write traversal paths, so it can't make this
    // fixture.)
    let entries = vec![
        TestEntry::file("../../etc/passwd", 512),
        TestEntry::file("../../etc/evil.jpg", 512),
        TestEntry::file("/etc/absolute.png", 512),
        TestEntry::file("a/../../climber.jpg", 512),
        TestEntry::file("nul\0byte.jpg", 512),
        TestEntry::file("innocent.jpg", 512),
    ];

    let job = harness.job_for("hostile.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.entries_seen, 6);
    assert_eq!(result.uploaded, 1);
    assert_eq!(result.skipped, 5);
    assert_eq!(result.failed, 0);

    assert_eq!(
        harness.staging.object_keys(),
        vec![format!("{STAGING_ROOT}/innocent.jpg")]
    );

    // `../../etc/passwd` is not even an image, so it skips on classification; the image-suffixed
    // attempts must have skipped on the path check
    let unsafe_skips = result
        .outcomes
        .iter()
        .filter(|outcome| {
            matches!(
                outcome,
                EntryOutcome::Skipped {
                    reason: SkipReason::UnsafePath,
                    ..
                }
            )
        })
        .count();
    assert_eq!(unsafe_skips, 4);

    Ok(())
}

/// A single entry whose upload fails is recorded as failed; sibling entries and the job itself
/// are unaffected, and the failed entry is neither staged nor announced downstream.
#[tokio::test(flavor = "multi_thread")]
async fn upload_failure_is_entry_fatal_job_safe() -> crate::Result<()> {
    let harness = TestHarness::new();
    harness.staging.fail_uploads_containing("broken");

    let entries = vec![
        TestEntry::file("one.jpg", 4096),
        TestEntry::file("broken.jpg", 4096),
        TestEntry::file("two.jpg", 4096),
    ];

    let job = harness.job_for("batch.zip", build_zip(&entries)).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.uploaded, 2);
    assert_eq!(result.failed, 1);
    assert!(result.degraded());

    assert_eq!(harness.staging.object_count(), 2);
    assert!(harness.staging.object(&format!("{STAGING_ROOT}/broken.jpg")).is_none());

    // The failed entry must not be announced to the conversion stage
    assert_eq!(harness.queue.messages().len(), 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_archive_is_a_clean_no_op() -> crate::Result<()> {
    let harness = TestHarness::new();

    let job = harness.job_for("empty.zip", build_zip(&[])).await?;
    let result = job.run_without_progress().await?;

    assert_eq!(result.entries_seen, 0);
    assert_eq!(result.uploaded, 0);
    assert_eq!(harness.staging.object_count(), 0);
    assert!(harness.queue.messages().is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_archive_format_fails_to_build() {
    let harness = TestHarness::new();

    let result = harness.job_for("batch.rar", vec![1, 2, 3]).await;

    assert_matches!(result, Err(IngestError::ArchiveFormatUnknown { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_source_object_fails_to_build() {
    let harness = TestHarness::new();

    let result = harness
        .job_for_key(&TestHarness::source_key("nowhere.zip"))
        .await;

    assert_matches!(result, Err(IngestError::ObjectNotFound { .. }));
}

/// A corrupt archive body fails the job, and nothing is announced downstream.
#[tokio::test(flavor = "multi_thread")]
async fn corrupt_archive_is_job_fatal() -> crate::Result<()> {
    let harness = TestHarness::new();

    let job = harness.job_for("garbage.zip", vec![0x42; 4096]).await?;
    let result = job.run_without_progress().await;

    assert!(result.is_err());
    assert!(harness.queue.messages().is_empty());

    Ok(())
}
