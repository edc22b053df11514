//! Implementations of progress callbacks that render progress bars
use snapstage::{
    IngestArchiveJob, IngestError, IngestProgressCallback, JobResult, Result, SkipReason,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Run the specified ingestion job, with progress bars for extra pretty-ness
pub(crate) async fn run_ingest_job(
    globals: &super::Globals,
    job: IngestArchiveJob,
) -> Result<JobResult> {
    let progress = IngestProgressReport::new(hide_progress(globals), &job);

    job.run(progress).await
}

/// Progress should be hidden for either of verbose mode (because there will be a flurry of log
/// messages and the progress bar rendering will be all messed up), or quiet mode (because
/// progress bars are not quiet).
fn hide_progress(globals: &super::Globals) -> bool {
    globals.verbose || globals.quiet
}

/// Progress reporting for the ingest operation, which receives progress updates from the lib
/// crate and renders progress bars accordingly
struct IngestProgressReport {
    /// Aggregate which groups the below progress bars together
    #[allow(dead_code)] // Unused but needs to stay in scope
    multi: indicatif::MultiProgress,

    /// Bytes of the (compressed) archive consumed so far, out of the archive's total size
    archive_bar: indicatif::ProgressBar,

    /// Running tally of entry outcomes
    entries_bar: indicatif::ProgressBar,

    uploaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl IngestProgressReport {
    fn new(hide: bool, job: &IngestArchiveJob) -> Self {
        let multi = indicatif::MultiProgress::new();

        let (archive_bar, entries_bar) = if hide {
            (
                indicatif::ProgressBar::hidden(),
                indicatif::ProgressBar::hidden(),
            )
        } else {
            let archive_bar = multi.add(indicatif::ProgressBar::new(job.archive_size()));
            archive_bar.set_style(
                indicatif::ProgressStyle::with_template(
                    "{prefix:>9} [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec}",
                )
                .unwrap()
                .progress_chars("=> "),
            );
            archive_bar.set_prefix("archive");

            let entries_bar = multi.add(indicatif::ProgressBar::new_spinner());
            entries_bar.set_style(
                indicatif::ProgressStyle::with_template("{prefix:>9} {spinner} {msg}").unwrap(),
            );
            entries_bar.set_prefix("entries");

            (archive_bar, entries_bar)
        };

        Self {
            multi,
            archive_bar,
            entries_bar,
            uploaded: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn update_entries_message(&self) {
        self.entries_bar.set_message(format!(
            "{} uploaded, {} skipped, {} failed",
            self.uploaded.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        ));
        self.entries_bar.tick();
    }
}

impl IngestProgressCallback for IngestProgressReport {
    fn archive_bytes_read(&self, bytes: usize) {
        self.archive_bar.inc(bytes as u64);
    }

    fn entry_skipped(&self, _path: &str, _reason: SkipReason) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.update_entries_message();
    }

    fn entry_uploaded(&self, _staging_key: &str, _bytes: u64) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
        self.update_entries_message();
    }

    fn entry_failed(&self, _path: &str, _error: &IngestError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.update_entries_message();
    }

    fn ingest_finished(&self, _result: &JobResult) {
        self.archive_bar.finish_and_clear();
        self.entries_bar.finish_and_clear();
    }
}
