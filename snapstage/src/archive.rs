//! Reading archive entries as a lazy, forward-only, single-pass sequence.
//!
//! Archive formats are inherently sequential: entry N+1's header lives after entry N's data in
//! the (possibly compressed) stream, so entries are surfaced one at a time, in archive order, and
//! each entry's payload must be fully consumed before the next entry becomes visible.  Nothing
//! here buffers the decompressed archive beyond the current entry's read window.
//!
//! The concrete decoder (`tar`, gzip-wrapped `tar`, or `zip`) is chosen from the source key's
//! extension and hidden behind [`EntrySink`], so the pipeline and orchestrator never touch a
//! format-specific type.

use crate::{ingest::IngestProgressCallback, Result};
use snafu::prelude::*;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// The supported archive container formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detect the archive format from the source object key.
    ///
    /// Detection is by extension only; the archive bytes themselves are not sniffed, since the
    /// source stream can only be read once.
    pub fn for_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();

        if key.ends_with(".tar.gz") || key.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if key.ends_with(".tar") {
            Some(Self::Tar)
        } else if key.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// What kind of record an archive entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
    /// Symlinks, hard links, device nodes, and other records that aren't plain files
    Other,
}

/// One entry surfaced from the archive stream.
///
/// Transient: the payload reader is only valid inside the [`EntrySink::on_entry`] call, and the
/// sink must consume (or drain) it fully before returning, otherwise the walk cannot advance to
/// the next entry.
pub(crate) struct ArchiveEntry<'a> {
    /// The entry's internal path, as raw bytes.  Attacker-controlled; not assumed to be UTF-8.
    pub raw_path: Vec<u8>,

    pub kind: EntryKind,

    /// The size declared in the entry's header.  Untrusted; useful only as an upload size hint.
    pub declared_size: u64,

    /// The entry's decompressed payload
    pub reader: &'a mut dyn Read,
}

/// The consumer of a sequential archive walk.
pub(crate) trait EntrySink {
    /// Handle the next entry in archive order.
    ///
    /// Returning an error aborts the walk; that is the job-fatal path.  Entry-level problems are
    /// the sink's own business and must not surface here.
    fn on_entry(&mut self, entry: ArchiveEntry<'_>) -> Result<()>;
}

/// Walk all entries of the archive in `reader`, in archive order, feeding each to `sink`.
///
/// This is a blocking call and must run on a blocking worker thread.
pub(crate) fn read_archive_entries<R: Read>(
    format: ArchiveFormat,
    reader: R,
    sink: &mut dyn EntrySink,
) -> Result<()> {
    match format {
        ArchiveFormat::Tar => walk_tar(reader, sink),
        ArchiveFormat::TarGz => walk_tar(flate2::read::GzDecoder::new(reader), sink),
        ArchiveFormat::Zip => walk_zip(reader, sink),
    }
}

fn walk_tar<R: Read>(reader: R, sink: &mut dyn EntrySink) -> Result<()> {
    let mut archive = tar::Archive::new(reader);

    for result in archive.entries().context(crate::error::ArchiveReadSnafu)? {
        let mut entry = result.context(crate::error::ArchiveReadSnafu)?;

        let raw_path = entry.path_bytes().into_owned();
        let entry_type = entry.header().entry_type();

        let kind = if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let declared_size = entry.size();

        sink.on_entry(ArchiveEntry {
            raw_path,
            kind,
            declared_size,
            reader: &mut entry,
        })?;
    }

    debug!("completed walking all tar entries");

    Ok(())
}

fn walk_zip<R: Read>(mut reader: R, sink: &mut dyn EntrySink) -> Result<()> {
    loop {
        let mut file = match zip::read::read_zipfile_from_stream(&mut reader)
            .context(crate::error::ZipReadSnafu)?
        {
            Some(file) => file,
            None => break,
        };

        let raw_path = file.name_raw().to_vec();

        // Zip has no directory type flag; directories are entries whose name ends in a separator
        let kind = if file.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let declared_size = file.size();

        sink.on_entry(ArchiveEntry {
            raw_path,
            kind,
            declared_size,
            reader: &mut file,
        })?;
    }

    debug!("completed walking all zip entries");

    Ok(())
}

/// A wrapper around an arbitrary [`std::io::Read`] which counts how many bytes are read from the
/// underlying reader and reports them to the progress callback.
///
/// This wraps the raw (still compressed) archive stream, so the count includes entry data and
/// container metadata alike; it's the number used to report how much of the archive has been
/// consumed.
pub(crate) struct CountingReader<R: Read + Send + 'static> {
    inner: R,
    progress: Arc<dyn IngestProgressCallback>,
    total_bytes_read: u64,
}

impl<R: Read + Send + 'static> CountingReader<R> {
    pub(crate) fn new(reader: R, progress: Arc<dyn IngestProgressCallback>) -> Self {
        Self {
            inner: reader,
            progress,
            total_bytes_read: 0,
        }
    }

    #[allow(dead_code)]
    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read
    }
}

impl<R: Read + Send + 'static> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.inner.read(buf)?;

        self.progress.archive_bytes_read(bytes_read);
        self.total_bytes_read += bytes_read as u64;

        Ok(bytes_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_by_extension() {
        assert_eq!(
            ArchiveFormat::for_key("uploads/acme/1/2/batch.zip"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::for_key("uploads/acme/1/2/batch.TAR"),
            Some(ArchiveFormat::Tar)
        );
        assert_eq!(
            ArchiveFormat::for_key("uploads/acme/1/2/batch.tar.gz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::for_key("uploads/acme/1/2/batch.tgz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::for_key("uploads/acme/1/2/batch.rar"), None);
        assert_eq!(ArchiveFormat::for_key("uploads/acme/1/2/batch"), None);
    }

    /// Collects everything surfaced by a walk so the walkers can be checked end to end
    struct Collector {
        entries: Vec<(Vec<u8>, EntryKind, Vec<u8>)>,
    }

    impl EntrySink for Collector {
        fn on_entry(&mut self, entry: ArchiveEntry<'_>) -> Result<()> {
            let mut data = Vec::new();
            entry
                .reader
                .read_to_end(&mut data)
                .context(crate::error::ArchiveReadSnafu)?;

            self.entries.push((entry.raw_path, entry.kind, data));

            Ok(())
        }
    }

    #[test]
    fn tar_walk_surfaces_entries_in_order() {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "photos/", std::io::empty()).unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "photos/a.jpg", &b"abcd"[..])
            .unwrap();

        let bytes = builder.into_inner().unwrap();

        let mut collector = Collector { entries: Vec::new() };
        read_archive_entries(ArchiveFormat::Tar, &bytes[..], &mut collector).unwrap();

        assert_eq!(collector.entries.len(), 2);
        assert!(collector.entries[0].0.starts_with(b"photos"));
        assert_eq!(collector.entries[0].1, EntryKind::Directory);
        assert_eq!(collector.entries[1].0, b"photos/a.jpg");
        assert_eq!(collector.entries[1].1, EntryKind::File);
        assert_eq!(collector.entries[1].2, b"abcd");
    }

    #[test]
    fn zip_walk_surfaces_entries_in_order() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        writer.add_directory("photos/", options).unwrap();
        writer.start_file("photos/a.jpg", options).unwrap();
        std::io::Write::write_all(&mut writer, b"abcd").unwrap();

        let bytes = writer.finish().unwrap().into_inner();

        let mut collector = Collector { entries: Vec::new() };
        read_archive_entries(ArchiveFormat::Zip, &bytes[..], &mut collector).unwrap();

        assert_eq!(collector.entries.len(), 2);
        assert_eq!(collector.entries[0].1, EntryKind::Directory);
        assert_eq!(collector.entries[1].0, b"photos/a.jpg");
        assert_eq!(collector.entries[1].1, EntryKind::File);
        assert_eq!(collector.entries[1].2, b"abcd");
    }

    #[test]
    fn garbage_input_is_an_error_not_a_panic() {
        let garbage = vec![0x42u8; 1024];

        let mut collector = Collector { entries: Vec::new() };
        assert!(read_archive_entries(ArchiveFormat::Zip, &garbage[..], &mut collector).is_err());
    }
}
