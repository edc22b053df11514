//! Builders for synthetic test archives (tar, tar.gz, zip) held entirely in memory.
use rand::RngCore;
use sha2::Digest;
use std::io::Write;

/// One entry to place in a synthetic archive.
#[derive(Clone, Debug)]
pub enum TestEntry {
    File { path: String, data: Vec<u8> },
    Directory { path: String },
}

impl TestEntry {
    /// A file entry filled with `size` bytes of random data
    pub fn file(path: impl Into<String>, size: usize) -> Self {
        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);

        Self::File {
            path: path.into(),
            data,
        }
    }

    /// A file entry with exactly the given contents
    pub fn file_with_data(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::File {
            path: path.into(),
            data: data.into(),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::Directory { path: path.into() }
    }

    /// The entry's path as it will appear inside the archive
    pub fn path(&self) -> &str {
        match self {
            Self::File { path, .. } => path,
            Self::Directory { path } => path,
        }
    }

    /// The entry's contents, empty for directories
    pub fn data(&self) -> &[u8] {
        match self {
            Self::File { data, .. } => data,
            Self::Directory { .. } => &[],
        }
    }
}

/// Build an uncompressed tar archive containing the given entries, in order.
pub fn build_tar(entries: &[TestEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        match entry {
            TestEntry::File { path, data } => {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();

                builder
                    .append_data(&mut header, path, &data[..])
                    .expect("appending file entry to in-memory tar can't fail");
            }
            TestEntry::Directory { path } => {
                let mut header = tar::Header::new_gnu();
                header.set_size(0);
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_cksum();

                builder
                    .append_data(&mut header, path, std::io::empty())
                    .expect("appending directory entry to in-memory tar can't fail");
            }
        }
    }

    builder
        .into_inner()
        .expect("finishing in-memory tar can't fail")
}

/// Build a gzip-compressed tar archive containing the given entries, in order.
pub fn build_tar_gz(entries: &[TestEntry]) -> Vec<u8> {
    let tar = build_tar(entries);

    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&tar)
        .expect("writing to in-memory gzip encoder can't fail");

    encoder
        .finish()
        .expect("finishing in-memory gzip encoder can't fail")
}

/// Build a zip archive containing the given entries, in order.
pub fn build_zip(entries: &[TestEntry]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        match entry {
            TestEntry::File { path, data } => {
                writer
                    .start_file(path, options)
                    .expect("starting file entry in in-memory zip can't fail");
                writer
                    .write_all(data)
                    .expect("writing file entry to in-memory zip can't fail");
            }
            TestEntry::Directory { path } => {
                writer
                    .add_directory(path, options)
                    .expect("adding directory entry to in-memory zip can't fail");
            }
        }
    }

    writer
        .finish()
        .expect("finishing in-memory zip can't fail")
        .into_inner()
}

/// SHA-256 of a byte slice, for comparing staged objects against the data that went into the
/// archive
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}
