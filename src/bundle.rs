//! Zip bundling of extracted images in a per-request work area

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::container::ExtractedFile;
use crate::error::Result;

/// Name of the archive handed back to the caller
pub const ARCHIVE_NAME: &str = "extracted_images.zip";
const WORK_AREA_PREFIX: &str = "pixelfuse-";

/// A uniquely named scratch directory, removed with everything in it on drop
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Create under `root`, or the system temp dir when `None`
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_AREA_PREFIX);
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "work area created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write one extracted image under its archive name
    pub fn write(&self, file: &ExtractedFile) -> Result<PathBuf> {
        let path = self.path().join(file.archive_name());
        fs::write(&path, &file.data)?;
        Ok(path)
    }
}

/// Zip `entries` flat (base names only) into `archive_path`
pub fn write_archive(entries: &[PathBuf], archive_path: &Path) -> Result<()> {
    let mut zip = ZipWriter::new(fs::File::create(archive_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in entries {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no file name"))?;
        zip.start_file(name, options)?;
        io::copy(&mut fs::File::open(entry)?, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

/// Write `files` into a fresh work area, zip them, and return the archive bytes.
///
/// The work area is removed before this returns, on success and on every error.
pub fn bundle(files: &[ExtractedFile], root: Option<&Path>) -> Result<Vec<u8>> {
    let area = WorkArea::new(root)?;

    let entries = files
        .iter()
        .map(|file| area.write(file))
        .collect::<Result<Vec<_>>>()?;

    let archive_path = area.path().join(ARCHIVE_NAME);
    write_archive(&entries, &archive_path)?;
    let bytes = fs::read(&archive_path)?;

    debug!(entries = entries.len(), size = bytes.len(), "archive built");
    Ok(bytes)
}
