//! Bulk download: package converted files into one ZIP archive.
//!
//! Archive failures are reported as [`ImgKitError::Archive`]; the converted
//! files themselves are borrowed, never consumed, so a failed build loses
//! nothing.

use crate::error::ImgKitError;
use crate::output::{dedupe_names, ConvertedFile};
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name used for the bulk download.
pub const ARCHIVE_NAME: &str = "converted-images.zip";

/// A finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveBlob {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

impl ArchiveBlob {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Write the archive to `path` (temp file + rename).
    pub async fn save(&self, path: &Path) -> Result<(), ImgKitError> {
        crate::output::write_atomic(path, &self.bytes).await
    }
}

/// Package every file's bytes under its output name.
///
/// Entries keep the order of `files`. Duplicate output names get a numeric
/// suffix (`photo-2.jpg`) so no entry shadows another.
pub fn build_archive(files: &[ConvertedFile]) -> Result<ArchiveBlob, ImgKitError> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let names = dedupe_names(files.iter().map(|f| f.output_name()));
        for (file, name) in files.iter().zip(names) {
            zip.start_file(name.as_str(), options)
                .map_err(|e| ImgKitError::Archive(format!("entry '{name}': {e}")))?;
            zip.write_all(file.bytes())
                .map_err(|e| ImgKitError::Archive(format!("entry '{name}': {e}")))?;
        }
        zip.finish()
            .map_err(|e| ImgKitError::Archive(format!("finalize: {e}")))?;
    }

    info!("Built {} with {} entries ({} bytes)", ARCHIVE_NAME, files.len(), buffer.len());
    Ok(ArchiveBlob {
        name: ARCHIVE_NAME,
        bytes: buffer,
    })
}
