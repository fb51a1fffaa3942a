//! Output types: converted files, batch summaries, and writing results to disk.

use crate::error::{ImgKitError, PageError};
use crate::geometry::{calculate_compression_ratio, Dimensions};
use crate::locator::ObjectUrl;
use crate::session::FileId;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The output artifact of a successful operation.
///
/// Immutable once created. The download reference is revoked when the value
/// is dropped (on removal or session clear).
#[derive(Debug, Serialize)]
pub struct ConvertedFile {
    id: FileId,
    original_name: String,
    output_name: String,
    mime: &'static str,
    size: u64,
    original_size: u64,
    dimensions: Dimensions,
    /// 1-based page index for PDF renditions.
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    #[serde(serialize_with = "serialize_url")]
    download_url: ObjectUrl,
    #[serde(skip)]
    bytes: Vec<u8>,
}

fn serialize_url<S: Serializer>(url: &ObjectUrl, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(url.as_str())
}

impl ConvertedFile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: FileId,
        original_name: impl Into<String>,
        original_size: u64,
        output_name: String,
        mime: &'static str,
        bytes: Vec<u8>,
        dimensions: Dimensions,
        page: Option<usize>,
        download_url: ObjectUrl,
    ) -> Self {
        Self {
            id,
            original_name: original_name.into(),
            output_name,
            mime,
            size: bytes.len() as u64,
            original_size,
            dimensions,
            page,
            download_url,
            bytes,
        }
    }

    /// Identifier of the originating file item.
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn page(&self) -> Option<usize> {
        self.page
    }

    /// Download reference, valid until this file is dropped.
    pub fn download_url(&self) -> &str {
        self.download_url.as_str()
    }

    /// Percentage saved relative to the original file. Negative when the
    /// output grew.
    pub fn compression_ratio(&self) -> i64 {
        calculate_compression_ratio(self.original_size, self.size)
    }
}

/// Outcome counts of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Files that entered `converting`.
    pub attempted: usize,
    pub converted: usize,
    pub failed: usize,
    /// Pending files left untouched because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    /// Isolated PDF page failures across the batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<PageError>,
}

/// Human-readable byte size: `0 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Make names unique by appending `-2`, `-3`, … before the extension.
pub fn dedupe_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.to_string()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return name.to_string();
            }
            let (stem, ext) = match name.rfind('.') {
                Some(i) if i > 0 => (&name[..i], &name[i..]),
                _ => (name, ""),
            };
            let mut n = *count;
            loop {
                let candidate = format!("{stem}-{n}{ext}");
                if !seen.contains_key(&candidate) {
                    seen.insert(candidate.clone(), 1);
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Write `bytes` to `path` atomically: temp file in the same directory, then
/// rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ImgKitError> {
    let write_err = |source| ImgKitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Save each converted file into `dir` under its output name.
///
/// Colliding output names are disambiguated the same way the archive does.
/// Returns the written paths in input order.
pub async fn write_outputs(dir: &Path, files: &[ConvertedFile]) -> Result<Vec<PathBuf>, ImgKitError> {
    let names = dedupe_names(files.iter().map(|f| f.output_name()));
    let mut written = Vec::with_capacity(files.len());
    for (file, name) in files.iter().zip(names) {
        let path = dir.join(name);
        write_atomic(&path, file.bytes()).await?;
        written.push(path);
    }
    info!("Wrote {} file(s) to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::UrlRegistry;

    fn converted(urls: &UrlRegistry, name: &str, bytes: &[u8], original: u64) -> ConvertedFile {
        ConvertedFile::new(
            FileId(1),
            "in.png",
            original,
            name.to_string(),
            "image/png",
            bytes.to_vec(),
            Dimensions::new(1, 1),
            None,
            urls.create(bytes.len() as u64),
        )
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_048_576), "1 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn dedupe_keeps_first_and_numbers_rest() {
        let names = dedupe_names(["a.jpg", "b.jpg", "a.jpg", "a.jpg", "noext", "noext"]);
        assert_eq!(names, ["a.jpg", "b.jpg", "a-2.jpg", "a-3.jpg", "noext", "noext-2"]);
    }

    #[test]
    fn dedupe_skips_taken_candidates() {
        let names = dedupe_names(["a-2.jpg", "a.jpg", "a.jpg"]);
        assert_eq!(names, ["a-2.jpg", "a.jpg", "a-3.jpg"]);
    }

    #[test]
    fn compression_ratio_uses_original_size() {
        let urls = UrlRegistry::new();
        let f = converted(&urls, "x.png", &[0u8; 60], 100);
        assert_eq!(f.compression_ratio(), 40);
        assert_eq!(f.size(), 60);
    }

    #[test]
    fn dropping_converted_file_revokes_url() {
        let urls = UrlRegistry::new();
        let f = converted(&urls, "x.png", b"abc", 3);
        assert!(f.download_url().starts_with("blob:imgkit/"));
        assert_eq!(urls.live_count(), 1);
        drop(f);
        assert_eq!(urls.live_count(), 0);
    }

    #[test]
    fn serialises_without_bytes() {
        let urls = UrlRegistry::new();
        let f = converted(&urls, "x.png", b"abc", 3);
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["output_name"], "x.png");
        assert_eq!(v["size"], 3);
        assert!(v.get("bytes").is_none());
        assert!(v["download_url"].as_str().unwrap().starts_with("blob:"));
    }

    #[tokio::test]
    async fn write_outputs_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let urls = UrlRegistry::new();
        let files = vec![
            converted(&urls, "a.png", b"one", 3),
            converted(&urls, "a.png", b"two", 3),
        ];
        let paths = write_outputs(&dir.path().join("out"), &files).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"one");
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"two");
        assert!(paths[1].ends_with("a-2.png"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
