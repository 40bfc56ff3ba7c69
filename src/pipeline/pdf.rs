//! PDF text extraction from a local copy of the bulk mirror.

use std::path::{Path, PathBuf};

use super::{ExtractionError, TextExtractor};

/// Reads PDFs below a mirror root with pdf-extract
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    root: PathBuf,
}

impl PdfTextExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File to read for a storage path.
    ///
    /// The mirror does not always hold the version the API reports; when the
    /// exact file is missing the first version is used instead.
    pub fn locate(&self, storage_path: &str) -> Result<PathBuf, ExtractionError> {
        let exact = self.root.join(storage_path);
        if exact.is_file() {
            return Ok(exact);
        }

        if let Some(first) = first_version(storage_path) {
            let fallback = self.root.join(first);
            if fallback.is_file() {
                tracing::debug!(
                    requested = %exact.display(),
                    using = %fallback.display(),
                    "falling back to first version"
                );
                return Ok(fallback);
            }
        }

        Err(ExtractionError::NotFound(exact))
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, storage_path: &str) -> Result<String, ExtractionError> {
        let path = self.locate(storage_path)?;
        let text = pdf_extract::extract_text(&path)
            .map_err(|e| ExtractionError::Failed(format!("{}: {}", path.display(), e)))?;

        if text.trim().is_empty() {
            // Scanned or image-only PDF
            tracing::debug!("Extracted empty text from PDF: {}", path.display());
        }
        Ok(text)
    }
}

/// `.../2101.00001v3.pdf` -> `.../2101.00001v1.pdf`
fn first_version(storage_path: &str) -> Option<String> {
    let stem = storage_path.strip_suffix(".pdf")?;
    let v = stem.rfind('v')?;
    let version = &stem[v + 1..];
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) || version == "1" {
        return None;
    }
    Some(format!("{}v1.pdf", &stem[..v]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_version() {
        assert_eq!(
            first_version("cs/pdf/2101/2101.00001v3.pdf").as_deref(),
            Some("cs/pdf/2101/2101.00001v1.pdf")
        );
        assert_eq!(
            first_version("math/pdf/0701/0701001v12.pdf").as_deref(),
            Some("math/pdf/0701/0701001v1.pdf")
        );
        assert_eq!(first_version("cs/pdf/2101/2101.00001v1.pdf"), None);
        assert_eq!(first_version("cs/pdf/2101/2101.00001.txt"), None);
    }

    #[test]
    fn test_locate_exact_and_fallback() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("arxiv/pdf/2101");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("2101.00001v1.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(folder.join("2101.00002v2.pdf"), b"%PDF-1.4").unwrap();

        let extractor = PdfTextExtractor::new(dir.path());

        assert_eq!(
            extractor.locate("arxiv/pdf/2101/2101.00002v2.pdf").unwrap(),
            folder.join("2101.00002v2.pdf")
        );
        assert_eq!(
            extractor.locate("arxiv/pdf/2101/2101.00001v4.pdf").unwrap(),
            folder.join("2101.00001v1.pdf")
        );
    }

    #[test]
    fn test_extract_nonexistent_file() {
        let dir = tempdir().unwrap();
        let extractor = PdfTextExtractor::new(dir.path());

        let result = extractor.extract("cs/pdf/2101/2101.00003v2.pdf");
        assert!(matches!(result, Err(ExtractionError::NotFound(_))));
    }
}
