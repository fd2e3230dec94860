//! Loading the reference PDF.
//!
//! Text extraction is done once per path for the lifetime of a [`DocumentLoader`];
//! later loads return the cached [`DocumentText`] without touching the file again.

use dashmap::DashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};

/// Full extracted text of a document, pages concatenated in order.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentText(Arc<str>);

impl DocumentText {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for DocumentText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentText")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Turns raw file bytes into per-page text.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String>;
}

/// Extractor backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())
    }
}

/// Memoizing document loader, shared read-only across sessions.
pub struct DocumentLoader {
    extractor: Arc<dyn TextExtractor>,
    cache: DashMap<PathBuf, Arc<OnceCell<DocumentText>>>,
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::with_extractor(Arc::new(PdfTextExtractor))
    }

    pub fn with_extractor(extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            extractor,
            cache: DashMap::new(),
        }
    }

    /// Load the text of the document at `path`.
    ///
    /// Concurrent first loads of the same path wait on one extraction. A failed
    /// load is not cached, so the next call tries again.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<DocumentText> {
        let path = path.as_ref().to_path_buf();

        // The map guard must be released before awaiting.
        let cell = self
            .cache
            .entry(path.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(text) = cell.get() {
            debug!("Document cache hit for {}", path.display());
            return Ok(text.clone());
        }

        cell.get_or_try_init(|| self.extract(path.clone()))
            .await
            .cloned()
    }

    async fn extract(&self, path: PathBuf) -> Result<DocumentText> {
        info!("Extracting text from {}", path.display());

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatError::DocumentNotFound(path));
            }
            Err(e) => {
                return Err(ChatError::DocumentParse {
                    path,
                    message: e.to_string(),
                });
            }
        };

        let extractor = self.extractor.clone();
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
            .await
            .map_err(|e| ChatError::DocumentParse {
                path: path.clone(),
                message: format!("extraction task failed: {e}"),
            })?
            .map_err(|message| ChatError::DocumentParse {
                path: path.clone(),
                message,
            })?;

        let text = pages.concat();
        if text.trim().is_empty() {
            warn!("No text extracted from {}", path.display());
            return Err(ChatError::DocumentParse {
                path,
                message: "document contains no extractable text".to_string(),
            });
        }

        info!(
            "Extracted {} characters from {} pages of {}",
            text.len(),
            pages.len(),
            path.display()
        );
        Ok(DocumentText::new(text))
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtractor {
        calls: AtomicUsize,
        pages: Vec<String>,
    }

    impl CountingExtractor {
        fn new(pages: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                pages: pages.iter().map(|p| p.to_string()).collect(),
            })
        }
    }

    impl TextExtractor for CountingExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.clone())
        }
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
            Err("not a PDF".to_string())
        }
    }

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4 fixture").unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_is_memoized() {
        let file = fixture();
        let extractor = CountingExtractor::new(&["AiCouncil offers ", "a 6-week ML course."]);
        let loader = DocumentLoader::with_extractor(extractor.clone());

        let first = loader.load(file.path()).await.unwrap();
        let second = loader.load(file.path()).await.unwrap();

        assert_eq!(first.as_str(), "AiCouncil offers a 6-week ML course.");
        assert_eq!(first, second);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_text_survives_file_removal() {
        let file = fixture();
        let path = file.path().to_path_buf();
        let extractor = CountingExtractor::new(&["page one"]);
        let loader = DocumentLoader::with_extractor(extractor.clone());

        loader.load(&path).await.unwrap();
        drop(file);

        let again = loader.load(&path).await.unwrap();
        assert_eq!(again.as_str(), "page one");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_extract_once() {
        let file = fixture();
        let extractor = CountingExtractor::new(&["shared"]);
        let loader = Arc::new(DocumentLoader::with_extractor(extractor.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = loader.clone();
            let path = file.path().to_path_buf();
            handles.push(tokio::spawn(async move { loader.load(path).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "shared");
        }
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let loader = DocumentLoader::with_extractor(CountingExtractor::new(&["x"]));
        let err = loader
            .load("definitely/not/here/brochure.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_extractor_failure_is_parse_error_and_not_cached() {
        let file = fixture();
        let loader = DocumentLoader::with_extractor(Arc::new(FailingExtractor));
        let err = loader.load(file.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::DocumentParse { .. }));
        assert!(err.to_string().contains("not a PDF"));

        let err = loader.load(file.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::DocumentParse { .. }));
    }

    #[tokio::test]
    async fn test_blank_document_is_rejected() {
        let file = fixture();
        let loader = DocumentLoader::with_extractor(CountingExtractor::new(&["  ", "\n"]));
        let err = loader.load(file.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::DocumentParse { .. }));
    }

    #[tokio::test]
    async fn test_real_extractor_rejects_garbage() {
        let file = fixture();
        let loader = DocumentLoader::new();
        let err = loader.load(file.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::DocumentParse { .. }));
    }
}
