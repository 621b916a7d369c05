//! Document decoders
//!
//! A [`DocumentSource`] turns a file into a [`DecodedDocument`]: positioned,
//! styled spans plus the plain text of each page. Span dumps (`.json`) are
//! always supported; PDFs need the `pdf` feature.

use crate::error::{Error, Result};
use crate::span::DecodedDocument;
use std::path::Path;
use tracing::debug;

/// Decodes documents from disk.
pub trait DocumentSource: Send + Sync {
    /// Decode one document. The returned document's `id` is its file name.
    fn load(&self, path: &Path) -> Result<DecodedDocument>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// File name used as a document id.
pub fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads JSON span dumps (a serialized [`DecodedDocument`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDumpSource;

impl DocumentSource for SpanDumpSource {
    fn load(&self, path: &Path) -> Result<DecodedDocument> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::document(path, format!("read failed: {e}")))?;
        let mut doc: DecodedDocument = serde_json::from_str(&contents)
            .map_err(|e| Error::document(path, format!("invalid span dump: {e}")))?;
        doc.id = document_id(path);
        debug!("Loaded span dump {} ({} pages, {} spans)", doc.id, doc.pages.len(), doc.spans.len());
        Ok(doc)
    }

    fn name(&self) -> &str {
        "span-dump"
    }
}

/// Picks a decoder by file extension: `.pdf` goes to pdfium (feature `pdf`),
/// everything else is read as a span dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl DocumentSource for FileSource {
    fn load(&self, path: &Path) -> Result<DecodedDocument> {
        let is_pdf = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            load_pdf(path)
        } else {
            SpanDumpSource.load(path)
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(feature = "pdf")]
fn load_pdf(path: &Path) -> Result<DecodedDocument> {
    crate::pdf::PdfiumSource.load(path)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(path: &Path) -> Result<DecodedDocument> {
    Err(Error::document(
        path,
        "PDF input requires building with the `pdf` feature",
    ))
}
