//! PDF decoding with pdfium

use crate::error::{Error, Result};
use crate::source::{document_id, DocumentSource};
use crate::span::{BBox, DecodedDocument, PageText, RawSpan};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Decodes PDFs through the pdfium library.
///
/// Each text segment pdfium reports becomes one span; its size and font
/// come from the segment's first character. Coordinates are converted to a
/// top-left origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumSource;

impl PdfiumSource {
    fn bind(path: &Path) -> Result<Pdfium> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Error::document(path, format!("Failed to bind pdfium library: {e}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl DocumentSource for PdfiumSource {
    fn load(&self, path: &Path) -> Result<DecodedDocument> {
        let pdfium = Self::bind(path)?;
        let doc = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| Error::document(path, format!("Failed to load PDF: {e}")))?;

        let mut pages = Vec::new();
        let mut spans = Vec::new();

        for (index, page) in doc.pages().iter().enumerate() {
            let number = index as u32 + 1;
            let width = page.width().value;
            let height = page.height().value;
            let text = page
                .text()
                .map_err(|e| Error::document(path, format!("Failed to get page text: {e}")))?;

            for segment in text.segments().iter() {
                let content = segment.text();
                if content.trim().is_empty() {
                    continue;
                }

                let bounds = segment.bounds();
                let top = bounds.top().value;
                let bottom = bounds.bottom().value;
                let (size, font) = segment
                    .chars()
                    .ok()
                    .and_then(|chars| {
                        chars
                            .iter()
                            .next()
                            .map(|c| (c.scaled_font_size().value, c.font_name()))
                    })
                    .unwrap_or((top - bottom, String::new()));

                spans.push(RawSpan {
                    page: number,
                    text: content,
                    size,
                    font,
                    bbox: BBox::new(
                        bounds.left().value,
                        height - top,
                        bounds.right().value,
                        height - bottom,
                    ),
                });
            }

            pages.push(PageText {
                number,
                width,
                height,
                text: text.all(),
            });
        }

        let id = document_id(path);
        debug!("Decoded {} ({} pages, {} spans)", id, pages.len(), spans.len());
        Ok(DecodedDocument { id, pages, spans })
    }

    fn name(&self) -> &str {
        "pdfium"
    }
}
