//! Document loading: PDF and plain text into ordered page texts

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{FileType, LoadedDocument, PageText};

/// Typographic characters folded to ASCII after extraction
const ASCII_FOLDS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
];

/// Replace leaked glyph names such as `uni2019` with the character they name
fn decode_glyph_names(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("uni") {
        output.push_str(&rest[..pos]);
        let candidate = rest[pos + 3..].get(..4);
        let decoded = candidate
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                output.push(c);
                rest = &rest[pos + 7..];
            }
            None => {
                output.push_str("uni");
                rest = &rest[pos + 3..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// Clean up extracted PDF text: glyph names, typographic characters, blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = decode_glyph_names(text);
    for (from, to) in ASCII_FOLDS {
        if result.contains(*from) {
            result = result.replace(*from, to);
        }
    }

    result
        .replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep non-empty pages with their original numbers and running offsets
fn build_pages(raw_pages: Vec<String>) -> Vec<PageText> {
    let mut offset = 0usize;
    raw_pages
        .into_iter()
        .enumerate()
        .filter(|(_, content)| !content.trim().is_empty())
        .map(|(i, content)| {
            let page = PageText {
                page_number: i as u32 + 1,
                char_offset: offset,
                content,
            };
            offset += page.content.chars().count();
            page
        })
        .collect()
}

/// Loads the startup document into ordered page texts
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    extract_timeout: Duration,
}

impl DocumentLoader {
    /// Create a loader with a deadline for PDF text extraction
    pub fn new(extract_timeout: Duration) -> Self {
        Self { extract_timeout }
    }

    /// Read and parse the document at `path`
    pub fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let file_type = FileType::from_path(path);
        if !file_type.is_supported() {
            return Err(Error::load(path, "unsupported file type (expected .pdf, .txt or .md)"));
        }

        let data = std::fs::read(path).map_err(|e| Error::load(path, e.to_string()))?;
        let pages = self.parse(path, file_type, &data)?;

        tracing::info!(
            "Loaded {} ({}): {} non-empty pages",
            path.display(),
            file_type.display_name(),
            pages.len()
        );

        Ok(LoadedDocument {
            path: path.to_path_buf(),
            file_type,
            pages,
        })
    }

    /// Parse raw bytes of a known file type
    pub fn parse(&self, path: &Path, file_type: FileType, data: &[u8]) -> Result<Vec<PageText>> {
        match file_type {
            FileType::Pdf => {
                let raw = self.extract_pdf_pages(path, data)?;
                Ok(build_pages(raw.iter().map(|p| cleanup_pdf_text(p)).collect()))
            }
            FileType::Txt | FileType::Markdown => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| Error::load(path, format!("not valid UTF-8: {}", e)))?;
                // Form feeds separate pages in text exports
                Ok(build_pages(text.split('\x0c').map(str::to_string).collect()))
            }
            FileType::Unknown => Err(Error::load(path, "unsupported file type")),
        }
    }

    /// Extract per-page PDF text on a separate thread with a deadline
    fn extract_pdf_pages(&self, path: &Path, data: &[u8]) -> Result<Vec<String>> {
        use std::sync::mpsc;
        use std::thread;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        // pdf-extract may panic on unusual fonts; the thread contains it
        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem_by_pages(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.extract_timeout) {
            Ok(Ok(pages)) => {
                let _ = handle.join();
                Ok(pages)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed: {}, trying lopdf fallback", e);
                Self::extract_pdf_pages_fallback(path, data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!(
                    "PDF extraction timed out after {:?}, trying lopdf fallback",
                    self.extract_timeout
                );
                Self::extract_pdf_pages_fallback(path, data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread crashed, trying lopdf fallback");
                Self::extract_pdf_pages_fallback(path, data)
            }
        }
    }

    /// Fallback PDF text extraction using lopdf page by page
    fn extract_pdf_pages_fallback(path: &Path, data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::load(path, format!("not a readable PDF: {}", e)))?;

        let pages = doc
            .get_pages()
            .keys()
            .map(|&page_number| match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("Could not extract text from page {}: {}", page_number, e);
                    String::new()
                }
            })
            .collect();

        Ok(pages)
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
