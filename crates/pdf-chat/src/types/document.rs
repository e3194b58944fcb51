//! Document, page and chunk types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported document types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a path
    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Unknown => "Unknown",
        }
    }
}

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Text content of the page
    pub content: String,
    /// Character offset of the page in the full document
    pub char_offset: usize,
}

impl PageText {
    /// Build pages from raw page strings, assigning numbers and offsets
    pub fn from_pages<I, S>(pages: I) -> Vec<PageText>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut offset = 0usize;
        pages
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let content = content.into();
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
}

/// A document loaded from disk
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Source path
    pub path: PathBuf,
    /// File type
    pub file_type: FileType,
    /// Ordered page texts
    pub pages: Vec<PageText>,
}

impl LoadedDocument {
    /// Total characters across all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.content.chars().count()).sum()
    }
}

/// A bounded, overlapping segment of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, a verbatim slice of its page
    pub text: String,
    /// Character offset of the first character in the whole document
    pub source_offset: usize,
    /// Page the chunk was taken from (1-indexed)
    pub page_number: u32,
    /// Position of the chunk in the document's chunk sequence
    pub index: u32,
}
