//! Text extraction from receipt files
//!
//! Two external capabilities are abstracted behind traits so the import
//! pipeline can be tested without them:
//! - `TextLayer` turns PDF bytes into positioned text fragments per page
//! - `OcrEngine` turns image bytes into plain text
//!
//! Concrete implementations shell out to `pdftotext` and `tesseract`. Mocks
//! live in `mock`.

pub mod mock;
mod ocr;
mod pdf;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use mock::{MockOcr, MockTextLayer};
pub use ocr::TesseractOcr;
pub use pdf::PdftotextLayer;

/// Fragments closer than this vertically belong to the same line
pub const LINE_TOLERANCE: f64 = 5.0;

/// A run of text with its position on the page
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Fragments of one page in reading order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub fragments: Vec<TextFragment>,
}

/// PDF text-layer extraction
#[async_trait]
pub trait TextLayer: Send + Sync {
    fn name(&self) -> &str;

    /// Extract positioned fragments for every page
    async fn extract(&self, pdf: &[u8]) -> Result<Vec<PageText>>;
}

/// Optical character recognition
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize the text in an image using a language hint (e.g. "spa")
    async fn recognize(&self, image: &[u8], language: &str) -> Result<String>;
}

/// How an input file is handled, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image,
    /// Concatenated multi-receipt text dump
    Text,
    /// A previously exported collection
    Collection,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tif" | "tiff" | "gif" => Some(Self::Image),
            "txt" => Some(Self::Text),
            "json" => Some(Self::Collection),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Text => "text",
            Self::Collection => "collection",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rebuild text lines from positioned fragments
///
/// A fragment starts a new line when its vertical position differs from the
/// previous fragment's by `tolerance` or more. Pages are separated by a blank
/// line.
pub fn rebuild_lines(pages: &[PageText], tolerance: f64) -> String {
    let mut page_texts = Vec::with_capacity(pages.len());

    for page in pages {
        let mut lines: Vec<String> = Vec::new();
        let mut last_y: Option<f64> = None;

        for fragment in &page.fragments {
            let text = fragment.text.trim();
            if text.is_empty() {
                continue;
            }
            let same_line = last_y.is_some_and(|y| (fragment.y - y).abs() < tolerance);
            match lines.last_mut() {
                Some(line) if same_line => {
                    line.push(' ');
                    line.push_str(text);
                }
                _ => lines.push(text.to_string()),
            }
            last_y = Some(fragment.y);
        }

        if !lines.is_empty() {
            page_texts.push(lines.join("\n"));
        }
    }

    page_texts.join("\n\n")
}
