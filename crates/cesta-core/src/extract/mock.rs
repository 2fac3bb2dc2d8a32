//! Mock extractors for testing
//!
//! In echo mode the input bytes are treated as the text the engine would have
//! produced, so fixtures can be plain text files with image or PDF extensions.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{OcrEngine, PageText, TextFragment, TextLayer};
use crate::error::{Error, Result};

/// Vertical spacing of echoed lines
const ECHO_LINE_HEIGHT: f64 = 12.0;

#[derive(Debug, Clone)]
enum Behavior {
    Echo,
    Fixed(String),
    Fail(String),
    Hang,
}

/// Mock OCR engine
#[derive(Debug)]
pub struct MockOcr {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockOcr {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the image bytes as text
    pub fn echo() -> Self {
        Self::with(Behavior::Echo)
    }

    /// Always returns `text`
    pub fn returning(text: impl Into<String>) -> Self {
        Self::with(Behavior::Fixed(text.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(Behavior::Fail(message.into()))
    }

    /// Never completes
    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(&self, image: &[u8], _language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Echo => Ok(String::from_utf8_lossy(image).into_owned()),
            Behavior::Fixed(text) => Ok(text.clone()),
            Behavior::Fail(message) => Err(Error::Ocr(message.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Mock PDF text layer
///
/// Text is returned as one page with one fragment per line.
#[derive(Debug)]
pub struct MockTextLayer {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockTextLayer {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the PDF bytes as text
    pub fn echo() -> Self {
        Self::with(Behavior::Echo)
    }

    pub fn returning(text: impl Into<String>) -> Self {
        Self::with(Behavior::Fixed(text.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(Behavior::Fail(message.into()))
    }

    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn text_to_page(text: &str) -> PageText {
    PageText {
        fragments: text
            .lines()
            .enumerate()
            .map(|(i, line)| TextFragment::new(line, 0.0, i as f64 * ECHO_LINE_HEIGHT))
            .collect(),
    }
}

#[async_trait]
impl TextLayer for MockTextLayer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, pdf: &[u8]) -> Result<Vec<PageText>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Echo => Ok(vec![text_to_page(&String::from_utf8_lossy(pdf))]),
            Behavior::Fixed(text) => Ok(vec![text_to_page(text)]),
            Behavior::Fail(message) => Err(Error::Extraction(message.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
