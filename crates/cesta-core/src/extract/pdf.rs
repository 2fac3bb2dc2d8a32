//! PDF text layer via poppler's `pdftotext -bbox`

use std::io::Write;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::process::Command;
use tracing::debug;

use super::{PageText, TextFragment, TextLayer};
use crate::error::{Error, Result};

/// Runs `pdftotext -bbox` and reads word boxes from its XHTML output
pub struct PdftotextLayer {
    program: String,
}

impl Default for PdftotextLayer {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

impl PdftotextLayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the executable can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-v")
            .output()
            .await
            .is_ok()
    }
}

#[async_trait]
impl TextLayer for PdftotextLayer {
    fn name(&self) -> &str {
        "pdftotext"
    }

    async fn extract(&self, pdf: &[u8]) -> Result<Vec<PageText>> {
        let mut input = tempfile::Builder::new()
            .prefix("cesta-")
            .suffix(".pdf")
            .tempfile()?;
        input.write_all(pdf)?;
        input.flush()?;

        let output = Command::new(&self.program)
            .kill_on_drop(true)
            .arg("-bbox")
            .arg(input.path())
            .arg("-")
            .output()
            .await
            .map_err(|e| {
                Error::Extraction(format!(
                    "Failed to run {} (is poppler installed?): {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!(
                "{} failed (exit code {}): {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let pages = parse_bbox_document(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Extracted {} PDF pages", pages.len());
        Ok(pages)
    }
}

/// Split `-bbox` output into pages of word fragments
fn parse_bbox_document(xhtml: &str) -> Result<Vec<PageText>> {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().trim_text(true);

    let mut pages = Vec::new();
    let mut buf = Vec::new();
    // Position and text of the word being read
    let mut word: Option<(f64, f64, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"page" => pages.push(PageText::default()),
                b"word" => {
                    let mut x = None;
                    let mut y = None;
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value);
                        match attr.key.as_ref() {
                            b"xMin" => x = value.parse::<f64>().ok(),
                            b"yMin" => y = value.parse::<f64>().ok(),
                            _ => {}
                        }
                    }
                    word = x.zip(y).map(|(x, y)| (x, y, String::new()));
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"page" => {
                pages.push(PageText::default());
            }
            Ok(Event::Text(ref e)) => {
                if let Some((_, _, text)) = word.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some((_, _, text)) = word.as_mut() {
                    let name = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_reference(&name) {
                        text.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"word" => {
                if let (Some((x, y, text)), Some(page)) = (word.take(), pages.last_mut()) {
                    page.fragments.push(TextFragment::new(text, x, y));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Extraction(format!(
                    "Malformed pdftotext output at byte {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(pages)
}

/// Resolve `&name;` or `&#NN;` / `&#xHH;` to its text
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}
