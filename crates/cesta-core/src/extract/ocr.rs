//! OCR via the `tesseract` command line tool

use std::io::Write;

use async_trait::async_trait;
use tokio::process::Command;

use super::OcrEngine;
use crate::error::{Error, Result};

/// Runs `tesseract <image> stdout -l <lang>`
pub struct TesseractOcr {
    program: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractOcr {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the executable can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8], language: &str) -> Result<String> {
        let mut input = tempfile::Builder::new().prefix("cesta-").tempfile()?;
        input.write_all(image)?;
        input.flush()?;

        // A timed out call drops this future; the child must not outlive it
        let output = Command::new(&self.program)
            .kill_on_drop(true)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .await
            .map_err(|e| {
                Error::Ocr(format!(
                    "Failed to run {} (is it installed?): {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "{} failed (exit code {}): {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).replace("\r\n", "\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_ocr_error() {
        let ocr = TesseractOcr::new("cesta-no-such-tesseract");
        let err = ocr.recognize(b"not an image", "spa").await.unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
        assert!(!ocr.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_process_is_killed() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let script = dir.path().join("slow-tesseract.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ocr = TesseractOcr::new(script.to_string_lossy());
        let result =
            tokio::time::timeout(Duration::from_millis(200), ocr.recognize(b"img", "spa")).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert!(!marker.exists());
    }
}
