//! Best-effort PDF text extraction with an OCR fallback.
//!
//! Direct extraction uses `pdf-extract`. When it yields too little text
//! (scanned forms), the first pages are rasterized with `pdftoppm` and read
//! with `tesseract`. Both tools are looked up on `PATH`; if either is
//! missing the fallback is skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use regmerge_recon::TextExtractor;

/// Direct text shorter than this (trimmed) triggers OCR.
pub const MIN_DIRECT_CHARS: usize = 50;
/// Only the first pages carry the identity header.
pub const MAX_PAGES: usize = 3;

#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    ocr: bool,
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self { ocr: true }
    }
}

impl PdfTextExtractor {
    pub fn new(ocr: bool) -> Self {
        Self { ocr }
    }

    fn direct_text(&self, raw: &[u8]) -> Result<String, String> {
        // pdf-extract can panic on malformed PDFs
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(raw));
        match result {
            Ok(Ok(pages)) => Ok(pages.into_iter().take(MAX_PAGES).collect::<Vec<_>>().join("\n")),
            Ok(Err(e)) => Err(format!("PDF: {e}")),
            Err(_) => Err("PDF extraction panicked (malformed file)".to_string()),
        }
    }

    fn ocr_text(&self, raw: &[u8]) -> Result<String, String> {
        let pdftoppm = which::which("pdftoppm")
            .map_err(|_| "pdftoppm not installed (poppler-utils)".to_string())?;
        let tesseract =
            which::which("tesseract").map_err(|_| "tesseract not installed".to_string())?;

        let dir = tempfile::tempdir().map_err(|e| format!("temp dir: {e}"))?;
        let pdf_path = dir.path().join("document.pdf");
        fs::write(&pdf_path, raw).map_err(|e| format!("cannot write {}: {e}", pdf_path.display()))?;

        let output = Command::new(&pdftoppm)
            .args(["-r", "300", "-png", "-f", "1", "-l"])
            .arg(MAX_PAGES.to_string())
            .arg(&pdf_path)
            .arg(dir.path().join("page"))
            .output()
            .map_err(|e| format!("failed to run pdftoppm: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "pdftoppm failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let mut text = String::new();
        for (i, image) in page_images(dir.path())?.iter().enumerate() {
            log::debug!("OCR page {}", i + 1);
            let output = Command::new(&tesseract)
                .arg(image)
                .arg("stdout")
                .args(["-l", "eng"])
                .output()
                .map_err(|e| format!("failed to run tesseract: {e}"))?;
            if output.status.success() {
                text.push_str(&String::from_utf8_lossy(&output.stdout));
                text.push('\n');
            } else {
                log::warn!(
                    "tesseract failed on page {}: {}",
                    i + 1,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        }
        Ok(text)
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, raw: &[u8]) -> String {
        let direct = self.direct_text(raw).unwrap_or_else(|e| {
            log::warn!("direct text extraction failed: {e}");
            String::new()
        });
        if direct.trim().chars().count() >= MIN_DIRECT_CHARS || !self.ocr {
            return direct;
        }

        log::info!("direct text insufficient ({} chars), trying OCR", direct.trim().len());
        match self.ocr_text(raw) {
            Ok(ocr) if !ocr.trim().is_empty() => {
                log::info!("OCR extracted {} chars", ocr.len());
                ocr
            }
            Ok(_) => direct,
            Err(e) => {
                log::warn!("OCR fallback unavailable: {e}");
                direct
            }
        }
    }
}

/// PNGs written by pdftoppm, in page order.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| format!("cannot list {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "png"))
        .collect();
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_yield_empty_text() {
        let extractor = PdfTextExtractor::new(false);
        assert_eq!(extractor.extract_text(b"definitely not a pdf"), "");
        assert_eq!(extractor.extract_text(&[]), "");
    }

    #[test]
    fn page_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-2.png", "page-1.png", "document.pdf", "page-3.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = page_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-3.png"]);
    }
}
