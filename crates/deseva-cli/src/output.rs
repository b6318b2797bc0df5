use std::io::Write;
use std::time::Duration;

use deseva_ingest::{Capabilities, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print one document's extracted text, with a header when several files are processed.
pub fn print_document(
    w: &mut dyn Write,
    file_name: &str,
    text: &str,
    with_header: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    if with_header {
        let header = format!("==> {} <==", file_name);
        if color.enabled() {
            writeln!(w, "{}", header.bold().cyan())?;
        } else {
            writeln!(w, "{}", header)?;
        }
    }
    if text.is_empty() {
        if color.enabled() {
            writeln!(w, "{}", "(no text)".dimmed())?;
        } else {
            writeln!(w, "(no text)")?;
        }
    } else {
        writeln!(w, "{}", text)?;
    }
    if with_header {
        writeln!(w)?;
    }
    Ok(())
}

/// Print an extraction failure, including its error chain.
pub fn print_failure(
    w: &mut dyn Write,
    file_name: &str,
    error: &anyhow::Error,
    color: ColorMode,
) -> std::io::Result<()> {
    let message = format!("{}: {:#}", file_name, error);
    if color.enabled() {
        writeln!(w, "{} {}", "error:".red().bold(), message)
    } else {
        writeln!(w, "error: {}", message)
    }
}

/// Print the loaded engines.
pub fn print_capabilities(
    w: &mut dyn Write,
    capabilities: &Capabilities,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "PDF:".bold(), capabilities.pdf_engine.green())?;
        writeln!(w, "{} {}", "OCR:".bold(), capabilities.ocr_engine.green())?;
    } else {
        writeln!(w, "PDF: {}", capabilities.pdf_engine)?;
        writeln!(w, "OCR: {}", capabilities.ocr_engine)?;
    }
    Ok(())
}

/// Short human-readable description of a progress event.
pub fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::PdfText { page, total } => format!("Reading text layer {}/{}", page, total),
        ProgressEvent::PdfOcrRender { page, total } => {
            format!("Rendering page {}/{} for OCR", page, total)
        }
        ProgressEvent::PdfOcr { page, total } => format!("OCR page {}/{}", page, total),
        ProgressEvent::PdfOcrProgress {
            page,
            total,
            progress,
        } => format!(
            "OCR page {}/{} ({:.0}%)",
            page,
            total,
            progress * 100.0
        ),
        ProgressEvent::ImageOcrProgress { progress } => {
            format!("OCR image ({:.0}%)", progress * 100.0)
        }
    }
}

/// One JSON object per event, tagged with the file it belongs to.
pub fn json_progress_line(file_name: &str, event: &ProgressEvent) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("file".to_string(), serde_json::Value::from(file_name));
    }
    serde_json::to_string(&value)
}

/// Spinner on stderr that follows the extraction phases of one file.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(file_name: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(file_name.to_string());
        bar.set_message("Starting...");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        self.bar.set_message(describe(event));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
