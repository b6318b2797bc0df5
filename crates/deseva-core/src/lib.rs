use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub mod backend;
pub mod config_file;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod text_utils;

// Re-export for convenience
pub use backend::{BackendError, BackendFuture, EncodedImage, OcrEngine, PdfBackend, PdfDocument};
pub use text_utils::normalize_text;

/// Default cap on the number of pages rasterized for the OCR fallback.
pub const DEFAULT_MAX_PAGES_FOR_OCR: NonZeroUsize = match NonZeroUsize::new(2) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default text-layer length (in characters) at which a PDF counts as digital.
pub const DEFAULT_MIN_TEXT_LENGTH_TO_SKIP_OCR: usize = 30;

/// Default upscale factor applied when rasterizing pages for OCR.
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// Where the bytes of a [`SourceFile`] come from.
#[derive(Debug, Clone)]
pub enum SourceData {
    Bytes(Arc<[u8]>),
    Path(PathBuf),
}

/// An uploaded document: a name, a declared media type and its bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub media_type: Option<String>,
    pub data: SourceData,
}

impl SourceFile {
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.map(str::to_string),
            data: SourceData::Bytes(bytes.into()),
        }
    }

    /// A file read lazily from disk. The name is the path's file name.
    pub fn from_path(path: impl Into<PathBuf>, media_type: Option<&str>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            media_type: media_type.map(str::to_string),
            data: SourceData::Path(path),
        }
    }

    pub fn kind(&self) -> SourceKind {
        SourceKind::classify(self.media_type.as_deref(), &self.name)
    }

    /// Load the file's bytes into memory.
    pub async fn read(&self) -> Result<Arc<[u8]>, ExtractError> {
        match &self.data {
            SourceData::Bytes(bytes) => Ok(Arc::clone(bytes)),
            SourceData::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map(Arc::from)
                    .map_err(|source| ExtractError::Read {
                        name: self.name.clone(),
                        source,
                    })
            }
        }
    }
}

/// Which extraction path a source takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image,
    Unsupported,
}

impl SourceKind {
    /// Classify by declared media type, falling back to a `.pdf` suffix on the name.
    pub fn classify(media_type: Option<&str>, name: &str) -> Self {
        let media_type = media_type.map(str::trim).unwrap_or("");
        if media_type.eq_ignore_ascii_case("application/pdf")
            || name.to_lowercase().ends_with(".pdf")
        {
            SourceKind::Pdf
        } else if media_type
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
        {
            SourceKind::Image
        } else {
            SourceKind::Unsupported
        }
    }
}

/// Progress events emitted during extraction.
///
/// Serialized with a `phase` tag (`pdf_text`, `pdf_ocr_render`, ...). `page` is
/// 1-based and `total` stays fixed within a phase of one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A page's text layer has been read.
    PdfText { page: usize, total: usize },
    /// A page is about to be rasterized for OCR.
    PdfOcrRender { page: usize, total: usize },
    /// OCR is starting on a rasterized page.
    PdfOcr { page: usize, total: usize },
    PdfOcrProgress {
        page: usize,
        total: usize,
        progress: f32,
    },
    /// Recognition progress for a standalone image.
    ImageOcrProgress { progress: f32 },
}

impl ProgressEvent {
    pub fn phase(&self) -> &'static str {
        match self {
            ProgressEvent::PdfText { .. } => "pdf_text",
            ProgressEvent::PdfOcrRender { .. } => "pdf_ocr_render",
            ProgressEvent::PdfOcr { .. } => "pdf_ocr",
            ProgressEvent::PdfOcrProgress { .. } => "pdf_ocr_progress",
            ProgressEvent::ImageOcrProgress { .. } => "image_ocr_progress",
        }
    }
}

/// Callback receiving [`ProgressEvent`]s.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Tuning for one extraction call.
#[derive(Clone)]
pub struct ExtractionOptions {
    /// Upper bound on pages rasterized and OCR'd when the text layer is too short.
    pub max_pages_for_ocr: NonZeroUsize,
    /// Normalized text-layer length at or above which OCR is skipped.
    ///
    /// This is a heuristic: a very short answer in a digital PDF still goes
    /// through OCR.
    pub min_text_length_to_skip_ocr: usize,
    pub render_scale: f32,
    pub progress: Option<ProgressSink>,
}

impl std::fmt::Debug for ExtractionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionOptions")
            .field("max_pages_for_ocr", &self.max_pages_for_ocr)
            .field(
                "min_text_length_to_skip_ocr",
                &self.min_text_length_to_skip_ocr,
            )
            .field("render_scale", &self.render_scale)
            .field("progress", &self.progress.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_pages_for_ocr: DEFAULT_MAX_PAGES_FOR_OCR,
            min_text_length_to_skip_ocr: DEFAULT_MIN_TEXT_LENGTH_TO_SKIP_OCR,
            render_scale: DEFAULT_RENDER_SCALE,
            progress: None,
        }
    }
}

impl ExtractionOptions {
    pub fn with_progress(mut self, sink: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink(event);
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to load extraction engines: {0}")]
    CapabilityLoad(String),
    #[error("Unable to open PDF. The file may be corrupted or password-protected. ({0})")]
    PdfOpen(#[source] BackendError),
    #[error("Unsupported file type for text extraction: {0}")]
    UnsupportedType(String),
    #[error(
        "No readable text detected in this PDF. If this is a scanned/handwritten PDF, \
         OCR may need better scan quality or a server-side OCR pipeline."
    )]
    NoTextDetected,
    #[error("Failed to read file {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read text on page {page}: {source}")]
    PageText {
        page: usize,
        #[source]
        source: BackendError,
    },
    #[error("failed to render page {page}: {source}")]
    Render {
        page: usize,
        #[source]
        source: BackendError,
    },
    #[error("OCR failed: {0}")]
    Ocr(#[source] BackendError),
}
