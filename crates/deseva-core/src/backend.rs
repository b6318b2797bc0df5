use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("failed to render page: {0}")]
    RenderError(String),
    #[error("OCR engine error: {0}")]
    OcrError(String),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxed future returned by capability trait methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// An encoded raster image, e.g. a PDF page rendered to PNG.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

/// Trait for PDF engines.
///
/// Implementors only open documents; per-page work happens on the returned
/// [`PdfDocument`].
pub trait PdfBackend: Send + Sync {
    /// Parse a PDF from its raw bytes.
    ///
    /// Corrupt and password-protected files fail with [`BackendError::OpenError`].
    fn open(&self, bytes: Arc<[u8]>) -> BackendFuture<'_, Box<dyn PdfDocument>>;
}

/// An opened PDF. Page numbers are 1-based.
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Text fragments of the page's text layer, in reading order.
    fn page_text(&self, page: usize) -> BackendFuture<'_, Vec<String>>;

    /// Rasterize the page at `scale` times its nominal resolution.
    fn render_page(&self, page: usize, scale: f32) -> BackendFuture<'_, EncodedImage>;
}

/// Trait for OCR engines.
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in `image`, reporting fractional progress in `[0, 1]`
    /// through `progress` as recognition advances.
    fn recognize<'a>(
        &'a self,
        image: &'a EncodedImage,
        progress: &'a (dyn Fn(f32) + Send + Sync),
    ) -> BackendFuture<'a, String>;
}
