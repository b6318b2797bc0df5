use std::sync::Arc;

pub mod capability;
mod image;
mod pdf;

// Re-export domain types for convenience
pub use capability::{
    Capabilities, CapabilityLoader, CapabilityProvider, FixedCapabilities, LoadState,
};
#[cfg(feature = "native")]
pub use capability::NativeCapabilities;
pub use deseva_core::{ExtractError, ExtractionOptions, ProgressEvent, SourceFile, SourceKind};

/// Turns uploaded PDFs and images into plain text.
///
/// Owns a [`CapabilityLoader`], so engines are brought up on the first
/// extraction that needs them and shared by every later call. An `Extractor`
/// can be shared across tasks behind an `Arc`.
pub struct Extractor {
    loader: CapabilityLoader,
}

impl Extractor {
    pub fn new(provider: impl CapabilityProvider + 'static) -> Self {
        Self {
            loader: CapabilityLoader::new(Arc::new(provider)),
        }
    }

    /// An extractor using MuPDF and the `tesseract` binary found on `PATH`.
    #[cfg(feature = "native")]
    pub fn native() -> Self {
        Self::new(NativeCapabilities::default())
    }

    pub fn loader(&self) -> &CapabilityLoader {
        &self.loader
    }

    /// Extract normalized text from `file`.
    ///
    /// Dispatches on:
    /// - no file → empty string, nothing loaded
    /// - `application/pdf` or a `.pdf` name → text layer, with OCR fallback
    /// - `image/*` → OCR
    /// - anything else → [`ExtractError::UnsupportedType`]
    pub async fn extract(
        &self,
        file: Option<&SourceFile>,
        options: &ExtractionOptions,
    ) -> Result<String, ExtractError> {
        let Some(file) = file else {
            return Ok(String::new());
        };

        let kind = file.kind();
        tracing::debug!(name = %file.name, media_type = ?file.media_type, ?kind, "extracting");

        match kind {
            SourceKind::Pdf => {
                let capabilities = self.loader.ensure().await?;
                let bytes = file.read().await?;
                pdf::extract_pdf(&capabilities, bytes, options).await
            }
            SourceKind::Image => {
                let bytes = file.read().await?;
                let capabilities = self.loader.ensure().await?;
                let media_type = file.media_type.as_deref().unwrap_or("image/*");
                image::extract_image(&capabilities, bytes, media_type, options).await
            }
            SourceKind::Unsupported => Err(ExtractError::UnsupportedType(
                file.media_type
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| file.name.clone()),
            )),
        }
    }
}
