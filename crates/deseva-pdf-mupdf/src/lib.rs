use std::sync::Arc;

use mupdf::{Colorspace, Document, ImageFormat, Matrix, Page, TextPageFlags};

use deseva_core::{BackendError, BackendFuture, EncodedImage, PdfBackend, PdfDocument};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the image-only and test code paths do not
/// transitively depend on it.
///
/// MuPDF handles are not `Send`, so an opened document keeps only the raw
/// bytes and every page operation re-parses them on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    fn open(&self, bytes: Arc<[u8]>) -> BackendFuture<'_, Box<dyn PdfDocument>> {
        Box::pin(async move {
            let probe = Arc::clone(&bytes);
            let page_count = blocking(move || {
                let document = open_document(&probe)?;
                let count = document
                    .page_count()
                    .map_err(|e| BackendError::OpenError(e.to_string()))?;
                Ok(usize::try_from(count).unwrap_or(0))
            })
            .await?;

            tracing::debug!(page_count, bytes = bytes.len(), "opened PDF");
            Ok(Box::new(MupdfDocument { bytes, page_count }) as Box<dyn PdfDocument>)
        })
    }
}

struct MupdfDocument {
    bytes: Arc<[u8]>,
    page_count: usize,
}

impl MupdfDocument {
    fn check_page(&self, page: usize) -> Result<(), BackendError> {
        if page == 0 || page > self.page_count {
            return Err(BackendError::ExtractionError(format!(
                "page {page} out of range (document has {} pages)",
                self.page_count
            )));
        }
        Ok(())
    }
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, page: usize) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move {
            self.check_page(page)?;
            let bytes = Arc::clone(&self.bytes);
            blocking(move || with_page(&bytes, page, text_fragments)).await
        })
    }

    fn render_page(&self, page: usize, scale: f32) -> BackendFuture<'_, EncodedImage> {
        Box::pin(async move {
            self.check_page(page)?;
            let bytes = Arc::clone(&self.bytes);
            blocking(move || with_page(&bytes, page, |page| render_png(page, scale))).await
        })
    }
}

/// One fragment per text line, in block order.
fn text_fragments(page: &Page) -> Result<Vec<String>, BackendError> {
    let text_page = page
        .to_text_page(TextPageFlags::empty())
        .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

    let mut fragments = Vec::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            let line_text: String = line
                .chars()
                .map(|c| c.char().unwrap_or('\u{FFFD}'))
                .collect();
            fragments.push(line_text);
        }
    }
    Ok(fragments)
}

fn render_png(page: &Page, scale: f32) -> Result<EncodedImage, BackendError> {
    let pixmap = page
        .to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            false,
            true,
        )
        .map_err(|e| BackendError::RenderError(e.to_string()))?;

    let mut data = Vec::new();
    pixmap
        .write_to(&mut data, ImageFormat::PNG)
        .map_err(|e| BackendError::RenderError(e.to_string()))?;

    Ok(EncodedImage {
        data,
        media_type: "image/png".to_string(),
        width: pixmap.width(),
        height: pixmap.height(),
    })
}

fn open_document(bytes: &[u8]) -> Result<Document, BackendError> {
    let document = Document::from_bytes(bytes, "application/pdf")
        .map_err(|e| BackendError::OpenError(e.to_string()))?;
    if document
        .needs_password()
        .map_err(|e| BackendError::OpenError(e.to_string()))?
    {
        return Err(BackendError::OpenError(
            "document is password-protected".into(),
        ));
    }
    Ok(document)
}

/// Open the document and run `work` on one of its pages (1-based).
fn with_page<T>(
    bytes: &[u8],
    page: usize,
    work: impl FnOnce(&Page) -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    let document = open_document(bytes)?;
    let index = i32::try_from(page - 1)
        .map_err(|_| BackendError::ExtractionError(format!("page {page} out of range")))?;
    let page = document
        .load_page(index)
        .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
    work(&page)
}

/// Run MuPDF work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, BackendError>
where
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BackendError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a one-page PDF whose content stream shows `text` in Helvetica.
    fn single_page_pdf(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_offset = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_offset
            )
            .as_bytes(),
        );
        pdf
    }

    #[tokio::test]
    async fn extracts_text_layer() {
        let backend = MupdfBackend::new();
        let document = backend
            .open(Arc::from(single_page_pdf("Hello World")))
            .await
            .unwrap();
        assert_eq!(document.page_count(), 1);

        let fragments = document.page_text(1).await.unwrap();
        assert!(fragments.join(" ").contains("Hello World"));
    }

    #[tokio::test]
    async fn renders_page_to_png() {
        let backend = MupdfBackend::new();
        let document = backend
            .open(Arc::from(single_page_pdf("Scan me")))
            .await
            .unwrap();

        let image = document.render_page(1, 2.0).await.unwrap();
        assert_eq!(image.media_type, "image/png");
        assert!(image.data.starts_with(b"\x89PNG"));
        // US Letter at 2x: 1224 x 1584
        assert_eq!(image.width, 1224);
        assert_eq!(image.height, 1584);
    }

    #[tokio::test]
    async fn garbage_fails_to_open() {
        let backend = MupdfBackend::new();
        let result = backend.open(Arc::from(b"not a pdf at all".to_vec())).await;
        assert!(matches!(result, Err(BackendError::OpenError(_))));
    }

    #[tokio::test]
    async fn out_of_range_page_is_an_error() {
        let backend = MupdfBackend::new();
        let document = backend
            .open(Arc::from(single_page_pdf("x")))
            .await
            .unwrap();
        assert!(document.page_text(0).await.is_err());
        assert!(document.render_page(2, 1.0).await.is_err());
    }
}
