use std::sync::Arc;

use deseva_core::{
    ExtractError, ExtractionOptions, OcrEngine, PdfDocument, ProgressEvent, normalize_text,
};

use crate::capability::Capabilities;

/// Extract text from a PDF: text layer first, OCR on rendered pages when the
/// text layer is shorter than `options.min_text_length_to_skip_ocr`.
pub(crate) async fn extract_pdf(
    capabilities: &Capabilities,
    bytes: Arc<[u8]>,
    options: &ExtractionOptions,
) -> Result<String, ExtractError> {
    let document = capabilities
        .pdf
        .open(bytes)
        .await
        .map_err(ExtractError::PdfOpen)?;

    let text = read_text_layer(document.as_ref(), options).await?;
    let chars = text.chars().count();
    if chars >= options.min_text_length_to_skip_ocr {
        tracing::debug!(chars, pages = document.page_count(), "using PDF text layer");
        return Ok(text);
    }

    tracing::info!(
        chars,
        threshold = options.min_text_length_to_skip_ocr,
        "text layer too short, falling back to OCR"
    );
    ocr_pages(document.as_ref(), capabilities.ocr.as_ref(), options).await
}

/// Concatenate every page's text fragments, one line per page, in page order.
async fn read_text_layer(
    document: &dyn PdfDocument,
    options: &ExtractionOptions,
) -> Result<String, ExtractError> {
    let total = document.page_count();
    let mut extracted = String::new();

    for page in 1..=total {
        let fragments = document
            .page_text(page)
            .await
            .map_err(|source| ExtractError::PageText { page, source })?;
        extracted.push_str(&fragments.join(" "));
        extracted.push('\n');

        options.emit(ProgressEvent::PdfText { page, total });
    }

    Ok(normalize_text(&extracted))
}

/// Rasterize and OCR the first `max_pages_for_ocr` pages, one at a time.
async fn ocr_pages(
    document: &dyn PdfDocument,
    ocr: &dyn OcrEngine,
    options: &ExtractionOptions,
) -> Result<String, ExtractError> {
    let total = document.page_count().min(options.max_pages_for_ocr.get());
    let mut ocr_text = String::new();

    for page in 1..=total {
        options.emit(ProgressEvent::PdfOcrRender { page, total });
        let image = document
            .render_page(page, options.render_scale)
            .await
            .map_err(|source| ExtractError::Render { page, source })?;

        options.emit(ProgressEvent::PdfOcr { page, total });
        let relay = |progress: f32| {
            options.emit(ProgressEvent::PdfOcrProgress {
                page,
                total,
                progress: progress.clamp(0.0, 1.0),
            })
        };
        let page_text = ocr
            .recognize(&image, &relay)
            .await
            .map_err(ExtractError::Ocr)?;

        tracing::debug!(page, total, chars = page_text.len(), "OCR'd page");
        ocr_text.push_str(&normalize_text(&page_text));
        ocr_text.push('\n');
    }

    let ocr_text = normalize_text(&ocr_text);
    if ocr_text.is_empty() {
        return Err(ExtractError::NoTextDetected);
    }
    Ok(ocr_text)
}
