use std::sync::Arc;

use deseva_core::{EncodedImage, ExtractError, ExtractionOptions, ProgressEvent, normalize_text};

use crate::capability::Capabilities;

/// OCR a standalone image. The bytes are handed to the OCR engine as they
/// were uploaded; pixel dimensions are not decoded and stay 0.
pub(crate) async fn extract_image(
    capabilities: &Capabilities,
    bytes: Arc<[u8]>,
    media_type: &str,
    options: &ExtractionOptions,
) -> Result<String, ExtractError> {
    let image = EncodedImage {
        data: bytes.to_vec(),
        media_type: media_type.to_string(),
        width: 0,
        height: 0,
    };

    let relay = |progress: f32| {
        options.emit(ProgressEvent::ImageOcrProgress {
            progress: progress.clamp(0.0, 1.0),
        })
    };
    let text = capabilities
        .ocr
        .recognize(&image, &relay)
        .await
        .map_err(ExtractError::Ocr)?;

    tracing::debug!(
        media_type,
        bytes = image.data.len(),
        chars = text.chars().count(),
        "OCR'd image"
    );
    Ok(normalize_text(&text))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use deseva_core::mock::{MockOcrEngine, MockPdfBackend};

    use super::*;

    #[tokio::test]
    async fn passes_bytes_and_media_type_through() {
        let ocr = Arc::new(MockOcrEngine::new("  Diagram:\t labelled   parts \n\n\n\n"));
        let capabilities = Capabilities::new(Arc::new(MockPdfBackend::scanned(0)), ocr.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let options =
            ExtractionOptions::default().with_progress(move |e| sink.lock().unwrap().push(e));

        let text = extract_image(
            &capabilities,
            Arc::from(b"jpeg bytes".to_vec()),
            "image/jpeg",
            &options,
        )
        .await
        .unwrap();

        assert_eq!(text, "Diagram: labelled parts");
        assert_eq!(ocr.seen_images(), vec![b"jpeg bytes".to_vec()]);
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .all(|e| matches!(e, ProgressEvent::ImageOcrProgress { .. }))
        );
    }

    #[tokio::test]
    async fn empty_ocr_is_empty_text() {
        let capabilities = Capabilities::new(
            Arc::new(MockPdfBackend::scanned(0)),
            Arc::new(MockOcrEngine::new(" \n ")),
        );

        let text = extract_image(
            &capabilities,
            Arc::from(Vec::new()),
            "image/png",
            &ExtractionOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(text, "");
    }
}
