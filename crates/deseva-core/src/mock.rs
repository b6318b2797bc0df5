//! Scripted PDF and OCR capabilities for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{BackendError, BackendFuture, EncodedImage, OcrEngine, PdfBackend, PdfDocument};

#[derive(Default)]
struct PdfState {
    pages: Vec<Vec<String>>,
    open_error: Option<String>,
    render_error_page: Option<usize>,
    open_calls: AtomicUsize,
    text_calls: AtomicUsize,
    rendered: Mutex<Vec<usize>>,
}

/// A hand-rolled mock implementing [`PdfBackend`] for tests.
///
/// Each page is a list of text-layer fragments; an empty list is a page with
/// no text layer. Rendering page `n` produces an image whose bytes are
/// `"page-n"`, so OCR mocks can tell pages apart.
#[derive(Clone)]
pub struct MockPdfBackend {
    state: Arc<PdfState>,
}

impl MockPdfBackend {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(str::to_string).collect())
            .collect();
        Self {
            state: Arc::new(PdfState {
                pages,
                ..Default::default()
            }),
        }
    }

    /// A document of `count` pages with no text layer at all.
    pub fn scanned(count: usize) -> Self {
        Self::new(vec![Vec::new(); count])
    }

    /// A backend whose `open` always fails, like a corrupt or encrypted file.
    pub fn failing_open(message: &str) -> Self {
        Self {
            state: Arc::new(PdfState {
                open_error: Some(message.to_string()),
                ..Default::default()
            }),
        }
    }

    /// Make rendering of `page` fail.
    pub fn with_render_error(self, page: usize) -> Self {
        let state = Arc::try_unwrap(self.state).unwrap_or_else(|_| {
            panic!("with_render_error must be called before the backend is shared")
        });
        Self {
            state: Arc::new(PdfState {
                render_error_page: Some(page),
                ..state
            }),
        }
    }

    pub fn open_calls(&self) -> usize {
        self.state.open_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.state.text_calls.load(Ordering::SeqCst)
    }

    /// Pages rasterized so far, in call order.
    pub fn rendered_pages(&self) -> Vec<usize> {
        self.state.rendered.lock().unwrap().clone()
    }
}

impl PdfBackend for MockPdfBackend {
    fn open(&self, _bytes: Arc<[u8]>) -> BackendFuture<'_, Box<dyn PdfDocument>> {
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            if let Some(message) = &state.open_error {
                return Err(BackendError::OpenError(message.clone()));
            }
            Ok(Box::new(MockPdfDocument { state }) as Box<dyn PdfDocument>)
        })
    }
}

struct MockPdfDocument {
    state: Arc<PdfState>,
}

impl PdfDocument for MockPdfDocument {
    fn page_count(&self) -> usize {
        self.state.pages.len()
    }

    fn page_text(&self, page: usize) -> BackendFuture<'_, Vec<String>> {
        self.state.text_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.state
                .pages
                .get(page.wrapping_sub(1))
                .cloned()
                .ok_or_else(|| BackendError::ExtractionError(format!("no page {page}")))
        })
    }

    fn render_page(&self, page: usize, _scale: f32) -> BackendFuture<'_, EncodedImage> {
        self.state.rendered.lock().unwrap().push(page);
        Box::pin(async move {
            if self.state.render_error_page == Some(page) {
                return Err(BackendError::RenderError(format!("page {page} is damaged")));
            }
            Ok(EncodedImage {
                data: format!("page-{page}").into_bytes(),
                media_type: "image/png".to_string(),
                width: 1,
                height: 1,
            })
        })
    }
}

/// A configurable mock response for [`MockOcrEngine`].
#[derive(Clone, Debug)]
pub enum MockOcrResponse {
    Text(String),
    Error(String),
}

/// A hand-rolled mock implementing [`OcrEngine`] for tests.
///
/// Returns responses in order, repeating the last one, and reports the
/// configured progress steps before answering.
pub struct MockOcrEngine {
    responses: Mutex<Vec<MockOcrResponse>>,
    fallback: MockOcrResponse,
    progress_steps: Vec<f32>,
    seen: Mutex<Vec<Vec<u8>>>,
    call_count: AtomicUsize,
}

impl MockOcrEngine {
    /// Create a mock that always recognizes `text`.
    pub fn new(text: &str) -> Self {
        Self::with_sequence(vec![MockOcrResponse::Text(text.to_string())])
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<MockOcrResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        // Reverse so we can pop() from the front cheaply.
        responses.reverse();
        let fallback = responses.first().cloned().unwrap();
        Self {
            responses: Mutex::new(responses),
            fallback,
            progress_steps: vec![0.0, 0.5, 1.0],
            seen: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self::with_sequence(vec![MockOcrResponse::Error(message.to_string())])
    }

    pub fn with_progress_steps(mut self, steps: Vec<f32>) -> Self {
        self.progress_steps = steps;
        self
    }

    /// How many times `recognize()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Bytes of every image passed to `recognize()`, in call order.
    pub fn seen_images(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }

    fn next_response(&self) -> MockOcrResponse {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize<'a>(
        &'a self,
        image: &'a EncodedImage,
        progress: &'a (dyn Fn(f32) + Send + Sync),
    ) -> BackendFuture<'a, String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.data.clone());
        let response = self.next_response();

        Box::pin(async move {
            for step in &self.progress_steps {
                progress(*step);
            }
            match response {
                MockOcrResponse::Text(text) => Ok(text),
                MockOcrResponse::Error(message) => Err(BackendError::OcrError(message)),
            }
        })
    }
}
