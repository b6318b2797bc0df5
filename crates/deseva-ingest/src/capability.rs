//! Lazy, once-per-loader initialization of the PDF and OCR engines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use deseva_core::{BackendFuture, ExtractError, OcrEngine, PdfBackend};

/// The engines an extraction needs.
#[derive(Clone)]
pub struct Capabilities {
    pub pdf: Arc<dyn PdfBackend>,
    pub ocr: Arc<dyn OcrEngine>,
    /// Human-readable engine descriptions, for logs and diagnostics.
    pub pdf_engine: String,
    pub ocr_engine: String,
}

impl Capabilities {
    pub fn new(pdf: Arc<dyn PdfBackend>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            pdf,
            ocr,
            pdf_engine: "pdf".to_string(),
            ocr_engine: "ocr".to_string(),
        }
    }

    pub fn with_engine_names(
        mut self,
        pdf_engine: impl Into<String>,
        ocr_engine: impl Into<String>,
    ) -> Self {
        self.pdf_engine = pdf_engine.into();
        self.ocr_engine = ocr_engine.into();
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("pdf_engine", &self.pdf_engine)
            .field("ocr_engine", &self.ocr_engine)
            .finish()
    }
}

/// Something that can bring up [`Capabilities`], e.g. by probing for installed engines.
pub trait CapabilityProvider: Send + Sync {
    fn load(&self) -> BackendFuture<'_, Capabilities>;
}

/// A provider handing out engines that were constructed up front.
pub struct FixedCapabilities(pub Capabilities);

impl CapabilityProvider for FixedCapabilities {
    fn load(&self) -> BackendFuture<'_, Capabilities> {
        let capabilities = self.0.clone();
        Box::pin(async move { Ok(capabilities) })
    }
}

/// Provider for the bundled engines: MuPDF for PDFs and the `tesseract` binary for OCR.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct NativeCapabilities {
    tesseract_path: std::path::PathBuf,
    language: String,
}

#[cfg(feature = "native")]
impl NativeCapabilities {
    pub fn new(tesseract_path: impl Into<std::path::PathBuf>, language: impl Into<String>) -> Self {
        Self {
            tesseract_path: tesseract_path.into(),
            language: language.into(),
        }
    }
}

#[cfg(feature = "native")]
impl Default for NativeCapabilities {
    fn default() -> Self {
        Self::new("tesseract", deseva_ocr_tesseract::DEFAULT_LANGUAGE)
    }
}

#[cfg(feature = "native")]
impl CapabilityProvider for NativeCapabilities {
    fn load(&self) -> BackendFuture<'_, Capabilities> {
        Box::pin(async move {
            let ocr = deseva_ocr_tesseract::TesseractOcr::probe(
                self.tesseract_path.clone(),
                self.language.clone(),
            )
            .await?;
            let ocr_engine = format!("tesseract {} ({})", ocr.version(), ocr.language());
            Ok(Capabilities::new(
                Arc::new(deseva_pdf_mupdf::MupdfBackend::new()),
                Arc::new(ocr),
            )
            .with_engine_names("MuPDF", ocr_engine))
        })
    }
}

/// Observable lifecycle of a [`CapabilityLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<Capabilities>, String>>>;

enum Slot {
    NotLoaded,
    Loading { attempt: u64, load: LoadFuture },
    Loaded(Arc<Capabilities>),
}

struct LoaderState {
    slot: Slot,
    attempts: u64,
}

/// Loads capabilities at most once at a time and keeps them after success.
///
/// Concurrent [`ensure`](Self::ensure) calls share one in-flight load and all
/// see its outcome. A failed load puts the loader back to
/// [`LoadState::NotLoaded`], so the next call tries again.
pub struct CapabilityLoader {
    provider: Arc<dyn CapabilityProvider>,
    state: Mutex<LoaderState>,
}

impl CapabilityLoader {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(LoaderState {
                slot: Slot::NotLoaded,
                attempts: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LoadState {
        match self.lock().slot {
            Slot::NotLoaded => LoadState::NotLoaded,
            Slot::Loading { .. } => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
        }
    }

    /// Forget loaded capabilities. A load still in flight finishes for its
    /// current waiters but is not recorded.
    pub fn reset(&self) {
        self.lock().slot = Slot::NotLoaded;
    }

    /// Return the loaded capabilities, loading them first if needed.
    pub async fn ensure(&self) -> Result<Arc<Capabilities>, ExtractError> {
        let (attempt, load) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.slot {
                Slot::Loaded(capabilities) => return Ok(Arc::clone(capabilities)),
                Slot::Loading { attempt, load } => (*attempt, load.clone()),
                Slot::NotLoaded => {
                    state.attempts += 1;
                    let attempt = state.attempts;
                    let provider = Arc::clone(&self.provider);
                    let load = async move {
                        provider
                            .load()
                            .await
                            .map(Arc::new)
                            .map_err(|e| e.to_string())
                    }
                    .boxed()
                    .shared();
                    tracing::debug!(attempt, "loading extraction engines");
                    state.slot = Slot::Loading {
                        attempt,
                        load: load.clone(),
                    };
                    (attempt, load)
                }
            }
        };

        let result = load.await;

        let mut state = self.lock();
        // Only the attempt that is still current may move the slot on
        if matches!(&state.slot, Slot::Loading { attempt: current, .. } if *current == attempt) {
            match &result {
                Ok(capabilities) => {
                    tracing::info!(
                        pdf = %capabilities.pdf_engine,
                        ocr = %capabilities.ocr_engine,
                        "extraction engines loaded"
                    );
                    state.slot = Slot::Loaded(Arc::clone(capabilities));
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "failed to load extraction engines");
                    state.slot = Slot::NotLoaded;
                }
            }
        }

        result.map_err(ExtractError::CapabilityLoad)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use deseva_core::BackendError;
    use deseva_core::mock::{MockOcrEngine, MockPdfBackend};

    use super::*;

    /// Counts loads; fails the first `failures` of them.
    struct CountingProvider {
        loads: AtomicUsize,
        failures: usize,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                failures,
                delay: Duration::from_millis(20),
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl CapabilityProvider for CountingProvider {
        fn load(&self) -> BackendFuture<'_, Capabilities> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                if n < self.failures {
                    return Err(BackendError::Unavailable("cdn unreachable".into()));
                }
                Ok(Capabilities::new(
                    Arc::new(MockPdfBackend::scanned(1)),
                    Arc::new(MockOcrEngine::new("text")),
                ))
            })
        }
    }

    #[tokio::test]
    async fn loads_once_and_stays_loaded() {
        let provider = CountingProvider::new(0);
        let loader = CapabilityLoader::new(provider.clone());
        assert_eq!(loader.state(), LoadState::NotLoaded);

        loader.ensure().await.unwrap();
        loader.ensure().await.unwrap();

        assert_eq!(provider.loads(), 1);
        assert_eq!(loader.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let provider = CountingProvider::new(0);
        let loader = CapabilityLoader::new(provider.clone());

        let (a, b, c) = tokio::join!(loader.ensure(), loader.ensure(), loader.ensure());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(provider.loads(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn state_is_loading_while_in_flight() {
        let provider = CountingProvider::new(0);
        let loader = CapabilityLoader::new(provider);

        let pending = loader.ensure();
        tokio::pin!(pending);
        // Poll once so the load starts, then observe
        assert!(futures_util::poll!(pending.as_mut()).is_pending());
        assert_eq!(loader.state(), LoadState::Loading);

        pending.await.unwrap();
        assert_eq!(loader.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let provider = CountingProvider::new(1);
        let loader = CapabilityLoader::new(provider.clone());

        let (a, b) = tokio::join!(loader.ensure(), loader.ensure());
        assert!(matches!(a, Err(ExtractError::CapabilityLoad(_))));
        assert!(matches!(b, Err(ExtractError::CapabilityLoad(_))));
        assert_eq!(provider.loads(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let provider = CountingProvider::new(1);
        let loader = CapabilityLoader::new(provider.clone());

        let err = loader.ensure().await.unwrap_err();
        assert!(err.to_string().contains("cdn unreachable"));
        assert_eq!(loader.state(), LoadState::NotLoaded);

        loader.ensure().await.unwrap();
        assert_eq!(provider.loads(), 2);
        assert_eq!(loader.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn reset_forces_reload() {
        let provider = CountingProvider::new(0);
        let loader = CapabilityLoader::new(provider.clone());

        loader.ensure().await.unwrap();
        loader.reset();
        assert_eq!(loader.state(), LoadState::NotLoaded);

        loader.ensure().await.unwrap();
        assert_eq!(provider.loads(), 2);
    }

    #[tokio::test]
    async fn fixed_capabilities_keep_engine_names() {
        let capabilities = Capabilities::new(
            Arc::new(MockPdfBackend::scanned(1)),
            Arc::new(MockOcrEngine::new("text")),
        )
        .with_engine_names("mock pdf", "mock ocr");
        let loader = CapabilityLoader::new(Arc::new(FixedCapabilities(capabilities)));

        let loaded = loader.ensure().await.unwrap();
        assert_eq!(loaded.pdf_engine, "mock pdf");
        assert_eq!(loaded.ocr_engine, "mock ocr");
    }
}
