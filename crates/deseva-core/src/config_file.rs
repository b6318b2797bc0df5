use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ExtractionOptions;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub extraction: Option<ExtractionConfig>,
    pub ocr: Option<OcrConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub max_pages_for_ocr: Option<usize>,
    pub min_text_length_to_skip_ocr: Option<usize>,
    pub render_scale: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language code(s), e.g. `"eng"` or `"eng+hin"`.
    pub language: Option<String>,
    /// Path to the `tesseract` executable.
    pub tesseract_path: Option<String>,
}

/// Platform config directory path: `<config_dir>/deseva/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deseva").join("config.toml"))
}

/// Load config by cascading CWD `.deseva.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".deseva.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_extraction = base.extraction.unwrap_or_default();
    let overlay_extraction = overlay.extraction.unwrap_or_default();
    let base_ocr = base.ocr.unwrap_or_default();
    let overlay_ocr = overlay.ocr.unwrap_or_default();

    ConfigFile {
        extraction: Some(ExtractionConfig {
            max_pages_for_ocr: overlay_extraction
                .max_pages_for_ocr
                .or(base_extraction.max_pages_for_ocr),
            min_text_length_to_skip_ocr: overlay_extraction
                .min_text_length_to_skip_ocr
                .or(base_extraction.min_text_length_to_skip_ocr),
            render_scale: overlay_extraction
                .render_scale
                .or(base_extraction.render_scale),
        }),
        ocr: Some(OcrConfig {
            language: overlay_ocr.language.or(base_ocr.language),
            tesseract_path: overlay_ocr.tesseract_path.or(base_ocr.tesseract_path),
        }),
    }
}

impl ConfigFile {
    /// Extraction options from this config, with defaults for unset fields.
    ///
    /// A zero page cap or a non-positive scale is ignored with a warning.
    pub fn extraction_options(&self) -> ExtractionOptions {
        let mut options = ExtractionOptions::default();
        let Some(extraction) = &self.extraction else {
            return options;
        };

        if let Some(max_pages) = extraction.max_pages_for_ocr {
            match NonZeroUsize::new(max_pages) {
                Some(n) => options.max_pages_for_ocr = n,
                None => tracing::warn!("max_pages_for_ocr must be positive, using default"),
            }
        }
        if let Some(min_len) = extraction.min_text_length_to_skip_ocr {
            options.min_text_length_to_skip_ocr = min_len;
        }
        if let Some(scale) = extraction.render_scale {
            if scale.is_finite() && scale > 0.0 {
                options.render_scale = scale;
            } else {
                tracing::warn!(scale, "render_scale must be positive, using default");
            }
        }
        options
    }
}
