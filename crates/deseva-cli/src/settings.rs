use std::num::NonZeroUsize;
use std::path::PathBuf;

use deseva_core::ExtractionOptions;
use deseva_core::config_file::ConfigFile;

/// Environment variable overriding the OCR language.
pub const ENV_OCR_LANG: &str = "DESEVA_OCR_LANG";
/// Environment variable overriding the tesseract executable.
pub const ENV_TESSERACT: &str = "DESEVA_TESSERACT";

/// Where to find tesseract and which language data to use.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub tesseract: PathBuf,
    pub language: String,
}

/// Resolve OCR settings: CLI flags > env vars > config file > defaults.
pub fn resolve_ocr(
    lang: Option<String>,
    tesseract: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
    config: &ConfigFile,
) -> OcrSettings {
    let file = config.ocr.clone().unwrap_or_default();
    let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);

    let language = lang
        .or_else(|| env(ENV_OCR_LANG).and_then(non_empty))
        .or(file.language)
        .unwrap_or_else(|| "eng".to_string());
    let tesseract = tesseract
        .or_else(|| env(ENV_TESSERACT).and_then(non_empty).map(PathBuf::from))
        .or_else(|| file.tesseract_path.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("tesseract"));

    OcrSettings {
        tesseract,
        language,
    }
}

/// Resolve extraction tuning: CLI flags > config file > defaults.
pub fn resolve_extraction(
    max_pages_for_ocr: Option<NonZeroUsize>,
    min_text_length: Option<usize>,
    scale: Option<f32>,
    config: &ConfigFile,
) -> ExtractionOptions {
    let mut options = config.extraction_options();
    if let Some(max_pages) = max_pages_for_ocr {
        options.max_pages_for_ocr = max_pages;
    }
    if let Some(min_len) = min_text_length {
        options.min_text_length_to_skip_ocr = min_len;
    }
    if let Some(scale) = scale {
        options.render_scale = scale;
    }
    options
}

/// Clap value parser for `--scale`.
pub fn parse_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err("scale must be a positive number".to_string())
    }
}

#[cfg(test)]
mod tests {
    use deseva_core::config_file::{ExtractionConfig, OcrConfig};

    use super::*;

    fn config() -> ConfigFile {
        ConfigFile {
            extraction: Some(ExtractionConfig {
                max_pages_for_ocr: Some(4),
                min_text_length_to_skip_ocr: Some(50),
                render_scale: None,
            }),
            ocr: Some(OcrConfig {
                language: Some("hin".into()),
                tesseract_path: Some("/opt/tesseract/bin/tesseract".into()),
            }),
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_anything() {
        let ocr = resolve_ocr(None, None, no_env, &ConfigFile::default());
        assert_eq!(ocr.language, "eng");
        assert_eq!(ocr.tesseract, PathBuf::from("tesseract"));
    }

    #[test]
    fn config_file_beats_defaults() {
        let ocr = resolve_ocr(None, None, no_env, &config());
        assert_eq!(ocr.language, "hin");
        assert_eq!(ocr.tesseract, PathBuf::from("/opt/tesseract/bin/tesseract"));
    }

    #[test]
    fn env_beats_config_and_flags_beat_env() {
        let env = |key: &str| match key {
            ENV_OCR_LANG => Some("eng+hin".to_string()),
            ENV_TESSERACT => Some("/usr/local/bin/tesseract".to_string()),
            _ => None,
        };

        let ocr = resolve_ocr(None, None, env, &config());
        assert_eq!(ocr.language, "eng+hin");
        assert_eq!(ocr.tesseract, PathBuf::from("/usr/local/bin/tesseract"));

        let ocr = resolve_ocr(Some("tam".into()), None, env, &config());
        assert_eq!(ocr.language, "tam");
        assert_eq!(ocr.tesseract, PathBuf::from("/usr/local/bin/tesseract"));
    }

    #[test]
    fn empty_env_is_ignored() {
        let env = |_: &str| Some("  ".to_string());
        let ocr = resolve_ocr(None, None, env, &config());
        assert_eq!(ocr.language, "hin");
    }

    #[test]
    fn extraction_flags_override_config() {
        let options = resolve_extraction(None, None, None, &config());
        assert_eq!(options.max_pages_for_ocr.get(), 4);
        assert_eq!(options.min_text_length_to_skip_ocr, 50);
        assert_eq!(options.render_scale, 2.0);

        let options = resolve_extraction(NonZeroUsize::new(1), Some(0), Some(3.0), &config());
        assert_eq!(options.max_pages_for_ocr.get(), 1);
        assert_eq!(options.min_text_length_to_skip_ocr, 0);
        assert_eq!(options.render_scale, 3.0);
    }

    #[test]
    fn scale_must_be_positive() {
        assert_eq!(parse_scale("1.5"), Ok(1.5));
        assert!(parse_scale("0").is_err());
        assert!(parse_scale("-2").is_err());
        assert!(parse_scale("inf").is_err());
        assert!(parse_scale("big").is_err());
    }
}
