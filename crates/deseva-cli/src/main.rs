use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use deseva_core::config_file;
use deseva_ingest::{ExtractionOptions, Extractor, NativeCapabilities, SourceFile};
use tracing_subscriber::EnvFilter;

mod output;
mod settings;

use output::{ColorMode, ProgressDisplay};

/// Extract plain text from answer PDFs and images, with OCR for scans
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from one or more PDF or image files
    Extract {
        /// Files to extract text from
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Media type to assume for every file (guessed from the extension otherwise)
        #[arg(long)]
        mime: Option<String>,

        /// Maximum number of pages to OCR when a PDF has no usable text layer
        #[arg(long)]
        max_pages_for_ocr: Option<NonZeroUsize>,

        /// Text-layer length (in characters) at which OCR is skipped
        #[arg(long)]
        min_text_length: Option<usize>,

        /// Upscale factor when rendering PDF pages for OCR
        #[arg(long, value_parser = settings::parse_scale)]
        scale: Option<f32>,

        #[command(flatten)]
        ocr: OcrArgs,

        /// Emit progress as JSON lines on stderr instead of a spinner
        #[arg(long)]
        json_progress: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Write extracted text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the PDF and OCR engines and report their versions
    Capabilities {
        #[command(flatten)]
        ocr: OcrArgs,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[derive(clap::Args, Debug)]
struct OcrArgs {
    /// Tesseract language(s), e.g. "eng" or "eng+hin"
    #[arg(long)]
    lang: Option<String>,

    /// Path to the tesseract executable
    #[arg(long)]
    tesseract: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_file::load_config();

    match cli.command {
        Command::Extract {
            files,
            mime,
            max_pages_for_ocr,
            min_text_length,
            scale,
            ocr,
            json_progress,
            no_color,
            output,
        } => {
            let options =
                settings::resolve_extraction(max_pages_for_ocr, min_text_length, scale, &config);
            let extractor = native_extractor(ocr, &config);
            extract(
                &extractor,
                &files,
                mime.as_deref(),
                &options,
                json_progress,
                no_color,
                output,
            )
            .await
        }
        Command::Capabilities { ocr, no_color } => {
            let extractor = native_extractor(ocr, &config);
            let capabilities = extractor.loader().ensure().await?;
            let mut stdout = std::io::stdout();
            output::print_capabilities(&mut stdout, &capabilities, ColorMode(!no_color))?;
            Ok(())
        }
    }
}

fn native_extractor(ocr: OcrArgs, config: &config_file::ConfigFile) -> Extractor {
    let ocr = settings::resolve_ocr(
        ocr.lang,
        ocr.tesseract,
        |key| std::env::var(key).ok(),
        config,
    );
    tracing::debug!(tesseract = %ocr.tesseract.display(), language = %ocr.language, "OCR settings");
    Extractor::new(NativeCapabilities::new(ocr.tesseract, ocr.language))
}

async fn extract(
    extractor: &Extractor,
    files: &[PathBuf],
    mime: Option<&str>,
    options: &ExtractionOptions,
    json_progress: bool,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let color = ColorMode(!no_color && output.is_none());
    let error_color = ColorMode(!no_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(
            std::fs::File::create(output_path)
                .with_context(|| format!("cannot create {}", output_path.display()))?,
        )
    } else {
        Box::new(std::io::stdout())
    };

    let mut failed = 0;
    for path in files {
        let file = source_file(path, mime);
        let file_name = file.name.clone();

        let display = (!json_progress).then(|| Arc::new(ProgressDisplay::new(&file_name)));
        let options = with_progress_sink(options, &file_name, json_progress, display.clone());

        let result = tokio::select! {
            result = extractor.extract(Some(&file), &options) => result,
            _ = tokio::signal::ctrl_c() => {
                if let Some(display) = &display {
                    display.finish();
                }
                anyhow::bail!("interrupted");
            }
        };
        if let Some(display) = &display {
            display.finish();
        }

        match result {
            Ok(text) => {
                output::print_document(&mut writer, &file_name, &text, files.len() > 1, color)?
            }
            Err(e) => {
                failed += 1;
                tracing::debug!(file = %file_name, error = ?e, "extraction failed");
                let error = anyhow::Error::new(e);
                output::print_failure(&mut std::io::stderr(), &file_name, &error, error_color)?;
            }
        }
    }
    writer.flush()?;

    if failed > 0 {
        anyhow::bail!("{} of {} files could not be extracted", failed, files.len());
    }
    Ok(())
}

/// Build a [`SourceFile`] for `path`, guessing the media type from the extension
/// unless one was given.
fn source_file(path: &Path, mime: Option<&str>) -> SourceFile {
    let media_type = mime.map(str::to_string).or_else(|| {
        mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
    });
    SourceFile::from_path(path, media_type.as_deref())
}

/// Copy of `options` whose progress goes to the spinner or to stderr as JSON lines.
fn with_progress_sink(
    options: &ExtractionOptions,
    file_name: &str,
    json_progress: bool,
    display: Option<Arc<ProgressDisplay>>,
) -> ExtractionOptions {
    let options = options.clone();
    if json_progress {
        let file_name = file_name.to_string();
        let stderr = Mutex::new(std::io::stderr());
        options.with_progress(move |event| {
            if let Ok(line) = output::json_progress_line(&file_name, &event)
                && let Ok(mut w) = stderr.lock()
            {
                let _ = writeln!(w, "{}", line);
            }
        })
    } else if let Some(display) = display {
        options.with_progress(move |event| display.handle(&event))
    } else {
        options
    }
}

#[cfg(test)]
mod tests {
    use deseva_core::SourceKind;

    use super::*;

    #[test]
    fn media_type_is_guessed_from_extension() {
        assert_eq!(
            source_file(Path::new("answers/scan.PNG"), None).kind(),
            SourceKind::Image
        );
        assert_eq!(
            source_file(Path::new("answer.pdf"), None).media_type.as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            source_file(Path::new("marks.csv"), None).kind(),
            SourceKind::Unsupported
        );
    }

    #[test]
    fn explicit_media_type_wins() {
        let file = source_file(Path::new("upload.bin"), Some("image/jpeg"));
        assert_eq!(file.name, "upload.bin");
        assert_eq!(file.media_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn cli_parses_extract_flags() {
        let cli = Cli::try_parse_from([
            "deseva",
            "extract",
            "a.pdf",
            "b.png",
            "--max-pages-for-ocr",
            "3",
            "--scale",
            "1.5",
            "--lang",
            "eng+hin",
            "--json-progress",
        ])
        .unwrap();
        match cli.command {
            Command::Extract {
                files,
                max_pages_for_ocr,
                scale,
                ocr,
                json_progress,
                ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(max_pages_for_ocr.map(NonZeroUsize::get), Some(3));
                assert_eq!(scale, Some(1.5));
                assert_eq!(ocr.lang.as_deref(), Some("eng+hin"));
                assert!(json_progress);
            }
            other => panic!("expected extract, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_zero_pages_and_bad_scale() {
        assert!(
            Cli::try_parse_from(["deseva", "extract", "a.pdf", "--max-pages-for-ocr", "0"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["deseva", "extract", "a.pdf", "--scale", "0"]).is_err());
        assert!(Cli::try_parse_from(["deseva", "extract"]).is_err());
    }
}
