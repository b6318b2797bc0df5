use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use deseva_core::{BackendError, BackendFuture, EncodedImage, OcrEngine};

/// Tesseract language used when none is configured.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
///
/// The image is piped through stdin and the recognized text read from stdout,
/// so no temporary files are written. Tesseract reports no intermediate
/// progress on the command line; callers see `0.0` when recognition starts and
/// `1.0` when it finishes.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    version: String,
}

impl TesseractOcr {
    /// Locate the tesseract binary and read its version.
    ///
    /// Fails with [`BackendError::Unavailable`] if the binary cannot be run.
    pub async fn probe(
        binary: impl Into<PathBuf>,
        language: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "could not run {}: {} (install tesseract-ocr or set the tesseract path)",
                    binary.display(),
                    e
                ))
            })?;

        // Tesseract 3 printed its version on stderr, later releases use stdout
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let version = parse_version(&stdout)
            .or_else(|| parse_version(&stderr))
            .ok_or_else(|| {
                BackendError::Unavailable(format!(
                    "{} does not look like tesseract",
                    binary.display()
                ))
            })?;

        let language = language.into();
        tracing::debug!(binary = %binary.display(), %version, %language, "found tesseract");
        Ok(Self {
            binary,
            language,
            version,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Extract the version from `tesseract --version` output ("tesseract 5.3.0").
fn parse_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("tesseract ")
            .map(|v| v.trim().trim_start_matches('v').to_string())
            .filter(|v| !v.is_empty())
    })
}

impl OcrEngine for TesseractOcr {
    fn recognize<'a>(
        &'a self,
        image: &'a EncodedImage,
        progress: &'a (dyn Fn(f32) + Send + Sync),
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            progress(0.0);

            let mut child = Command::new(&self.binary)
                .args(["stdin", "stdout", "-l", self.language.as_str()])
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| BackendError::OcrError("tesseract stdin unavailable".into()))?;
            let write = async move {
                stdin.write_all(&image.data).await?;
                stdin.shutdown().await
            };

            let (written, output) = tokio::join!(write, child.wait_with_output());
            let output = output?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(BackendError::OcrError(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            // A failed write only matters if tesseract did not already report it
            written?;

            // Tesseract ends each page with a form feed
            let text = String::from_utf8_lossy(&output.stdout).replace('\x0c', "");
            tracing::debug!(
                bytes = image.data.len(),
                chars = text.chars().count(),
                "tesseract finished"
            );

            progress(1.0);
            Ok(text)
        })
    }
}
