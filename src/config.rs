//! Configuration types for rendering and transcription runs.
//!
//! All run behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One struct for both stages keeps the CLI mapping
//! trivial and lets a library caller reuse one config for a whole job.

use crate::artifact::ArtifactWriter;
use crate::batch::{AlwaysAbort, BatchRunner, FailureDecision};
use crate::error::ScribeError;
use crate::progress::ProgressCallback;
use crate::prompts::InstructionPolicy;
use crate::usage::UsageRates;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Lowest accepted rendering resolution.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering resolution.
pub const MAX_DPI: u32 = 600;

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a render or transcription run.
///
/// # Example
/// ```rust
/// use pagescribe::{BatchConfig, RendererBackend};
///
/// let config = BatchConfig::builder()
///     .dpi(300)
///     .renderer(RendererBackend::Poppler)
///     .model("gpt-4.1-mini")
///     .rates(0.40, 1.60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    // ── Rendering ────────────────────────────────────────────────────────
    /// Rendering resolution in dots per inch. Range: 72–600. Default: 300.
    ///
    /// Scans of small print transcribe noticeably better at 300 DPI than at
    /// screen resolutions; above 400 the images mostly grow without helping.
    pub dpi: u32,

    /// Optional cap on the longest edge of a rendered page, in pixels.
    pub max_rendered_pixels: Option<u32>,

    /// Which rasteriser produces the page images. Default: pdfium.
    pub renderer: RendererBackend,

    /// Directory for page images. `None` writes next to the source document.
    pub image_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Recognition ──────────────────────────────────────────────────────
    /// LLM model identifier. `None` uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (transcription wants no creativity).
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Custom system prompt. `None` uses the built-in transcriber prompt.
    pub system_prompt: Option<String>,

    /// Per-page instruction policy. Default: mirrored margins by parity.
    pub instructions: InstructionPolicy,

    /// Token prices used for cost estimates.
    pub rates: UsageRates,

    // ── Artifacts ────────────────────────────────────────────────────────
    /// Directory for transcript artifacts. `None` writes next to each image.
    pub output_dir: Option<PathBuf>,

    /// Refuse to replace an existing artifact. Default: true.
    ///
    /// Artifacts may carry human corrections (`manually_edited: true`), so
    /// replacing them has to be asked for explicitly.
    pub fail_if_exists: bool,

    // ── Run control ──────────────────────────────────────────────────────
    /// What to do when an item fails. Default: abort.
    pub on_failure: Arc<dyn FailureDecision>,

    /// Observer for per-item events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: None,
            renderer: RendererBackend::default(),
            image_dir: None,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            instructions: InstructionPolicy::default(),
            rates: UsageRates::default(),
            output_dir: None,
            fail_if_exists: true,
            on_failure: Arc::new(AlwaysAbort),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("renderer", &self.renderer)
            .field("image_dir", &self.image_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("instructions", &self.instructions)
            .field("rates", &self.rates)
            .field("output_dir", &self.output_dir)
            .field("fail_if_exists", &self.fail_if_exists)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// A batch runner wired with this config's writer, rates, failure policy
    /// and progress observer.
    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(Arc::clone(&self.on_failure))
            .with_writer(ArtifactWriter::new(self.fail_if_exists))
            .with_rates(self.rates)
            .with_progress(self.progress_callback.clone())
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl fmt::Debug for BatchConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = Some(px.max(100));
        self
    }

    pub fn renderer(mut self, backend: RendererBackend) -> Self {
        self.config.renderer = backend;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn instructions(mut self, policy: InstructionPolicy) -> Self {
        self.config.instructions = policy;
        self
    }

    /// Prices in USD per million input / output tokens.
    pub fn rates(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.config.rates = UsageRates::new(input_per_million, output_per_million);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn fail_if_exists(mut self, v: bool) -> Self {
        self.config.fail_if_exists = v;
        self
    }

    pub fn on_failure(mut self, decision: Arc<dyn FailureDecision>) -> Self {
        self.config.on_failure = decision;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, ScribeError> {
        let c = &self.config;
        if c.dpi < MIN_DPI || c.dpi > MAX_DPI {
            return Err(ScribeError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(ScribeError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        let rates_ok = |r: f64| r.is_finite() && r >= 0.0;
        if !rates_ok(c.rates.input_per_million) || !rates_ok(c.rates.output_per_million) {
            return Err(ScribeError::InvalidConfig(format!(
                "token rates must be finite and non-negative, got {:?}",
                c.rates
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which rasteriser turns PDF pages into images.
///
/// | Backend | Needs | Notes |
/// |---------|-------|-------|
/// | `Pdfium` | libpdfium (`PDFIUM_LIB_PATH`, working dir, or system) | In-process, no subprocesses |
/// | `Poppler` | `pdftoppm` and `pdfinfo` on `PATH` | External process; its stderr is reported verbatim |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererBackend {
    #[default]
    Pdfium,
    Poppler,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BatchConfig::default();
        assert_eq!(c.dpi, 300);
        assert!(c.fail_if_exists);
        assert_eq!(c.renderer, RendererBackend::Pdfium);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(c.rates, UsageRates::default());
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = BatchConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(c.dpi, MAX_DPI);
        let c = BatchConfig::builder().dpi(1).build().unwrap();
        assert_eq!(c.dpi, MIN_DPI);
    }

    #[test]
    fn builder_rejects_negative_rates() {
        let err = BatchConfig::builder().rates(-1.0, 0.4).build().unwrap_err();
        assert!(err.to_string().contains("rates"));
        assert!(BatchConfig::builder().rates(f64::NAN, 0.4).build().is_err());
    }

    #[test]
    fn builder_rejects_zero_max_tokens() {
        assert!(BatchConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let c = BatchConfig::builder().model("gpt-4.1").build().unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("gpt-4.1"));
    }
}
