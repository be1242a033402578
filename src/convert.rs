//! Top-level entry points for the two stages.
//!
//! [`render_document`] turns a PDF page range into page images, one chunk of
//! pages per renderer call. [`transcribe_images`] turns page images into
//! provenance-tagged Markdown artifacts, one VLM call per image. Both end in
//! [`crate::batch::BatchRunner::run`], so ordering, usage accounting and the
//! continue/abort policy are identical.
//!
//! The `_with` variants take the external collaborator explicitly; the plain
//! variants build it from the [`BatchConfig`].

use crate::batch::BatchReport;
use crate::config::{BatchConfig, DEFAULT_MODEL};
use crate::error::ScribeError;
use crate::pipeline::input;
use crate::pipeline::recognize::{PageImage, Recognizer, TranscribeImages, VisionRecognizer};
use crate::pipeline::render::{renderer_for, RenderChunks, RenderOptions, Renderer};
use crate::plan::ChunkPlan;
use crate::range::PageRange;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Render pages `start..=end` (zero-indexed, inclusive) of `input` to PNG
/// page images with the configured backend.
///
/// Absent bounds mean "from the first page" and "through the last page".
///
/// # Errors
/// - Source problems (`FileNotFound`, `NotAPdf`, `PasswordRequired`, ...)
/// - [`ScribeError::InvalidRange`] before any page is rendered
/// - [`ScribeError::BatchAborted`] when the failure policy aborts
pub async fn render_document(
    input: impl AsRef<Path>,
    start: Option<i64>,
    end: Option<i64>,
    config: &BatchConfig,
) -> Result<BatchReport, ScribeError> {
    render_document_with(renderer_for(config.renderer), input, start, end, config).await
}

/// [`render_document`] with an explicit renderer.
pub async fn render_document_with(
    renderer: Arc<dyn Renderer>,
    input: impl AsRef<Path>,
    start: Option<i64>,
    end: Option<i64>,
    config: &BatchConfig,
) -> Result<BatchReport, ScribeError> {
    let source = input::resolve_document(input.as_ref())?;

    // ── Step 1: Resolve the range ────────────────────────────────────────
    let total_pages = renderer
        .count_pages(&source, config.password.as_deref())
        .await?;
    info!("{} has {} pages", source.display(), total_pages);
    let range = PageRange::resolve(start, end, total_pages)?;

    // ── Step 2: Plan chunks ──────────────────────────────────────────────
    let plan = ChunkPlan::for_range(range);
    info!(
        "Planned {} chunks of up to {} pages",
        plan.len(),
        plan.chunk_size()
    );

    // ── Step 3: Render chunk by chunk ────────────────────────────────────
    let options = RenderOptions::from_config(config, &source);
    let work = RenderChunks::new(renderer, source, options);
    config.runner().run(&work, plan.chunks()).await
}

/// Transcribe page images (files, or directories of images) to Markdown
/// artifacts with the configured vision provider.
///
/// # Errors
/// - [`ScribeError::FileNotFound`] for a path that does not exist
/// - [`ScribeError::ProviderNotConfigured`] when no provider can be built
/// - [`ScribeError::NoWork`] when no images were found
/// - [`ScribeError::BatchAborted`] when the failure policy aborts
pub async fn transcribe_images(
    paths: &[PathBuf],
    config: &BatchConfig,
) -> Result<BatchReport, ScribeError> {
    let images = input::collect_images(paths)?;
    if images.is_empty() {
        return Err(ScribeError::NoWork("no page images to process".into()));
    }
    let provider = resolve_provider(config).await?;
    info!(
        "Transcribing {} images with model {}",
        images.len(),
        config.model_or_default()
    );
    let recognizer = Arc::new(VisionRecognizer::new(provider, config));
    run_transcription(recognizer, images, config).await
}

/// [`transcribe_images`] with an explicit recognizer.
pub async fn transcribe_images_with(
    recognizer: Arc<dyn Recognizer>,
    paths: &[PathBuf],
    config: &BatchConfig,
) -> Result<BatchReport, ScribeError> {
    let images = input::collect_images(paths)?;
    run_transcription(recognizer, images, config).await
}

async fn run_transcription(
    recognizer: Arc<dyn Recognizer>,
    images: Vec<PathBuf>,
    config: &BatchConfig,
) -> Result<BatchReport, ScribeError> {
    let items = PageImage::from_paths(images);
    let work = TranscribeImages::new(
        recognizer,
        config.instructions.clone(),
        config.output_dir.clone(),
    );
    config.runner().run(&work, &items).await
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScribeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key (`OPENAI_API_KEY`, ...) from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before auto-detection so the model choice is honoured even
///    when several API keys are present.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, config.model.as_deref().unwrap_or(&model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", config.model.as_deref().unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScribeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
