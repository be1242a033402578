//! VLM interaction: send one page image and its instruction, get text back.
//!
//! Intentionally thin. Prompt text lives in [`crate::prompts`], and the
//! decision about what to do when a call fails belongs to the batch runner,
//! so this module neither retries nor times out on its own: a failed call is
//! reported once, with the provider's message, and the operator decides.

use crate::batch::{Transcript, UnitOfWork, WorkOutput};
use crate::config::BatchConfig;
use crate::error::ItemError;
use crate::pipeline::encode::encode_file;
use crate::prompts::{page_number_from_path, InstructionPolicy, DEFAULT_SYSTEM_PROMPT};
use crate::usage::UsageRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Text and token usage returned for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub usage: UsageRecord,
}

/// A vision model that turns a page image into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe `image`, following `instruction`. `label` names the item in
    /// error messages.
    async fn recognize(
        &self,
        label: &str,
        image: ImageData,
        instruction: &str,
    ) -> Result<Recognition, ItemError>;
}

/// [`Recognizer`] backed by an `edgequake-llm` provider.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

/// Build `CompletionOptions` from the batch config.
fn build_options(config: &BatchConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl Recognizer for VisionRecognizer {
    /// The request is a system message followed by one user message carrying
    /// the instruction and the image.
    async fn recognize(
        &self,
        label: &str,
        image: ImageData,
        instruction: &str,
    ) -> Result<Recognition, ItemError> {
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images(instruction, vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ItemError::external(label, e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            label, response.prompt_tokens, response.completion_tokens
        );

        Ok(Recognition {
            text: response.content,
            usage: UsageRecord::new(
                response.prompt_tokens as u64,
                response.completion_tokens as u64,
            ),
        })
    }
}

// ── Unit of work ─────────────────────────────────────────────────────────────

/// One image queued for transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub path: PathBuf,
    /// 1-indexed page number used to pick the instruction.
    pub page_number: usize,
}

impl PageImage {
    /// Page numbers come from the trailing digits of each file stem
    /// (`book_p0012.png` → 12), falling back to the 1-based list position.
    pub fn from_paths(paths: Vec<PathBuf>) -> Vec<PageImage> {
        paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let page_number = page_number_from_path(&path).unwrap_or(i + 1);
                PageImage { path, page_number }
            })
            .collect()
    }
}

/// Transcription stage: one item per page image, one artifact per item.
pub struct TranscribeImages {
    recognizer: Arc<dyn Recognizer>,
    instructions: InstructionPolicy,
    output_dir: Option<PathBuf>,
}

impl TranscribeImages {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        instructions: InstructionPolicy,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            recognizer,
            instructions,
            output_dir,
        }
    }

    /// `{output_dir}/{image_stem}.md`, or next to the image.
    pub fn artifact_path(&self, image: &Path) -> PathBuf {
        let file_name = image
            .file_stem()
            .map(|s| format!("{}.md", s.to_string_lossy()))
            .unwrap_or_else(|| "page.md".to_string());
        match self.output_dir {
            Some(ref dir) => dir.join(file_name),
            None => image.with_file_name(file_name),
        }
    }
}

#[async_trait]
impl UnitOfWork for TranscribeImages {
    type Item = PageImage;

    fn item_kind(&self) -> &'static str {
        "page images"
    }

    fn label(&self, item: &PageImage) -> String {
        item.path.display().to_string()
    }

    async fn invoke(&self, item: &PageImage) -> Result<WorkOutput, ItemError> {
        let image = encode_file(&item.path)
            .await
            .map_err(|e| ItemError::persistence(&item.path, e))?;
        let instruction = self.instructions.instruction_for(item.page_number);
        let label = self.label(item);

        let recognition = self.recognizer.recognize(&label, image, instruction).await?;

        Ok(WorkOutput::Transcript(Transcript {
            source_path: item.path.clone(),
            output_path: self.artifact_path(&item.path),
            text: recognition.text,
            usage: recognition.usage,
        }))
    }
}
