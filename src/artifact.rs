//! Transcript artifacts: a provenance header followed by the transcribed text.
//!
//! ## File format
//!
//! ```text
//! ---
//! source_path: "scans/book_p0012.png"
//! input_tokens: 1532
//! output_tokens: 811
//! elapsed_seconds: 4.207
//! estimated_cost_usd: 0.0004776
//! manually_edited: false
//! ---
//!
//! <transcribed text>
//! ```
//!
//! Reviewers and downstream aggregators read these files, so the key names
//! and their order are a compatibility contract. The pipeline always writes
//! `manually_edited: false`; humans flip it when they correct a transcript.
//!
//! Numbers are written with Rust's shortest round-trip float formatting, so
//! [`parse_artifact`] recovers exactly the values that were written.

use crate::error::{ItemError, ScribeError};
use crate::usage::UsageRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Marker line opening and closing the header block.
pub const HEADER_MARKER: &str = "---";

const KEY_SOURCE_PATH: &str = "source_path";
const KEY_INPUT_TOKENS: &str = "input_tokens";
const KEY_OUTPUT_TOKENS: &str = "output_tokens";
const KEY_ELAPSED_SECONDS: &str = "elapsed_seconds";
const KEY_ESTIMATED_COST_USD: &str = "estimated_cost_usd";
const KEY_MANUALLY_EDITED: &str = "manually_edited";

/// Provenance metadata written once at the top of every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub source_path: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub estimated_cost_usd: f64,
    pub manually_edited: bool,
}

impl ArtifactHeader {
    /// Header for a freshly produced transcript. `elapsed` is kept at
    /// millisecond precision.
    pub fn new(source: &Path, usage: UsageRecord, elapsed: Duration, cost_usd: f64) -> Self {
        Self {
            source_path: source.to_string_lossy().into_owned(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            elapsed_seconds: elapsed.as_millis() as f64 / 1000.0,
            estimated_cost_usd: cost_usd,
            manually_edited: false,
        }
    }
}

/// A parsed artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub header: ArtifactHeader,
    pub body: String,
}

// ── Body normalisation ───────────────────────────────────────────────────────

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*$").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[ \t]*$").unwrap());

/// Clean the raw text returned by the recognition service.
///
/// Vision models sometimes wrap their whole answer in a ```` ```text ```` (or
/// ```` ```markdown ````) fence despite being told not to. The outer fence is
/// removed, including a dangling opener whose closer was cut off by the token
/// limit. Line endings become `\n` and surrounding whitespace is trimmed.
/// Fenced blocks that do not wrap the whole answer are left alone.
pub fn normalize_body(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = text.trim().lines().collect();

    if lines.first().is_some_and(|l| RE_FENCE_OPEN.is_match(l.trim_end())) {
        lines.remove(0);
        if lines.last().is_some_and(|l| RE_FENCE_CLOSE.is_match(l.trim())) {
            lines.pop();
        }
    }

    lines.join("\n").trim().to_string()
}

// ── Serialisation ────────────────────────────────────────────────────────────

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unescape_value(raw: &str) -> Result<String, ScribeError> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| {
            ScribeError::InvalidArtifact(format!("{KEY_SOURCE_PATH} must be a quoted string, got {raw}"))
        })?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            other => {
                return Err(ScribeError::InvalidArtifact(format!(
                    "unknown escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Serialise a header and body into the artifact file format.
///
/// The body is normalised with [`normalize_body`] first.
pub fn render_artifact(header: &ArtifactHeader, body: &str) -> String {
    format!(
        "{HEADER_MARKER}\n\
         {KEY_SOURCE_PATH}: {}\n\
         {KEY_INPUT_TOKENS}: {}\n\
         {KEY_OUTPUT_TOKENS}: {}\n\
         {KEY_ELAPSED_SECONDS}: {}\n\
         {KEY_ESTIMATED_COST_USD}: {}\n\
         {KEY_MANUALLY_EDITED}: {}\n\
         {HEADER_MARKER}\n\
         \n\
         {}\n",
        escape_value(&header.source_path),
        header.input_tokens,
        header.output_tokens,
        header.elapsed_seconds,
        header.estimated_cost_usd,
        header.manually_edited,
        normalize_body(body),
    )
}

/// Parse an artifact back into its header and body.
///
/// Keys may appear in any order (editors sometimes reorder them) but all six
/// must be present. Unknown keys are ignored.
pub fn parse_artifact(text: &str) -> Result<Artifact, ScribeError> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let mut lines = text.split('\n');

    match lines.next() {
        Some(l) if l.trim_end() == HEADER_MARKER => {}
        _ => {
            return Err(ScribeError::InvalidArtifact(
                "missing opening '---' marker".into(),
            ))
        }
    }

    let mut source_path = None;
    let mut input_tokens = None;
    let mut output_tokens = None;
    let mut elapsed_seconds = None;
    let mut estimated_cost_usd = None;
    let mut manually_edited = None;
    let mut closed = false;

    for line in lines.by_ref() {
        let line = line.trim_end_matches('\r');
        if line.trim_end() == HEADER_MARKER {
            closed = true;
            break;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            ScribeError::InvalidArtifact(format!("header line is not 'key: value': {line:?}"))
        })?;
        let value = value.trim();
        let bad = |what: &str| ScribeError::InvalidArtifact(format!("{key}: {what}: {value:?}"));

        match key.trim() {
            KEY_SOURCE_PATH => source_path = Some(unescape_value(value)?),
            KEY_INPUT_TOKENS => {
                input_tokens = Some(value.parse::<u64>().map_err(|_| bad("not a token count"))?)
            }
            KEY_OUTPUT_TOKENS => {
                output_tokens = Some(value.parse::<u64>().map_err(|_| bad("not a token count"))?)
            }
            KEY_ELAPSED_SECONDS => {
                elapsed_seconds = Some(value.parse::<f64>().map_err(|_| bad("not a number"))?)
            }
            KEY_ESTIMATED_COST_USD => {
                estimated_cost_usd = Some(value.parse::<f64>().map_err(|_| bad("not a number"))?)
            }
            KEY_MANUALLY_EDITED => {
                manually_edited = Some(value.parse::<bool>().map_err(|_| bad("not a boolean"))?)
            }
            other => debug!("Ignoring unknown artifact header key {other:?}"),
        }
    }

    if !closed {
        return Err(ScribeError::InvalidArtifact(
            "missing closing '---' marker".into(),
        ));
    }

    let missing = |key: &str| ScribeError::InvalidArtifact(format!("missing header key {key}"));
    let header = ArtifactHeader {
        source_path: source_path.ok_or_else(|| missing(KEY_SOURCE_PATH))?,
        input_tokens: input_tokens.ok_or_else(|| missing(KEY_INPUT_TOKENS))?,
        output_tokens: output_tokens.ok_or_else(|| missing(KEY_OUTPUT_TOKENS))?,
        elapsed_seconds: elapsed_seconds.ok_or_else(|| missing(KEY_ELAPSED_SECONDS))?,
        estimated_cost_usd: estimated_cost_usd.ok_or_else(|| missing(KEY_ESTIMATED_COST_USD))?,
        manually_edited: manually_edited.ok_or_else(|| missing(KEY_MANUALLY_EDITED))?,
    };

    let rest: Vec<&str> = lines.collect();
    let body = rest.join("\n");
    let body = body.strip_prefix('\n').unwrap_or(&body);

    Ok(Artifact {
        header,
        body: body.trim_end().to_string(),
    })
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Persists artifacts to disk.
///
/// Contents always go to a `.tmp` sibling first, so a failed write never
/// leaves a partial artifact behind. With `fail_if_exists` (the default) the
/// temp file is then hard-linked into place, which refuses to replace an
/// existing file: it may carry human corrections. Otherwise it is renamed
/// over the target.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactWriter {
    fail_if_exists: bool,
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self {
            fail_if_exists: true,
        }
    }
}

impl ArtifactWriter {
    pub fn new(fail_if_exists: bool) -> Self {
        Self { fail_if_exists }
    }

    pub fn fail_if_exists(&self) -> bool {
        self.fail_if_exists
    }

    /// Write `header` + `body` to `path`, creating parent directories.
    pub async fn write(
        &self,
        path: &Path,
        header: &ArtifactHeader,
        body: &str,
    ) -> Result<PathBuf, ItemError> {
        let contents = render_artifact(header, body);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ItemError::persistence(parent, e))?;
        }

        if self.fail_if_exists && tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(already_exists(path));
        }

        let tmp_path = temp_path_for(path);
        let published = match tokio::fs::write(&tmp_path, contents.as_bytes()).await {
            Err(e) => Err(ItemError::persistence(&tmp_path, e)),
            Ok(()) if self.fail_if_exists => {
                tokio::fs::hard_link(&tmp_path, path)
                    .await
                    .map_err(|e| {
                        if e.kind() == std::io::ErrorKind::AlreadyExists {
                            already_exists(path)
                        } else {
                            ItemError::persistence(path, e)
                        }
                    })
            }
            Ok(()) => tokio::fs::rename(&tmp_path, path)
                .await
                .map_err(|e| ItemError::persistence(path, e)),
        };

        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", tmp_path.display(), e);
            }
        }
        published?;

        debug!("Wrote artifact {} ({} bytes)", path.display(), contents.len());
        Ok(path.to_path_buf())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}

fn already_exists(path: &Path) -> ItemError {
    ItemError::persistence(
        path,
        "artifact already exists (pass --overwrite to replace it)",
    )
}
