//! PDF rasterisation: render page chunks to PNG files.
//!
//! Two interchangeable backends implement [`Renderer`]:
//!
//! * [`PdfiumRenderer`] — in-process via `pdfium-render`. The pdfium C++
//!   library uses thread-local state and is not safe to call from async
//!   contexts, so all work runs inside `tokio::task::spawn_blocking`.
//! * [`PopplerRenderer`] — the `pdftoppm` / `pdfinfo` command-line tools.
//!   A non-zero exit is reported with the tool's stderr verbatim.
//!
//! Either way every page of a chunk becomes one PNG named
//! `{source_stem}_p{NNNN}.png` (1-indexed), so the transcription stage can
//! recover page numbers, and therefore page parity, from file names.

use crate::batch::{UnitOfWork, WorkOutput};
use crate::config::{BatchConfig, RendererBackend};
use crate::error::{ItemError, ScribeError};
use crate::range::PageRange;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Page images are rendered at `dpi / PDF_POINTS_PER_INCH` pixels per point.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Options for one render call.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    /// Cap on the longest edge in pixels.
    pub max_pixels: Option<u32>,
    pub output_dir: PathBuf,
    pub password: Option<String>,
}

impl RenderOptions {
    /// Options for `source` taken from `config`; images go to
    /// `config.image_dir`, or next to the source.
    pub fn from_config(config: &BatchConfig, source: &Path) -> Self {
        let output_dir = config.image_dir.clone().unwrap_or_else(|| {
            source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        });
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            output_dir,
            password: config.password.clone(),
        }
    }

    /// Output file for a zero-indexed page of `source`.
    pub fn image_path(&self, source: &Path, page_index: usize) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".to_string());
        self.output_dir
            .join(format!("{stem}_p{:04}.png", page_index + 1))
    }
}

/// A rasteriser for PDF page ranges.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of pages in the document.
    async fn count_pages(&self, source: &Path, password: Option<&str>)
        -> Result<usize, ScribeError>;

    /// Render every page of `range` and return the written files in page order.
    async fn render(
        &self,
        source: &Path,
        range: PageRange,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, ItemError>;
}

/// The renderer for a configured backend.
pub fn renderer_for(backend: RendererBackend) -> Arc<dyn Renderer> {
    match backend {
        RendererBackend::Pdfium => Arc::new(PdfiumRenderer),
        RendererBackend::Poppler => Arc::new(PopplerRenderer::default()),
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────────

/// In-process renderer backed by pdfium.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

/// Bind pdfium: `PDFIUM_LIB_PATH` if set, else a library in the working
/// directory, else the system library.
pub fn bind_pdfium() -> Result<Pdfium, ScribeError> {
    let bindings = if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        Pdfium::bind_to_library(&path)
            .map_err(|e| ScribeError::PdfiumBindingFailed(format!("{path}: {e:?}")))?
    } else {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| ScribeError::PdfiumBindingFailed(format!("{e:?}")))?
    };
    Ok(Pdfium::new(bindings))
}

fn open_error(path: &Path, password: Option<&str>, e: PdfiumError) -> ScribeError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            ScribeError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            ScribeError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        ScribeError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn count_pages_blocking(path: &Path, password: Option<&str>) -> Result<usize, ScribeError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| open_error(path, password, e))?;
    Ok(document.pages().len() as usize)
}

fn render_blocking(
    source: &Path,
    range: PageRange,
    options: &RenderOptions,
) -> Result<Vec<PathBuf>, ItemError> {
    let item = range.to_string();
    let pdfium = bind_pdfium().map_err(|e| ItemError::external(&item, e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(source, options.password.as_deref())
        .map_err(|e| {
            ItemError::external(&item, open_error(source, options.password.as_deref(), e).to_string())
        })?;

    let mut render_config =
        PdfRenderConfig::new().scale_page_by_factor(options.dpi as f32 / PDF_POINTS_PER_INCH);
    if let Some(px) = options.max_pixels {
        render_config = render_config
            .set_maximum_width(px as i32)
            .set_maximum_height(px as i32);
    }

    std::fs::create_dir_all(&options.output_dir)
        .map_err(|e| ItemError::persistence(&options.output_dir, e))?;

    let pages = document.pages();
    let mut written = Vec::with_capacity(range.page_count());

    for idx in range.pages() {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ItemError::external(&item, format!("page {}: {:?}", idx + 1, e)))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ItemError::external(&item, format!("page {}: {:?}", idx + 1, e)))?;

        let image = bitmap.as_image();
        let path = options.image_path(source, idx);
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| ItemError::persistence(&path, e))?;

        debug!(
            "Rendered page {} → {}x{} px → {}",
            idx + 1,
            image.width(),
            image.height(),
            path.display()
        );
        written.push(path);
    }

    Ok(written)
}

#[async_trait]
impl Renderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn count_pages(
        &self,
        source: &Path,
        password: Option<&str>,
    ) -> Result<usize, ScribeError> {
        let path = source.to_path_buf();
        let pwd = password.map(str::to_string);
        tokio::task::spawn_blocking(move || count_pages_blocking(&path, pwd.as_deref()))
            .await
            .map_err(|e| ScribeError::Internal(format!("Page-count task panicked: {}", e)))?
    }

    async fn render(
        &self,
        source: &Path,
        range: PageRange,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, ItemError> {
        let path = source.to_path_buf();
        let opts = options.clone();
        tokio::task::spawn_blocking(move || render_blocking(&path, range, &opts))
            .await
            .map_err(|e| ItemError::external(range.to_string(), format!("render task panicked: {e}")))?
    }
}

// ── poppler ──────────────────────────────────────────────────────────────────

/// Renderer that shells out to poppler's `pdftoppm` and `pdfinfo`.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    pub pdftoppm: PathBuf,
    pub pdfinfo: PathBuf,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            pdfinfo: PathBuf::from("pdfinfo"),
        }
    }
}

/// The tool's own diagnostic text, or its exit status when it printed none.
fn diagnostic(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

/// Extract the page count from `pdfinfo` output.
pub fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    stdout.lines().find_map(|line| {
        line.strip_prefix("Pages:")
            .and_then(|rest| rest.trim().parse().ok())
    })
}

#[async_trait]
impl Renderer for PopplerRenderer {
    fn name(&self) -> &'static str {
        "poppler"
    }

    async fn count_pages(
        &self,
        source: &Path,
        password: Option<&str>,
    ) -> Result<usize, ScribeError> {
        let mut cmd = Command::new(&self.pdfinfo);
        if let Some(pwd) = password {
            cmd.arg("-upw").arg(pwd);
        }
        let output = cmd.arg(source).output().await.map_err(|e| {
            ScribeError::PageCountFailed {
                path: source.to_path_buf(),
                detail: format!("could not run {}: {e}", self.pdfinfo.display()),
            }
        })?;

        if !output.status.success() {
            return Err(ScribeError::PageCountFailed {
                path: source.to_path_buf(),
                detail: diagnostic(&output),
            });
        }

        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            ScribeError::PageCountFailed {
                path: source.to_path_buf(),
                detail: "pdfinfo printed no 'Pages:' line".into(),
            }
        })
    }

    async fn render(
        &self,
        source: &Path,
        range: PageRange,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, ItemError> {
        let item = range.to_string();
        tokio::fs::create_dir_all(&options.output_dir)
            .await
            .map_err(|e| ItemError::persistence(&options.output_dir, e))?;

        let mut written = Vec::with_capacity(range.page_count());
        for idx in range.pages() {
            let page = (idx + 1).to_string();
            let path = options.image_path(source, idx);
            // -singlefile appends ".png" to the prefix.
            let prefix = path.with_extension("");

            let mut cmd = Command::new(&self.pdftoppm);
            cmd.arg("-png")
                .arg("-singlefile")
                .arg("-r")
                .arg(options.dpi.to_string())
                .arg("-f")
                .arg(&page)
                .arg("-l")
                .arg(&page);
            if let Some(px) = options.max_pixels {
                cmd.arg("-scale-to").arg(px.to_string());
            }
            if let Some(ref pwd) = options.password {
                cmd.arg("-upw").arg(pwd);
            }
            cmd.arg(source).arg(&prefix);

            let output = cmd.output().await.map_err(|e| {
                ItemError::external(&item, format!("could not run {}: {e}", self.pdftoppm.display()))
            })?;
            if !output.status.success() {
                return Err(ItemError::external(&item, diagnostic(&output)));
            }

            debug!("Rendered page {} → {}", page, path.display());
            written.push(path);
        }

        Ok(written)
    }
}

// ── Unit of work ─────────────────────────────────────────────────────────────

/// Render stage: one item per chunk of pages.
pub struct RenderChunks {
    renderer: Arc<dyn Renderer>,
    source: PathBuf,
    options: RenderOptions,
}

impl RenderChunks {
    pub fn new(renderer: Arc<dyn Renderer>, source: impl Into<PathBuf>, options: RenderOptions) -> Self {
        let source = source.into();
        info!(
            "Rendering {} with {} at {} DPI into {}",
            source.display(),
            renderer.name(),
            options.dpi,
            options.output_dir.display()
        );
        Self {
            renderer,
            source,
            options,
        }
    }
}

#[async_trait]
impl UnitOfWork for RenderChunks {
    type Item = PageRange;

    fn item_kind(&self) -> &'static str {
        "page chunks"
    }

    fn label(&self, item: &PageRange) -> String {
        item.to_string()
    }

    async fn invoke(&self, item: &PageRange) -> Result<WorkOutput, ItemError> {
        let files = self.renderer.render(&self.source, *item, &self.options).await?;
        Ok(WorkOutput::Images(files))
    }
}
