//! Document Rasterizer: page 1 of a PDF → one PNG.
//!
//! The rendering engine is owned by a [`PageRenderer`] that is constructed
//! once (binding pdfium is the expensive part) and shared through an `Arc`
//! by every submission. If binding fails, no [`Rasterizer`] exists at all;
//! an engine that breaks later reports [`RasterError::EngineInit`], which the
//! orchestrator surfaces as a fatal, non-retryable failure.
//!
//! Rendering runs under `spawn_blocking`: the renderer call blocks until the
//! page is drawn, and that must not stall the Tokio worker threads.

use crate::config::ReviewConfig;
use crate::error::RasterError;
use crate::pipeline::encode;
use crate::pipeline::input::SourceDocument;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::{mpsc, Arc};
use tracing::{debug, info};

/// Renders the first page of an in-memory PDF.
pub trait PageRenderer: Send + Sync {
    /// `scale` multiplies the page's natural size; `max_pixels` caps either edge.
    fn render_first_page(
        &self,
        bytes: &[u8],
        scale: f32,
        max_pixels: u32,
    ) -> Result<DynamicImage, RasterError>;
}

/// [`PageRenderer`] backed by pdfium.
///
/// The bound library lives on a dedicated worker thread for its whole
/// lifetime; render requests are sent to it over a channel. Construction
/// blocks until the worker has either bound pdfium or failed to, so a
/// successfully built renderer is always usable. Dropping the renderer
/// stops the worker.
pub struct PdfiumRenderer {
    jobs: mpsc::Sender<RenderJob>,
}

struct RenderJob {
    bytes: Vec<u8>,
    scale: f32,
    max_pixels: u32,
    reply: mpsc::Sender<Result<DynamicImage, RasterError>>,
}

impl PdfiumRenderer {
    /// Bind pdfium, downloading and caching the library on first use.
    pub fn bind() -> Result<Self, RasterError> {
        Self::bind_with_progress(None)
    }

    /// Like [`PdfiumRenderer::bind`], reporting `(downloaded, total)` bytes
    /// if the library has to be fetched.
    pub fn bind_with_progress(
        on_progress: Option<&dyn Fn(u64, Option<u64>)>,
    ) -> Result<Self, RasterError> {
        let path = pdfium_auto::ensure_pdfium_library(on_progress)
            .map_err(|e| RasterError::EngineInit(e.to_string()))?;
        Self::from_library(&path)
    }

    /// Bind an explicit pdfium library file.
    pub fn from_library(path: &Path) -> Result<Self, RasterError> {
        let path = path.to_path_buf();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);
        let (jobs_tx, jobs_rx) = mpsc::channel::<RenderJob>();

        std::thread::Builder::new()
            .name("pdfium".into())
            .spawn(move || {
                let pdfium = match pdfium_auto::bind_pdfium_from_path(&path) {
                    Ok(pdfium) => {
                        let _ = ready_tx.send(Ok(()));
                        pdfium
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                for job in jobs_rx {
                    let result = render_page_one(&pdfium, &job.bytes, job.scale, job.max_pixels);
                    let _ = job.reply.send(result);
                }
                debug!("pdfium worker stopped");
            })
            .map_err(|e| RasterError::EngineInit(format!("cannot start pdfium worker: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("pdfium bound");
                Ok(Self { jobs: jobs_tx })
            }
            Ok(Err(reason)) => Err(RasterError::EngineInit(reason)),
            Err(_) => Err(RasterError::EngineInit(
                "pdfium worker exited during startup".into(),
            )),
        }
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_first_page(
        &self,
        bytes: &[u8],
        scale: f32,
        max_pixels: u32,
    ) -> Result<DynamicImage, RasterError> {
        let (reply, result) = mpsc::channel();
        self.jobs
            .send(RenderJob {
                bytes: bytes.to_vec(),
                scale,
                max_pixels,
                reply,
            })
            .map_err(|_| RasterError::EngineInit("pdfium worker is not running".into()))?;
        result
            .recv()
            .map_err(|_| RasterError::EngineInit("pdfium worker stopped mid-render".into()))?
    }
}

fn render_page_one(
    pdfium: &Pdfium,
    bytes: &[u8],
    scale: f32,
    max_pixels: u32,
) -> Result<DynamicImage, RasterError> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| RasterError::MalformedDocument(format!("{:?}", e)))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(RasterError::MalformedDocument("document has no pages".into()));
    }
    debug!("PDF loaded: {} pages, rendering page 1", pages.len());

    let page = pages
        .get(0)
        .map_err(|e| RasterError::MalformedDocument(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RasterError::MalformedDocument(format!("{:?}", e)))?;

    Ok(bitmap.as_image())
}

/// Output of [`Rasterizer::rasterize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterResult {
    /// PNG-encoded page 1.
    pub image_bytes: Vec<u8>,
    /// Source name with its extension replaced by `.png`.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Validates documents and turns page 1 into a PNG.
#[derive(Clone)]
pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
    max_document_bytes: u64,
    scale: f32,
    max_pixels: u32,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: &ReviewConfig) -> Self {
        Self {
            renderer,
            max_document_bytes: config.max_document_bytes,
            scale: config.render_scale,
            max_pixels: config.max_rendered_pixels,
        }
    }

    /// Bind pdfium now and build a rasterizer around it.
    pub fn with_pdfium(config: &ReviewConfig) -> Result<Self, RasterError> {
        Ok(Self::new(Arc::new(PdfiumRenderer::bind()?), config))
    }

    pub fn max_document_bytes(&self) -> u64 {
        self.max_document_bytes
    }

    /// Type and size checks. Cheap; never touches the renderer.
    pub fn validate(&self, document: &SourceDocument) -> Result<(), RasterError> {
        let declared_pdf = document
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("pdf"))
            || document.name.to_ascii_lowercase().ends_with(".pdf");
        if !declared_pdf {
            return Err(RasterError::UnsupportedType {
                detail: format!("'{}' is not a PDF", document.name),
            });
        }

        if document.size() > self.max_document_bytes {
            return Err(RasterError::TooLarge {
                size: document.size(),
                max: self.max_document_bytes,
            });
        }

        if !document.bytes.starts_with(b"%PDF") {
            return Err(RasterError::UnsupportedType {
                detail: "missing %PDF header".into(),
            });
        }

        Ok(())
    }

    /// Render page 1 of `document` to PNG.
    pub async fn rasterize(&self, document: &SourceDocument) -> Result<RasterResult, RasterError> {
        self.validate(document)?;

        let renderer = Arc::clone(&self.renderer);
        let bytes = document.bytes.clone();
        let (scale, max_pixels) = (self.scale, self.max_pixels);

        let image = tokio::task::spawn_blocking(move || {
            renderer.render_first_page(&bytes, scale, max_pixels)
        })
        .await
        .map_err(|e| RasterError::MalformedDocument(format!("render task panicked: {}", e)))??;

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyCanvas { width, height });
        }

        let image_bytes =
            encode::encode_png(&image).map_err(|e| RasterError::Encode(e.to_string()))?;
        let file_name = raster_file_name(&document.name);
        info!(
            "Rasterised '{}' → '{}' ({}x{} px, {} bytes)",
            document.name,
            file_name,
            width,
            height,
            image_bytes.len()
        );

        Ok(RasterResult {
            image_bytes,
            file_name,
            width,
            height,
        })
    }
}

/// `cv.pdf` → `cv.png`, `cv.PDF` → `cv.png`, `resume` → `resume.png`.
pub fn raster_file_name(source_name: &str) -> String {
    let file = Path::new(source_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match file.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file.as_str(),
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{stem}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenderer {
        calls: AtomicUsize,
        size: (u32, u32),
    }

    impl PageRenderer for CountingRenderer {
        fn render_first_page(
            &self,
            _bytes: &[u8],
            _scale: f32,
            _max_pixels: u32,
        ) -> Result<DynamicImage, RasterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                self.size.0,
                self.size.1,
                Rgba([255, 255, 255, 255]),
            )))
        }
    }

    fn rasterizer(size: (u32, u32), max_bytes: u64) -> (Rasterizer, Arc<CountingRenderer>) {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
            size,
        });
        let config = ReviewConfig::builder()
            .max_document_bytes(max_bytes)
            .build()
            .unwrap();
        (Rasterizer::new(renderer.clone(), &config), renderer)
    }

    fn pdf(name: &str, len: usize) -> SourceDocument {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(len.max(bytes.len()), b' ');
        SourceDocument::new(name, bytes)
    }

    #[test]
    fn file_name_replaces_extension() {
        assert_eq!(raster_file_name("cv.pdf"), "cv.png");
        assert_eq!(raster_file_name("Jane Doe.PDF"), "Jane Doe.png");
        assert_eq!(raster_file_name("my.resume.pdf"), "my.resume.png");
        assert_eq!(raster_file_name("resume"), "resume.png");
        assert_eq!(raster_file_name(".pdf"), "document.png");
        assert_eq!(raster_file_name("dir/cv.pdf"), "cv.png");
    }

    #[tokio::test]
    async fn renders_one_png_with_derived_name() {
        let (r, renderer) = rasterizer((120, 160), 1024);
        let out = r.rasterize(&pdf("cv.pdf", 64)).await.unwrap();
        assert_eq!(out.file_name, "cv.png");
        assert_eq!((out.width, out.height), (120, 160));
        assert_eq!(encode::sniff_image_mime(&out.image_bytes), Some("image/png"));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_document_is_rejected_without_rendering() {
        let (r, renderer) = rasterizer((10, 10), 100);
        let err = r.rasterize(&pdf("cv.pdf", 101)).await.unwrap_err();
        assert_eq!(err.code(), "too-large");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected_without_rendering() {
        let (r, renderer) = rasterizer((10, 10), 1024);
        let err = r.rasterize(&pdf("cv.docx", 20)).await.unwrap_err();
        assert_eq!(err.code(), "unsupported-type");

        let fake = SourceDocument::new("cv.pdf", b"PK\x03\x04 zip".to_vec());
        assert_eq!(r.rasterize(&fake).await.unwrap_err().code(), "unsupported-type");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn content_type_admits_pdf_without_extension() {
        let (r, _) = rasterizer((10, 10), 1024);
        let doc = pdf("upload", 20).with_content_type("application/pdf");
        assert_eq!(r.rasterize(&doc).await.unwrap().file_name, "upload.png");
    }

    #[tokio::test]
    async fn empty_canvas_is_reported() {
        let (r, _) = rasterizer((0, 10), 1024);
        let err = r.rasterize(&pdf("cv.pdf", 20)).await.unwrap_err();
        assert_eq!(err.code(), "empty-canvas");
    }
}
