//! # PDF Exporter
//!
//! Reference [`Exporter`] that writes composed cards as a PDF 1.7 file, one
//! card per page, scaled to fit the page inside its margins.
//!
//! ```text
//! %PDF-1.7
//! 1 0 obj Catalog        3 0 obj Helvetica
//! 2 0 obj Pages          4 0 obj Helvetica-Bold
//! 5.. image XObjects, content stream + page object per page, then Info
//! xref / trailer / %%EOF
//! ```
//!
//! Element transforms are applied with a `cm` matrix: the element box is
//! scaled about its centre and moved by its offset, exactly like a CSS
//! `translate(..) scale(..)` with a centred origin. Image sources are
//! embedded once per document as XObjects and fitted inside their box;
//! a missing or undecodable source is drawn as a framed placeholder. QR
//! codes are drawn module by module.

use async_trait::async_trait;
use miniz_oxide::deflate::compress_to_vec_zlib;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use tracing::warn;

use crate::document::{paginate, BlockRole, Color, DocumentNode, NodeKind};
use crate::images::{load_image, ImagePixels, LoadedImage, RasterBudget};
use crate::layout::{Anchor, ElementKey, CARD_HEIGHT_PX, CARD_WIDTH_PX};
use crate::pipeline::{ExportFailure, Exporter};
use crate::print::ExportOptions;
use crate::transform::RenderTransform;

const FOOTER_STRIP_PX: f64 = 30.0;
const PLACEHOLDER_GRAY: Color = Color { r: 0.55, g: 0.55, b: 0.58 };
const FRAME_GRAY: Color = Color { r: 0.8, g: 0.8, b: 0.82 };
const FILL_GRAY: Color = Color { r: 0.94, g: 0.94, b: 0.95 };

#[derive(Debug, Clone)]
pub struct PdfExporter {
    compress: bool,
}

/// Card placement on one page: origin of the card's top-left corner in PDF
/// space and the px-to-pt factor.
#[derive(Debug, Clone, Copy)]
struct Placement {
    left: f64,
    top: f64,
    k: f64,
    page_height: f64,
}

impl Placement {
    fn fit(options: &ExportOptions) -> Self {
        let (page_w, page_h) = options.page_size_pt();
        let margin = options.margin_pt();
        let avail_w = (page_w - 2.0 * margin).max(1.0);
        let avail_h = (page_h - 2.0 * margin).max(1.0);
        let k = (avail_w / CARD_WIDTH_PX).min(avail_h / CARD_HEIGHT_PX);
        Self {
            left: (page_w - CARD_WIDTH_PX * k) / 2.0,
            top: (page_h - CARD_HEIGHT_PX * k) / 2.0,
            k,
            page_height: page_h,
        }
    }

    /// `cm` operands mapping a box's local y-up units onto the page.
    fn matrix(&self, x: f64, y: f64, h: f64, scale: f64) -> [f64; 6] {
        let f = self.k * scale;
        [f, 0.0, 0.0, f, self.left + x * self.k, self.page_height - self.top - (y + h * scale) * self.k]
    }
}

#[derive(Debug, Clone, Copy)]
struct ImageRef {
    id: usize,
    width: u32,
    height: u32,
}

/// Object list plus the image XObjects registered so far.
struct PdfBuilder<'a> {
    objects: Vec<Vec<u8>>,
    options: &'a ExportOptions,
    placement: Placement,
    /// Keyed by source; `None` marks a source that failed to load.
    images: HashMap<String, Option<ImageRef>>,
    page_images: BTreeSet<usize>,
}

impl<'a> PdfBuilder<'a> {
    fn new(options: &'a ExportOptions) -> Self {
        Self {
            // 0 unused, 1 catalog, 2 page tree, 3/4 fonts
            objects: vec![
                vec![],
                b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
                vec![],
                b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_vec(),
                b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>".to_vec(),
            ],
            options,
            placement: Placement::fit(options),
            images: HashMap::new(),
            page_images: BTreeSet::new(),
        }
    }

    fn push(&mut self, data: Vec<u8>) -> usize {
        self.objects.push(data);
        self.objects.len() - 1
    }

    /// Embed `src` the first time it is seen and mark it used on this page.
    fn image(&mut self, src: &str, width: f64, height: f64) -> Option<ImageRef> {
        let found = match self.images.get(src) {
            Some(found) => *found,
            None => {
                let budget = RasterBudget::for_box(width, height, self.options.raster_scale, self.options.image_quality);
                let loaded = match load_image(src, budget) {
                    Ok(image) => Some(self.write_image(&image)),
                    Err(e) => {
                        warn!(error = %e, "image could not be embedded, drawing placeholder");
                        None
                    }
                };
                self.images.insert(src.to_string(), loaded);
                loaded
            }
        };
        if let Some(image) = found {
            self.page_images.insert(image.id);
        }
        found
    }

    fn write_image(&mut self, image: &LoadedImage) -> ImageRef {
        let (w, h) = (image.width, image.height);
        let id = match &image.pixels {
            ImagePixels::Jpeg { data, gray } => {
                let mut obj = Vec::new();
                let _ = write!(
                    obj,
                    "<< /Type /XObject /Subtype /Image /Width {w} /Height {h} /ColorSpace {} \
                     /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                    if *gray { "/DeviceGray" } else { "/DeviceRGB" },
                    data.len()
                );
                obj.extend_from_slice(data);
                obj.extend_from_slice(b"\nendstream");
                self.push(obj)
            }
            ImagePixels::Rgb { rgb, alpha } => {
                let smask = alpha.as_ref().map(|alpha| {
                    let compressed = compress_to_vec_zlib(alpha, 6);
                    let mut obj = Vec::new();
                    let _ = write!(
                        obj,
                        "<< /Type /XObject /Subtype /Image /Width {w} /Height {h} /ColorSpace /DeviceGray \
                         /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>\nstream\n",
                        compressed.len()
                    );
                    obj.extend_from_slice(&compressed);
                    obj.extend_from_slice(b"\nendstream");
                    self.push(obj)
                });
                let compressed = compress_to_vec_zlib(rgb, 6);
                let mut obj = Vec::new();
                let _ = write!(
                    obj,
                    "<< /Type /XObject /Subtype /Image /Width {w} /Height {h} /ColorSpace /DeviceRGB \
                     /BitsPerComponent 8 /Filter /FlateDecode /Length {}",
                    compressed.len()
                );
                if let Some(smask) = smask {
                    let _ = write!(obj, " /SMask {smask} 0 R");
                }
                obj.extend_from_slice(b" >>\nstream\n");
                obj.extend_from_slice(&compressed);
                obj.extend_from_slice(b"\nendstream");
                self.push(obj)
            }
        };
        ImageRef { id, width: w, height: h }
    }

    /// Resource dictionary for the page just written; resets the usage set.
    fn take_page_resources(&mut self) -> String {
        let mut resources = String::from("/Font << /F1 3 0 R /F2 4 0 R >>");
        if !self.page_images.is_empty() {
            let entries: Vec<String> = self.page_images.iter().map(|id| format!("/Im{id} {id} 0 R")).collect();
            let _ = write!(resources, " /XObject << {} >>", entries.join(" "));
        }
        self.page_images.clear();
        resources
    }
}

impl PdfExporter {
    pub fn new() -> Self {
        Self { compress: true }
    }

    /// Leave content streams uncompressed (useful when inspecting output).
    pub fn uncompressed() -> Self {
        Self { compress: false }
    }

    /// Write composed nodes to PDF bytes. Each page-break marker starts a page.
    pub fn write(&self, nodes: &[DocumentNode], options: &ExportOptions) -> Result<Vec<u8>, ExportFailure> {
        let pages = paginate(nodes);
        if pages.is_empty() {
            return Err(ExportFailure("nothing to write".to_string()));
        }

        let (page_w, page_h) = options.page_size_pt();
        let mut builder = PdfBuilder::new(options);

        let mut page_ids = vec![];
        for page in pages {
            let mut stream = String::new();
            for node in page {
                self.write_node(&mut builder, &mut stream, node, None)?;
            }

            let content = self.stream_object(stream.as_bytes());
            let content_id = builder.push(content);
            let resources = builder.take_page_resources();
            let page_id = builder.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                     /Contents {} 0 R /Resources << {} >> >>",
                    page_w, page_h, content_id, resources
                )
                .into_bytes(),
            );
            page_ids.push(page_id);
        }

        let kids: Vec<String> = page_ids.iter().map(|id| format!("{id} 0 R")).collect();
        builder.objects[2] = format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), page_ids.len()).into_bytes();

        let info_id = builder.push(
            format!(
                "<< /Title ({}) /Producer (cardlayout-core {}) >>",
                escape_pdf_string(&options.filename),
                crate::ENGINE_VERSION
            )
            .into_bytes(),
        );

        Ok(serialize(&builder.objects, info_id))
    }

    fn stream_object(&self, content: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        if self.compress {
            let compressed = compress_to_vec_zlib(content, 6);
            let _ = write!(data, "<< /Length {} /Filter /FlateDecode >>\nstream\n", compressed.len());
            data.extend_from_slice(&compressed);
        } else {
            let _ = write!(data, "<< /Length {} >>\nstream\n", content.len());
            data.extend_from_slice(content);
        }
        data.extend_from_slice(b"\nendstream");
        data
    }

    fn write_node(
        &self,
        builder: &mut PdfBuilder<'_>,
        stream: &mut String,
        node: &DocumentNode,
        accent: Option<Color>,
    ) -> Result<(), ExportFailure> {
        let placement = builder.placement;
        match &node.kind {
            NodeKind::PageBreak => return Ok(()),
            NodeKind::Card { width, height, accent: card_accent } => {
                let [a, b, c, d, e, f] = placement.matrix(0.0, 0.0, *height, 1.0);
                let _ = writeln!(stream, "q\n{a:.4} {b} {c} {d:.4} {e:.2} {f:.2} cm");
                fill_rect(stream, Color::WHITE, 0.0, 0.0, *width, *height);
                let _ = writeln!(stream, "{:.3} {:.3} {:.3} RG\n0.8 w\n0 0 {width:.2} {height:.2} re\nS\nQ", FRAME_GRAY.r, FRAME_GRAY.g, FRAME_GRAY.b);
                for child in &node.children {
                    self.write_node(builder, stream, child, Some(*card_accent))?;
                }
                return Ok(());
            }
            NodeKind::Block { role } => {
                let bounds = role.bounds();
                let accent = accent.unwrap_or(Color::INK);
                let band = match role {
                    BlockRole::HeaderBand => Some(bounds),
                    BlockRole::FooterBand => Some(Anchor {
                        x: bounds.x,
                        y: CARD_HEIGHT_PX - FOOTER_STRIP_PX,
                        width: bounds.width,
                        height: FOOTER_STRIP_PX,
                    }),
                    _ => None,
                };
                if let Some(band) = band {
                    let [a, b, c, d, e, f] = placement.matrix(band.x, band.y, band.height, 1.0);
                    let _ = writeln!(stream, "q\n{a:.4} {b} {c} {d:.4} {e:.2} {f:.2} cm");
                    fill_rect(stream, accent, 0.0, 0.0, band.width, band.height);
                    let _ = writeln!(stream, "Q");
                }
            }
            _ => {
                if let (Some(key), Some(anchor), Some(transform)) = (node.element, node.anchor, &node.transform) {
                    if transform.is_rendered() {
                        self.write_element(builder, stream, key, &node.kind, anchor, transform)?;
                    }
                }
            }
        }

        for child in &node.children {
            self.write_node(builder, stream, child, accent)?;
        }
        Ok(())
    }

    fn write_element(
        &self,
        builder: &mut PdfBuilder<'_>,
        stream: &mut String,
        key: ElementKey,
        kind: &NodeKind,
        anchor: Anchor,
        transform: &RenderTransform,
    ) -> Result<(), ExportFailure> {
        let s = transform.scale;
        let (dx, dy) = transform.translate;
        // Scale about the box centre, then apply the offset.
        let x = anchor.x + dx + anchor.width * (1.0 - s) / 2.0;
        let y = anchor.y + dy + anchor.height * (1.0 - s) / 2.0;
        let (w, h) = (anchor.width, anchor.height);

        let [a, b, c, d, e, f] = builder.placement.matrix(x, y, h, s);
        let _ = writeln!(stream, "q\n{a:.4} {b} {c} {d:.4} {e:.2} {f:.2} cm");

        match kind {
            NodeKind::Text { content, bold, placeholder } => {
                let size = transform.font_size.unwrap_or(10.0);
                let color = if *placeholder {
                    PLACEHOLDER_GRAY
                } else if on_accent(key) {
                    Color::WHITE
                } else {
                    Color::INK
                };
                let baseline = ((h - size) / 2.0).max(0.0) + size * 0.2;
                let _ = writeln!(
                    stream,
                    "BT\n{:.3} {:.3} {:.3} rg\n/{} {:.1} Tf\n2 {:.2} Td\n({}) Tj\nET",
                    color.r,
                    color.g,
                    color.b,
                    if *bold { "F2" } else { "F1" },
                    size,
                    baseline,
                    escape_pdf_string(content)
                );
            }
            NodeKind::Image { src, alt } => {
                let embedded = src.as_deref().and_then(|src| builder.image(src, w * s, h * s));
                match embedded {
                    Some(image) => draw_image(stream, image, w, h),
                    None => draw_image_placeholder(stream, alt, w, h),
                }
            }
            NodeKind::QrCode { payload } => write_qr(stream, payload, w, h)?,
            _ => {}
        }

        let _ = writeln!(stream, "Q");
        Ok(())
    }
}

impl Default for PdfExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exporter for PdfExporter {
    async fn export(&self, nodes: &[DocumentNode], options: &ExportOptions) -> Result<Vec<u8>, ExportFailure> {
        let writer = self.clone();
        let nodes = nodes.to_vec();
        let options = options.clone();
        tokio::task::spawn_blocking(move || writer.write(&nodes, &options))
            .await
            .map_err(|e| ExportFailure(format!("PDF writer task failed: {e}")))?
    }
}

/// Text drawn on the accent bands.
fn on_accent(key: ElementKey) -> bool {
    matches!(key, ElementKey::SchoolName | ElementKey::Tagline | ElementKey::Footer)
}

fn fill_rect(stream: &mut String, color: Color, x: f64, y: f64, w: f64, h: f64) {
    let _ = writeln!(
        stream,
        "{:.3} {:.3} {:.3} rg\n{x:.2} {y:.2} {w:.2} {h:.2} re\nf",
        color.r, color.g, color.b
    );
}

/// Fit the image inside the box keeping its aspect ratio, centred.
fn draw_image(stream: &mut String, image: ImageRef, w: f64, h: f64) {
    let (iw, ih) = (image.width.max(1) as f64, image.height.max(1) as f64);
    let fit = (w / iw).min(h / ih);
    let (dw, dh) = (iw * fit, ih * fit);
    let _ = writeln!(
        stream,
        "q\n{dw:.3} 0 0 {dh:.3} {:.3} {:.3} cm\n/Im{} Do\nQ",
        (w - dw) / 2.0,
        (h - dh) / 2.0,
        image.id
    );
}

fn draw_image_placeholder(stream: &mut String, alt: &str, w: f64, h: f64) {
    fill_rect(stream, FILL_GRAY, 0.0, 0.0, w, h);
    let _ = writeln!(
        stream,
        "{:.3} {:.3} {:.3} RG\n0.6 w\n0 0 {w:.2} {h:.2} re\nS",
        FRAME_GRAY.r, FRAME_GRAY.g, FRAME_GRAY.b
    );
    if !alt.is_empty() {
        let size = (h / 3.0).min(14.0);
        let _ = writeln!(
            stream,
            "BT\n{:.3} {:.3} {:.3} rg\n/F1 {size:.1} Tf\n4 {:.2} Td\n({}) Tj\nET",
            PLACEHOLDER_GRAY.r,
            PLACEHOLDER_GRAY.g,
            PLACEHOLDER_GRAY.b,
            (h - size) / 2.0,
            escape_pdf_string(alt)
        );
    }
}

fn write_qr(stream: &mut String, payload: &str, w: f64, h: f64) -> Result<(), ExportFailure> {
    let code = qrcode::QrCode::new(payload.as_bytes())
        .map_err(|e| ExportFailure(format!("QR code generation failed: {e}")))?;
    let modules = code.width();
    let side = w.min(h);
    let cell = side / modules as f64;

    fill_rect(stream, Color::WHITE, 0.0, 0.0, side, side);
    let _ = writeln!(stream, "0 0 0 rg");
    for row in 0..modules {
        for col in 0..modules {
            if code[(col, row)] == qrcode::Color::Dark {
                let _ = writeln!(
                    stream,
                    "{:.3} {:.3} {cell:.3} {cell:.3} re",
                    col as f64 * cell,
                    side - (row + 1) as f64 * cell
                );
            }
        }
    }
    let _ = writeln!(stream, "f");
    Ok(())
}

/// Escape a PDF literal string. Standard fonts only cover Latin-1, so
/// anything outside printable ASCII is replaced.
fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn serialize(objects: &[Vec<u8>], info_id: usize) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::new();
    let mut offsets = vec![0usize; objects.len()];

    output.extend_from_slice(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n");
    for (i, data) in objects.iter().enumerate().skip(1) {
        offsets[i] = output.len();
        let _ = write!(output, "{i} 0 obj\n");
        output.extend_from_slice(data);
        output.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = output.len();
    let _ = write!(output, "xref\n0 {}\n0000000000 65535 f \n", objects.len());
    for offset in offsets.iter().skip(1) {
        let _ = write!(output, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        output,
        "trailer\n<< /Size {} /Root 1 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len()
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{jpeg_data_url, png_data_url};
    use crate::pipeline::compose;
    use crate::print::DocumentType;
    use crate::records::DocumentRecord;
    use crate::selection::EditMode;
    use crate::settings::{Branding, PersistedSettings};

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    fn settings_with_logo(logo: Option<String>) -> PersistedSettings {
        PersistedSettings::bootstrap(&Branding { name: "Greenfield".into(), logo, ..Default::default() })
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("Roll (12)"), "Roll \\(12\\)");
        assert_eq!(escape_pdf_string("a\\b"), "a\\\\b");
        assert_eq!(escape_pdf_string("Zoë"), "Zo?");
    }

    #[test]
    fn test_one_page_per_card() {
        let records = [DocumentRecord::new("s1", "Asha"), DocumentRecord::new("s2", "Ben"), DocumentRecord::new("s3", "Chen")];
        let refs: Vec<_> = records.iter().collect();
        let settings = settings_with_logo(None);
        let doc = compose(&refs, &settings, &EditMode::View, DocumentType::IdentityCard);
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "cards.pdf");

        let bytes = PdfExporter::uncompressed().write(doc.nodes(), &options).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        assert_eq!(count(&bytes, b"/Type /Page "), 3);
        assert_eq!(count(&bytes, b"(Asha) Tj"), 1);
        assert_eq!(count(&bytes, b"/Count 3"), 1);
        assert_eq!(count(&bytes, b"/XObject"), 0);
    }

    #[test]
    fn test_photo_and_logo_are_embedded() {
        let record = DocumentRecord {
            photo: Some(jpeg_data_url(30, 36)),
            ..DocumentRecord::new("s1", "Asha")
        };
        let settings = settings_with_logo(Some(png_data_url(16, 16, 255)));
        let doc = compose(&[&record], &settings, &EditMode::View, DocumentType::IdentityCard);
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "one.pdf");

        let bytes = PdfExporter::uncompressed().write(doc.nodes(), &options).unwrap();
        assert_eq!(count(&bytes, b"/Subtype /Image"), 2);
        assert_eq!(count(&bytes, b"/DCTDecode"), 2);
        assert_eq!(count(&bytes, b" Do\n"), 2);
        assert_eq!(count(&bytes, b"/XObject << "), 1);
        // Initials are only drawn for the placeholder.
        assert_eq!(count(&bytes, b"(A) Tj"), 0);
    }

    #[test]
    fn test_shared_logo_embedded_once() {
        let records = [DocumentRecord::new("s1", "Asha"), DocumentRecord::new("s2", "Ben")];
        let refs: Vec<_> = records.iter().collect();
        let settings = settings_with_logo(Some(png_data_url(8, 8, 100)));
        let doc = compose(&refs, &settings, &EditMode::View, DocumentType::IdentityCard);
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "two.pdf");

        let bytes = PdfExporter::uncompressed().write(doc.nodes(), &options).unwrap();
        // Translucent PNG: one RGB image plus its soft mask.
        assert_eq!(count(&bytes, b"/Subtype /Image"), 2);
        assert_eq!(count(&bytes, b"/SMask "), 1);
        assert_eq!(count(&bytes, b" Do\n"), 2);
        assert_eq!(count(&bytes, b"/XObject << "), 2);
    }

    #[test]
    fn test_undecodable_photo_falls_back_to_placeholder() {
        let record = DocumentRecord {
            photo: Some("data:image/jpeg;base64,!!!".to_string()),
            ..DocumentRecord::new("s1", "Asha")
        };
        let settings = settings_with_logo(None);
        let doc = compose(&[&record], &settings, &EditMode::View, DocumentType::IdentityCard);
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "one.pdf");

        let bytes = PdfExporter::uncompressed().write(doc.nodes(), &options).unwrap();
        assert_eq!(count(&bytes, b"/XObject"), 0);
        assert_eq!(count(&bytes, b"(A) Tj"), 1);
    }

    #[test]
    fn test_hidden_element_not_drawn() {
        let record = DocumentRecord::new("s1", "Asha");
        let mut settings = settings_with_logo(None);
        settings.layout.get_mut(ElementKey::StudentName).visible = false;
        let doc = compose(&[&record], &settings, &EditMode::View, DocumentType::IdentityCard);
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "one.pdf");
        let bytes = PdfExporter::uncompressed().write(doc.nodes(), &options).unwrap();
        assert_eq!(count(&bytes, b"(Asha) Tj"), 0);
    }

    #[test]
    fn test_empty_input_rejected() {
        let options = ExportOptions::for_document(DocumentType::IdentityCard, "none.pdf");
        assert!(PdfExporter::new().write(&[], &options).is_err());
    }
}
