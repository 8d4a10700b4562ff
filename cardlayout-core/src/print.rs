//! Export Options - Physical Page Format
//!
//! Page size and orientation come from the document type, never from the
//! individual export call.

use serde::{Deserialize, Serialize};

const MM_TO_PT: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    #[default]
    IdentityCard,
    Certificate,
    Marksheet,
    Register,
}

impl DocumentType {
    pub fn orientation(self) -> Orientation {
        match self {
            DocumentType::Certificate => Orientation::Landscape,
            DocumentType::IdentityCard | DocumentType::Marksheet | DocumentType::Register => {
                Orientation::Portrait
            }
        }
    }

    pub fn page_size(self) -> PageSize {
        match self {
            DocumentType::IdentityCard => PageSize::Cr80,
            _ => PageSize::A4,
        }
    }

    fn file_label(self, count: usize) -> String {
        let label = match self {
            DocumentType::IdentityCard => "ID_Card",
            DocumentType::Certificate => "Certificate",
            DocumentType::Marksheet => "Marksheet",
            DocumentType::Register => "Register",
        };
        if count > 1 { format!("{label}s") } else { label.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    /// ISO/IEC 7810 ID-1 card, 53.98 x 85.6 mm in portrait.
    Cr80,
    A4,
}

impl PageSize {
    /// Portrait (width, height) in millimetres.
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            PageSize::Cr80 => (53.98, 85.6),
            PageSize::A4 => (210.0, 297.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub document_type: DocumentType,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margin_mm: f64,
    /// Device pixels per card pixel when a decoded image is downsampled.
    pub raster_scale: f64,
    /// JPEG quality for re-encoded images, 0.1 to 1.0.
    pub image_quality: f64,
    pub filename: String,
}

impl ExportOptions {
    pub fn for_document(document_type: DocumentType, filename: &str) -> Self {
        Self {
            document_type,
            page_size: document_type.page_size(),
            orientation: document_type.orientation(),
            margin_mm: 0.0,
            raster_scale: 3.0,
            image_quality: 0.98,
            filename: filename.to_string(),
        }
    }

    /// Override raster settings with validation.
    pub fn with_raster(mut self, scale: f64, quality: f64) -> Result<Self, &'static str> {
        if !(1.0..=4.0).contains(&scale) {
            return Err("Raster scale must be between 1 and 4");
        }
        if !(0.1..=1.0).contains(&quality) {
            return Err("Image quality must be between 0.1 and 1.0");
        }
        self.raster_scale = scale;
        self.image_quality = quality;
        Ok(self)
    }

    /// Page (width, height) in PDF points, orientation applied.
    pub fn page_size_pt(&self) -> (f64, f64) {
        let (w, h) = self.page_size.dimensions_mm();
        let (w, h) = match self.orientation {
            Orientation::Portrait => (w.min(h), w.max(h)),
            Orientation::Landscape => (w.max(h), w.min(h)),
        };
        (w * MM_TO_PT, h * MM_TO_PT)
    }

    pub fn margin_pt(&self) -> f64 {
        self.margin_mm * MM_TO_PT
    }
}

/// `Asha_Verma_ID_Card.pdf` for one record, `Class_7_ID_Cards.pdf` for a class.
pub fn export_filename(document_type: DocumentType, subject: &str, count: usize) -> String {
    let stem: String = subject
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    let stem = if stem.is_empty() { "Document".to_string() } else { stem };
    format!("{}_{}.pdf", stem, document_type.file_label(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_fixed_per_type() {
        let card = ExportOptions::for_document(DocumentType::IdentityCard, "a.pdf");
        assert_eq!(card.orientation, Orientation::Portrait);
        let (w, h) = card.page_size_pt();
        assert!(w < h);

        let cert = ExportOptions::for_document(DocumentType::Certificate, "c.pdf");
        let (w, h) = cert.page_size_pt();
        assert!(w > h);
    }

    #[test]
    fn test_raster_validation() {
        let opts = ExportOptions::for_document(DocumentType::IdentityCard, "a.pdf");
        assert!(opts.clone().with_raster(0.5, 0.9).is_err());
        assert!(opts.clone().with_raster(2.0, 1.5).is_err());
        let ok = opts.with_raster(2.0, 0.8).unwrap();
        assert_eq!(ok.raster_scale, 2.0);
    }

    #[test]
    fn test_export_filename() {
        assert_eq!(export_filename(DocumentType::IdentityCard, "Asha  Verma", 1), "Asha_Verma_ID_Card.pdf");
        assert_eq!(export_filename(DocumentType::IdentityCard, "Class 7", 30), "Class_7_ID_Cards.pdf");
        assert_eq!(export_filename(DocumentType::Marksheet, "../", 1), "Document_Marksheet.pdf");
    }
}
