//! Batch Composer & Export Pipeline - Single Entry Point
//!
//! CRITICAL: an empty composition never reaches the exporter, and only one
//! export may be in flight at a time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::document::{DocumentNode, ExportableDocument};
use crate::hashing::{document_fingerprint, sha256_hex};
use crate::print::{DocumentType, ExportOptions};
use crate::records::DocumentRecord;
use crate::render::Renderer;
use crate::selection::EditMode;
use crate::settings::PersistedSettings;
use crate::ENGINE_VERSION;

/// Failure reported by an exporter implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExportFailure(pub String);

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No records to export")]
    EmptyBatch,

    #[error("An export is already in progress")]
    InProgress,

    #[error("Export failed: {0}")]
    Exporter(#[from] ExportFailure),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Turns a composed subtree into a paginated file.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, nodes: &[DocumentNode], options: &ExportOptions) -> Result<Vec<u8>, ExportFailure>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFile {
    pub filename: String,
    pub size_bytes: usize,
    pub data_base64: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub document_type: DocumentType,
    pub page_count: usize,
    pub document_fingerprint: String,
    /// sha256 over settings, card ids and engine version; set by the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_hash: Option<String>,
    pub file: ExportedFile,
}

/// Compose 1..N cards for export.
///
/// Cards are ordered by numeric roll number; records without one keep their
/// input order after the numbered records. Exactly one page-break marker sits
/// between consecutive cards.
pub fn compose(
    records: &[&DocumentRecord],
    settings: &PersistedSettings,
    mode: &EditMode,
    document_type: DocumentType,
) -> ExportableDocument {
    compose_with(&Renderer::default(), records, settings, mode, document_type)
}

pub fn compose_with(
    renderer: &Renderer,
    records: &[&DocumentRecord],
    settings: &PersistedSettings,
    mode: &EditMode,
    document_type: DocumentType,
) -> ExportableDocument {
    if records.is_empty() {
        return ExportableDocument::Empty;
    }

    let ordered = export_order(records);
    let mut nodes = Vec::with_capacity(ordered.len() * 2 - 1);
    for (i, record) in ordered.iter().enumerate() {
        if i > 0 {
            nodes.push(DocumentNode::page_break());
        }
        nodes.push(renderer.render(record, settings, mode));
    }

    ExportableDocument::Content {
        document_type,
        documents: ordered.len(),
        nodes,
    }
}

/// Stable sort: numbered rolls ascending, then unnumbered in input order.
pub fn export_order<'a>(records: &[&'a DocumentRecord]) -> Vec<&'a DocumentRecord> {
    let mut ordered = records.to_vec();
    ordered.sort_by_key(|r| match r.roll_number_value() {
        Some(roll) => (0, roll),
        None => (1, 0),
    });
    ordered
}

/// Releases the in-flight flag however the export ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Guards the exporter: refuses empty documents and duplicate triggers.
pub struct ExportController<E: Exporter> {
    exporter: E,
    in_flight: AtomicBool,
}

impl<E: Exporter> ExportController<E> {
    pub fn new(exporter: E) -> Self {
        Self {
            exporter,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn export(
        &self,
        document: &ExportableDocument,
        options: &ExportOptions,
    ) -> Result<ExportReceipt, ExportError> {
        if document.is_empty() {
            return Err(ExportError::EmptyBatch);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::InProgress);
        }
        let _guard = InFlight(&self.in_flight);

        let fingerprint = document_fingerprint(document)?;
        info!(
            documents = document.document_count(),
            filename = %options.filename,
            "starting export"
        );

        let bytes = self.exporter.export(document.nodes(), options).await.map_err(|e| {
            error!(error = %e, filename = %options.filename, "export failed");
            e
        })?;

        let receipt = ExportReceipt {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            document_type: options.document_type,
            page_count: document.page_breaks() + 1,
            document_fingerprint: fingerprint,
            export_hash: None,
            file: ExportedFile {
                filename: options.filename.clone(),
                size_bytes: bytes.len(),
                hash: sha256_hex(&bytes),
                data_base64: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes),
            },
        };
        info!(id = %receipt.id, pages = receipt.page_count, "export complete");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Branding;

    fn rec(id: &str, roll: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            roll_number: roll.map(str::to_string),
            ..DocumentRecord::new(id, id)
        }
    }

    fn ids(doc: &ExportableDocument) -> Vec<String> {
        doc.documents().filter_map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_roll_number_order() {
        let records = [rec("c", Some("3")), rec("a", Some("1")), rec("b", Some("2"))];
        let refs: Vec<_> = records.iter().collect();
        let settings = PersistedSettings::bootstrap(&Branding::default());
        let doc = compose(&refs, &settings, &EditMode::View, DocumentType::IdentityCard);
        assert_eq!(ids(&doc), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_numeric_not_lexical() {
        let records = [rec("ten", Some("10")), rec("nine", Some("9"))];
        let refs: Vec<_> = records.iter().collect();
        let ordered: Vec<_> = export_order(&refs).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ordered, vec!["nine", "ten"]);
    }

    #[test]
    fn test_unnumbered_keep_input_order_after_numbered() {
        let records = [rec("x", None), rec("two", Some("2")), rec("y", Some("n/a")), rec("one", Some("1"))];
        let refs: Vec<_> = records.iter().collect();
        let ordered: Vec<_> = export_order(&refs).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ordered, vec!["one", "two", "x", "y"]);
    }

    #[test]
    fn test_single_record_has_no_breaks() {
        let records = [rec("solo", None)];
        let refs: Vec<_> = records.iter().collect();
        let settings = PersistedSettings::bootstrap(&Branding::default());
        let doc = compose(&refs, &settings, &EditMode::View, DocumentType::IdentityCard);
        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(doc.page_breaks(), 0);
    }
}
