//! CardLayout Core - Visual Template Layout Engine
//!
//! # The Five Rules (Non-Negotiable)
//! 1. Every Element Always Has A Layout
//! 2. Stored Settings Never Break A Session
//! 3. Design Mode Decorates, Never Alters Content
//! 4. Rendering Is Pure
//! 5. Empty Batches Never Reach The Exporter

pub mod layout;
pub mod settings;
pub mod validation;
pub mod store;
pub mod selection;
pub mod transform;
pub mod records;
pub mod print;
pub mod document;
pub mod render;
pub mod hashing;
pub mod pipeline;
pub mod images;
pub mod pdf;
pub mod editor;
pub mod config;

pub use layout::{ElementKey, ElementLayout, LayoutConfiguration, LayoutEdit, LayoutError, default_layout};
pub use settings::{Branding, PersistedSettings, TemplateIdentity};
pub use validation::{LayoutRule, RepairMode, ValidationReport, Validator, ViolationSeverity};
pub use store::{ConfigurationStore, FileStore, KeyValueStore, MemoryStore, SaveStatus, StorageError};
pub use selection::{EditMode, OperatorRole};
pub use transform::{resolve, RenderTransform};
pub use records::{DocumentRecord, DocumentScope, RecordBook, RecordSource};
pub use print::{DocumentType, ExportOptions, PageSize};
pub use document::{DocumentNode, ExportableDocument, NodeKind};
pub use render::{render, Renderer};
pub use hashing::{canonical_json, compute_export_hash, document_fingerprint};
pub use pipeline::{compose, ExportController, ExportError, ExportFailure, ExportReceipt, Exporter};
pub use pdf::PdfExporter;
pub use editor::{Notice, NoticeLevel, TemplateEditor};
pub use config::EngineConfig;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
