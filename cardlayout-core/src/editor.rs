//! # Template Editor
//!
//! Session facade over the configuration store, the edit-mode state machine
//! and the renderer. Every accepted edit is persisted immediately; storage
//! and export problems become [`Notice`]s for the operator instead of errors.
//!
//! ```text
//! toggle_design ─▶ select ─▶ apply_edit ─▶ (persist) ─▶ preview / export
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{DocumentNode, ExportableDocument};
use crate::hashing::compute_export_hash;
use crate::layout::{ElementKey, LayoutEdit};
use crate::pipeline::{compose_with, ExportController, ExportError, ExportReceipt, Exporter};
use crate::print::{DocumentType, ExportOptions};
use crate::records::{DocumentRecord, DocumentScope};
use crate::render::Renderer;
use crate::selection::{EditMode, OperatorRole};
use crate::settings::{Branding, PersistedSettings};
use crate::store::{ConfigurationStore, KeyValueStore, SaveStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Operator-visible message. Never blocks the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

pub struct TemplateEditor<S: KeyValueStore> {
    store: ConfigurationStore<S>,
    mode: EditMode,
    role: OperatorRole,
    scope: Option<DocumentScope>,
    renderer: Renderer,
    document_type: DocumentType,
    notices: Vec<Notice>,
}

impl<S: KeyValueStore> TemplateEditor<S> {
    pub fn new(store: ConfigurationStore<S>, role: OperatorRole) -> Self {
        Self {
            store,
            mode: EditMode::View,
            role,
            scope: None,
            renderer: Renderer::default(),
            document_type: DocumentType::IdentityCard,
            notices: vec![],
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = document_type;
        self
    }

    pub fn settings(&self) -> &PersistedSettings {
        self.store.settings()
    }

    pub fn store(&self) -> &ConfigurationStore<S> {
        &self.store
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn role(&self) -> OperatorRole {
        self.role
    }

    pub fn scope(&self) -> Option<&DocumentScope> {
        self.scope.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ------------------------------------------------------------------
    // Mode and selection
    // ------------------------------------------------------------------

    pub fn enter_design(&mut self) -> bool {
        self.mode.enter_design(self.role)
    }

    pub fn exit_design(&mut self) -> bool {
        self.mode.exit_design()
    }

    /// Flip between view and design. Returns whether design mode is active.
    pub fn toggle_design(&mut self) -> bool {
        if self.mode.is_design() {
            self.mode.exit_design();
        } else {
            self.mode.enter_design(self.role);
        }
        self.mode.is_design()
    }

    pub fn select(&mut self, key: ElementKey) -> bool {
        self.mode.select(key)
    }

    pub fn select_named(&mut self, name: &str) -> bool {
        self.mode.select_named(name)
    }

    pub fn clear_selection(&mut self) {
        self.mode.clear_selection();
    }

    /// Switching the student or class forces the session back to view mode.
    pub fn set_scope(&mut self, scope: DocumentScope) {
        if self.scope.as_ref() != Some(&scope) {
            debug!(?scope, "document scope changed");
            self.mode.reset();
            self.scope = Some(scope);
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Apply an edit to the selected element. Ignored outside design mode or
    /// without a selection. Returns true if the layout changed.
    pub fn apply_edit(&mut self, edit: LayoutEdit) -> bool {
        let Some(key) = self.mode.edit_target() else {
            debug!(?edit, "edit ignored, nothing selected");
            return false;
        };
        match self.store.update(|settings| settings.layout.apply(key, edit)) {
            Some(status) => {
                self.record_save(status);
                true
            }
            None => false,
        }
    }

    /// Restore the selected element's blueprint layout.
    pub fn reset_element(&mut self) -> bool {
        let Some(key) = self.mode.edit_target() else {
            return false;
        };
        match self.store.update(|settings| {
            let before = settings.layout.get(key).clone();
            settings.layout.reset_element(key);
            *settings.layout.get(key) != before
        }) {
            Some(status) => {
                self.record_save(status);
                true
            }
            None => false,
        }
    }

    /// Discard every layout customisation. Only available in design mode.
    pub fn reset_to_blueprint(&mut self) -> bool {
        if !self.mode.is_design() {
            return false;
        }
        let status = self.store.reset_layout();
        info!("layout reset to blueprint");
        self.record_save(status);
        true
    }

    /// Merge a changed school profile. Layout is left untouched.
    pub fn on_branding_change(&mut self, branding: &Branding) {
        if let Some(status) = self.store.react_to_identity_change(branding) {
            debug!("template identity updated from branding");
            self.record_save(status);
        }
    }

    fn record_save(&mut self, status: SaveStatus) {
        if let SaveStatus::InMemoryOnly { warning } = status {
            warn!("template settings kept in memory only");
            self.notices.push(Notice::warning(warning));
        }
    }

    // ------------------------------------------------------------------
    // Rendering and export
    // ------------------------------------------------------------------

    /// Live card for one record, including design-mode decoration.
    pub fn preview(&self, record: &DocumentRecord) -> DocumentNode {
        self.renderer.render(record, self.store.settings(), &self.mode)
    }

    pub fn compose(&self, records: &[&DocumentRecord]) -> ExportableDocument {
        compose_with(&self.renderer, records, self.store.settings(), &self.mode, self.document_type)
    }

    /// Re-render the current in-memory state and hand it to the exporter.
    /// Settings and mode are never modified here.
    pub async fn export<E: Exporter>(
        &mut self,
        controller: &ExportController<E>,
        records: &[&DocumentRecord],
        options: &ExportOptions,
    ) -> Result<ExportReceipt, ExportError> {
        let document = self.compose(records);
        match controller.export(&document, options).await {
            Ok(mut receipt) => {
                let card_ids: Vec<&str> = document.documents().filter_map(|n| n.id.as_deref()).collect();
                match compute_export_hash(self.store.settings(), &card_ids, &receipt.engine_version) {
                    Ok(hash) => receipt.export_hash = Some(hash),
                    Err(e) => warn!(error = %e, "export hash not computed"),
                }
                self.notices.push(Notice::info(format!(
                    "Exported {} page(s) to {}",
                    receipt.page_count, receipt.file.filename
                )));
                Ok(receipt)
            }
            Err(e) => {
                let notice = match &e {
                    ExportError::EmptyBatch => Notice::warning("No students match the selected filter. Nothing was exported."),
                    ExportError::InProgress => Notice::warning("An export is already running."),
                    _ => Notice::error(format!("Export failed: {e}. Please try again.")),
                };
                self.notices.push(notice);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn editor(role: OperatorRole) -> TemplateEditor<MemoryStore> {
        let branding = Branding { name: "Greenfield".into(), ..Default::default() };
        TemplateEditor::new(ConfigurationStore::open(MemoryStore::new(), &branding), role)
    }

    #[test]
    fn test_edit_requires_selection() {
        let mut ed = editor(OperatorRole::Administrator);
        assert!(!ed.apply_edit(LayoutEdit::SetScale { value: 2.0 }));
        assert!(ed.toggle_design());
        assert!(!ed.apply_edit(LayoutEdit::SetScale { value: 2.0 }));
        assert!(ed.select(ElementKey::Photo));
        assert!(ed.apply_edit(LayoutEdit::SetScale { value: 2.0 }));
        assert_eq!(ed.settings().layout.get(ElementKey::Photo).scale, 2.0);
    }

    #[test]
    fn test_staff_edits_are_ignored() {
        let mut ed = editor(OperatorRole::Staff);
        assert!(!ed.toggle_design());
        assert!(!ed.select(ElementKey::Photo));
        assert!(!ed.apply_edit(LayoutEdit::ToggleVisible));
        assert_eq!(ed.settings().layout.hidden(), vec![]);
    }

    #[test]
    fn test_scope_change_leaves_design_mode() {
        let mut ed = editor(OperatorRole::Administrator);
        ed.set_scope(DocumentScope::Single { record_id: "s1".into() });
        ed.enter_design();
        ed.select(ElementKey::Logo);
        ed.set_scope(DocumentScope::Class { class_name: "7".into() });
        assert_eq!(*ed.mode(), EditMode::View);
    }

    #[test]
    fn test_quota_failure_becomes_notice() {
        let branding = Branding::default();
        let store = ConfigurationStore::open(MemoryStore::with_quota(16), &branding);
        let mut ed = TemplateEditor::new(store, OperatorRole::Administrator);
        ed.enter_design();
        ed.select(ElementKey::Footer);
        assert!(ed.apply_edit(LayoutEdit::Nudge { dx: 4.0, dy: 0.0 }));
        assert_eq!(ed.settings().layout.get(ElementKey::Footer).offset_x, 4.0);
        let notices = ed.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(ed.notices().is_empty());
    }

    #[test]
    fn test_reset_element_and_blueprint() {
        let mut ed = editor(OperatorRole::Administrator);
        ed.enter_design();
        ed.select(ElementKey::Address);
        ed.apply_edit(LayoutEdit::SetOffsetY { value: 30.0 });
        assert!(ed.reset_element());
        assert!(!ed.reset_element());
        ed.apply_edit(LayoutEdit::ToggleVisible);
        assert!(ed.reset_to_blueprint());
        assert_eq!(ed.settings().layout, crate::layout::default_layout());
    }
}
