//! Persistence write counting. Runs only with `--features test-hooks`.

#![cfg(feature = "test-hooks")]

use cardlayout_core::store::{get_save_call_count, reset_save_call_count};
use cardlayout_core::{Branding, ConfigurationStore, ElementKey, LayoutEdit, MemoryStore, OperatorRole, TemplateEditor};

#[test]
fn invariant_only_real_changes_are_persisted() {
    reset_save_call_count();
    let mut editor = TemplateEditor::new(
        ConfigurationStore::open(MemoryStore::new(), &Branding::default()),
        OperatorRole::Administrator,
    );
    assert_eq!(get_save_call_count(), 0, "loading must not write");

    editor.enter_design();
    editor.select(ElementKey::Tagline);
    assert!(!editor.apply_edit(LayoutEdit::SetScale { value: 1.0 }));
    assert_eq!(get_save_call_count(), 0);

    assert!(editor.apply_edit(LayoutEdit::SetScale { value: 1.2 }));
    assert!(editor.apply_edit(LayoutEdit::Nudge { dx: 0.0, dy: -4.0 }));
    assert_eq!(get_save_call_count(), 2);

    editor.on_branding_change(&Branding::default());
    assert_eq!(get_save_call_count(), 2);
}
