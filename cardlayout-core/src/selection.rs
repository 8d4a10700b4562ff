//! Edit-Mode State Machine
//!
//! `View` is the normal operating state. `Design` carries an optional
//! selection, so a selection outside design mode cannot be represented.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layout::ElementKey;

/// Operator role supplied by the authentication shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorRole {
    Administrator,
    #[default]
    Staff,
}

impl OperatorRole {
    pub fn can_design(self) -> bool {
        matches!(self, OperatorRole::Administrator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum EditMode {
    #[default]
    View,
    Design { selected: Option<ElementKey> },
}

impl EditMode {
    pub fn is_design(&self) -> bool {
        matches!(self, EditMode::Design { .. })
    }

    pub fn selected(&self) -> Option<ElementKey> {
        match self {
            EditMode::Design { selected } => *selected,
            EditMode::View => None,
        }
    }

    /// `View -> Design` with no selection. Returns false if the role may not
    /// design or design mode is already active.
    pub fn enter_design(&mut self, role: OperatorRole) -> bool {
        if self.is_design() || !role.can_design() {
            return false;
        }
        debug!(?role, "entering design mode");
        *self = EditMode::Design { selected: None };
        true
    }

    /// Select (or re-select) an element. Ignored outside design mode.
    pub fn select(&mut self, key: ElementKey) -> bool {
        match self {
            EditMode::Design { selected } => {
                *selected = Some(key);
                true
            }
            EditMode::View => false,
        }
    }

    /// Select by element name. Unknown names are ignored.
    pub fn select_named(&mut self, name: &str) -> bool {
        match ElementKey::from_name(name) {
            Some(key) => self.select(key),
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        if let EditMode::Design { selected } = self {
            *selected = None;
        }
    }

    /// `Design -> View`. Edits were already persisted, so nothing is committed.
    pub fn exit_design(&mut self) -> bool {
        if !self.is_design() {
            return false;
        }
        debug!("leaving design mode");
        *self = EditMode::View;
        true
    }

    /// Forced back to `View`, e.g. when the document scope changes.
    pub fn reset(&mut self) {
        *self = EditMode::View;
    }

    /// The element an edit should target, if edits are currently accepted.
    pub fn edit_target(&self) -> Option<ElementKey> {
        self.selected()
    }
}
