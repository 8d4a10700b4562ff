//! Transform Resolver
//!
//! Maps stored element state to a backend-neutral [`RenderTransform`].

use serde::{Deserialize, Serialize};

use crate::layout::{ElementKey, ElementLayout};
use crate::selection::EditMode;

/// Stacking level of every element that is not being edited.
pub const BASE_Z: i32 = 10;
/// Stacking level of the selected element in design mode.
pub const SELECTED_Z: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Display {
    Shown,
    /// Occupies no space and is excluded from export.
    Hidden,
}

/// Pointer affordance added in design mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affordance {
    None,
    Selectable,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTransform {
    pub translate: (f64, f64),
    pub scale: f64,
    pub display: Display,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    pub z_index: i32,
    pub affordance: Affordance,
}

impl RenderTransform {
    pub fn is_rendered(&self) -> bool {
        self.display == Display::Shown
    }

    /// The same transform with design-mode decoration removed.
    pub fn without_affordance(&self) -> Self {
        Self {
            z_index: BASE_Z,
            affordance: Affordance::None,
            ..self.clone()
        }
    }
}

pub fn resolve(key: ElementKey, layout: &ElementLayout, mode: &EditMode) -> RenderTransform {
    let (z_index, affordance) = match mode {
        EditMode::View => (BASE_Z, Affordance::None),
        EditMode::Design { selected: Some(k) } if *k == key => (SELECTED_Z, Affordance::Selected),
        EditMode::Design { .. } => (BASE_Z, Affordance::Selectable),
    };
    RenderTransform {
        translate: (layout.offset_x, layout.offset_y),
        scale: layout.scale,
        display: if layout.visible { Display::Shown } else { Display::Hidden },
        font_size: layout.font_size,
        z_index,
        affordance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ElementLayout {
        ElementLayout {
            offset_x: 40.0,
            offset_y: -12.5,
            scale: 1.25,
            visible: true,
            font_size: Some(14.0),
        }
    }

    #[test]
    fn test_view_mode_baseline() {
        let t = resolve(ElementKey::SchoolName, &layout(), &EditMode::View);
        assert_eq!(t.translate, (40.0, -12.5));
        assert_eq!(t.scale, 1.25);
        assert_eq!(t.font_size, Some(14.0));
        assert_eq!(t.z_index, BASE_Z);
        assert_eq!(t.affordance, Affordance::None);
    }

    #[test]
    fn test_selected_is_elevated() {
        let mode = EditMode::Design { selected: Some(ElementKey::SchoolName) };
        let selected = resolve(ElementKey::SchoolName, &layout(), &mode);
        let other = resolve(ElementKey::Tagline, &layout(), &mode);
        assert_eq!(selected.z_index, SELECTED_Z);
        assert_eq!(selected.affordance, Affordance::Selected);
        assert_eq!(other.z_index, BASE_Z);
        assert_eq!(other.affordance, Affordance::Selectable);
        assert_eq!(selected.without_affordance(), other.without_affordance());
    }

    #[test]
    fn test_hidden_still_resolved() {
        let mut l = layout();
        l.visible = false;
        let t = resolve(ElementKey::SchoolName, &l, &EditMode::View);
        assert!(!t.is_rendered());
        assert_eq!(t.translate, (40.0, -12.5));
        assert_eq!(t.scale, 1.25);
    }
}
