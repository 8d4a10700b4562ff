//! Persisted Settings - Identity plus Layout
//!
//! Branding fields are owned by the external academy profile and are merged
//! in whenever it changes. The signature is owned here. Layout positions are
//! never touched by a branding merge.

use serde::{Deserialize, Serialize};

use crate::layout::{default_layout, LayoutConfiguration};

/// Schema version written alongside every stored settings object.
pub const SETTINGS_SCHEMA_VERSION: &str = "1.0.0";

pub const DEFAULT_ACCENT_COLOR: &str = "#1e3a8a";

/// Read-only branding value observed from the academy profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default = "default_accent")]
    pub accent_color: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

fn default_accent() -> String { DEFAULT_ACCENT_COLOR.to_string() }

impl Default for TemplateIdentity {
    fn default() -> Self {
        Self {
            name: String::new(),
            tagline: String::new(),
            accent_color: default_accent(),
            logo: None,
            signature: None,
        }
    }
}

impl TemplateIdentity {
    pub fn from_branding(branding: &Branding) -> Self {
        let mut identity = Self::default();
        identity.merge_branding(branding);
        identity
    }

    /// Overwrite the branding-owned fields. The signature is left alone.
    pub fn merge_branding(&mut self, branding: &Branding) {
        self.name = branding.name.clone();
        self.tagline = branding.tagline.clone();
        self.logo = branding.logo.clone();
        if let Some(color) = &branding.accent_color {
            self.accent_color = color.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSettings {
    pub schema_version: String,
    pub identity: TemplateIdentity,
    pub layout: LayoutConfiguration,
}

impl PersistedSettings {
    pub fn bootstrap(branding: &Branding) -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION.to_string(),
            identity: TemplateIdentity::from_branding(branding),
            layout: default_layout(),
        }
    }

    /// Reset to master blueprint: default layout, identity preserved.
    pub fn reset_layout(&mut self) {
        self.layout = default_layout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ElementKey;

    fn branding(name: &str) -> Branding {
        Branding {
            name: name.to_string(),
            tagline: "Learning for life".to_string(),
            logo: Some("data:image/png;base64,AAAA".to_string()),
            accent_color: Some("#0f766e".to_string()),
        }
    }

    #[test]
    fn test_merge_keeps_signature() {
        let mut identity = TemplateIdentity::from_branding(&branding("Greenfield"));
        identity.signature = Some("sig".to_string());
        identity.merge_branding(&branding("Greenfield Senior"));
        assert_eq!(identity.name, "Greenfield Senior");
        assert_eq!(identity.signature.as_deref(), Some("sig"));
        assert_eq!(identity.accent_color, "#0f766e");
    }

    #[test]
    fn test_missing_accent_keeps_current() {
        let mut identity = TemplateIdentity::default();
        identity.merge_branding(&Branding { name: "X".into(), ..Default::default() });
        assert_eq!(identity.accent_color, DEFAULT_ACCENT_COLOR);
    }

    #[test]
    fn test_reset_layout_preserves_identity() {
        let mut settings = PersistedSettings::bootstrap(&branding("Greenfield"));
        settings.layout.get_mut(ElementKey::Logo).scale = 3.0;
        settings.reset_layout();
        assert_eq!(settings.layout, default_layout());
        assert_eq!(settings.identity.name, "Greenfield");
    }
}
