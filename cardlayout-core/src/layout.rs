//! Layout Model - Fixed Element Schema
//!
//! Every placeable element is a variant of [`ElementKey`]. A
//! [`LayoutConfiguration`] stores exactly one [`ElementLayout`] per key, so a
//! missing entry cannot be represented once a configuration exists.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Card canvas width in pixels. Anchors and offsets are expressed in this space.
pub const CARD_WIDTH_PX: f64 = 320.0;
/// Card canvas height in pixels.
pub const CARD_HEIGHT_PX: f64 = 500.0;

pub const OFFSET_X_LIMIT: f64 = 180.0;
pub const OFFSET_Y_LIMIT: f64 = 350.0;
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 4.0;
pub const MIN_FONT_SIZE: f64 = 6.0;
pub const MAX_FONT_SIZE: f64 = 72.0;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("Layout entry missing for element: {0}")]
    MissingElement(ElementKey),

    #[error("Unknown element: {0}")]
    UnknownElement(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKey {
    Logo,
    SchoolName,
    Tagline,
    Photo,
    StudentName,
    SecondaryIds,
    GuardianName,
    Contact,
    Address,
    DateOfBirth,
    RegistrationId,
    VerificationCode,
    Signature,
    Footer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Image,
}

/// Default anchored box of an element on the card canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Anchor {
    const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

impl ElementKey {
    pub const COUNT: usize = 14;

    /// All keys in skeleton order (header, photo, identity, footer).
    pub const ALL: [ElementKey; Self::COUNT] = [
        ElementKey::Logo,
        ElementKey::SchoolName,
        ElementKey::Tagline,
        ElementKey::Photo,
        ElementKey::StudentName,
        ElementKey::SecondaryIds,
        ElementKey::GuardianName,
        ElementKey::Contact,
        ElementKey::Address,
        ElementKey::DateOfBirth,
        ElementKey::RegistrationId,
        ElementKey::VerificationCode,
        ElementKey::Signature,
        ElementKey::Footer,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKey::Logo => "logo",
            ElementKey::SchoolName => "schoolName",
            ElementKey::Tagline => "tagline",
            ElementKey::Photo => "photo",
            ElementKey::StudentName => "studentName",
            ElementKey::SecondaryIds => "secondaryIds",
            ElementKey::GuardianName => "guardianName",
            ElementKey::Contact => "contact",
            ElementKey::Address => "address",
            ElementKey::DateOfBirth => "dateOfBirth",
            ElementKey::RegistrationId => "registrationId",
            ElementKey::VerificationCode => "verificationCode",
            ElementKey::Signature => "signature",
            ElementKey::Footer => "footer",
        }
    }

    pub fn from_name(name: &str) -> Option<ElementKey> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Human-readable label for element pickers.
    pub fn label(self) -> &'static str {
        match self {
            ElementKey::Logo => "Logo",
            ElementKey::SchoolName => "School Name",
            ElementKey::Tagline => "Tagline",
            ElementKey::Photo => "Photo",
            ElementKey::StudentName => "Student Name",
            ElementKey::SecondaryIds => "Class / Roll",
            ElementKey::GuardianName => "Guardian",
            ElementKey::Contact => "Contact",
            ElementKey::Address => "Address",
            ElementKey::DateOfBirth => "Date of Birth",
            ElementKey::RegistrationId => "Registration No.",
            ElementKey::VerificationCode => "QR Code",
            ElementKey::Signature => "Signature",
            ElementKey::Footer => "Footer",
        }
    }

    pub fn kind(self) -> ElementKind {
        match self {
            ElementKey::Logo
            | ElementKey::Photo
            | ElementKey::VerificationCode
            | ElementKey::Signature => ElementKind::Image,
            _ => ElementKind::Text,
        }
    }

    pub fn is_text(self) -> bool {
        self.kind() == ElementKind::Text
    }

    pub fn default_font_size(self) -> Option<f64> {
        match self {
            ElementKey::SchoolName => Some(18.0),
            ElementKey::Tagline => Some(9.0),
            ElementKey::StudentName => Some(16.0),
            ElementKey::SecondaryIds => Some(11.0),
            ElementKey::GuardianName | ElementKey::Contact => Some(10.0),
            ElementKey::Address => Some(9.0),
            ElementKey::DateOfBirth | ElementKey::RegistrationId => Some(10.0),
            ElementKey::Footer => Some(8.0),
            ElementKey::Logo
            | ElementKey::Photo
            | ElementKey::VerificationCode
            | ElementKey::Signature => None,
        }
    }

    pub fn anchor(self) -> Anchor {
        match self {
            ElementKey::Logo => Anchor::new(14.0, 14.0, 56.0, 56.0),
            ElementKey::SchoolName => Anchor::new(78.0, 16.0, 228.0, 26.0),
            ElementKey::Tagline => Anchor::new(78.0, 46.0, 228.0, 18.0),
            ElementKey::Photo => Anchor::new(110.0, 92.0, 100.0, 120.0),
            ElementKey::StudentName => Anchor::new(20.0, 226.0, 280.0, 26.0),
            ElementKey::SecondaryIds => Anchor::new(20.0, 256.0, 280.0, 18.0),
            ElementKey::GuardianName => Anchor::new(20.0, 284.0, 280.0, 18.0),
            ElementKey::Contact => Anchor::new(20.0, 306.0, 280.0, 18.0),
            ElementKey::Address => Anchor::new(20.0, 328.0, 280.0, 32.0),
            ElementKey::DateOfBirth => Anchor::new(20.0, 364.0, 135.0, 18.0),
            ElementKey::RegistrationId => Anchor::new(165.0, 364.0, 135.0, 18.0),
            ElementKey::VerificationCode => Anchor::new(20.0, 394.0, 72.0, 72.0),
            ElementKey::Signature => Anchor::new(200.0, 410.0, 100.0, 40.0),
            ElementKey::Footer => Anchor::new(20.0, 477.0, 280.0, 16.0),
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ElementKey {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKey::from_name(s).ok_or_else(|| LayoutError::UnknownElement(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementLayout {
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

fn default_true() -> bool { true }
fn default_scale() -> f64 { 1.0 }

/// A single slider/checkbox adjustment made in design mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum LayoutEdit {
    SetOffsetX { value: f64 },
    SetOffsetY { value: f64 },
    Nudge { dx: f64, dy: f64 },
    SetScale { value: f64 },
    SetFontSize { value: f64 },
    SetVisible { visible: bool },
    ToggleVisible,
}

impl ElementLayout {
    pub fn default_for(key: ElementKey) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
            visible: true,
            font_size: key.default_font_size(),
        }
    }

    /// Apply an edit, clamping into bounds. Returns true if anything changed.
    pub fn apply(&mut self, key: ElementKey, edit: LayoutEdit) -> bool {
        let before = self.clone();
        match edit {
            LayoutEdit::SetOffsetX { value } => self.offset_x = clamp_offset_x(value).unwrap_or(self.offset_x),
            LayoutEdit::SetOffsetY { value } => self.offset_y = clamp_offset_y(value).unwrap_or(self.offset_y),
            LayoutEdit::Nudge { dx, dy } => {
                self.offset_x = clamp_offset_x(self.offset_x + dx).unwrap_or(self.offset_x);
                self.offset_y = clamp_offset_y(self.offset_y + dy).unwrap_or(self.offset_y);
            }
            LayoutEdit::SetScale { value } => self.scale = clamp_scale(value).unwrap_or(self.scale),
            LayoutEdit::SetFontSize { value } => {
                if key.is_text() {
                    self.font_size = clamp_font_size(value).or(self.font_size);
                }
            }
            LayoutEdit::SetVisible { visible } => self.visible = visible,
            LayoutEdit::ToggleVisible => self.visible = !self.visible,
        }
        *self != before
    }
}

pub fn clamp_offset_x(v: f64) -> Option<f64> {
    clamp_number(v, -OFFSET_X_LIMIT, OFFSET_X_LIMIT)
}

pub fn clamp_offset_y(v: f64) -> Option<f64> {
    clamp_number(v, -OFFSET_Y_LIMIT, OFFSET_Y_LIMIT)
}

pub fn clamp_scale(v: f64) -> Option<f64> {
    clamp_number(v, MIN_SCALE, MAX_SCALE)
}

pub fn clamp_font_size(v: f64) -> Option<f64> {
    clamp_number(v, MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Infinities land on the nearest bound; NaN has no nearest value.
fn clamp_number(v: f64, min: f64, max: f64) -> Option<f64> {
    (!v.is_nan()).then(|| v.clamp(min, max))
}

/// Total mapping from every [`ElementKey`] to its [`ElementLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfiguration {
    entries: [ElementLayout; ElementKey::COUNT],
}

/// The bootstrap layout for an uninitialized academy.
pub fn default_layout() -> LayoutConfiguration {
    LayoutConfiguration {
        entries: ElementKey::ALL.map(ElementLayout::default_for),
    }
}

impl LayoutConfiguration {
    pub fn get(&self, key: ElementKey) -> &ElementLayout {
        &self.entries[key.index()]
    }

    pub fn get_mut(&mut self, key: ElementKey) -> &mut ElementLayout {
        &mut self.entries[key.index()]
    }

    pub fn set(&mut self, key: ElementKey, layout: ElementLayout) {
        self.entries[key.index()] = layout;
    }

    pub fn apply(&mut self, key: ElementKey, edit: LayoutEdit) -> bool {
        self.get_mut(key).apply(key, edit)
    }

    pub fn reset_element(&mut self, key: ElementKey) {
        self.set(key, ElementLayout::default_for(key));
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementKey, &ElementLayout)> {
        ElementKey::ALL.iter().copied().zip(self.entries.iter())
    }

    /// Keys whose element is currently hidden.
    pub fn hidden(&self) -> Vec<ElementKey> {
        self.iter().filter(|(_, l)| !l.visible).map(|(k, _)| k).collect()
    }

    /// Strict construction: every key must be present. A text entry
    /// without a font size takes its default.
    pub fn from_entries(mut entries: HashMap<ElementKey, ElementLayout>) -> Result<Self, LayoutError> {
        let mut config = default_layout();
        for key in ElementKey::ALL {
            let mut layout = entries.remove(&key).ok_or(LayoutError::MissingElement(key))?;
            if layout.font_size.is_none() {
                layout.font_size = key.default_font_size();
            }
            config.set(key, layout);
        }
        Ok(config)
    }

    /// Lenient construction from a stored JSON object. Entries that are
    /// missing or unparseable take their default; unknown names are ignored.
    /// Returns the configuration and the keys that were filled from defaults.
    pub fn from_partial(stored: &Map<String, Value>) -> (Self, Vec<ElementKey>) {
        let mut config = default_layout();
        let mut filled = vec![];
        for key in ElementKey::ALL {
            let parsed = stored
                .get(key.name())
                .and_then(|v| serde_json::from_value::<ElementLayout>(v.clone()).ok());
            match parsed {
                Some(mut layout) => {
                    if layout.font_size.is_none() {
                        layout.font_size = key.default_font_size();
                    }
                    config.set(key, layout);
                }
                None => filled.push(key),
            }
        }
        (config, filled)
    }
}

impl Default for LayoutConfiguration {
    fn default() -> Self {
        default_layout()
    }
}

impl Serialize for LayoutConfiguration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ElementKey::COUNT))?;
        for (key, layout) in self.iter() {
            map.serialize_entry(key.name(), layout)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LayoutConfiguration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: HashMap<String, ElementLayout> = HashMap::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(name, layout)| ElementKey::from_name(&name).map(|k| (k, layout)))
            .collect();
        LayoutConfiguration::from_entries(entries).map_err(de::Error::custom)
    }
}
