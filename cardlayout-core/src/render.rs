//! Document Renderer
//!
//! Composes one card for one record. The skeleton never changes between view
//! and design mode; only the transforms carry design-mode decoration.

use chrono::NaiveDate;

use crate::document::{BlockRole, Color, DocumentNode, NodeKind};
use crate::layout::ElementKey;
use crate::records::DocumentRecord;
use crate::selection::EditMode;
use crate::settings::{PersistedSettings, DEFAULT_ACCENT_COLOR};
use crate::transform::resolve;

/// Shown in place of any empty record field.
pub const NOT_RECORDED: &str = "Not Recorded";

#[derive(Debug, Clone)]
pub struct Renderer {
    placeholder: String,
}

impl Renderer {
    pub fn new(placeholder: &str) -> Self {
        Self { placeholder: placeholder.to_string() }
    }

    pub fn render(&self, record: &DocumentRecord, settings: &PersistedSettings, mode: &EditMode) -> DocumentNode {
        let accent = Color::from_hex(&settings.identity.accent_color)
            .or_else(|| Color::from_hex(DEFAULT_ACCENT_COLOR))
            .unwrap_or(Color::INK);

        let blocks = BlockRole::ALL
            .iter()
            .map(|&role| {
                let children = role
                    .elements()
                    .iter()
                    .filter_map(|&key| {
                        let transform = resolve(key, settings.layout.get(key), mode);
                        if !transform.is_rendered() {
                            return None;
                        }
                        Some(DocumentNode::element(key, self.content(key, record, settings), transform))
                    })
                    .collect();
                DocumentNode::block(role, children)
            })
            .collect();

        DocumentNode::card(&record.id, accent, blocks)
    }

    fn content(&self, key: ElementKey, record: &DocumentRecord, settings: &PersistedSettings) -> NodeKind {
        let identity = &settings.identity;
        match key {
            ElementKey::Logo => NodeKind::Image {
                src: identity.logo.clone(),
                alt: identity.name.clone(),
            },
            ElementKey::SchoolName => text(identity.name.clone(), true, false),
            ElementKey::Tagline => text(identity.tagline.clone(), false, false),
            ElementKey::Photo => NodeKind::Image {
                src: non_empty(&record.photo).map(str::to_string),
                alt: initials(&record.name),
            },
            ElementKey::StudentName => match non_empty_str(&record.name) {
                Some(name) => text(name.to_string(), true, false),
                None => text(self.placeholder.clone(), true, true),
            },
            ElementKey::SecondaryIds => {
                let class = match (non_empty(&record.class_name), non_empty(&record.section)) {
                    (Some(c), Some(s)) => Some(format!("{c} - {s}")),
                    (Some(c), None) => Some(c.to_string()),
                    _ => None,
                };
                let roll = non_empty(&record.roll_number);
                let content = format!(
                    "Class: {} | Roll: {}",
                    class.as_deref().unwrap_or(&self.placeholder),
                    roll.unwrap_or(&self.placeholder)
                );
                text(content, false, class.is_none() && roll.is_none())
            }
            ElementKey::GuardianName => self.labelled("Guardian", non_empty(&record.guardian_name)),
            ElementKey::Contact => self.labelled("Contact", non_empty(&record.contact)),
            ElementKey::Address => self.labelled("Address", non_empty(&record.address)),
            ElementKey::DateOfBirth => {
                let dob = non_empty(&record.date_of_birth).map(format_date);
                self.labelled("DOB", dob.as_deref())
            }
            ElementKey::RegistrationId => self.labelled("Reg. No", non_empty(&record.registration_number)),
            ElementKey::VerificationCode => NodeKind::QrCode { payload: record.id.clone() },
            ElementKey::Signature => NodeKind::Image {
                src: identity.signature.clone(),
                alt: "Authorized Signatory".to_string(),
            },
            ElementKey::Footer => {
                let school = non_empty_str(&identity.name).unwrap_or("the school office");
                text(format!("If found, please return to {school}"), false, false)
            }
        }
    }

    fn labelled(&self, label: &str, value: Option<&str>) -> NodeKind {
        match value {
            Some(v) => text(format!("{label}: {v}"), false, false),
            None => text(format!("{label}: {}", self.placeholder), false, true),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(NOT_RECORDED)
    }
}

/// Render one card with the default placeholder text.
pub fn render(record: &DocumentRecord, settings: &PersistedSettings, mode: &EditMode) -> DocumentNode {
    Renderer::default().render(record, settings, mode)
}

fn text(content: String, bold: bool, placeholder: bool) -> NodeKind {
    NodeKind::Text { content, bold, placeholder }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().and_then(non_empty_str)
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// `2012-03-15` becomes `15 Mar 2012`; anything else is shown as entered.
fn format_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%d %b %Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|w| w.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}
