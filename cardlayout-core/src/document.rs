//! # Document Tree
//!
//! The backend-neutral output of the renderer. A card is a fixed tree of
//! blocks and element nodes; each element node carries its anchor box and its
//! resolved [`RenderTransform`]. Batches are flat lists of cards separated by
//! [`NodeKind::PageBreak`] markers.

use serde::{Deserialize, Serialize};

use crate::layout::{Anchor, ElementKey, CARD_HEIGHT_PX, CARD_WIDTH_PX};
use crate::print::DocumentType;
use crate::transform::RenderTransform;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const INK: Color = Color { r: 0.12, g: 0.13, b: 0.16 };

    /// Parse `#RRGGBB` (or `RRGGBB`).
    pub fn from_hex(hex: &str) -> Option<Color> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Color {
            r: channel(0)? as f64 / 255.0,
            g: channel(2)? as f64 / 255.0,
            b: channel(4)? as f64 / 255.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockRole {
    HeaderBand,
    PhotoBlock,
    IdentityBlock,
    FooterBand,
}

impl BlockRole {
    pub const ALL: [BlockRole; 4] = [
        BlockRole::HeaderBand,
        BlockRole::PhotoBlock,
        BlockRole::IdentityBlock,
        BlockRole::FooterBand,
    ];

    /// Elements placed in this block, in draw order.
    pub fn elements(self) -> &'static [ElementKey] {
        match self {
            BlockRole::HeaderBand => &[ElementKey::Logo, ElementKey::SchoolName, ElementKey::Tagline],
            BlockRole::PhotoBlock => &[ElementKey::Photo],
            BlockRole::IdentityBlock => &[
                ElementKey::StudentName,
                ElementKey::SecondaryIds,
                ElementKey::GuardianName,
                ElementKey::Contact,
                ElementKey::Address,
                ElementKey::DateOfBirth,
                ElementKey::RegistrationId,
            ],
            BlockRole::FooterBand => &[ElementKey::VerificationCode, ElementKey::Signature, ElementKey::Footer],
        }
    }

    /// Block box on the card canvas.
    pub fn bounds(self) -> Anchor {
        match self {
            BlockRole::HeaderBand => Anchor { x: 0.0, y: 0.0, width: CARD_WIDTH_PX, height: 80.0 },
            BlockRole::PhotoBlock => Anchor { x: 0.0, y: 80.0, width: CARD_WIDTH_PX, height: 140.0 },
            BlockRole::IdentityBlock => Anchor { x: 0.0, y: 220.0, width: CARD_WIDTH_PX, height: 168.0 },
            BlockRole::FooterBand => Anchor { x: 0.0, y: 388.0, width: CARD_WIDTH_PX, height: 112.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    Card {
        width: f64,
        height: f64,
        accent: Color,
    },
    Block {
        role: BlockRole,
    },
    Text {
        content: String,
        #[serde(default)]
        bold: bool,
        /// True when the record had no value and a placeholder is shown.
        #[serde(default)]
        placeholder: bool,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        alt: String,
    },
    QrCode {
        payload: String,
    },
    /// Forces the exporter onto a new physical page.
    PageBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<RenderTransform>,
    #[serde(default)]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn card(id: &str, accent: Color, children: Vec<DocumentNode>) -> Self {
        Self {
            kind: NodeKind::Card { width: CARD_WIDTH_PX, height: CARD_HEIGHT_PX, accent },
            id: Some(id.to_string()),
            element: None,
            anchor: Some(Anchor { x: 0.0, y: 0.0, width: CARD_WIDTH_PX, height: CARD_HEIGHT_PX }),
            transform: None,
            children,
        }
    }

    pub fn block(role: BlockRole, children: Vec<DocumentNode>) -> Self {
        Self {
            kind: NodeKind::Block { role },
            id: None,
            element: None,
            anchor: Some(role.bounds()),
            transform: None,
            children,
        }
    }

    pub fn element(key: ElementKey, kind: NodeKind, transform: RenderTransform) -> Self {
        Self {
            kind,
            id: None,
            element: Some(key),
            anchor: Some(key.anchor()),
            transform: Some(transform),
            children: vec![],
        }
    }

    pub fn page_break() -> Self {
        Self {
            kind: NodeKind::PageBreak,
            id: None,
            element: None,
            anchor: None,
            transform: None,
            children: vec![],
        }
    }

    pub fn is_page_break(&self) -> bool {
        matches!(self.kind, NodeKind::PageBreak)
    }

    /// Element keys present anywhere under this node, in tree order.
    pub fn elements(&self) -> Vec<ElementKey> {
        let mut keys = vec![];
        self.collect_elements(&mut keys);
        keys
    }

    fn collect_elements(&self, keys: &mut Vec<ElementKey>) {
        if let Some(key) = self.element {
            keys.push(key);
        }
        for child in &self.children {
            child.collect_elements(keys);
        }
    }

    pub fn find(&self, key: ElementKey) -> Option<&DocumentNode> {
        if self.element == Some(key) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }
}

/// The composed subtree handed to an exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExportableDocument {
    /// Nothing to export; the exporter must not be called.
    Empty,
    Content {
        document_type: DocumentType,
        documents: usize,
        nodes: Vec<DocumentNode>,
    },
}

impl ExportableDocument {
    pub fn is_empty(&self) -> bool {
        matches!(self, ExportableDocument::Empty)
    }

    pub fn nodes(&self) -> &[DocumentNode] {
        match self {
            ExportableDocument::Empty => &[],
            ExportableDocument::Content { nodes, .. } => nodes,
        }
    }

    pub fn document_count(&self) -> usize {
        match self {
            ExportableDocument::Empty => 0,
            ExportableDocument::Content { documents, .. } => *documents,
        }
    }

    pub fn page_breaks(&self) -> usize {
        self.nodes().iter().filter(|n| n.is_page_break()).count()
    }

    /// Document nodes without the page-break markers.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentNode> {
        self.nodes().iter().filter(|n| !n.is_page_break())
    }
}

/// Split a composed node list into pages at page-break markers.
pub fn paginate(nodes: &[DocumentNode]) -> Vec<&[DocumentNode]> {
    if nodes.is_empty() {
        return vec![];
    }
    nodes.split(DocumentNode::is_page_break).collect()
}
