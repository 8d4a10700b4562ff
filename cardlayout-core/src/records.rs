//! Student Records - Read-Only Source
//!
//! The record store is an external collaborator. [`RecordBook`] is the
//! in-memory implementation used by the CLI and tests.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Unique identifier, also the verification (QR) payload.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default, alias = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default, alias = "rollNo")]
    pub roll_number: Option<String>,
    #[serde(default, alias = "regNo")]
    pub registration_number: Option<String>,
    #[serde(default, alias = "dob")]
    pub date_of_birth: Option<String>,
    #[serde(default, alias = "fatherName")]
    pub guardian_name: Option<String>,
    #[serde(default, alias = "phone")]
    pub contact: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
}

impl DocumentRecord {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Numeric roll number, if the stored value parses as one.
    pub fn roll_number_value(&self) -> Option<u64> {
        self.roll_number.as_deref().and_then(|r| r.trim().parse().ok())
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// What the operator is producing documents for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum DocumentScope {
    Single { record_id: String },
    Class { class_name: String },
}

pub trait RecordSource {
    /// All records in store order.
    fn records(&self) -> &[DocumentRecord];

    fn find(&self, id: &str) -> Option<&DocumentRecord> {
        self.records().iter().find(|r| r.id == id)
    }

    /// Active records of one class, in store order.
    fn by_class(&self, class_name: &str) -> Vec<&DocumentRecord> {
        self.records()
            .iter()
            .filter(|r| r.is_active() && r.class_name.as_deref() == Some(class_name))
            .collect()
    }

    /// Records to issue documents for. Inactive records are never included.
    fn resolve_scope(&self, scope: &DocumentScope) -> Vec<&DocumentRecord> {
        match scope {
            DocumentScope::Single { record_id } => self.find(record_id).filter(|r| r.is_active()).into_iter().collect(),
            DocumentScope::Class { class_name } => self.by_class(class_name),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBook {
    records: Vec<DocumentRecord>,
}

impl RecordBook {
    pub fn new(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<DocumentRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content).map_err(std::io::Error::from)
    }
}

impl RecordSource for RecordBook {
    fn records(&self) -> &[DocumentRecord] {
        &self.records
    }
}
