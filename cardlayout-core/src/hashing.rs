//! Hashing - Document Fingerprints
//!
//! Canonical JSON plus SHA-256 gives a fingerprint that is identical for
//! structurally identical documents, whatever order their maps were built in.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::document::ExportableDocument;
use crate::settings::PersistedSettings;

/// Compute SHA-256 of bytes as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data).iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Serialize with object keys sorted and no whitespace
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    to_string(&sorted(v))
}

fn sorted(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Fingerprint of a composed document, as recorded in export receipts.
pub fn document_fingerprint(document: &ExportableDocument) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(document)?.as_bytes()))
}

/// Audit hash of an export request:
/// sha256(settings + ordered record ids + engine_version)
pub fn compute_export_hash(
    settings: &PersistedSettings,
    record_ids: &[&str],
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!(
        "{}:{}:{}",
        canonical_json(settings)?,
        record_ids.join(","),
        engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}
