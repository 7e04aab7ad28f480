//! Image Vault - Metadata Block
//!
//! The JSON descriptor framed at the front of every container. The block is
//! held as the JSON object it was read from, so a rewrite only changes the
//! keys it sets; everything else (unknown fields, explicit nulls, timestamp
//! strings as another writer formatted them) goes back out untouched.
//! Accessors interpret the well-known camelCase keys leniently and never
//! fail on a value of an unexpected type.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fallback MIME type when a container does not record one
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Well-known metadata keys
pub mod keys {
    pub const ID: &str = "id";
    pub const ORIGINAL_NAME: &str = "originalName";
    pub const MIME_TYPE: &str = "mimeType";
    pub const SIZE: &str = "size";
    pub const ENCRYPTED_AT: &str = "encryptedAt";
    pub const UPLOAD_DATE: &str = "uploadDate";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const TAGS: &str = "tags";
}

/// Image metadata (stored in plaintext inside the container)
///
/// Any JSON object is valid metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageMeta {
    fields: Map<String, Value>,
}

impl ImageMeta {
    /// Metadata for a fresh upload, stamped with the current time
    pub fn new(
        id: impl Into<String>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        let now = Value::from(timestamp(Utc::now()));
        let mut fields = Map::new();
        fields.insert(keys::ID.into(), Value::from(id.into()));
        fields.insert(keys::ORIGINAL_NAME.into(), Value::from(original_name.into()));
        fields.insert(keys::MIME_TYPE.into(), Value::from(mime_type.into()));
        fields.insert(keys::SIZE.into(), Value::from(size));
        fields.insert(keys::ENCRYPTED_AT.into(), now.clone());
        fields.insert(keys::UPLOAD_DATE.into(), now);
        fields.insert(keys::TAGS.into(), Value::Array(Vec::new()));
        Self { fields }
    }

    /// Wrap an already-parsed object
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field; an existing key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    // ───────────────────────────────────────────────────────────────────────
    // Lenient accessors
    // ───────────────────────────────────────────────────────────────────────

    /// `id` as text; numbers are rendered, anything else is empty
    pub fn id(&self) -> String {
        match self.fields.get(keys::ID) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.insert(keys::ID, id.into());
    }

    /// Display name, empty when absent or not a string
    pub fn original_name(&self) -> &str {
        self.str_field(keys::ORIGINAL_NAME).unwrap_or_default()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.str_field(keys::MIME_TYPE).filter(|m| !m.is_empty())
    }

    /// MIME type, or the JPEG fallback for containers that lack one
    pub fn mime_or_default(&self) -> &str {
        self.mime_type().unwrap_or(DEFAULT_MIME_TYPE)
    }

    /// Plaintext length; numeric strings are accepted
    pub fn size(&self) -> Option<u64> {
        match self.fields.get(keys::SIZE)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn encrypted_at(&self) -> Option<DateTime<Utc>> {
        self.time_field(keys::ENCRYPTED_AT)
    }

    pub fn upload_date(&self) -> Option<DateTime<Utc>> {
        self.time_field(keys::UPLOAD_DATE)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.time_field(keys::UPDATED_AT)
    }

    /// Creation time shown in listings: `uploadDate`, else `encryptedAt`
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.upload_date().or_else(|| self.encrypted_at())
    }

    /// Tags in stored order. Missing or `null` on legacy containers means
    /// none; scalar entries are rendered as text, others are ignored.
    pub fn tags(&self) -> Vec<String> {
        let Some(Value::Array(items)) = self.fields.get(keys::TAGS) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Replace tags (normalized) and stamp `updatedAt`
    pub fn retag<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<Value> = normalize_tags(tags).into_iter().map(Value::from).collect();
        self.insert(keys::TAGS, Value::Array(tags));
        self.insert(keys::UPDATED_AT, timestamp(Utc::now()));
    }

    /// Case-insensitive exact tag match
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags().iter().any(|t| t.to_lowercase() == tag)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn time_field(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.str_field(key)?;
        DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
    }
}

/// `toISOString()` shape: UTC, millisecond precision, `Z` suffix
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trim, lowercase, drop empties and duplicates; first occurrence wins
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Parse a tag field as sent by forms: a JSON array, or a comma list
pub fn parse_tag_field(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => normalize_tags(tags),
        Err(_) => normalize_tags(raw.split(',')),
    }
}
