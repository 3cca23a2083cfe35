//! Logical file and content key types.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of a content key.
pub const MAX_CONTENT_KEY_LEN: usize = 64;

crate::uuid_id! {
    /// Identifier of a logical file.
    FileId
}

/// Opaque name of one immutable byte stream in the backend.
///
/// Keys are restricted to `[A-Za-z0-9_-]` so they can be used directly as
/// file names and object names.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey(String);

impl ContentKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse and validate a key.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() || s.len() > MAX_CONTENT_KEY_LEN {
            return Err(crate::Error::InvalidContentKey(format!(
                "length must be 1..={MAX_CONTENT_KEY_LEN}, got {}",
                s.len()
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::InvalidContentKey(format!(
                "unsupported characters in {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentKey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, user-visible file. Several logical files may share one content key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalFile {
    pub id: FileId,
    pub name: String,
    /// Suffix of `name` starting at its last dot, or empty.
    pub extension: String,
    pub size: u64,
    pub hash: ContentHash,
    pub content_key: ContentKey,
    pub is_dir: bool,
    /// Identity supplied by the authentication layer; 0 for anonymous uploads.
    pub uploader_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Derive a file extension from a display name.
///
/// Returns the suffix beginning at the final `.` of the last path element,
/// dot included, or an empty string when there is none.
pub fn file_extension(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) => base[idx..].to_string(),
        None => String::new(),
    }
}
