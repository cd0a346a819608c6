//! Generated card images.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::CardSpec;

/// Raw image returned by a gateway, before the core wraps it.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), bytes }
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A generated card together with the spec that produced it.
///
/// Only created from a successful gateway call.
#[derive(Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub mime_type: String,
    #[serde(with = "super::base64_bytes")]
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Snapshot of the spec at compile time
    pub spec: CardSpec,
}

impl Artifact {
    pub(crate) fn from_generated(image: GeneratedImage, spec: CardSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: image.mime_type,
            bytes: image.bytes,
            created_at: Utc::now(),
            spec,
        }
    }

    /// Hex SHA-256 of the image bytes.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// File extension matching the MIME type.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }

    /// Download name, e.g. `Greeting_Card_christmas_2026-12-01.png`.
    pub fn suggested_file_name(&self) -> String {
        format!(
            "Greeting_Card_{}_{}.{}",
            self.spec.holiday.id(),
            self.created_at.format("%Y-%m-%d"),
            self.extension()
        )
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Artifact {}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}
