//! Gateway-ready generation requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Resolution;

/// Which kind of generation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Paint a new card from text only.
    CreateFromText,
    /// Paint a new card on top of an uploaded reference image.
    CreateFromReference,
    /// Regenerate a previously generated card with edits.
    Edit,
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateFromText => write!(f, "create-from-text"),
            Self::CreateFromReference => write!(f, "create-from-reference"),
            Self::Edit => write!(f, "edit"),
        }
    }
}

/// One ordered piece of a prompt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptSegment {
    /// Prompt text.
    Text {
        text: String,
    },
    /// Inline image sent ahead of the text, e.g. a reference or prior card.
    Image {
        /// MIME type, e.g. `image/png`
        mime_type: String,
        /// Raw image bytes, base64 on the wire
        #[serde(with = "crate::card::base64_bytes")]
        data: Vec<u8>,
    },
}

impl PromptSegment {
    /// Text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image segment from raw bytes.
    pub fn image(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Image { mime_type: mime_type.into(), data }
    }

    /// Text content, `None` for images.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    /// Whether this segment carries an image.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

impl fmt::Debug for PromptSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.debug_struct("Text").field("text", text).finish(),
            Self::Image { mime_type, data } => f
                .debug_struct("Image")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Compiled representation of a card spec, ready for a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub mode: RequestMode,
    /// Ordered prompt parts; images come before text
    pub segments: Vec<PromptSegment>,
    /// Artifact being edited, for edit requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_artifact: Option<Uuid>,
    /// Aspect ratio, e.g. `3:4`
    pub aspect_hint: String,
    /// Requested output size
    pub quality_hint: Resolution,
}

impl GenerationRequest {
    /// All text segments joined by newlines.
    pub fn prompt_text(&self) -> String {
        self.segments.iter().filter_map(PromptSegment::as_text).collect::<Vec<_>>().join("\n")
    }

    /// Number of image segments.
    pub fn image_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_image()).count()
    }

    /// JSON view with image payloads replaced by their size.
    pub fn to_inspection_json(&self) -> serde_json::Value {
        let segments: Vec<serde_json::Value> = self
            .segments
            .iter()
            .map(|segment| match segment {
                PromptSegment::Text { text } => serde_json::json!({ "kind": "text", "text": text }),
                PromptSegment::Image { mime_type, data } => serde_json::json!({
                    "kind": "image",
                    "mime_type": mime_type,
                    "bytes": data.len(),
                }),
            })
            .collect();

        serde_json::json!({
            "mode": self.mode,
            "segments": segments,
            "prior_artifact": self.prior_artifact,
            "aspect_hint": self.aspect_hint,
            "quality_hint": self.quality_hint,
        })
    }
}
