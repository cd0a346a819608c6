//! Card data model.
//!
//! `CardSpec` is what a session accumulates, `Artifact` is what a gateway
//! produces, and `catalog` holds the fixed option tables both refer to.

mod artifact;
pub mod catalog;
mod spec;

pub use artifact::{Artifact, GeneratedImage};
pub use catalog::{
    FontFamily, FontSize, FrameId, HolidayId, Resolution, UnknownOption, COLOR_OPTIONS,
};
pub use spec::{
    CardField, CardSpec, FieldParseError, ReferenceImage, StyleMode, TextField, TextStyle,
};

/// Serde adapter storing byte buffers as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
