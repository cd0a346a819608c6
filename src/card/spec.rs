//! The card specification accumulated by a session.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::catalog::{FontFamily, FontSize, FrameId, HolidayId, Resolution};

/// How the card background is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleMode {
    /// Let the model paint a scene from the holiday theme.
    #[default]
    Theme,
    /// Start from an uploaded reference image.
    Reference,
}

impl StyleMode {
    pub fn id(self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Reference => "reference",
        }
    }
}

/// Uploaded reference image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Raw image bytes
    #[serde(with = "super::base64_bytes")]
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), bytes }
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Typography for a single text field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: FontFamily,
    pub font_size: FontSize,
    /// Free-text color name passed to the model
    pub color: String,
    pub bold: bool,
    pub italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: FontFamily::Serif,
            font_size: FontSize::Medium,
            color: "Gold".to_string(),
            bold: false,
            italic: false,
        }
    }
}

impl TextStyle {
    /// Default style at the given size.
    pub fn sized(font_size: FontSize) -> Self {
        Self { font_size, ..Self::default() }
    }
}

/// The three text fields printed on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Sender,
    Recipient,
    Message,
}

impl TextField {
    pub fn id(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Recipient => "recipient",
            Self::Message => "message",
        }
    }
}

/// Structured description of a requested card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSpec {
    pub holiday: HolidayId,
    pub custom_holiday_name: String,
    pub style: StyleMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ReferenceImage>,
    pub strict_reference: bool,
    pub frame: FrameId,
    pub resolution: Resolution,
    /// Let the model pick typography; per-field styles are kept but ignored.
    pub auto_text_style: bool,
    pub sender: String,
    pub sender_style: TextStyle,
    pub recipient: String,
    pub recipient_style: TextStyle,
    pub message: String,
    pub message_style: TextStyle,
    /// Free-text edit request used when refining; empty means none
    pub refinement_instruction: String,
}

impl Default for CardSpec {
    fn default() -> Self {
        let holiday = HolidayId::default();
        Self {
            holiday,
            custom_holiday_name: String::new(),
            style: StyleMode::Theme,
            reference_image: None,
            strict_reference: false,
            frame: FrameId::None,
            resolution: Resolution::OneK,
            auto_text_style: false,
            sender: String::new(),
            sender_style: TextStyle::sized(FontSize::Small),
            recipient: String::new(),
            recipient_style: TextStyle::sized(FontSize::Medium),
            message: holiday.default_message().to_string(),
            message_style: TextStyle::sized(FontSize::Large),
            refinement_instruction: String::new(),
        }
    }
}

impl CardSpec {
    /// Style stored for a text field.
    pub fn style_for(&self, field: TextField) -> &TextStyle {
        match field {
            TextField::Sender => &self.sender_style,
            TextField::Recipient => &self.recipient_style,
            TextField::Message => &self.message_style,
        }
    }

    fn style_for_mut(&mut self, field: TextField) -> &mut TextStyle {
        match field {
            TextField::Sender => &mut self.sender_style,
            TextField::Recipient => &mut self.recipient_style,
            TextField::Message => &mut self.message_style,
        }
    }

    /// Custom occasion name as entered, when the holiday is custom and the
    /// name is not blank.
    pub fn custom_occasion(&self) -> Option<&str> {
        if self.holiday != HolidayId::Custom || self.custom_holiday_name.trim().is_empty() {
            return None;
        }
        Some(&self.custom_holiday_name)
    }

    /// Whether a reference image is attached.
    pub fn has_reference_image(&self) -> bool {
        self.reference_image.is_some()
    }

    /// Return a copy of this spec with one field replaced.
    ///
    /// Selecting a holiday also swaps the message for that holiday's default.
    pub fn with_field(&self, field: CardField) -> Self {
        let mut next = self.clone();
        next.apply(field);
        next
    }

    fn apply(&mut self, field: CardField) {
        match field {
            CardField::Holiday(holiday) => {
                self.holiday = holiday;
                self.message = holiday.default_message().to_string();
            }
            CardField::CustomHolidayName(name) => self.custom_holiday_name = name,
            CardField::Style(style) => self.style = style,
            CardField::ReferenceImage(image) => self.reference_image = image,
            CardField::StrictReference(strict) => self.strict_reference = strict,
            CardField::Frame(frame) => self.frame = frame,
            CardField::Resolution(resolution) => self.resolution = resolution,
            CardField::AutoTextStyle(auto) => self.auto_text_style = auto,
            CardField::Text(TextField::Sender, text) => self.sender = text,
            CardField::Text(TextField::Recipient, text) => self.recipient = text,
            CardField::Text(TextField::Message, text) => self.message = text,
            CardField::TextStyle(target, style) => *self.style_for_mut(target) = style,
            CardField::FontFamily(target, family) => self.style_for_mut(target).font_family = family,
            CardField::FontSize(target, size) => self.style_for_mut(target).font_size = size,
            CardField::Color(target, color) => self.style_for_mut(target).color = color,
            CardField::Bold(target, bold) => self.style_for_mut(target).bold = bold,
            CardField::Italic(target, italic) => self.style_for_mut(target).italic = italic,
            CardField::RefinementInstruction(text) => self.refinement_instruction = text,
        }
    }
}

/// A single field assignment on a `CardSpec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardField {
    Holiday(HolidayId),
    CustomHolidayName(String),
    Style(StyleMode),
    ReferenceImage(Option<ReferenceImage>),
    StrictReference(bool),
    Frame(FrameId),
    Resolution(Resolution),
    AutoTextStyle(bool),
    Text(TextField, String),
    TextStyle(TextField, TextStyle),
    FontFamily(TextField, FontFamily),
    FontSize(TextField, FontSize),
    Color(TextField, String),
    Bold(TextField, bool),
    Italic(TextField, bool),
    RefinementInstruction(String),
}

impl CardField {
    /// Path of the field this assignment targets, e.g. `sender.color`.
    pub fn path(&self) -> String {
        match self {
            Self::Holiday(_) => "holiday".to_string(),
            Self::CustomHolidayName(_) => "custom_holiday_name".to_string(),
            Self::Style(_) => "style".to_string(),
            Self::ReferenceImage(_) => "reference_image".to_string(),
            Self::StrictReference(_) => "strict_reference".to_string(),
            Self::Frame(_) => "frame".to_string(),
            Self::Resolution(_) => "resolution".to_string(),
            Self::AutoTextStyle(_) => "auto_text_style".to_string(),
            Self::Text(target, _) => target.id().to_string(),
            Self::TextStyle(target, _) => format!("{}.style", target.id()),
            Self::FontFamily(target, _) => format!("{}.font", target.id()),
            Self::FontSize(target, _) => format!("{}.size", target.id()),
            Self::Color(target, _) => format!("{}.color", target.id()),
            Self::Bold(target, _) => format!("{}.bold", target.id()),
            Self::Italic(target, _) => format!("{}.italic", target.id()),
            Self::RefinementInstruction(_) => "refinement_instruction".to_string(),
        }
    }

    /// Parse a `path=value` assignment from text.
    ///
    /// Reference images cannot be set from text; load them with
    /// `CardField::ReferenceImage` instead.
    pub fn parse(path: &str, value: &str) -> Result<Self, FieldParseError> {
        let path = path.trim();
        let invalid = |reason: String| FieldParseError::InvalidValue {
            path: path.to_string(),
            value: value.to_string(),
            reason,
        };

        let field = match path {
            "holiday" => Self::Holiday(value.parse().map_err(|e| invalid(format!("{e}")))?),
            "custom_holiday_name" | "custom_name" => Self::CustomHolidayName(value.to_string()),
            "style" => Self::Style(match value.trim().to_ascii_lowercase().as_str() {
                "theme" => StyleMode::Theme,
                "reference" => StyleMode::Reference,
                _ => return Err(invalid("expected 'theme' or 'reference'".to_string())),
            }),
            "strict_reference" | "strict" => Self::StrictReference(parse_bool(value).ok_or_else(
                || invalid("expected a boolean".to_string()),
            )?),
            "frame" => Self::Frame(value.parse().map_err(|e| invalid(format!("{e}")))?),
            "resolution" => Self::Resolution(value.parse().map_err(|e| invalid(format!("{e}")))?),
            "auto_text_style" | "auto_style" => Self::AutoTextStyle(
                parse_bool(value).ok_or_else(|| invalid("expected a boolean".to_string()))?,
            ),
            "refinement_instruction" | "instruction" => {
                Self::RefinementInstruction(value.to_string())
            }
            other => {
                let (target, attr) = match other.split_once('.') {
                    Some((target, attr)) => (target, Some(attr)),
                    None => (other, None),
                };
                let target = match target {
                    "sender" => TextField::Sender,
                    "recipient" => TextField::Recipient,
                    "message" => TextField::Message,
                    _ => return Err(FieldParseError::UnknownField(path.to_string())),
                };
                match attr {
                    None => Self::Text(target, value.to_string()),
                    Some("font" | "font_family") => Self::FontFamily(
                        target,
                        value.parse().map_err(|e| invalid(format!("{e}")))?,
                    ),
                    Some("size" | "font_size") => Self::FontSize(
                        target,
                        value.parse().map_err(|e| invalid(format!("{e}")))?,
                    ),
                    Some("color") => Self::Color(target, value.trim().to_string()),
                    Some("bold") => Self::Bold(
                        target,
                        parse_bool(value).ok_or_else(|| invalid("expected a boolean".to_string()))?,
                    ),
                    Some("italic") => Self::Italic(
                        target,
                        parse_bool(value).ok_or_else(|| invalid("expected a boolean".to_string()))?,
                    ),
                    Some(_) => return Err(FieldParseError::UnknownField(path.to_string())),
                }
            }
        };

        Ok(field)
    }

    /// Parse a single `path=value` string.
    pub fn parse_assignment(assignment: &str) -> Result<Self, FieldParseError> {
        let (path, value) = assignment
            .split_once('=')
            .ok_or_else(|| FieldParseError::MissingValue(assignment.to_string()))?;
        Self::parse(path, value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Errors from parsing a textual field assignment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldParseError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("invalid value '{value}' for {path}: {reason}")]
    InvalidValue { path: String, value: String, reason: String },

    #[error("expected path=value, got '{0}'")]
    MissingValue(String),
}
