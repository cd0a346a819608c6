//! Fixed option catalogs for cards.
//!
//! Every selector on a card (holiday, frame, font, size, resolution) is a closed
//! set. The prompt text attached to each option lives here so the compiler only
//! has to look it up.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a catalog id cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownOption {
    /// Which catalog was consulted
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
    /// Accepted ids, comma separated
    pub expected: String,
}

impl UnknownOption {
    fn new(kind: &'static str, value: &str, ids: &[&str]) -> Self {
        Self { kind, value: value.to_string(), expected: ids.join(", ") }
    }
}

/// Holiday or occasion the card is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayId {
    #[default]
    NewYear,
    LunarNewYear,
    Daeboreum,
    Chuseok,
    Christmas,
    /// Free-text occasion, see `CardSpec::custom_holiday_name`
    Custom,
}

impl HolidayId {
    /// All holidays in display order.
    pub const ALL: [Self; 6] = [
        Self::NewYear,
        Self::LunarNewYear,
        Self::Daeboreum,
        Self::Chuseok,
        Self::Christmas,
        Self::Custom,
    ];

    /// Stable id used in config, CLI flags and file names.
    pub fn id(self) -> &'static str {
        match self {
            Self::NewYear => "new_year",
            Self::LunarNewYear => "lunar_new_year",
            Self::Daeboreum => "daeboreum",
            Self::Chuseok => "chuseok",
            Self::Christmas => "christmas",
            Self::Custom => "custom",
        }
    }

    /// Human readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::NewYear => "New Year (1/1)",
            Self::LunarNewYear => "Lunar New Year",
            Self::Daeboreum => "Daeboreum",
            Self::Chuseok => "Chuseok",
            Self::Christmas => "Christmas",
            Self::Custom => "Custom / Other",
        }
    }

    /// Localized subtitle shown next to the name.
    pub fn sub_name(self) -> &'static str {
        match self {
            Self::NewYear => "새해",
            Self::LunarNewYear => "구정 (Seollal)",
            Self::Daeboreum => "정월대보름",
            Self::Chuseok => "추석",
            Self::Christmas => "크리스마스",
            Self::Custom => "직접 입력 (Birthday, etc.)",
        }
    }

    /// Scene description fed to the image model.
    pub fn atmosphere(self) -> &'static str {
        match self {
            Self::NewYear => {
                "Sunrise over a calm ocean, hopeful atmosphere, bright warm lighting, minimalist elegant design, 8k resolution."
            }
            Self::LunarNewYear => {
                "Traditional Korean aesthetics, Hanok architecture, Bokjumeoni (lucky bag), Dancheong patterns, elegant calligraphy vibe, warm festive lighting, soft bokeh."
            }
            Self::Daeboreum => {
                "Large bright full moon in a night sky, traditional Korean village at night, floating lanterns, mystical and serene atmosphere, dark blue and gold color palette."
            }
            Self::Chuseok => {
                "Autumn leaves, persimmons, golden rice fields, full moon, traditional Korean harvest festival mood, warm golden hour lighting, rich oranges and browns."
            }
            Self::Christmas => {
                "Christmas tree with glowing lights, snow falling outside a window, cozy fireplace, red and gold ornaments, low-key warm lighting, magical bokeh."
            }
            Self::Custom => "Celebratory atmosphere appropriate for the specific occasion.",
        }
    }

    /// Message pre-filled when the holiday is selected.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NewYear => "Happy New Year",
            Self::LunarNewYear => "새해 복 많이 받으세요",
            Self::Daeboreum => "소원 성취 하세요",
            Self::Chuseok => "풍요로운 한가위 되세요",
            Self::Christmas => "Merry Christmas",
            Self::Custom => "Congratulations",
        }
    }
}

/// Decorative border drawn around the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameId {
    #[default]
    None,
    Simple,
    Ornate,
    Floral,
    Festive,
    Polaroid,
}

impl FrameId {
    /// All frames in display order.
    pub const ALL: [Self; 6] =
        [Self::None, Self::Simple, Self::Ornate, Self::Floral, Self::Festive, Self::Polaroid];

    pub fn id(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Simple => "simple",
            Self::Ornate => "ornate",
            Self::Floral => "floral",
            Self::Festive => "festive",
            Self::Polaroid => "polaroid",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::None => "No Frame",
            Self::Simple => "Simple Gold",
            Self::Ornate => "Ornate / Royal",
            Self::Floral => "Floral",
            Self::Festive => "Festive",
            Self::Polaroid => "Polaroid Style",
        }
    }

    /// Border description fed to the image model.
    pub fn description(self) -> &'static str {
        match self {
            Self::None => "No border, edge-to-edge image.",
            Self::Simple => "A thin, elegant metallic gold line border around the edges.",
            Self::Ornate => {
                "A luxurious, intricate vintage corner frame design with swirls and classical detailing."
            }
            Self::Floral => {
                "A natural border made of soft flowers, leaves, and vines framing the image."
            }
            Self::Festive => {
                "A decorative border appropriate for the holiday (e.g. snowflakes for winter, clouds for new year)."
            }
            Self::Polaroid => "A vintage instant photo style with a thick white border at the bottom.",
        }
    }
}

/// Font family for a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    #[default]
    Serif,
    Sans,
    Brush,
    Handwritten,
    Calligraphy,
    Cursive,
}

impl FontFamily {
    pub const ALL: [Self; 6] = [
        Self::Serif,
        Self::Sans,
        Self::Brush,
        Self::Handwritten,
        Self::Calligraphy,
        Self::Cursive,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Serif => "serif",
            Self::Sans => "sans",
            Self::Brush => "brush",
            Self::Handwritten => "handwritten",
            Self::Calligraphy => "calligraphy",
            Self::Cursive => "cursive",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Serif => "Serif / Myeongjo (명조)",
            Self::Sans => "Sans / Gothic (고딕)",
            Self::Brush => "Brush / Gungseo (궁서)",
            Self::Handwritten => "Handwritten (손글씨)",
            Self::Calligraphy => "Calligraphy (캘리그라피)",
            Self::Cursive => "Cursive (필기체)",
        }
    }

    /// Style description fed to the image model.
    pub fn prompt_description(self) -> &'static str {
        match self {
            Self::Serif => "Elegant Serif or Korean Myeongjo style",
            Self::Sans => "Modern Sans-serif or Korean Gothic style",
            Self::Brush => "Traditional Ink Brush or Korean Gungseo style",
            Self::Handwritten => "Casual handwritten pen style",
            Self::Calligraphy => "Artistic fancy calligraphy",
            Self::Cursive => "Flowing cursive script",
        }
    }
}

/// Relative size of a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
    Huge,
}

impl FontSize {
    pub const ALL: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::Huge];

    pub fn id(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Huge => "huge",
        }
    }
}

/// Output resolution requested from the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub const ALL: [Self; 3] = [Self::OneK, Self::TwoK, Self::FourK];

    pub fn id(self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::OneK => "Standard",
            Self::TwoK => "High Quality",
            Self::FourK => "Ultra HD",
        }
    }
}

/// Named text colors offered by the picker: (label, prompt value).
///
/// Colors on a `TextStyle` stay free text; this list only seeds choices.
pub const COLOR_OPTIONS: [(&str, &str); 7] = [
    ("Black", "Black"),
    ("White", "White"),
    ("Gold", "Gold"),
    ("Red", "Dark Red"),
    ("Navy", "Navy Blue"),
    ("Green", "Dark Green"),
    ("Brown", "Dark Brown"),
];

macro_rules! catalog_parse {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = UnknownOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|option| option.id().eq_ignore_ascii_case(needle))
                    .ok_or_else(|| {
                        let ids: Vec<&str> = Self::ALL.iter().map(|option| option.id()).collect();
                        UnknownOption::new($kind, s, &ids)
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.id())
            }
        }
    };
}

catalog_parse!(HolidayId, "holiday");
catalog_parse!(FrameId, "frame");
catalog_parse!(FontFamily, "font family");
catalog_parse!(FontSize, "font size");
catalog_parse!(Resolution, "resolution");
