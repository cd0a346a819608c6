//! Card spec to prompt compilation.
//!
//! Compilation is a pure function of the spec (and, for edits, the prior
//! artifact). The same input always yields the same request. Preconditions
//! such as a non-empty sender are enforced by the session before this runs.

use crate::card::{Artifact, CardSpec, FrameId, StyleMode, TextField, TextStyle};

use super::request::{GenerationRequest, PromptSegment, RequestMode};

/// Aspect ratio requested for every card.
pub const CARD_ASPECT_RATIO: &str = "3:4";

/// Atmosphere used in strict reference mode, regardless of holiday.
pub const STRICT_REFERENCE_ATMOSPHERE: &str = "STRICTLY follow the visual style, composition, lighting, and color palette of the provided reference image. Do not add new artistic interpretations or change the mood. The goal is to keep the original look of the reference image as closely as possible, serving effectively as a canvas for the text.";

/// Reference instruction when the model may adapt the image.
pub const REFERENCE_ADAPT_INSTRUCTION: &str = "Maintain the composition and color grading of the provided reference image, but adapt it to the requested holiday theme.";

/// Reference instruction in strict mode.
pub const REFERENCE_STRICT_INSTRUCTION: &str = "USE THE IMAGE EXACTLY AS IS. Do not alter the composition or style. Just add the requested text and frame.";

/// Edit instruction used when the user gave none.
pub const DEFAULT_EDIT_INSTRUCTION: &str = "Improve the composition and text visibility.";

const AUTO_TYPOGRAPHY_RULES: &str = "TYPOGRAPHY RULES:
- Automatically select the most aesthetic fonts, colors, and sizes that match the background and holiday atmosphere.
- Ensure high contrast and readability.
- FOR KOREAN TEXT (Hangul): Use high-quality Korean font styles (e.g., Serif/Myeongjo for elegance, Sans/Gothic for modern, Brush/Gungseo for traditional).
- FOR ENGLISH TEXT: Use matching fonts.
- Layout the text perfectly centered and balanced.";

const MANUAL_TYPOGRAPHY_RULES: &str = "TYPOGRAPHY RULES:
- Strictly follow the specific font, color, and size instructions provided for each text field.
- Layout the text elegantly on the card.";

const VISUAL_QUALITY: &str = "Visual Quality: Cinematic lighting, detailed texture, 8k resolution, professional photography style.";

const TEXT_QUALITY: &str = "Ensure the text is spelled correctly, uses the requested font styles, and is integrated naturally into the image composition.";

const MESSAGE_PLACEMENT: &str = "(Center this prominently)";
const RECIPIENT_PLACEMENT: &str = "(Place appropriately, typically above message)";
const SENDER_PLACEMENT: &str = "(Place at bottom)";

/// Compile a spec into a generation request.
///
/// With `prior` set the request is an edit of that artifact; otherwise it is a
/// fresh creation, from the reference image when the spec carries one in
/// reference mode.
pub fn compile(spec: &CardSpec, prior: Option<&Artifact>) -> GenerationRequest {
    let typography = typography_block(spec);

    let (mode, segments) = if let Some(prior) = prior {
        let prompt = edit_prompt(spec, &typography);
        (
            RequestMode::Edit,
            vec![
                PromptSegment::image(prior.mime_type.clone(), prior.bytes.clone()),
                PromptSegment::text(prompt),
            ],
        )
    } else if let (StyleMode::Reference, Some(reference)) = (spec.style, &spec.reference_image) {
        let adherence = if spec.strict_reference {
            REFERENCE_STRICT_INSTRUCTION
        } else {
            REFERENCE_ADAPT_INSTRUCTION
        };
        (
            RequestMode::CreateFromReference,
            vec![
                PromptSegment::image(reference.mime_type.clone(), reference.bytes.clone()),
                PromptSegment::text(format!("{}\n{adherence}", base_prompt(spec, &typography))),
            ],
        )
    } else {
        (RequestMode::CreateFromText, vec![PromptSegment::text(base_prompt(spec, &typography))])
    };

    GenerationRequest {
        mode,
        segments,
        prior_artifact: prior.map(|artifact| artifact.id),
        aspect_hint: CARD_ASPECT_RATIO.to_string(),
        quality_hint: spec.resolution,
    }
}

/// Scene description for the card background.
pub fn atmosphere(spec: &CardSpec) -> String {
    if spec.style == StyleMode::Reference && spec.strict_reference {
        return STRICT_REFERENCE_ATMOSPHERE.to_string();
    }

    match spec.custom_occasion() {
        Some(name) => format!(
            "A celebratory atmosphere specifically designed for '{name}'. Visual elements, colors, and lighting that perfectly represent '{name}'. High quality, elegant, aesthetically pleasing."
        ),
        None => spec.holiday.atmosphere().to_string(),
    }
}

/// Frame instruction, empty when the card has no frame.
pub fn frame_instruction(spec: &CardSpec) -> String {
    if spec.frame == FrameId::None {
        return String::new();
    }
    format!("Design Element: The card must have a {} perfectly centered.", spec.frame.description())
}

/// Instruction for one text field, empty when there is no text.
pub fn text_instruction(text: &str, style: &TextStyle, label: &str, auto_style: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    if auto_style {
        return format!("{label}: \"{text}\"");
    }

    let font = style.font_family.prompt_description();
    let details = [
        format!("Font Style: {font}"),
        format!("Color: {}", style.color),
        format!("Size: {}", style.font_size.id()),
        if style.bold { "Weight: Bold".to_string() } else { String::new() },
        if style.italic { "Style: Italic".to_string() } else { String::new() },
    ]
    .into_iter()
    .filter(|token| !token.is_empty())
    .collect::<Vec<_>>()
    .join(", ");

    format!("{label}: \"{text}\" [Typography: {details}]")
}

/// Per-field instructions in placement order: message, recipient, sender.
///
/// The recipient is `None` when no recipient was entered.
pub fn field_instructions(spec: &CardSpec) -> (String, Option<String>, String) {
    let auto = spec.auto_text_style;
    let message =
        text_instruction(&spec.message, spec.style_for(TextField::Message), "Main Message", auto);
    let recipient = (!spec.recipient.trim().is_empty()).then(|| {
        text_instruction(
            &format!("To {}", spec.recipient),
            spec.style_for(TextField::Recipient),
            "Recipient",
            auto,
        )
    });
    let sender = text_instruction(
        &format!("From {}", spec.sender),
        spec.style_for(TextField::Sender),
        "Sender",
        auto,
    );
    (message, recipient, sender)
}

/// Typography rules followed by the numbered text placements.
pub fn typography_block(spec: &CardSpec) -> String {
    let rules =
        if spec.auto_text_style { AUTO_TYPOGRAPHY_RULES } else { MANUAL_TYPOGRAPHY_RULES };
    let (message, recipient, sender) = field_instructions(spec);

    let placements = [
        (Some(message), MESSAGE_PLACEMENT),
        (recipient, RECIPIENT_PLACEMENT),
        (Some(sender), SENDER_PLACEMENT),
    ];

    let mut block = rules.to_string();
    let mut number = 0;
    for (instruction, placement) in placements {
        let Some(instruction) = instruction.filter(|i| !i.is_empty()) else {
            continue;
        };
        number += 1;
        block.push_str(&format!("\n{number}. {instruction} {placement}"));
    }
    block
}

fn base_prompt(spec: &CardSpec, typography: &str) -> String {
    let atmosphere = atmosphere(spec);
    let frame = frame_instruction(spec);

    let mut lines = vec![
        "Generate a high-quality greeting card image.".to_string(),
        format!("Style & Atmosphere: {}.", atmosphere.trim_end_matches('.')),
    ];
    if !frame.is_empty() {
        lines.push(frame);
    }
    lines.push(VISUAL_QUALITY.to_string());
    lines.push(typography.to_string());
    lines.push(TEXT_QUALITY.to_string());
    lines.join("\n")
}

fn edit_prompt(spec: &CardSpec, typography: &str) -> String {
    let instruction = spec.refinement_instruction.trim();
    let edit = if instruction.is_empty() {
        DEFAULT_EDIT_INSTRUCTION.to_string()
    } else {
        format!("Specific Edit Instruction: {instruction}")
    };

    format!(
        "Act as a professional photo editor and graphic designer.
I have provided an image of a greeting card. Please regenerate this card with the following adjustments:

{edit}

Strictly maintain the text content and typography as follows:
{typography}

Maintain the original style, lighting, and atmosphere of the input image unless explicitly told to change it.
Ensure the text is legible and beautiful."
    )
}
