//! Prompt compilation.
//!
//! Turns a `CardSpec` into a `GenerationRequest`: an ordered list of text and
//! image segments plus aspect and quality hints.

mod compiler;
mod request;

pub use compiler::{
    atmosphere, compile, field_instructions, frame_instruction, text_instruction,
    typography_block, CARD_ASPECT_RATIO, DEFAULT_EDIT_INSTRUCTION, REFERENCE_ADAPT_INSTRUCTION,
    REFERENCE_STRICT_INSTRUCTION, STRICT_REFERENCE_ATMOSPHERE,
};
pub use request::{GenerationRequest, PromptSegment, RequestMode};
