//! Illustrative image generation for a news title.

use crate::imagegen::{ImageError, ImageGenerator};

/// Accent color shared by all generated illustrations.
const ACCENT_COLOR: &str = "#2563EB";

/// Fixed-style prompt: three simple icons, monochrome with one accent color,
/// no text anywhere in the image.
pub fn build_illustration_prompt(title: &str) -> String {
    format!(
        "Minimalist editorial illustration for a medical news item titled \"{title}\". \
         Exactly three simple flat icons representing the topic, monochrome dark gray on a \
         white background with {ACCENT_COLOR} as the single accent color. Clean lines, \
         generous spacing, no text, no letters, no numbers."
    )
}

pub async fn generate_illustration(
    imagegen: &dyn ImageGenerator,
    title: &str,
) -> Result<String, ImageError> {
    let prompt = build_illustration_prompt(title);
    imagegen.generate(&prompt).await
}
