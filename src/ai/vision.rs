use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use super::client::{GenerativeModel, InlineImage};
use super::retry::{retry_with_backoff, RetryPolicy};
use crate::{
    error::AppError,
    images::{validate_image, ImageUpload},
};

pub const ANALYZE_PROMPT: &str = "You are looking at a photo of food ingredients. \
Identify every ingredient you can see and suggest up to three dishes that could be cooked with them. \
Reply with exactly two lines and nothing else:\n\
ingredients: <comma-separated ingredient names>\n\
suggestions: <comma-separated recipe names>";

const DEFAULT_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub ingredients: Vec<String>,
    pub confidence: f32,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
}

lazy_static! {
    static ref INGREDIENTS_RE: Regex =
        Regex::new(r"(?im)^[ \t*#>-]*ingredients[ \t*]*:[ \t*]*(.*)$").unwrap();
    static ref SUGGESTIONS_RE: Regex =
        Regex::new(r"(?im)^[ \t*#>-]*suggestions[ \t*]*:[ \t*]*(.*)$").unwrap();
    static ref CONFIDENCE_RE: Regex =
        Regex::new(r"(?im)^[ \t*#>-]*confidence[ \t*]*:[ \t*]*([0-9]*\.?[0-9]+)[ \t]*(%?)").unwrap();
}

/// Splits a comma/semicolon list, trimming punctuation and dropping case-insensitive repeats.
fn split_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw.split([',', ';']) {
        let item = item
            .trim()
            .trim_matches(|c: char| c == '*' || c == '.' || c == '"' || c == '`')
            .trim();
        if item.is_empty() {
            continue;
        }
        if out.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

fn capture_list(re: &Regex, text: &str) -> Vec<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| split_list(m.as_str()))
        .unwrap_or_default()
}

/// Reads the two-line answer; tolerates markdown decoration and extra lines.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AppError> {
    let ingredients = capture_list(&INGREDIENTS_RE, text);
    if ingredients.is_empty() {
        return Err(AppError::NoIngredientsDetected);
    }
    let suggestions = capture_list(&SUGGESTIONS_RE, text);

    let confidence = CONFIDENCE_RE
        .captures(text)
        .and_then(|c| {
            let value: f32 = c.get(1)?.as_str().parse().ok()?;
            let percent = c.get(2).is_some_and(|m| !m.as_str().is_empty());
            Some(if percent || value > 1.0 { value / 100.0 } else { value })
        })
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    Ok(AnalysisResult {
        ingredients,
        confidence,
        suggestions,
        recipe: None,
    })
}

/// Validates the upload, sends it to the model with the fixed prompt, and parses the answer.
/// Invalid uploads fail before any network call.
pub async fn analyze_image(
    model: &dyn GenerativeModel,
    policy: &RetryPolicy,
    img: &ImageUpload,
) -> Result<AnalysisResult, AppError> {
    validate_image(img)?;

    let inline = InlineImage {
        mime_type: img.content_type.clone(),
        data: STANDARD.encode(&img.body),
    };
    let inline = &inline;
    debug!(mime = %img.content_type, bytes = img.body.len(), "analyzing image");

    let text = retry_with_backoff(policy, move || model.generate(ANALYZE_PROMPT, Some(inline))).await?;
    let result = parse_analysis(&text)?;
    info!(
        ingredients = result.ingredients.len(),
        suggestions = result.suggestions.len(),
        "image analyzed"
    );
    Ok(result)
}
