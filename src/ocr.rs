//! OCR text-extraction provider abstraction and implementations.
//!
//! Defines the [`OcrProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns no text; used when OCR is not configured.
//! - **[`GoogleVisionProvider`]** — calls the Cloud Vision `images:annotate`
//!   endpoint with TEXT_DETECTION, with retry and backoff.
//!
//! The intake flow treats OCR as best-effort: [`extract_text`] returns
//! `None` on failure or empty detection so the caller degrades to manual
//! entry. Field parsing from the returned free text belongs to the caller.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s (capped at 2^3)

use anyhow::{bail, Result};
use base64::Engine;
use std::time::Duration;

use crate::config::OcrConfig;

/// Trait for OCR backends.
pub trait OcrProvider: Send + Sync {
    /// Provider identifier (e.g. `"google"`).
    fn name(&self) -> &str;
}

/// Extract free text from image bytes using the configured provider.
///
/// Returns `Ok(None)` when the provider is disabled, the image contains no
/// detectable text, or the extraction fails after retries: OCR failures
/// must degrade to manual entry, never to a hard error at the intake
/// boundary. The inner error is reported on stderr so an operator can see
/// why a form came back blank.
pub async fn extract_text(
    provider: &dyn OcrProvider,
    config: &OcrConfig,
    image_bytes: &[u8],
) -> Option<String> {
    if image_bytes.is_empty() {
        return None;
    }

    match config.provider.as_str() {
        "google" => match extract_google(config, image_bytes).await {
            Ok(text) => text.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                eprintln!("warning: OCR extraction failed ({}): {}", provider.name(), e);
                None
            }
        },
        _ => None,
    }
}

// ============ Disabled Provider ============

/// A no-op OCR provider. Every extraction yields `None`.
pub struct DisabledProvider;

impl OcrProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }
}

// ============ Google Cloud Vision Provider ============

/// OCR via the Cloud Vision `images:annotate` endpoint.
///
/// Requires the `GOOGLE_VISION_API_KEY` environment variable.
pub struct GoogleVisionProvider;

impl GoogleVisionProvider {
    pub fn new() -> Result<Self> {
        if std::env::var("GOOGLE_VISION_API_KEY").is_err() {
            bail!("GOOGLE_VISION_API_KEY environment variable not set");
        }
        Ok(Self)
    }
}

impl OcrProvider for GoogleVisionProvider {
    fn name(&self) -> &str {
        "google"
    }
}

async fn extract_google(config: &OcrConfig, image_bytes: &[u8]) -> Result<Option<String>> {
    let api_key = std::env::var("GOOGLE_VISION_API_KEY")
        .map_err(|_| anyhow::anyhow!("GOOGLE_VISION_API_KEY not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let content = base64::engine::general_purpose::STANDARD.encode(image_bytes);
    let body = serde_json::json!({
        "requests": [{
            "image": { "content": content },
            "features": [{ "type": "TEXT_DETECTION", "maxResults": 1 }]
        }]
    });

    let url = format!(
        "https://vision.googleapis.com/v1/images:annotate?key={}",
        api_key
    );

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s
            let delay = Duration::from_secs(1 << (attempt - 1).min(3));
            tokio::time::sleep(delay).await;
        }

        let resp = client.post(&url).json(&body).send().await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return Ok(parse_annotate_response(&json));
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("Vision API error {}: {}", status, body_text));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("Vision API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OCR failed after retries")))
}

/// Pull the full-text annotation out of the `images:annotate` response.
fn parse_annotate_response(json: &serde_json::Value) -> Option<String> {
    let first = json.get("responses")?.as_array()?.first()?;
    // fullTextAnnotation carries the whole detected block; the textAnnotations
    // fallback covers older response shapes
    if let Some(text) = first
        .get("fullTextAnnotation")
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
    {
        return Some(text.to_string());
    }
    first
        .get("textAnnotations")?
        .as_array()?
        .first()?
        .get("description")?
        .as_str()
        .map(|s| s.to_string())
}

/// Create the appropriate [`OcrProvider`] based on configuration.
pub fn create_provider(config: &OcrConfig) -> Result<Box<dyn OcrProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "google" => Ok(Box::new(GoogleVisionProvider::new()?)),
        other => bail!("Unknown OCR provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_text_annotation() {
        let json = serde_json::json!({
            "responses": [{
                "fullTextAnnotation": { "text": "Maya R.\n555-0132\nmug, blue glaze" }
            }]
        });
        assert_eq!(
            parse_annotate_response(&json).as_deref(),
            Some("Maya R.\n555-0132\nmug, blue glaze")
        );
    }

    #[test]
    fn test_parse_text_annotations_fallback() {
        let json = serde_json::json!({
            "responses": [{
                "textAnnotations": [{ "description": "bowl #7" }]
            }]
        });
        assert_eq!(parse_annotate_response(&json).as_deref(), Some("bowl #7"));
    }

    #[test]
    fn test_parse_empty_response() {
        let json = serde_json::json!({ "responses": [{}] });
        assert_eq!(parse_annotate_response(&json), None);
        assert_eq!(parse_annotate_response(&serde_json::json!({})), None);
    }

    #[tokio::test]
    async fn test_disabled_provider_yields_none() {
        let config = OcrConfig::default();
        let provider = create_provider(&config).unwrap();
        let text = extract_text(provider.as_ref(), &config, b"some image bytes").await;
        assert_eq!(text, None);
    }

    #[tokio::test]
    async fn test_empty_image_yields_none() {
        let config = OcrConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(extract_text(provider.as_ref(), &config, b"").await, None);
    }
}
