// Vision-model backend: asks a hosted multimodal model to read spine titles

use super::{BackendError, ImageInput, RawDetection, TextDetectionBackend};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Value, json};

pub const VISION_API_KEY_ENV: &str = "SPINESCAN_VISION_API_KEY";

const BACKEND_NAME: &str = "vision_model";
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";

/// The model follows the JSON contract almost always; replies that need the
/// free-text fallback get a slightly lower confidence.
const JSON_REPLY_CONFIDENCE: f32 = 0.95;
const TEXT_REPLY_CONFIDENCE: f32 = 0.90;
const MAX_TEXT_REPLY_TITLES: usize = 30;

const EXTRACTION_PROMPT: &str = "You are analyzing a photo of DVD and Blu-ray cases on a shelf. \
Extract ALL visible movie titles from the spines. Read each spine top to bottom, include titles \
with vertical or partially obscured text, and ignore non-title text such as format logos, studio \
names, certifications and edition markings. Extract only what you can actually see. Return ONLY \
a JSON array of the visible titles, like [\"TITLE 1\", \"TITLE 2\"], with no other text.";

/// Reply lines starting with these are conversation, not titles.
const FILLER_PREFIXES: [&str; 12] = [
    "here", "the following", "movie", "title", "dvd", "blu-ray", "collection", "visible", "spine",
    "total", "count", "section",
];

/// Adapter for a hosted vision model speaking a messages-style HTTP API.
pub struct VisionModelBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl VisionModelBackend {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Result<Self, BackendError> {
        let api_key = std::env::var(VISION_API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            log::warn!("{} not set, vision model backend will be skipped", VISION_API_KEY_ENV);
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client init failed: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

impl TextDetectionBackend for VisionModelBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn detect(&self, image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
        let Some(api_key) = &self.api_key else {
            return Err(BackendError::Unavailable(format!(
                "{VISION_API_KEY_ENV} is not set"
            )));
        };

        let encoded = BASE64_STANDARD.encode(&image.bytes);
        let body = json!({
            "model": self.model,
            "max_tokens": 2048,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": encoded,
                        },
                    },
                    { "type": "text", "text": EXTRACTION_PROMPT },
                ],
            }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key.as_str())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::Auth(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!("HTTP {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let content = payload["content"][0]["text"].as_str().unwrap_or_default();
        if content.is_empty() {
            return Err(BackendError::MalformedResponse(
                "reply carried no text content".to_string(),
            ));
        }

        let detections = parse_reply(content);
        log::info!("vision model returned {} titles", detections.len());
        Ok(detections)
    }
}

/// Parse the model reply: the JSON array it was asked for, or free text as
/// a fallback when the model wrapped the answer in prose.
fn parse_reply(content: &str) -> Vec<RawDetection> {
    if let Some(titles) = extract_json_titles(content) {
        return titles
            .into_iter()
            .map(|title| RawDetection {
                text: title,
                backend_confidence: JSON_REPLY_CONFIDENCE,
                backend_name: BACKEND_NAME,
            })
            .collect();
    }

    log::warn!("vision model reply was not a JSON array, falling back to line parsing");
    content
        .lines()
        .filter_map(clean_reply_line)
        .take(MAX_TEXT_REPLY_TITLES)
        .map(|title| RawDetection {
            text: title,
            backend_confidence: TEXT_REPLY_CONFIDENCE,
            backend_name: BACKEND_NAME,
        })
        .collect()
}

/// Locate and parse a JSON string array inside the reply, tolerating
/// surrounding prose.
fn extract_json_titles(content: &str) -> Option<Vec<String>> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&content[start..=end]).ok()?;
    let items = value.as_array()?;

    let titles: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if titles.is_empty() { None } else { Some(titles) }
}

/// Strip list markers and quoting from one reply line; None when the line is
/// conversational filler rather than a title.
fn clean_reply_line(line: &str) -> Option<String> {
    let mut text = line.trim();
    text = text.trim_start_matches(['-', '*', '•']).trim_start();

    // "1. Title" style numbering.
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && text[digits..].starts_with('.') {
        text = text[digits + 1..].trim_start();
    }

    let text = text.trim_matches(['"', '\'', '`']);
    let len = text.chars().count();
    if len < 2 || len > 100 {
        return None;
    }
    if text.contains('[') || text.contains(']') {
        return None;
    }

    let lower = text.to_lowercase();
    if FILLER_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return None;
    }

    Some(text.to_string())
}
