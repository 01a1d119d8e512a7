// Cloud text-detection backend: document OCR over a REST endpoint

use super::{BackendError, ImageInput, RawDetection, TextDetectionBackend};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Value, json};

pub const CLOUD_API_KEY_ENV: &str = "SPINESCAN_CLOUD_OCR_API_KEY";

const BACKEND_NAME: &str = "cloud_text";
const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// The service reports no per-line confidence for full-text annotations, so
/// every line gets the same one.
const LINE_CONFIDENCE: f32 = 0.90;

/// Adapter for a cloud document-text-detection REST API.
pub struct CloudTextDetectionBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl CloudTextDetectionBackend {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Result<Self, BackendError> {
        let api_key = std::env::var(CLOUD_API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            log::warn!("{} not set, cloud text backend will be skipped", CLOUD_API_KEY_ENV);
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client init failed: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
        })
    }
}

impl TextDetectionBackend for CloudTextDetectionBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn detect(&self, image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
        let Some(api_key) = &self.api_key else {
            return Err(BackendError::Unavailable(format!(
                "{CLOUD_API_KEY_ENV} is not set"
            )));
        };

        let encoded = BASE64_STANDARD.encode(&image.bytes);
        let body = json!({
            "requests": [{
                "image": { "content": encoded },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION", "maxResults": 50 }],
                "imageContext": { "languageHints": ["en"] },
            }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key.as_str())])
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
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(BackendError::MalformedResponse(
                "endpoint rejected the request".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!("HTTP {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let detections = annotation_to_detections(&payload)?;
        log::info!("cloud text detection returned {} lines", detections.len());
        Ok(detections)
    }
}

/// Pull the full-text annotation out of the API reply and split it into one
/// detection per usable line.
fn annotation_to_detections(payload: &Value) -> Result<Vec<RawDetection>, BackendError> {
    let reply = payload["responses"]
        .get(0)
        .ok_or_else(|| BackendError::MalformedResponse("reply carried no responses".to_string()))?;

    if let Some(message) = reply["error"]["message"].as_str() {
        return Err(BackendError::MalformedResponse(message.to_string()));
    }

    let Some(full_text) = reply["fullTextAnnotation"]["text"].as_str() else {
        log::warn!("cloud text detection found no text in the photo");
        return Ok(Vec::new());
    };

    Ok(full_text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= 2 && !is_product_code(line))
        .map(|line| RawDetection {
            text: line.to_string(),
            backend_confidence: LINE_CONFIDENCE,
            backend_name: BACKEND_NAME,
        })
        .collect())
}

/// Spines often carry catalog numbers like "P12345" next to the title.
fn is_product_code(line: &str) -> bool {
    let mut chars = line.chars();
    chars.next() == Some('P') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_the_annotation_into_line_detections() {
        let payload = json!({
            "responses": [{
                "fullTextAnnotation": {
                    "text": "THE DARK KNIGHT\nSNATCH\nP12345\nX\n  GLORY  \n"
                }
            }]
        });

        let detections = annotation_to_detections(&payload).unwrap();
        let texts: Vec<&str> = detections.iter().map(|d| d.text.as_str()).collect();
        // Product codes and single characters are backend noise, not titles.
        assert_eq!(texts, ["THE DARK KNIGHT", "SNATCH", "GLORY"]);
        assert!(detections.iter().all(|d| d.backend_name == BACKEND_NAME));
    }

    #[test]
    fn missing_annotation_means_zero_detections() {
        let payload = json!({ "responses": [{}] });
        assert!(annotation_to_detections(&payload).unwrap().is_empty());
    }

    #[test]
    fn service_error_is_a_malformed_response() {
        let payload = json!({
            "responses": [{ "error": { "message": "image too large" } }]
        });
        let error = annotation_to_detections(&payload).unwrap_err();
        assert!(matches!(error, BackendError::MalformedResponse(_)));
    }

    #[test]
    fn empty_reply_is_a_malformed_response() {
        let payload = json!({ "responses": [] });
        assert!(annotation_to_detections(&payload).is_err());
    }

    #[test]
    fn product_codes_are_recognized() {
        assert!(is_product_code("P12345"));
        assert!(is_product_code("P9"));
        assert!(!is_product_code("PULP FICTION"));
        assert!(!is_product_code("12345"));
    }
}
