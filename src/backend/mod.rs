// Text detection backend trait and shared types

use serde::Serialize;
use thiserror::Error;

pub mod cloud_text;
pub mod local_engine;
pub mod vision_model;

/// One piece of text a backend read off the photo.
#[derive(Debug, Clone, Serialize)]
pub struct RawDetection {
    pub text: String,
    pub backend_confidence: f32,
    pub backend_name: &'static str,
}

/// Advisory region-of-interest hint from an upstream spine-segmentation
/// step, in fractional image coordinates (0-1). Backends may ignore hints;
/// every backend must work with none.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegionHint {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// The photo handed to a backend: the encoded bytes plus optional hints.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub hints: Vec<RegionHint>,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            hints: Vec::new(),
        }
    }

    pub fn with_hints(bytes: Vec<u8>, hints: Vec<RegionHint>) -> Self {
        Self { bytes, hints }
    }
}

/// Typed backend failure. The orchestrator only looks at the kind to decide
/// how to advance the chain; the messages are for the logs.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Missing or unusable configuration/credentials, or the service cannot
    /// be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out")]
    Timeout,

    #[error("backend rate limited")]
    RateLimited,

    #[error("backend authentication failed: {0}")]
    Auth(String),

    /// The backend answered, but with something we cannot use. Treated as
    /// zero detections by the orchestrator.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Kinds that may succeed again later in the same session; the others
    /// are terminal for their backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Timeout | BackendError::RateLimited)
    }

    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::Unavailable(_) => BackendErrorKind::Unavailable,
            BackendError::Timeout => BackendErrorKind::Timeout,
            BackendError::RateLimited => BackendErrorKind::RateLimited,
            BackendError::Auth(_) => BackendErrorKind::Auth,
            BackendError::MalformedResponse(_) => BackendErrorKind::MalformedResponse,
        }
    }
}

/// Message-free error discriminant kept in diagnostics records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    Unavailable,
    Timeout,
    RateLimited,
    Auth,
    MalformedResponse,
}

/// Diagnostic record of one backend attempt, retained per invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BackendOutcome {
    pub backend_name: &'static str,
    pub success: bool,
    pub detections: Vec<RawDetection>,
    pub error: Option<BackendErrorKind>,
}

/// Trait for detection backends that can read raw text from a photo.
#[allow(async_fn_in_trait)]
pub trait TextDetectionBackend {
    fn name(&self) -> &'static str;

    /// Run one single-shot detection pass over the photo.
    async fn detect(&self, image: &ImageInput) -> Result<Vec<RawDetection>, BackendError>;
}

/// Wrapper enum for the configured backend implementations.
/// This allows using backends polymorphically without dyn trait issues.
pub enum BackendAdapter {
    VisionModel(vision_model::VisionModelBackend),
    CloudText(cloud_text::CloudTextDetectionBackend),
    Local(local_engine::LocalTextRecognitionBackend),
}

impl TextDetectionBackend for BackendAdapter {
    fn name(&self) -> &'static str {
        match self {
            BackendAdapter::VisionModel(backend) => backend.name(),
            BackendAdapter::CloudText(backend) => backend.name(),
            BackendAdapter::Local(backend) => backend.name(),
        }
    }

    async fn detect(&self, image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
        match self {
            BackendAdapter::VisionModel(backend) => backend.detect(image).await,
            BackendAdapter::CloudText(backend) => backend.detect(image).await,
            BackendAdapter::Local(backend) => backend.detect(image).await,
        }
    }
}
