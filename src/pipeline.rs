// Fallback orchestration across the configured detection backends

use crate::backend::{BackendError, BackendOutcome, ImageInput, RawDetection, TextDetectionBackend};
use crate::config::PipelineConfig;
use crate::rank::DetectionResult;
use crate::{dedup, normalize, rank};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline-level failure. Backend failures never surface here; they are
/// recorded per attempt in the report's outcomes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("pipeline cancelled")]
    Cancelled,
}

/// Everything one invocation produced: the ranked titles plus a per-backend
/// diagnostics record. An empty result list is a valid outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub results: Vec<DetectionResult>,
    pub outcomes: Vec<BackendOutcome>,
}

/// Shared cancellation flag; callers keep a clone and set it to abort the
/// run, including any in-flight backend call.
pub fn create_cancel_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    NotStarted,
    Attempting(usize),
    Succeeded,
    Exhausted,
}

/// Drives the backend fallback chain for one photo:
/// `NotStarted -> Attempting(i) -> {Succeeded | Attempting(i+1) | Exhausted}`.
///
/// Attempts are strictly sequential; detections from insufficient attempts
/// are kept and merged with later ones in a single deduplication pass, so a
/// partial first backend still contributes corroboration.
pub struct Pipeline {
    config: PipelineConfig,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, cancel: Arc<AtomicBool>) -> Self {
        Self { config, cancel }
    }

    pub async fn run<B: TextDetectionBackend>(
        &self,
        backends: &[B],
        image: ImageInput,
    ) -> Result<PipelineReport, PipelineError> {
        // Reject undecodable input up front; every backend would choke on it.
        image::load_from_memory(&image.bytes)
            .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;

        let deadline = Instant::now()
            + Duration::from_secs(self.config.overall_deadline_secs);

        let mut phase = Phase::NotStarted;
        let mut collected: Vec<RawDetection> = Vec::new();
        let mut outcomes: Vec<BackendOutcome> = Vec::new();

        for (index, backend) in backends.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Cancelled);
            }

            let Some(budget) = attempt_budget(deadline, self.config.backend_timeout_secs) else {
                log::warn!("overall deadline reached, skipping remaining backends");
                break;
            };

            transition(&mut phase, Phase::Attempting(index));
            log::info!(
                "trying backend '{}' ({} of {})",
                backend.name(),
                index + 1,
                backends.len()
            );

            let attempt = tokio::select! {
                outcome = tokio::time::timeout(budget, backend.detect(&image)) => {
                    outcome.unwrap_or(Err(BackendError::Timeout))
                }
                _ = wait_cancelled(&self.cancel) => {
                    return Err(PipelineError::Cancelled);
                }
            };

            match attempt {
                Ok(detections) => {
                    log::info!(
                        "backend '{}' returned {} detections",
                        backend.name(),
                        detections.len()
                    );
                    outcomes.push(BackendOutcome {
                        backend_name: backend.name(),
                        success: true,
                        detections: detections.clone(),
                        error: None,
                    });

                    let usable = attempt_candidate_count(detections.clone(), self.config.merge_threshold);
                    collected.extend(detections);

                    if usable >= self.config.min_sufficient {
                        transition(&mut phase, Phase::Succeeded);
                        break;
                    }
                    if usable > 0 {
                        log::info!(
                            "backend '{}' yielded {} of {} candidates, trying the next backend",
                            backend.name(),
                            usable,
                            self.config.min_sufficient
                        );
                    } else {
                        log::info!("backend '{}' yielded no usable candidates", backend.name());
                    }
                }
                Err(error) => {
                    if error.is_retryable() {
                        log::warn!("backend '{}' failed ({}), advancing", backend.name(), error);
                    } else {
                        log::warn!(
                            "backend '{}' failed terminally ({}), advancing",
                            backend.name(),
                            error
                        );
                    }
                    outcomes.push(BackendOutcome {
                        backend_name: backend.name(),
                        success: false,
                        detections: Vec::new(),
                        error: Some(error.kind()),
                    });
                }
            }
        }

        // One consolidation pass over everything every backend contributed.
        let candidates = normalize::normalize_detections(collected);
        let clusters = dedup::cluster(candidates, self.config.merge_threshold);
        let results = rank::rank(clusters, self.config.max_results);

        if phase != Phase::Succeeded {
            transition(&mut phase, Phase::Exhausted);
        }
        if results.is_empty() {
            // Valid outcome; the caller decides how to present "nothing found".
            log::info!("no titles survived validation and consolidation");
        }

        Ok(PipelineReport { results, outcomes })
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    log::debug!("pipeline state: {:?} -> {:?}", phase, next);
    *phase = next;
}

/// How many validated, deduplicated candidates one attempt produced on its
/// own. Decides sufficiency without touching the accumulated detections.
fn attempt_candidate_count(detections: Vec<RawDetection>, merge_threshold: f64) -> usize {
    let candidates = normalize::normalize_detections(detections);
    dedup::cluster(candidates, merge_threshold).len()
}

/// Time available for the next attempt: the per-backend timeout, clipped by
/// what is left of the overall deadline. None once the deadline passed.
fn attempt_budget(deadline: Instant, backend_timeout_secs: u64) -> Option<Duration> {
    let remaining = deadline.checked_duration_since(Instant::now())?;
    if remaining.is_zero() {
        return None;
    }
    Some(remaining.min(Duration::from_secs(backend_timeout_secs)))
}

async fn wait_cancelled(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_clipped_by_the_deadline() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let budget = attempt_budget(deadline, 20).unwrap();
        assert!(budget <= Duration::from_secs(5));

        let deadline = Instant::now() + Duration::from_secs(120);
        let budget = attempt_budget(deadline, 20).unwrap();
        assert_eq!(budget, Duration::from_secs(20));
    }

    #[test]
    fn budget_is_gone_after_the_deadline() {
        let deadline = Instant::now() - Duration::from_secs(1);
        assert!(attempt_budget(deadline, 20).is_none());
    }
}
