// Scoring and ordering of consolidated title clusters

use crate::consts::SUPPORT_BOOST;
use crate::dedup::CandidateCluster;
use serde::Serialize;
use uuid::Uuid;

/// One ranked title, ready for the caller (and optional enrichment lookup).
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub id: String,
    pub title: String,
    pub confidence: f32,
}

/// A cluster scores its best backend confidence, boosted a little for every
/// corroborating detection beyond the first, capped at 1.0.
fn score(cluster: &CandidateCluster) -> f32 {
    let boost = SUPPORT_BOOST * cluster.support_count.saturating_sub(1) as f32;
    (cluster.max_backend_confidence + boost).clamp(0.0, 1.0)
}

/// Order clusters by score (descending, ties keep first-seen order) and cap
/// the list so low-value tail candidates don't flood the caller.
pub fn rank(clusters: Vec<CandidateCluster>, max_results: usize) -> Vec<DetectionResult> {
    let mut scored: Vec<(f32, CandidateCluster)> =
        clusters.into_iter().map(|c| (score(&c), c)).collect();

    // sort_by is stable, so equal scores preserve first-seen order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(max_results);

    scored
        .into_iter()
        .map(|(confidence, cluster)| DetectionResult {
            id: Uuid::new_v4().to_string(),
            title: cluster.representative_text,
            confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawDetection;
    use crate::normalize::NormalizedCandidate;

    fn cluster_of(text: &str, confidence: f32, support: usize) -> CandidateCluster {
        let member = NormalizedCandidate {
            original: RawDetection {
                text: text.to_string(),
                backend_confidence: confidence,
                backend_name: "test",
            },
            normalized_text: text.to_string(),
        };
        CandidateCluster {
            representative_text: text.to_string(),
            members: vec![member],
            support_count: support,
            max_backend_confidence: confidence,
        }
    }

    #[test]
    fn corroboration_boosts_and_caps_the_score() {
        let results = rank(
            vec![cluster_of("GLORY", 0.7, 3), cluster_of("SNATCH", 0.95, 2)],
            15,
        );

        // 0.95 + 0.1 caps at 1.0, 0.7 + 2 * 0.1 = 0.9.
        assert_eq!(results[0].title, "SNATCH");
        assert!((results[0].confidence - 1.0).abs() < 1e-6);
        assert_eq!(results[1].title, "GLORY");
        assert!((results[1].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn confidences_are_monotonic_non_increasing() {
        let clusters = vec![
            cluster_of("A FEW GOOD MEN", 0.4, 1),
            cluster_of("SNATCH", 0.9, 1),
            cluster_of("GLORY", 0.6, 4),
            cluster_of("HEAT", 0.85, 1),
        ];
        let results = rank(clusters, 15);

        for pair in results.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let results = rank(
            vec![cluster_of("HEAT", 0.8, 1), cluster_of("GLORY", 0.8, 1)],
            15,
        );
        assert_eq!(results[0].title, "HEAT");
        assert_eq!(results[1].title, "GLORY");
    }

    #[test]
    fn result_list_is_capped() {
        let clusters: Vec<CandidateCluster> = (0..30)
            .map(|i| cluster_of(&format!("TITLE {i}"), 0.5, 1))
            .collect();
        assert_eq!(rank(clusters, 15).len(), 15);
    }

    #[test]
    fn results_carry_unique_ids() {
        let results = rank(
            vec![cluster_of("HEAT", 0.8, 1), cluster_of("GLORY", 0.7, 1)],
            15,
        );
        assert_ne!(results[0].id, results[1].id);
        assert!(!results[0].id.is_empty());
    }
}
