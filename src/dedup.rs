// Near-duplicate clustering for normalized title candidates

use crate::normalize::NormalizedCandidate;

/// A group of candidates judged to be the same title.
///
/// The representative is the first-seen member's text and is never replaced,
/// so a cluster's identity stays stable while corroboration accumulates.
#[derive(Debug, Clone)]
pub struct CandidateCluster {
    pub representative_text: String,
    pub members: Vec<NormalizedCandidate>,
    pub support_count: usize,
    pub max_backend_confidence: f32,
}

/// Normalized Levenshtein similarity in [0, 1], case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = strsim::levenshtein(&a, &b);
    1.0 - distance as f64 / max_len as f64
}

/// Greedy incremental clustering in candidate order: each candidate joins the
/// most similar existing cluster at or above `merge_threshold`, otherwise it
/// opens a new one. O(n * clusters), fine for the tens of detections one
/// photo yields.
pub fn cluster(
    candidates: Vec<NormalizedCandidate>,
    merge_threshold: f64,
) -> Vec<CandidateCluster> {
    let mut clusters: Vec<CandidateCluster> = Vec::new();

    for candidate in candidates {
        let mut best: Option<(usize, f64)> = None;
        for (index, existing) in clusters.iter().enumerate() {
            let score = similarity(&existing.representative_text, &candidate.normalized_text);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) if score >= merge_threshold => {
                let target = &mut clusters[index];
                target.support_count += 1;
                target.max_backend_confidence = target
                    .max_backend_confidence
                    .max(candidate.original.backend_confidence);
                target.members.push(candidate);
            }
            _ => clusters.push(CandidateCluster {
                representative_text: candidate.normalized_text.clone(),
                max_backend_confidence: candidate.original.backend_confidence,
                support_count: 1,
                members: vec![candidate],
            }),
        }
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawDetection;

    fn candidate(text: &str, confidence: f32) -> NormalizedCandidate {
        NormalizedCandidate {
            original: RawDetection {
                text: text.to_string(),
                backend_confidence: confidence,
                backend_name: "test",
            },
            normalized_text: text.to_string(),
        }
    }

    #[test]
    fn similarity_is_case_insensitive() {
        assert_eq!(similarity("SNATCH", "snatch"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn similarity_scales_with_edit_distance() {
        // One deletion out of 15 characters.
        let s = similarity("THE DARK KNIGHT", "the dark knght");
        assert!((s - (1.0 - 1.0 / 15.0)).abs() < 1e-9);
        assert!(similarity("SNATCH", "THE DARK KNIGHT") < 0.5);
    }

    #[test]
    fn near_duplicates_merge_into_one_cluster() {
        let clusters = cluster(
            vec![
                candidate("THE DARK KNIGHT", 0.9),
                candidate("the dark knght", 0.7),
                candidate("SNATCH", 0.8),
            ],
            0.85,
        );

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].representative_text, "THE DARK KNIGHT");
        assert_eq!(clusters[0].support_count, 2);
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[1].representative_text, "SNATCH");
        assert_eq!(clusters[1].support_count, 1);
    }

    #[test]
    fn representative_is_first_seen_and_confidence_is_max() {
        let clusters = cluster(
            vec![candidate("the dark knght", 0.6), candidate("THE DARK KNIGHT", 0.95)],
            0.85,
        );

        assert_eq!(clusters.len(), 1);
        // First-seen text stays the representative even though a later,
        // higher-confidence member joined.
        assert_eq!(clusters[0].representative_text, "the dark knght");
        assert!((clusters[0].max_backend_confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn output_representatives_stay_below_merge_threshold() {
        let threshold = 0.85;
        let clusters = cluster(
            vec![
                candidate("THE DARK KNIGHT", 0.9),
                candidate("the dark knght", 0.7),
                candidate("DARK KNIGHTS", 0.7),
                candidate("SNATCH", 0.8),
                candidate("SNACH", 0.8),
                candidate("GLORY", 0.8),
            ],
            threshold,
        );

        for (i, a) in clusters.iter().enumerate() {
            for b in clusters.iter().skip(i + 1) {
                assert!(
                    similarity(&a.representative_text, &b.representative_text) < threshold,
                    "clusters '{}' and '{}' are near-duplicates",
                    a.representative_text,
                    b.representative_text
                );
            }
        }
    }
}
