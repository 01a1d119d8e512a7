// Raw detection cleanup and title plausibility checks

use crate::backend::RawDetection;
use crate::consts::{
    CERTIFICATION_TOKENS, EDITION_TOKENS, FORMAT_TOKENS, MAX_TITLE_CHARS, MIN_TITLE_CHARS,
    STOP_WORDS,
};

/// A raw detection together with its cleaned-up text.
#[derive(Debug, Clone)]
pub struct NormalizedCandidate {
    pub original: RawDetection,
    pub normalized_text: String,
}

fn is_allowed_char(c: char) -> bool {
    c.is_alphanumeric() || c == ' ' || matches!(c, '&' | ':' | '\'' | '-' | '.' | ',' | '(' | ')')
}

fn is_noise_token(token: &str) -> bool {
    let upper = token.to_uppercase();
    FORMAT_TOKENS.contains(&upper.as_str())
        || CERTIFICATION_TOKENS.contains(&upper.as_str())
        || EDITION_TOKENS.contains(&upper.as_str())
}

/// Clean one raw text line: disallowed characters become spaces, known
/// format/certification/edition tokens are dropped whole-word, whitespace is
/// collapsed. The result may be empty; callers must handle that.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .map(|c| if is_allowed_char(c) { c } else { ' ' })
        .collect();

    let kept: Vec<&str> = stripped
        .split_whitespace()
        .filter(|token| !is_noise_token(token))
        .collect();

    kept.join(" ")
}

/// Decide whether a normalized string could be a movie title. Intentionally
/// permissive: deduplication and ranking discard low-value candidates later,
/// a rejection here is final.
pub fn is_plausible_title(normalized: &str) -> bool {
    let len = normalized.chars().count();
    if len < MIN_TITLE_CHARS || len > MAX_TITLE_CHARS {
        return false;
    }
    // Covers purely numeric strings as well: product codes, prices, stray marks.
    if !normalized.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    if STOP_WORDS.contains(&normalized.to_uppercase().as_str()) {
        return false;
    }
    true
}

/// Normalize a batch of raw detections and keep the plausible ones.
pub fn normalize_detections(detections: Vec<RawDetection>) -> Vec<NormalizedCandidate> {
    detections
        .into_iter()
        .filter_map(|detection| {
            let normalized_text = normalize(&detection.text);
            if !is_plausible_title(&normalized_text) {
                log::debug!(
                    "Dropping implausible detection '{}' from {}",
                    detection.text,
                    detection.backend_name
                );
                return None;
            }
            Some(NormalizedCandidate {
                original: detection,
                normalized_text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawDetection {
        RawDetection {
            text: text.to_string(),
            backend_confidence: 0.9,
            backend_name: "test",
        }
    }

    #[test]
    fn strips_format_and_edition_tokens() {
        assert_eq!(normalize("BLU-RAY SPECIAL EDITION GLORY"), "GLORY");
        assert_eq!(normalize("GLADIATOR EXTENDED CUT DVD"), "GLADIATOR");
    }

    #[test]
    fn collapses_whitespace_and_disallowed_characters() {
        assert_eq!(normalize("  THE   DARK\tKNIGHT "), "THE DARK KNIGHT");
        assert_eq!(normalize("SE7EN [4K] *UHD*"), "SE7EN");
        assert_eq!(normalize("2001: A Space Odyssey"), "2001: A Space Odyssey");
    }

    #[test]
    fn noise_tokens_only_match_whole_words() {
        // "Cutthroat" contains "CUT" but must survive.
        assert_eq!(normalize("Cutthroat Island"), "Cutthroat Island");
        assert_eq!(normalize("Grease"), "Grease");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "BLU-RAY SPECIAL EDITION GLORY",
            "  THE   DARK KNIGHT ",
            "SE7EN [4K] *UHD*",
            "2001: A Space Odyssey",
            "",
            "###",
            "Director's Cut: Alien",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn normalize_may_return_empty() {
        assert_eq!(normalize("DVD BLU-RAY 4K"), "");
        assert_eq!(normalize("***"), "");
    }

    #[test]
    fn validator_rejects_numbers_and_fragments() {
        assert!(!is_plausible_title("7"));
        assert!(!is_plausible_title("1984 "));
        assert!(!is_plausible_title("12345"));
        assert!(!is_plausible_title("A"));
        assert!(!is_plausible_title(""));
        assert!(!is_plausible_title("("));
    }

    #[test]
    fn validator_rejects_stop_words_and_length_overflow() {
        assert!(!is_plausible_title("AND"));
        assert!(!is_plausible_title("with"));
        assert!(!is_plausible_title(&"A".repeat(121)));
        assert!(is_plausible_title(&"A".repeat(120)));
    }

    #[test]
    fn validator_accepts_ordinary_titles() {
        assert!(is_plausible_title("Up"));
        assert!(is_plausible_title("THE DARK KNIGHT"));
        assert!(is_plausible_title("2001: A Space Odyssey"));
        assert!(is_plausible_title("Se7en"));
    }

    #[test]
    fn batch_normalization_drops_rejected_detections() {
        let candidates = normalize_detections(vec![
            raw("THE DARK KNIGHT"),
            raw("7"),
            raw("DVD BLU-RAY"),
            raw("SNATCH"),
        ]);
        let texts: Vec<&str> = candidates
            .iter()
            .map(|c| c.normalized_text.as_str())
            .collect();
        assert_eq!(texts, ["THE DARK KNIGHT", "SNATCH"]);
    }
}
