//! Term extraction for trending detection.
//!
//! Three sources of terms: the item's sports keywords, the curated entity
//! lexicon, and significant 2-3 word phrases anchored by a sports
//! indicator word.

use ingestion::keywords::{ENTITY_LEXICON, SPORTS_INDICATORS};
use regex::Regex;

/// Stopwords that disqualify phrases and normalised terms.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "must", "can", "this", "that", "these", "those",
];

/// Minimum phrase length in characters.
const MIN_PHRASE_CHARS: usize = 6;

/// Minimum normalised term length in characters.
const MIN_TERM_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTerm {
    /// Term as it appeared
    pub term: String,
    /// Normalised tracking key
    pub normalized: String,
    /// teams | players | leagues | events | keyword | phrase
    pub term_type: String,
}

pub struct TermExtractor {
    non_word: Regex,
}

impl Default for TermExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TermExtractor {
    pub fn new() -> Self {
        Self {
            non_word: Regex::new(r"[^\w\s]").expect("valid non-word regex"),
        }
    }

    /// Extract (term, normalised, type) triples from one item.
    pub fn extract(&self, title: &str, text: &str, sports_keywords: &[String]) -> Vec<ExtractedTerm> {
        let mut terms = Vec::new();
        let combined = format!("{} {}", title, text).to_lowercase();

        for keyword in sports_keywords {
            if let Some(normalized) = self.normalize(keyword) {
                let term_type = self.classify(keyword);
                terms.push(ExtractedTerm {
                    term: keyword.clone(),
                    normalized,
                    term_type,
                });
            }
        }

        for (entity_type, entities) in ENTITY_LEXICON {
            for entity in *entities {
                if combined.contains(&entity.to_lowercase()) {
                    if let Some(normalized) = self.normalize(entity) {
                        terms.push(ExtractedTerm {
                            term: entity.to_string(),
                            normalized,
                            term_type: entity_type.to_string(),
                        });
                    }
                }
            }
        }

        let words: Vec<&str> = combined.split_whitespace().collect();
        for window in [2usize, 3] {
            for chunk in words.windows(window) {
                let phrase = chunk.join(" ");
                if !self.is_significant_phrase(&phrase) {
                    continue;
                }
                if let Some(normalized) = self.normalize(&phrase) {
                    terms.push(ExtractedTerm {
                        term: phrase,
                        normalized,
                        term_type: "phrase".to_string(),
                    });
                }
            }
        }

        terms
    }

    /// Normalise a term: lowercase, non-word chars to spaces, collapsed
    /// whitespace. Rejects short results and stopwords.
    pub fn normalize(&self, term: &str) -> Option<String> {
        let lowered = term.to_lowercase();
        let cleaned = self.non_word.replace_all(&lowered, " ");
        let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.chars().count() < MIN_TERM_CHARS || STOPWORDS.contains(&normalized.as_str()) {
            return None;
        }

        Some(normalized)
    }

    fn classify(&self, term: &str) -> String {
        let lowered = term.to_lowercase();
        for (entity_type, entities) in ENTITY_LEXICON {
            if entities.iter().any(|e| e.to_lowercase() == lowered) {
                return entity_type.to_string();
            }
        }

        if term.split_whitespace().count() == 1 {
            "keyword".to_string()
        } else {
            "phrase".to_string()
        }
    }

    fn is_significant_phrase(&self, phrase: &str) -> bool {
        let words: Vec<&str> = phrase.split_whitespace().collect();

        if words.iter().any(|word| STOPWORDS.contains(word)) {
            return false;
        }

        if phrase.chars().count() < MIN_PHRASE_CHARS {
            return false;
        }

        SPORTS_INDICATORS
            .iter()
            .any(|indicator| phrase.contains(indicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_short_and_stopwords() {
        let extractor = TermExtractor::new();
        assert_eq!(extractor.normalize("ab"), None);
        assert_eq!(extractor.normalize("the"), None);
        assert_eq!(extractor.normalize("Lakers!"), Some("lakers".to_string()));
        assert_eq!(
            extractor.normalize("  Trade   Deadline  "),
            Some("trade deadline".to_string())
        );
    }

    #[test]
    fn test_entities_classified_by_lexicon() {
        let extractor = TermExtractor::new();
        let terms = extractor.extract(
            "Lakers explore trade options",
            "The NBA trade deadline approaches as LeBron James weighs in.",
            &[],
        );

        let lakers = terms.iter().find(|t| t.normalized == "lakers").unwrap();
        assert_eq!(lakers.term_type, "teams");

        let lebron = terms.iter().find(|t| t.normalized == "lebron james").unwrap();
        assert_eq!(lebron.term_type, "players");

        let nba = terms.iter().find(|t| t.normalized == "nba").unwrap();
        assert_eq!(nba.term_type, "leagues");
    }

    #[test]
    fn test_phrases_need_sports_indicator() {
        let extractor = TermExtractor::new();
        let terms = extractor.extract("", "lakers trade rumors swirl as quarterly earnings rise", &[]);

        assert!(terms.iter().any(|t| t.normalized == "lakers trade"));
        assert!(!terms.iter().any(|t| t.normalized == "quarterly earnings"));
    }

    #[test]
    fn test_phrases_reject_stopwords() {
        let extractor = TermExtractor::new();
        let terms = extractor.extract("", "the trade was completed yesterday evening", &[]);
        assert!(!terms.iter().any(|t| t.normalized == "the trade"));
    }

    #[test]
    fn test_caller_keywords_included() {
        let extractor = TermExtractor::new();
        let terms = extractor.extract("title", "text", &["playoffs".to_string()]);
        let playoffs = terms.iter().find(|t| t.normalized == "playoffs").unwrap();
        assert_eq!(playoffs.term_type, "keyword");
    }
}
