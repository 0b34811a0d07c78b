//! Content hashing and shingling for duplicate detection.
//!
//! The content hash is a SHA-256 digest over normalised title+text: equal
//! under trivial editorial changes (case, punctuation, whitespace) but not
//! under rewording. Shingles and MinHash signatures feed the near-duplicate
//! index, which catches the rewording case.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use sha2::{Digest, Sha256};

/// Shingle width in tokens.
pub const DEFAULT_SHINGLE_SIZE: usize = 3;

/// MinHash permutations.
pub const DEFAULT_NUM_PERMUTATIONS: usize = 128;

/// Stopwords dropped during normalisation (alongside tokens of length <= 2).
const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "are", "was", "were", "been", "being", "have", "has",
    "had", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "this", "that", "these", "those", "you", "she", "they", "him", "her", "them", "your", "his",
    "its", "our", "their",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Normalise text for hashing: lowercase, non-word characters to spaces,
/// collapsed whitespace, short tokens and stopwords dropped.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_alphanumeric() || c == '_' {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }

    cleaned
        .split_whitespace()
        .filter(|word| word.len() > 2 && !is_stopword(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest of normalised `title` + `text`.
pub fn content_hash(title: &str, text: &str) -> String {
    let combined = format!("{} {}", normalize_text(title), normalize_text(text));

    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    hex::encode(hasher.finalize())
}

/// K-shingles over the normalised text. Texts shorter than `k` tokens
/// produce a single shingle holding the whole normalised text.
pub fn shingles(text: &str, k: usize) -> HashSet<String> {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();

    if words.len() < k {
        let mut single = HashSet::new();
        single.insert(normalized);
        return single;
    }

    words.windows(k).map(|window| window.join(" ")).collect()
}

/// A MinHash signature: the per-permutation minima over a shingle set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    values: Vec<u64>,
}

impl MinHashSignature {
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Estimated Jaccard similarity: fraction of matching positions.
    pub fn jaccard(&self, other: &MinHashSignature) -> f64 {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return 0.0;
        }
        let matching = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / self.values.len() as f64
    }
}

/// Computes MinHash signatures with a fixed, deterministic permutation
/// family so signatures are comparable across runs.
pub struct MinHasher {
    params: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_permutations: usize) -> Self {
        let params = (0..num_permutations as u64)
            .map(|i| {
                // Multiplier must be odd to permute the full 2^64 ring
                let a = splitmix64(i.wrapping_mul(2)) | 1;
                let b = splitmix64(i.wrapping_mul(2).wrapping_add(1));
                (a, b)
            })
            .collect();
        Self { params }
    }

    pub fn num_permutations(&self) -> usize {
        self.params.len()
    }

    /// Signature over title+text, shingled at the default width.
    pub fn signature_for(&self, title: &str, text: &str) -> MinHashSignature {
        let combined = format!("{} {}", title, text);
        self.signature(&shingles(&combined, DEFAULT_SHINGLE_SIZE))
    }

    pub fn signature(&self, shingles: &HashSet<String>) -> MinHashSignature {
        let mut values = vec![u64::MAX; self.params.len()];

        for shingle in shingles {
            let base = base_hash(shingle);
            for (i, (a, b)) in self.params.iter().enumerate() {
                let permuted = a.wrapping_mul(base).wrapping_add(*b);
                if permuted < values[i] {
                    values[i] = permuted;
                }
            }
        }

        MinHashSignature { values }
    }
}

fn base_hash(shingle: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    shingle.hash(&mut hasher);
    hasher.finish()
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_stopwords_and_short_tokens() {
        assert_eq!(
            normalize_text("The Lakers ARE on a win streak!"),
            "lakers win streak"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_punctuation() {
        assert_eq!(
            normalize_text("Trade   deadline... approaching-fast"),
            "trade deadline approaching fast"
        );
    }

    #[test]
    fn test_content_hash_stable_under_formatting() {
        let a = content_hash("Lakers Win!", "The Lakers beat the Warriors.");
        let b = content_hash("LAKERS WIN", "the lakers   beat the warriors");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs_on_rewording() {
        let a = content_hash("Lakers Win", "The Lakers beat the Warriors.");
        let b = content_hash("Lakers Win", "The Warriors beat the Lakers.");
        assert_ne!(a, b);
    }

    #[test]
    fn test_shingles_basic() {
        let s = shingles("lakers guard scores forty points tonight", 3);
        assert!(s.contains("lakers guard scores"));
        assert!(s.contains("scores forty points"));
    }

    #[test]
    fn test_shingles_short_text_single_shingle() {
        let s = shingles("lakers win", 3);
        assert_eq!(s.len(), 1);
        assert!(s.contains("lakers win"));
    }

    #[test]
    fn test_minhash_identical_texts_identical_signatures() {
        let hasher = MinHasher::new(DEFAULT_NUM_PERMUTATIONS);
        let a = hasher.signature_for("Title", "some long article text about basketball games");
        let b = hasher.signature_for("Title", "some long article text about basketball games");
        assert_eq!(a, b);
        assert_eq!(a.jaccard(&b), 1.0);
    }

    #[test]
    fn test_minhash_similar_texts_high_jaccard() {
        let hasher = MinHasher::new(DEFAULT_NUM_PERMUTATIONS);
        let base = "lakers defeated warriors overtime thriller arena monday night james led \
                    lakers points assists while curry scored points warriors losing effort game \
                    tied regulation before lakers outscored warriors extra period secure victory";
        let near = base.replace("monday", "tuesday");
        let a = hasher.signature(&shingles(base, 3));
        let b = hasher.signature(&shingles(&near, 3));
        assert!(a.jaccard(&b) > 0.7, "jaccard was {}", a.jaccard(&b));
    }

    #[test]
    fn test_minhash_different_texts_low_jaccard() {
        let hasher = MinHasher::new(DEFAULT_NUM_PERMUTATIONS);
        let a = hasher.signature(&shingles(
            "lakers defeated warriors overtime thriller crypto arena",
            3,
        ));
        let b = hasher.signature(&shingles(
            "yankees pitching rotation spring training notes bronx",
            3,
        ));
        assert!(a.jaccard(&b) < 0.2, "jaccard was {}", a.jaccard(&b));
    }
}
