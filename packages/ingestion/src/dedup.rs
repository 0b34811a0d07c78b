//! Near-duplicate detection via MinHash locality-sensitive hashing.
//!
//! The index stores one MinHash signature per content hash and buckets each
//! signature into `bands` groups of `rows` values. Two documents whose
//! signatures collide in any band are reported as near-duplicates without a
//! pairwise scan. The band/row split is chosen to minimise the integrated
//! false-positive/false-negative error at the Jaccard threshold.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use tracing::{debug, info};

use crate::hasher::{MinHashSignature, MinHasher, DEFAULT_NUM_PERMUTATIONS};

/// Default Jaccard threshold above which content counts as a near-duplicate.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

pub struct NearDuplicateIndex {
    hasher: MinHasher,
    bands: usize,
    rows: usize,
    /// Per band: band-key -> content hashes bucketed there
    buckets: Vec<HashMap<u64, Vec<String>>>,
    /// Every live LSH entry has a record here (content hash -> signature)
    entries: HashMap<String, MinHashSignature>,
    insertion_order: VecDeque<String>,
    /// Querent content hash -> the existing hashes it duplicated
    duplicate_relations: HashMap<String, Vec<String>>,
    errors: u64,
}

impl Default for NearDuplicateIndex {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_NUM_PERMUTATIONS)
    }
}

impl NearDuplicateIndex {
    pub fn new(threshold: f64, num_permutations: usize) -> Self {
        let (bands, rows) = optimal_band_split(threshold, num_permutations);
        debug!(threshold, num_permutations, bands, rows, "Near-duplicate index initialized");

        Self {
            hasher: MinHasher::new(num_permutations),
            bands,
            rows,
            buckets: vec![HashMap::new(); bands],
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            duplicate_relations: HashMap::new(),
            errors: 0,
        }
    }

    /// Add content to the index. Returns true if the content is unique (and
    /// was inserted), false if a near-duplicate was found (nothing inserted;
    /// the duplicate relation is recorded for the querent).
    pub fn add(&mut self, content_hash: &str, title: &str, text: &str) -> bool {
        let signature = self.hasher.signature_for(title, text);

        let matches = self.query_signature(&signature);
        if !matches.is_empty() {
            info!(
                content_hash = %content_hash,
                matches = matches.len(),
                "Found near-duplicates for content"
            );
            self.duplicate_relations
                .insert(content_hash.to_string(), matches);
            return false;
        }

        self.insert_signature(content_hash, signature);
        true
    }

    /// Query without inserting.
    pub fn find(&self, title: &str, text: &str) -> Vec<String> {
        let signature = self.hasher.signature_for(title, text);
        self.query_signature(&signature)
    }

    /// Bound memory: drop the oldest entries until at most `max_entries`
    /// remain, by insertion order.
    pub fn evict_oldest(&mut self, max_entries: usize) {
        while self.entries.len() > max_entries {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            match self.entries.remove(&oldest) {
                Some(signature) => self.remove_from_buckets(&oldest, &signature),
                None => {
                    // Insertion order out of sync with the entry map
                    self.errors += 1;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        self.entries.contains_key(content_hash)
    }

    /// The existing content hashes a rejected querent duplicated.
    pub fn duplicates_of(&self, content_hash: &str) -> Option<&[String]> {
        self.duplicate_relations
            .get(content_hash)
            .map(|v| v.as_slice())
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }

    fn query_signature(&self, signature: &MinHashSignature) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for band in 0..self.bands {
            let key = self.band_key(signature, band);
            if let Some(bucket) = self.buckets[band].get(&key) {
                for hash in bucket {
                    if seen.insert(hash.clone()) {
                        matches.push(hash.clone());
                    }
                }
            }
        }

        matches
    }

    fn insert_signature(&mut self, content_hash: &str, signature: MinHashSignature) {
        for band in 0..self.bands {
            let key = self.band_key(&signature, band);
            self.buckets[band]
                .entry(key)
                .or_default()
                .push(content_hash.to_string());
        }

        self.entries.insert(content_hash.to_string(), signature);
        self.insertion_order.push_back(content_hash.to_string());
    }

    fn remove_from_buckets(&mut self, content_hash: &str, signature: &MinHashSignature) {
        for band in 0..self.bands {
            let key = self.band_key(signature, band);
            if let Some(bucket) = self.buckets[band].get_mut(&key) {
                bucket.retain(|h| h != content_hash);
                if bucket.is_empty() {
                    self.buckets[band].remove(&key);
                }
            }
        }
    }

    fn band_key(&self, signature: &MinHashSignature, band: usize) -> u64 {
        let start = band * self.rows;
        let slice = &signature.values()[start..start + self.rows];
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        slice.hash(&mut hasher);
        hasher.finish()
    }
}

/// Pick the band/row split whose banding curve best approximates a step at
/// `threshold`, by numerically integrating false-positive mass below the
/// threshold and false-negative mass above it.
fn optimal_band_split(threshold: f64, num_permutations: usize) -> (usize, usize) {
    const STEPS: usize = 100;

    let mut best = (1, num_permutations);
    let mut best_error = f64::MAX;

    for bands in 1..=num_permutations {
        let max_rows = num_permutations / bands;
        for rows in 1..=max_rows {
            let collision = |s: f64| 1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32);

            let false_positive = integrate(&collision, 0.0, threshold, STEPS);
            let false_negative = integrate(&|s| 1.0 - collision(s), threshold, 1.0, STEPS);
            let error = false_positive + false_negative;

            if error < best_error {
                best_error = error;
                best = (bands, rows);
            }
        }
    }

    best
}

fn integrate(f: &dyn Fn(f64) -> f64, lo: f64, hi: f64, steps: usize) -> f64 {
    let dx = (hi - lo) / steps as f64;
    (0..steps).map(|i| f(lo + (i as f64 + 0.5) * dx) * dx).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::content_hash;

    const ARTICLE: &str = "The Los Angeles Lakers defeated the Golden State Warriors 120-115 \
        in an overtime thriller at the arena on Monday night. LeBron James led the Lakers with \
        35 points and 12 assists while Stephen Curry scored 42 points for the Warriors in the \
        losing effort. The game was tied at the end of regulation before the Lakers outscored \
        the Warriors in the extra period to secure the victory.";

    #[test]
    fn test_unique_then_duplicate() {
        let mut index = NearDuplicateIndex::default();

        let hash_a = content_hash("Lakers beat Warriors", ARTICLE);
        assert!(index.add(&hash_a, "Lakers beat Warriors", ARTICLE));

        // Near-identical rewording: one word changed
        let reworded = ARTICLE.replace("Monday", "Tuesday");
        let hash_b = content_hash("Lakers beat Warriors", &reworded);
        assert!(!index.add(&hash_b, "Lakers beat Warriors", &reworded));

        assert_eq!(index.len(), 1);
        assert_eq!(index.duplicates_of(&hash_b), Some(&[hash_a][..]));
    }

    #[test]
    fn test_exact_repeat_is_duplicate() {
        let mut index = NearDuplicateIndex::default();
        let hash = content_hash("Title", ARTICLE);
        assert!(index.add(&hash, "Title", ARTICLE));
        assert!(!index.add(&hash, "Title", ARTICLE));
    }

    #[test]
    fn test_unrelated_content_is_unique() {
        let mut index = NearDuplicateIndex::default();
        index.add(&content_hash("a", ARTICLE), "Lakers beat Warriors", ARTICLE);

        let other = "The Yankees announced their starting pitching rotation for the opening \
            homestand in the Bronx, with the manager citing strong spring training numbers \
            from the bullpen and a healthy roster heading into the season.";
        assert!(index.add(&content_hash("b", other), "Yankees set rotation", other));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_find_does_not_insert() {
        let mut index = NearDuplicateIndex::default();
        let hash = content_hash("t", ARTICLE);
        index.add(&hash, "t", ARTICLE);

        let found = index.find("t", ARTICLE);
        assert_eq!(found, vec![hash]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_evict_oldest_by_insertion_order() {
        let mut index = NearDuplicateIndex::default();

        let texts = [
            "yankees announced their starting pitching rotation opening homestand bronx manager",
            "chiefs quarterback threw four touchdowns against division rivals sunday afternoon",
            "bruins goaltender recorded consecutive shutouts home winning streak continues tonight",
            "wimbledon seeds advanced straight sets opening round grass court conditions perfect",
            "dodgers bullpen collapsed ninth inning surrendering five runs blown save loss",
        ];

        let mut hashes = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let title = format!("headline number {}", i);
            let hash = content_hash(&title, text);
            assert!(index.add(&hash, &title, text));
            hashes.push(hash);
        }

        assert_eq!(index.len(), 5);
        index.evict_oldest(2);
        assert_eq!(index.len(), 2);
        assert!(!index.contains(&hashes[0]));
        assert!(!index.contains(&hashes[1]));
        assert!(!index.contains(&hashes[2]));
        assert!(index.contains(&hashes[3]));
        assert!(index.contains(&hashes[4]));
    }

    #[test]
    fn test_band_split_covers_permutations() {
        let (bands, rows) = optimal_band_split(0.8, 128);
        assert!(bands * rows <= 128);
        assert!(bands >= 1 && rows >= 1);
    }
}
