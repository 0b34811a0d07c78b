//! The closed set of quality signals.
//!
//! Each signal maps (content, source) to a value in [0, 1] and carries a
//! fixed weight; the scorer combines them as a weighted sum. Dispatch is a
//! match over the kind, no open polymorphism.

use chrono::Utc;
use ingestion::ExtractedContent;
use regex::Regex;
use serde::Serialize;

use crate::common::Source;

/// Bumped when any signal formula changes; persisted alongside values so
/// recomputation is comparable.
pub const ALGORITHM_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    SourceReputation,
    Freshness,
    ContentDepth,
    TitleQuality,
    SportsRelevance,
    LanguageQuality,
}

impl SignalKind {
    pub fn all() -> [SignalKind; 6] {
        [
            SignalKind::SourceReputation,
            SignalKind::Freshness,
            SignalKind::ContentDepth,
            SignalKind::TitleQuality,
            SignalKind::SportsRelevance,
            SignalKind::LanguageQuality,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::SourceReputation => "source_reputation",
            SignalKind::Freshness => "freshness",
            SignalKind::ContentDepth => "content_depth",
            SignalKind::TitleQuality => "title_quality",
            SignalKind::SportsRelevance => "sports_relevance",
            SignalKind::LanguageQuality => "language_quality",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            SignalKind::SourceReputation => 0.25,
            SignalKind::Freshness => 0.15,
            SignalKind::ContentDepth => 0.20,
            SignalKind::TitleQuality => 0.15,
            SignalKind::SportsRelevance => 0.15,
            SignalKind::LanguageQuality => 0.10,
        }
    }
}

/// Compiled patterns shared by the signal computations.
pub struct SignalSet {
    clickbait: Regex,
    high_value: Vec<Regex>,
    medium_value: Vec<Regex>,
    low_value: Vec<Regex>,
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSet {
    pub fn new() -> Self {
        let clickbait_patterns = [
            r"\b(you won't believe|shocking|amazing|incredible)\b",
            r"\b(this will|you need to|must see|will blow your mind)\b",
            r"\b(number \d+ will|reason \d+ is|things? you)\b",
            r"\b(hate him|doctors hate|one weird trick)\b",
            r"^(\d+\s+(ways?|things?|reasons?|secrets?))",
            r"\b(gone wrong|gone right|what happens next)\b",
        ];
        let clickbait = Regex::new(&format!("(?i){}", clickbait_patterns.join("|")))
            .expect("valid clickbait regex");

        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid relevance regex"))
                .collect()
        };

        Self {
            clickbait,
            high_value: compile(&[
                r"\b(NBA|NFL|MLB|NHL|MLS|NCAA)\b",
                r"\b(Lakers|Warriors|Patriots|Cowboys|Yankees|Dodgers)\b",
                r"\b(LeBron|Brady|Mahomes|Curry|Judge|Ohtani)\b",
                r"\b(Super Bowl|World Series|NBA Finals|Stanley Cup)\b",
                r"\b(playoffs?|championship|finals?|draft)\b",
            ]),
            medium_value: compile(&[
                r"\b(basketball|football|baseball|hockey|soccer|tennis|golf)\b",
                r"\b(game|match|season|player|team|coach|trade)\b",
                r"\b(score|points?|goals?|runs?|yards?|stats?)\b",
                r"\b(injury|injured|contract|signing|free agent)\b",
            ]),
            low_value: compile(&[
                r"\b(sport|sports|athletic|competition|tournament)\b",
                r"\b(win|wins|won|lose|lost|victory|defeat)\b",
                r"\b(training|practice|workout|fitness)\b",
            ]),
        }
    }

    pub fn compute(&self, kind: SignalKind, content: &ExtractedContent, source: &Source) -> f64 {
        let value = match kind {
            SignalKind::SourceReputation => source_reputation(source),
            SignalKind::Freshness => freshness(content),
            SignalKind::ContentDepth => content_depth(content),
            SignalKind::TitleQuality => self.title_quality(content),
            SignalKind::SportsRelevance => self.sports_relevance(content),
            SignalKind::LanguageQuality => language_quality(content),
        };
        value.clamp(0.0, 1.0)
    }

    fn title_quality(&self, content: &ExtractedContent) -> f64 {
        let title = &content.title;
        if title.is_empty() {
            return 0.0;
        }

        let mut score: f64 = 1.0;

        // Length curve peaks at 40-80 characters
        let length = title.chars().count();
        if length < 20 {
            score *= 0.5;
        } else if length < 40 {
            score *= 0.7 + (length - 20) as f64 / 20.0 * 0.3;
        } else if length > 80 {
            score *= (1.0 - (length - 80) as f64 / 100.0).max(0.6);
        }

        if self.clickbait.is_match(title) {
            score *= 0.3;
        }

        if is_all_upper(title) && length > 10 {
            score *= 0.4;
        }

        let punct_count = title.chars().filter(|c| matches!(c, '!' | '?')).count();
        if punct_count > 2 {
            score *= 0.6;
        }

        if title.split_whitespace().count() < 3 {
            score *= 0.5;
        }

        // Bonus for title case, or a leading capital with the rest not
        // all-uppercase
        let first_upper = title.chars().next().map(char::is_uppercase).unwrap_or(false);
        let rest: String = title.chars().skip(1).collect();
        if is_title_case(title) || (first_upper && !is_all_upper(&rest)) {
            score *= 1.1;
        }

        score
    }

    fn sports_relevance(&self, content: &ExtractedContent) -> f64 {
        let combined = format!("{} {}", content.title, content.text);

        let mut score = (content.sports_keywords.len() as f64 * 0.1).min(0.4);

        let mut tier_hits = 0.0;
        for regex in &self.high_value {
            tier_hits += regex.find_iter(&combined).count() as f64 * 0.2;
        }
        for regex in &self.medium_value {
            tier_hits += regex.find_iter(&combined).count() as f64 * 0.1;
        }
        for regex in &self.low_value {
            tier_hits += regex.find_iter(&combined).count() as f64 * 0.05;
        }
        score += tier_hits.min(0.3);

        score += match content.content_type.as_str() {
            "game_recap" | "breaking_news" | "trade" | "injury" => 0.2,
            "analysis" | "interview" => 0.1,
            _ => 0.0,
        };

        score
    }
}

/// Every cased character is uppercase and at least one cased character
/// exists. A title of digits and punctuation only is not shouting.
fn is_all_upper(text: &str) -> bool {
    let mut has_cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

/// Title case: uppercase letters only start cased runs, lowercase letters
/// only continue them, and at least one cased character exists.
fn is_title_case(text: &str) -> bool {
    let mut has_cased = false;
    let mut prev_cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            if prev_cased {
                return false;
            }
            has_cased = true;
            prev_cased = true;
        } else if c.is_lowercase() {
            if !prev_cased {
                return false;
            }
            has_cased = true;
            prev_cased = true;
        } else {
            prev_cased = false;
        }
    }
    has_cased
}

fn source_reputation(source: &Source) -> f64 {
    let tier_score = match source.quality_tier {
        1 => 0.9,
        2 => 0.7,
        _ => 0.5,
    };
    source.reputation * 0.6 + tier_score * 0.3 + source.success_rate * 0.1
}

fn freshness(content: &ExtractedContent) -> f64 {
    let Some(published_at) = content.published_at else {
        return 0.3;
    };

    let age_hours = (Utc::now() - published_at).num_seconds() as f64 / 3600.0;
    (-age_hours.max(0.0) / 24.0).exp()
}

fn content_depth(content: &ExtractedContent) -> f64 {
    let word_count = content.word_count;
    let text = &content.text;

    // Length curve: thin under 300 words, peak at 2000, soft decay beyond
    let length_score = if word_count < 100 {
        0.1
    } else if word_count < 300 {
        word_count as f64 / 300.0 * 0.6
    } else if word_count <= 2000 {
        0.6 + (word_count - 300) as f64 / 1700.0 * 0.4
    } else {
        1.0 - ((word_count - 2000) as f64 / 5000.0).min(0.3)
    };

    let structure_score = structure(text, &content.title);
    let density_score = density(text);

    length_score * 0.5 + structure_score * 0.3 + density_score * 0.2
}

fn structure(text: &str, title: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 0.0;

    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| s.trim().chars().count() > 10)
        .count();
    if sentences >= 3 {
        score += 0.3;
    }

    let paragraphs = text
        .split("\n\n")
        .filter(|p| p.trim().chars().count() > 50)
        .count();
    if paragraphs >= 2 {
        score += 0.3;
    }

    if title.split_whitespace().count() >= 4 {
        score += 0.2;
    }

    // Quotes indicate original reporting
    if text.contains('"') || text.contains('\u{201c}') || text.contains('\u{201d}') {
        score += 0.2;
    }

    score.min(1.0)
}

fn density(text: &str) -> f64 {
    let words: Vec<String> = text.to_lowercase().split_whitespace().map(String::from).collect();
    if words.len() < 10 {
        return 0.0;
    }

    let unique: std::collections::HashSet<&String> = words.iter().collect();
    let ratio = unique.len() as f64 / words.len() as f64;

    ((ratio - 0.2) / 0.6).clamp(0.0, 1.0)
}

fn language_quality(content: &ExtractedContent) -> f64 {
    let text = &content.text;
    if text.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 1.0;

    match whatlang::detect(text) {
        Some(info) => {
            let detected = iso_code(info.lang());
            if detected == content.language {
                score *= info.confidence();
            } else {
                score *= 0.5;
            }
        }
        None => score *= 0.3,
    }

    if text.chars().count() < 50 {
        score *= 0.3;
    }

    // Replacement chars and classic mojibake sequences
    for issue in ["\u{fffd}", "\u{00e2}\u{20ac}\u{2122}", "\u{00e2}\u{20ac}\u{0153}"] {
        if text.contains(issue) {
            score *= 0.7;
            break;
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > 10 {
        let unique: std::collections::HashSet<&&str> = words.iter().collect();
        if (unique.len() as f64 / words.len() as f64) < 0.3 {
            score *= 0.5;
        }
    }

    score
}

fn iso_code(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;
    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Jpn => "ja",
        Lang::Cmn => "zh",
        Lang::Kor => "ko",
        Lang::Ara => "ar",
        Lang::Tur => "tr",
        Lang::Pol => "pl",
        Lang::Swe => "sv",
        other => other.code(),
    }
}
