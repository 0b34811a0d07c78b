//! Multi-strategy HTML content extraction.
//!
//! Three methods run in order until one yields enough text: a
//! readability-style paragraph-density heuristic with metadata scraping, a
//! boilerplate-stripping densest-subtree pass, and a structural fallback
//! over common content selectors ending at `<body>`. Post-processing then
//! normalises the record: whitespace, title cleanup, language detection,
//! date parsing, content hashing, keyword tagging, and type classification.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::canonical::UrlCanonicalizer;
use crate::hasher;
use crate::keywords::{self, ENTITY_LEXICON};

/// Minimum extracted text length (characters) for a method to count.
const MIN_TEXT_CHARS: usize = 100;

/// Minimum paragraph length considered by the readability heuristic.
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Elements whose subtrees never contribute article text.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "form",
];

/// Structural fallback selectors, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".content",
    ".post-content",
    ".article-body",
    ".story-body",
    "#content",
];

/// Byline sources tried in order.
const BYLINE_SELECTORS: &[&str] = &[
    r#"meta[name="author"]"#,
    ".byline",
    ".author",
    ".writer",
    r#"[rel="author"]"#,
    ".post-author",
];

/// Publication-date sources tried in order.
const DATE_SELECTORS: &[&str] = &[
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="publishdate"]"#,
    r#"meta[name="date"]"#,
    "time[datetime]",
    ".publish-date",
    ".date",
    ".timestamp",
];

/// A fully post-processed article record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedContent {
    /// URL the page was requested as
    pub url: String,
    /// Canonical URL: normalised final URL, superseded by rel=canonical
    pub canonical_url: String,
    pub title: String,
    pub text: String,
    pub byline: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// ISO 639-1 language code
    pub language: String,
    pub word_count: usize,
    pub image_url: Option<String>,
    pub content_hash: String,
    pub sports_keywords: Vec<String>,
    /// Entity names grouped by lexicon partition
    pub entities: HashMap<String, Vec<String>>,
    pub content_type: String,
    pub extraction_method: String,
    pub success: bool,
    /// Per-method failure notes; diagnostic only, never persisted
    pub errors: Vec<String>,
}

struct RawExtraction {
    title: Option<String>,
    text: String,
    byline: Option<String>,
    published_raw: Option<String>,
}

pub struct ContentExtractor {
    canonicalizer: UrlCanonicalizer,
    whitespace: Regex,
    p_selector: Selector,
    a_selector: Selector,
    title_selector: Selector,
    h1_selector: Selector,
    body_selector: Selector,
    candidate_selector: Selector,
    content_selectors: Vec<Selector>,
    byline_selectors: Vec<Selector>,
    date_selectors: Vec<Selector>,
    og_title_selector: Selector,
    og_image_selector: Selector,
    img_selector: Selector,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor {
    pub fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("valid selector");

        Self {
            canonicalizer: UrlCanonicalizer::new(),
            whitespace: Regex::new(r"\s+").expect("valid whitespace regex"),
            p_selector: parse("p"),
            a_selector: parse("a"),
            title_selector: parse("title"),
            h1_selector: parse("h1"),
            body_selector: parse("body"),
            candidate_selector: parse("article, main, section, div"),
            content_selectors: CONTENT_SELECTORS.iter().map(|s| parse(s)).collect(),
            byline_selectors: BYLINE_SELECTORS.iter().map(|s| parse(s)).collect(),
            date_selectors: DATE_SELECTORS.iter().map(|s| parse(s)).collect(),
            og_title_selector: parse(r#"meta[property="og:title"]"#),
            og_image_selector: parse(r#"meta[property="og:image"]"#),
            img_selector: parse("img[src]"),
        }
    }

    /// Extract structured content from raw HTML. `final_url` (post-redirect)
    /// anchors canonicalisation and relative-link resolution.
    pub fn extract(&self, html: &str, url: &str, final_url: &str) -> ExtractedContent {
        let mut result = ExtractedContent {
            url: url.to_string(),
            ..ExtractedContent::default()
        };

        result.canonical_url = self.canonicalizer.canonicalize(final_url);
        if let Some(declared) = self.canonicalizer.canonical_from_html(html, final_url) {
            result.canonical_url = declared;
        }

        let document = Html::parse_document(html);

        let methods: [(&str, fn(&Self, &Html) -> Option<RawExtraction>); 3] = [
            ("readability", Self::readability_extract),
            ("density", Self::density_extract),
            ("structural", Self::structural_extract),
        ];

        let mut raw: Option<(String, RawExtraction)> = None;
        for (name, method) in methods {
            match method(self, &document) {
                Some(extraction) if extraction.text.chars().count() >= MIN_TEXT_CHARS => {
                    raw = Some((name.to_string(), extraction));
                    break;
                }
                Some(_) => result.errors.push(format!("{}: too little text", name)),
                None => result.errors.push(format!("{}: no content found", name)),
            }
        }

        let Some((method, extraction)) = raw else {
            result.errors.push("extraction_failed".to_string());
            return result;
        };

        result.extraction_method = method;
        self.post_process(&mut result, extraction, &document, final_url);
        result
    }

    fn post_process(
        &self,
        result: &mut ExtractedContent,
        extraction: RawExtraction,
        document: &Html,
        final_url: &str,
    ) {
        // Text: collapse whitespace between paragraphs but keep paragraph
        // breaks so structure survives for downstream scoring
        let text = extraction
            .text
            .split("\n\n")
            .map(|paragraph| self.collapse(paragraph))
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        result.word_count = text.split_whitespace().count();
        result.text = text;

        // Title: collapse, then strip the site-name suffix
        let mut title = self.collapse(extraction.title.as_deref().unwrap_or(""));
        for separator in [" - ", " | "] {
            if let Some(idx) = title.find(separator) {
                title.truncate(idx);
                title = title.trim_end().to_string();
                break;
            }
        }
        result.title = title;

        if result.title.is_empty() {
            result.errors.push("no_title".to_string());
            return;
        }

        result.byline = extraction.byline.map(|b| self.collapse(&b)).filter(|b| !b.is_empty());

        result.language = detect_language(&result.text);

        result.published_at = extraction
            .published_raw
            .as_deref()
            .and_then(parse_published_at);

        result.content_hash = hasher::content_hash(&result.title, &result.text);

        let combined = format!("{} {}", result.title, result.text);
        result.sports_keywords = keywords::extract_sports_keywords(&combined);
        result.entities = extract_entities(&combined);
        result.content_type = keywords::classify_content_type(&result.title, &result.text);

        result.image_url = self.extract_image(document, final_url);

        result.success = true;
        debug!(
            url = %result.url,
            method = %result.extraction_method,
            word_count = result.word_count,
            "Content extracted"
        );
    }

    /// Readability-style extraction: score candidate containers by the
    /// amount of paragraph text they hold, then take the winner's
    /// paragraphs. Ties go to the outermost container, whose paragraph set
    /// is identical.
    fn readability_extract(&self, document: &Html) -> Option<RawExtraction> {
        let mut best: Option<(usize, ElementRef)> = None;

        for candidate in document.select(&self.candidate_selector) {
            let score: usize = candidate
                .select(&self.p_selector)
                .map(|p| p.text().collect::<String>().trim().chars().count())
                .filter(|length| *length >= MIN_PARAGRAPH_CHARS)
                .sum();
            if score == 0 {
                continue;
            }
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }

        let (_, container) = best?;

        let text = container
            .select(&self.p_selector)
            .map(|p| p.text().collect::<String>())
            .map(|t| t.trim().to_string())
            .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.is_empty() {
            return None;
        }

        Some(RawExtraction {
            title: self.page_title(document),
            text,
            byline: self.first_match(document, &self.byline_selectors),
            published_raw: self.first_match(document, &self.date_selectors),
        })
    }

    /// Boilerplate-stripping extraction: among candidate containers, pick
    /// the subtree with the most non-link text.
    fn density_extract(&self, document: &Html) -> Option<RawExtraction> {
        let mut best: Option<(usize, ElementRef)> = None;

        for candidate in document.select(&self.candidate_selector) {
            let text = collect_text(candidate);
            let text_len = text.chars().count();
            if text_len < MIN_TEXT_CHARS {
                continue;
            }

            let link_len: usize = candidate
                .select(&self.a_selector)
                .map(|a| a.text().collect::<String>().chars().count())
                .sum();

            let score = text_len.saturating_sub(2 * link_len);
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }

        let (_, container) = best?;
        let text = collect_text(container);

        Some(RawExtraction {
            title: self.page_title(document),
            text,
            byline: None,
            published_raw: self.first_match(document, &self.date_selectors),
        })
    }

    /// Structural fallback: first common content selector with enough text,
    /// finally `<body>`.
    fn structural_extract(&self, document: &Html) -> Option<RawExtraction> {
        let mut text = None;

        for selector in &self.content_selectors {
            if let Some(element) = document.select(selector).next() {
                let candidate = collect_text(element);
                if candidate.chars().count() >= MIN_TEXT_CHARS {
                    text = Some(candidate);
                    break;
                }
            }
        }

        let text = match text {
            Some(text) => text,
            None => {
                let body = document.select(&self.body_selector).next()?;
                collect_text(body)
            }
        };

        let title = self.page_title(document).or_else(|| {
            self.first_text(document, &self.h1_selector)
        });

        Some(RawExtraction {
            title,
            text,
            byline: None,
            published_raw: None,
        })
    }

    fn page_title(&self, document: &Html) -> Option<String> {
        if let Some(meta) = document.select(&self.og_title_selector).next() {
            if let Some(content) = meta.value().attr("content") {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        self.first_text(document, &self.title_selector)
    }

    fn first_text(&self, document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// First match over a selector list: meta tags yield `content`,
    /// `<time>` yields `datetime`, anything else its text.
    fn first_match(&self, document: &Html, selectors: &[Selector]) -> Option<String> {
        for selector in selectors {
            if let Some(element) = document.select(selector).next() {
                let value = match element.value().name() {
                    "meta" => element.value().attr("content").map(str::to_string),
                    "time" => element
                        .value()
                        .attr("datetime")
                        .map(str::to_string)
                        .or_else(|| Some(element.text().collect::<String>())),
                    _ => Some(element.text().collect::<String>()),
                };
                if let Some(value) = value {
                    let trimmed = value.trim().to_string();
                    if !trimmed.is_empty() {
                        return Some(trimmed);
                    }
                }
            }
        }
        None
    }

    fn extract_image(&self, document: &Html, final_url: &str) -> Option<String> {
        let src = document
            .select(&self.og_image_selector)
            .next()
            .and_then(|meta| meta.value().attr("content").map(str::to_string))
            .or_else(|| {
                document
                    .select(&self.img_selector)
                    .next()
                    .and_then(|img| img.value().attr("src").map(str::to_string))
            })?;

        let base = Url::parse(final_url).ok()?;
        base.join(src.trim()).ok().map(|u| u.to_string())
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }
}

/// Collect text from a subtree, skipping boilerplate elements.
fn collect_text(element: ElementRef) -> String {
    let mut out = String::new();
    collect_text_into(element, &mut out);
    out.trim().to_string()
}

fn collect_text_into(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !BOILERPLATE_TAGS.contains(&child_element.value().name()) {
                collect_text_into(child_element, out);
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn extract_entities(text: &str) -> HashMap<String, Vec<String>> {
    let lowered = text.to_lowercase();
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();

    for (entity_type, entities) in ENTITY_LEXICON {
        for entity in *entities {
            if lowered.contains(&entity.to_lowercase()) {
                grouped
                    .entry(entity_type.to_string())
                    .or_default()
                    .push(entity.to_string());
            }
        }
    }

    grouped
}

fn detect_language(text: &str) -> String {
    match whatlang::detect(text) {
        Some(info) => iso_639_1(info.lang()).to_string(),
        None => "en".to_string(),
    }
}

fn iso_639_1(lang: whatlang::Lang) -> &'static str {
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

/// Parse a publication date: the fixed format list first, then loose
/// RFC 3339 / RFC 2822 fallbacks.
fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    debug!(raw = %raw, "Could not parse publication date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECAP_HTML: &str = r#"
    <html>
    <head>
        <title>Lakers Beat Warriors 120-115 in Overtime Thriller - Example Sports</title>
        <meta name="author" content="John Smith">
        <meta property="article:published_time" content="2024-01-15T22:30:00Z">
        <link rel="canonical" href="https://example.com/lakers-warriors-recap">
    </head>
    <body>
        <nav>Home | NBA | NFL | MLB</nav>
        <article>
            <h1>Lakers Beat Warriors 120-115 in Overtime Thriller</h1>
            <p>The Los Angeles Lakers defeated the Golden State Warriors 120-115 in an
            overtime thriller at the arena on Monday night. LeBron James led
            the Lakers with 35 points and 12 assists, while Stephen Curry scored
            42 points for the Warriors in the losing effort.</p>
            <p>The game was tied 110-110 at the end of regulation before the Lakers
            outscored the Warriors 10-5 in the extra period to secure the victory
            and the final score sealed the night.</p>
        </article>
        <footer>Copyright 2024</footer>
    </body>
    </html>
    "#;

    #[test]
    fn test_extracts_recap_article() {
        let extractor = ContentExtractor::new();
        let result = extractor.extract(
            RECAP_HTML,
            "https://example.com/lakers-warriors-game?utm_source=feed",
            "https://example.com/lakers-warriors-game",
        );

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.canonical_url, "https://example.com/lakers-warriors-recap");
        assert_eq!(result.title, "Lakers Beat Warriors 120-115 in Overtime Thriller");
        assert_eq!(result.byline.as_deref(), Some("John Smith"));
        assert!(result.text.contains("LeBron James led"));
        assert!(result.word_count > 50);
        assert_eq!(result.extraction_method, "readability");
        assert_eq!(result.content_type, "game_recap");
        assert!(result.published_at.is_some());
        assert_eq!(result.content_hash.len(), 64);
        assert!(result.entities.get("teams").is_some());
        assert_eq!(result.language, "en");
        assert_eq!(result.word_count, result.text.split_whitespace().count());
    }

    #[test]
    fn test_extraction_fails_on_thin_page() {
        let extractor = ContentExtractor::new();
        let result = extractor.extract(
            "<html><body><p>Too short.</p></body></html>",
            "https://example.com/thin",
            "https://example.com/thin",
        );

        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e == "extraction_failed"));
    }

    #[test]
    fn test_no_title_marks_failure() {
        let body: String = std::iter::repeat("plenty of words in this paragraph about a game with score updates. ")
            .take(10)
            .collect();
        let html = format!("<html><body><div>{}</div></body></html>", body);

        let extractor = ContentExtractor::new();
        let result = extractor.extract(&html, "https://example.com/x", "https://example.com/x");

        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e == "no_title"));
    }

    #[test]
    fn test_boilerplate_excluded_from_text() {
        let extractor = ContentExtractor::new();
        let result = extractor.extract(
            RECAP_HTML,
            "https://example.com/a",
            "https://example.com/a",
        );
        assert!(!result.text.contains("Copyright"));
        assert!(!result.text.contains("Home | NBA"));
    }

    #[test]
    fn test_title_site_suffix_stripped() {
        let extractor = ContentExtractor::new();
        let result = extractor.extract(RECAP_HTML, "https://example.com/a", "https://example.com/a");
        assert!(!result.title.contains("Example Sports"));
    }

    #[test]
    fn test_parse_published_at_formats() {
        assert!(parse_published_at("2024-01-15T22:30:00+00:00").is_some());
        assert!(parse_published_at("2024-01-15T22:30:00").is_some());
        assert!(parse_published_at("2024-01-15 22:30:00").is_some());
        assert!(parse_published_at("2024-01-15").is_some());
        assert!(parse_published_at("01/15/2024").is_some());
        assert!(parse_published_at("January 15, 2024").is_some());
        assert!(parse_published_at("Jan 15, 2024").is_some());
        assert!(parse_published_at("Mon, 15 Jan 2024 22:30:00 GMT").is_some());
        assert!(parse_published_at("not a date").is_none());
        assert!(parse_published_at("").is_none());
    }

    #[test]
    fn test_parse_published_at_utc_value() {
        let dt = parse_published_at("2024-01-15T22:30:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T22:30:00+00:00");
    }

    #[test]
    fn test_entities_grouped_by_type() {
        let grouped = extract_entities("LeBron James carried the Lakers past the NBA's best");
        assert!(grouped.get("players").unwrap().contains(&"LeBron James".to_string()));
        assert!(grouped.get("teams").unwrap().contains(&"Lakers".to_string()));
        assert!(grouped.get("leagues").unwrap().contains(&"NBA".to_string()));
    }
}
