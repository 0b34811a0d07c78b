//! Curated sports vocabulary: keyword sets, entity lexicon, content-type
//! classification table, and phrase indicators.
//!
//! These tables drive keyword tagging in the extractor, sports-relevance
//! scoring, and term extraction for trending detection. They are closed
//! sets; matching is case-insensitive substring over lowercased text.

/// Sport-partitioned keyword set used for relevance tagging.
pub const SPORTS_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "basketball",
        &["basketball", "nba", "wnba", "ncaa basketball", "march madness", "playoffs"],
    ),
    (
        "football",
        &["football", "nfl", "ncaa football", "college football", "super bowl"],
    ),
    (
        "baseball",
        &["baseball", "mlb", "world series", "playoffs", "spring training"],
    ),
    (
        "soccer",
        &["soccer", "mls", "fifa", "world cup", "premier league"],
    ),
    ("hockey", &["hockey", "nhl", "stanley cup", "playoffs"]),
    (
        "tennis",
        &["tennis", "wimbledon", "us open", "french open", "australian open"],
    ),
    ("golf", &["golf", "pga", "masters", "us open", "british open"]),
    (
        "olympics",
        &["olympics", "olympic games", "winter olympics", "summer olympics"],
    ),
];

/// Entity lexicon partitioned by type, used by term extraction.
pub const ENTITY_LEXICON: &[(&str, &[&str])] = &[
    (
        "teams",
        &[
            "Lakers", "Warriors", "Celtics", "Heat", "Bulls", "Knicks", "Patriots", "Cowboys",
            "Packers", "Steelers", "Chiefs", "49ers", "Yankees", "Dodgers", "Red Sox", "Giants",
            "Cubs", "Mets", "Rangers", "Bruins", "Blackhawks", "Penguins", "Kings", "Flyers",
        ],
    ),
    (
        "players",
        &[
            "LeBron James",
            "Stephen Curry",
            "Kevin Durant",
            "Giannis",
            "Tom Brady",
            "Patrick Mahomes",
            "Aaron Rodgers",
            "Josh Allen",
            "Mike Trout",
            "Shohei Ohtani",
            "Mookie Betts",
            "Aaron Judge",
            "Connor McDavid",
            "Sidney Crosby",
            "Alex Ovechkin",
        ],
    ),
    ("leagues", &["NBA", "NFL", "MLB", "NHL", "MLS", "NCAA"]),
    (
        "events",
        &[
            "Super Bowl",
            "World Series",
            "NBA Finals",
            "Stanley Cup",
            "March Madness",
            "NBA Draft",
            "NFL Draft",
            "Trade Deadline",
        ],
    ),
];

/// Content-type classification: first match in priority order wins.
pub const CONTENT_TYPE_PATTERNS: &[(&str, &[&str])] = &[
    (
        "game_recap",
        &["final score", "game recap", "box score", "highlights", "final:"],
    ),
    (
        "breaking_news",
        &["breaking:", "just in:", "report:", "sources:", "exclusive:"],
    ),
    (
        "analysis",
        &["analysis", "breakdown", "preview", "prediction", "outlook"],
    ),
    (
        "trade",
        &["trade", "traded", "acquired", "signs", "contract", "deal"],
    ),
    (
        "injury",
        &["injury", "injured", "hurt", "out for", "sidelined", "questionable"],
    ),
    (
        "roster",
        &["roster", "lineup", "starting", "bench", "depth chart"],
    ),
    (
        "interview",
        &["interview", "says", "speaks", "comments", "quotes"],
    ),
];

/// Fallback label when no content-type pattern matches.
pub const CONTENT_TYPE_GENERAL: &str = "general";

/// Words that mark a 2-3 word phrase as sports-relevant for term extraction.
pub const SPORTS_INDICATORS: &[&str] = &[
    "game",
    "match",
    "season",
    "player",
    "team",
    "coach",
    "trade",
    "injury",
    "score",
    "win",
    "loss",
    "championship",
    "playoff",
];

/// Classify title+text into a content-type label.
pub fn classify_content_type(title: &str, text: &str) -> String {
    let combined = format!("{} {}", title, text).to_lowercase();

    for (label, patterns) in CONTENT_TYPE_PATTERNS {
        if patterns.iter().any(|p| combined.contains(p)) {
            return label.to_string();
        }
    }

    CONTENT_TYPE_GENERAL.to_string()
}

/// Extract matched sports keywords from text, first-seen order, deduplicated.
pub fn extract_sports_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut found = Vec::new();

    for (_sport, keywords) in SPORTS_KEYWORDS {
        for keyword in *keywords {
            if lowered.contains(keyword) && !found.iter().any(|k| k == keyword) {
                found.push(keyword.to_string());
            }
        }
    }

    found
}
