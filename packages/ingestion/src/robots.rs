//! Robots.txt fetching, parsing, and cached compliance checks.
//!
//! The cache is keyed by `scheme://host/robots.txt` with a 24-hour TTL.
//! Anything other than a clean HTTP 200 fails open: the URL is treated as
//! allowed and nothing is cached, so the next check retries the fetch.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

/// How long a parsed robots.txt stays valid.
const CACHE_TTL_HOURS: i64 = 24;

/// Timeout for the robots.txt fetch itself.
const FETCH_TIMEOUT_SECS: u64 = 10;

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent (lowercase)
    rules: HashMap<String, AgentRules>,
    /// Rules for `*`
    default_rules: AgentRules,
    sitemaps: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        let mut in_rule_block = false;

        let mut flush = |agents: &mut Vec<String>, rules: &mut AgentRules, robots: &mut RobotsTxt| {
            for agent in agents.drain(..) {
                if agent == "*" {
                    robots.default_rules = rules.clone();
                } else {
                    robots.rules.insert(agent, rules.clone());
                }
            }
            *rules = AgentRules::default();
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group
                    if in_rule_block {
                        flush(&mut current_agents, &mut current_rules, &mut robots);
                        in_rule_block = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    in_rule_block = true;
                    if !value.is_empty() {
                        current_rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    in_rule_block = true;
                    if !value.is_empty() {
                        current_rules.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_rule_block = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        current_rules.crawl_delay = Some(delay);
                    }
                }
                "sitemap" => {
                    robots.sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        flush(&mut current_agents, &mut current_rules, &mut robots);
        robots
    }

    fn rules_for(&self, user_agent: &str) -> &AgentRules {
        let agent = user_agent.to_lowercase();
        self.rules
            .get(&agent)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|(name, _)| agent.contains(name.as_str()))
                    .map(|(_, rules)| rules)
            })
            .unwrap_or(&self.default_rules)
    }

    /// Check whether a path is allowed for a user-agent. Allow rules take
    /// precedence over disallow rules.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let rules = self.rules_for(user_agent);

        if rules.allow.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }

        !rules
            .disallow
            .iter()
            .any(|prefix| prefix == "/" || path.starts_with(prefix))
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let rules = self.rules_for(user_agent);
        rules
            .crawl_delay
            .or(self.default_rules.crawl_delay)
            .map(Duration::from_secs_f64)
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// TTL-cached robots.txt checker shared across a worker's fetch tasks.
pub struct RobotsChecker {
    client: reqwest::Client,
    cache: RwLock<HashMap<String, (RobotsTxt, DateTime<Utc>)>>,
}

impl RobotsChecker {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `url` may be fetched by `user_agent`. Consults the cache,
    /// fetching robots.txt on a miss. Fails open on any error.
    pub async fn can_fetch(&self, url: &str, user_agent: &str) -> bool {
        let Some((robots_url, path)) = robots_key(url) else {
            return true;
        };

        {
            let cache = self.cache.read().await;
            if let Some((robots, cached_at)) = cache.get(&robots_url) {
                if Utc::now() - *cached_at < chrono::Duration::hours(CACHE_TTL_HOURS) {
                    return robots.is_allowed(user_agent, &path);
                }
            }
        }

        match self
            .client
            .get(&robots_url)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                match response.text().await {
                    Ok(body) => {
                        let robots = RobotsTxt::parse(&body);
                        let allowed = robots.is_allowed(user_agent, &path);
                        self.cache
                            .write()
                            .await
                            .insert(robots_url, (robots, Utc::now()));
                        allowed
                    }
                    Err(e) => {
                        warn!(robots_url = %robots_url, error = %e, "Failed to read robots.txt body");
                        self.cache.write().await.remove(&robots_url);
                        true
                    }
                }
            }
            // Missing robots.txt (or any non-200) means everything is allowed
            Ok(_) => true,
            Err(e) => {
                warn!(robots_url = %robots_url, error = %e, "Failed to fetch robots.txt");
                self.cache.write().await.remove(&robots_url);
                true
            }
        }
    }

    /// Crawl delay for a URL's host, answered from cache only. Never makes
    /// a network call.
    pub async fn crawl_delay(&self, url: &str, user_agent: &str) -> Option<Duration> {
        let (robots_url, _) = robots_key(url)?;
        let cache = self.cache.read().await;
        let (robots, _) = cache.get(&robots_url)?;
        robots.crawl_delay(user_agent)
    }
}

fn robots_key(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let robots_url = format!("{}://{}/robots.txt", parsed.scheme(), authority);
    Some((robots_url, parsed.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPORTS_SITE_ROBOTS: &str = r#"
# robots for a scores site
User-agent: *
Disallow: /api/
Disallow: /account/
Crawl-delay: 3

User-agent: sportsmediabot
Disallow: /live/
Crawl-delay: 0.5

Sitemap: https://scores.example.com/sitemap-news.xml
Sitemap: https://scores.example.com/sitemap-teams.xml
    "#;

    #[test]
    fn test_parse_selects_agent_group() {
        let robots = RobotsTxt::parse(SPORTS_SITE_ROBOTS);

        // Unknown crawlers fall to the wildcard group
        assert!(!robots.is_allowed("OtherCrawler", "/api/v2/scores"));
        assert!(!robots.is_allowed("OtherCrawler", "/account/settings"));
        assert!(robots.is_allowed("OtherCrawler", "/nba/lakers-recap"));
        assert_eq!(
            robots.crawl_delay("OtherCrawler"),
            Some(Duration::from_secs(3))
        );

        assert_eq!(robots.sitemaps().len(), 2);
    }

    #[test]
    fn test_full_user_agent_string_matches_its_group() {
        let robots = RobotsTxt::parse(SPORTS_SITE_ROBOTS);
        let agent = "SportsMediaBot/1.0 (+https://sportsmedia.com/bot)";

        // The configured user-agent string contains the group token, and the
        // matched group replaces the wildcard rules rather than merging
        assert!(!robots.is_allowed(agent, "/live/game-7"));
        assert!(robots.is_allowed(agent, "/api/v2/scores"));
        assert_eq!(
            robots.crawl_delay(agent),
            Some(Duration::from_secs_f64(0.5))
        );
    }

    #[test]
    fn test_allow_takes_precedence_over_disallow() {
        let content = r#"
User-agent: *
Disallow: /scores/
Allow: /scores/final/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("SportsMediaBot", "/scores/live/4821"));
        assert!(robots.is_allowed("SportsMediaBot", "/scores/final/2024-03-01"));
    }

    #[test]
    fn test_agent_specific_blanket_block() {
        let content = r#"
User-agent: scraperbot
Disallow: /

User-agent: *
Disallow: /drafts/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("ScraperBot", "/nhl/standings"));
        assert!(robots.is_allowed("SportsMediaBot", "/nhl/standings"));
        assert!(!robots.is_allowed("SportsMediaBot", "/drafts/trade-grades"));
    }

    #[test]
    fn test_comment_only_robots_allows_everything() {
        let robots = RobotsTxt::parse("# cleared during site migration\n\n");

        assert!(robots.is_allowed("SportsMediaBot", "/nba/lakers-recap"));
        assert!(robots.crawl_delay("SportsMediaBot").is_none());
        assert!(robots.sitemaps().is_empty());
    }

    #[test]
    fn test_robots_key() {
        let (robots_url, path) = robots_key("https://example.com/nba/news?x=1").unwrap();
        assert_eq!(robots_url, "https://example.com/robots.txt");
        assert_eq!(path, "/nba/news");
    }

    #[tokio::test]
    async fn test_crawl_delay_never_fetches() {
        // An unreachable host: crawl_delay must answer None from the cold
        // cache without attempting the network
        let checker = RobotsChecker::new(reqwest::Client::new());
        let delay = checker
            .crawl_delay("https://nonexistent.invalid/page", "SportsMediaBot")
            .await;
        assert_eq!(delay, None);
    }

    #[tokio::test]
    async fn test_can_fetch_fails_open_when_fetch_fails() {
        // The robots fetch itself fails (unresolvable host): the URL is
        // treated as allowed and nothing is cached
        let checker = RobotsChecker::new(reqwest::Client::new());
        assert!(
            checker
                .can_fetch("https://nonexistent.invalid/nba/recap", "SportsMediaBot")
                .await
        );
    }
}
