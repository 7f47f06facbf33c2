//! Sources, pages and discovered links.

use serde::{Deserialize, Serialize};

/// A data provider (e.g. a country's health authority) and the pages it publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    /// Source identity, e.g. "NZ"
    pub name: String,

    /// Pages to scrape, in configured order
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Source {
    pub fn new(name: impl Into<String>, urls: &[&str]) -> Self {
        Self {
            name: name.into(),
            pages: urls.iter().map(|u| Page::new(*u)).collect(),
        }
    }

    /// Pages that are switched on.
    pub fn active_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| p.enabled)
    }
}

/// A single page URL scraped for data file links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub url: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Page {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
        }
    }

    /// Stable key used to toggle a page, e.g. `NZ_public`.
    pub fn key(&self, source: &str) -> String {
        let category = if self.url.contains("public-hospitals") {
            "public"
        } else if self.url.contains("private-hospitals") {
            "private"
        } else if self.url.contains("declared-hospitals") {
            "declared"
        } else {
            self.url.rsplit('/').next().unwrap_or_default()
        };
        format!("{source}_{category}")
    }
}

/// A candidate data file link found on a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Absolute URL of the file
    pub target_url: String,

    /// Page the link was found on
    pub origin_page_url: String,

    /// Anchor text, trimmed
    pub display_text: String,
}

/// Maps `(source, page URL substring)` to a canonical file identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingRule {
    pub source: String,
    pub url_contains: String,
    pub name: String,
}

impl NamingRule {
    pub fn new(source: &str, url_contains: &str, name: &str) -> Self {
        Self {
            source: source.to_string(),
            url_contains: url_contains.to_string(),
            name: name.to_string(),
        }
    }

    fn matches(&self, source: &str, page_url: &str) -> bool {
        self.source == source && page_url.contains(&self.url_contains)
    }
}

/// Derive the canonical identity of the file persisted for `(source, page)`.
///
/// The first matching rule wins. Otherwise the name is built from the first
/// path segment mentioning "hospital", or the last non-empty segment.
pub fn file_identity(rules: &[NamingRule], source: &str, page_url: &str) -> String {
    if let Some(rule) = rules.iter().find(|r| r.matches(source, page_url)) {
        return rule.name.clone();
    }

    let path = url::Url::parse(page_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| page_url.split(['?', '#']).next().unwrap_or("").to_string());

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let segment = segments
        .iter()
        .find(|s| s.contains("hospital"))
        .or_else(|| segments.last())
        .copied()
        .unwrap_or("data");

    format!("{}_{}", source, title_case(&segment.replace('-', "_")))
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}
