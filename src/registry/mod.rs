// src/registry/mod.rs
//! Roster of companies that are already publicly listed.
//!
//! The DART calendar mixes genuine IPO subscriptions with rights offerings
//! of firms that already trade; membership in this roster is what tells
//! them apart. The roster comes from the KIND (KRX) listed-corporation
//! download, is normalized once, and is cached for half a day; it changes
//! far too slowly to justify hammering the portal.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::dart::client::build_http_client;
use crate::extractors::tokenizer;
use crate::utils::error::FetchError;

const KIND_LISTED_URL: &str =
    "https://kind.krx.co.kr/corpgeneral/corpList.do?method=download&searchType=13";
pub const REGISTRY_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const REGISTRY_CACHE_KEY: &str = "listed";

// A KRX issue code is exactly six digits; on the downloaded table it sits
// in the cell right after the company name.
static ISSUE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}$").expect("Failed to compile ISSUE_CODE_RE"));

// Delimited variant of the same roster: "회사명,005930,..." on one line.
static DELIMITED_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^,]+?)\s*,\s*(\d{6})(?:\s*,|$)").expect("Failed to compile DELIMITED_ROW_RE")
});

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE"));

// Corporate-form noise that appears inconsistently between the calendar and
// the roster for the same company.
const CORPORATE_FORMS: [&str; 4] = ["주식회사", "유한회사", "(주)", "㈜"];

/// Canonical form of a company name for membership and identity checks:
/// corporate-form tokens removed, all whitespace removed, lowercased.
///
/// The calendar-side identity keys and the roster entries must go through
/// this same function or the exclusion step silently stops matching.
pub fn normalize_corp_name(name: &str) -> String {
    let mut text = name.trim().to_string();
    for form in CORPORATE_FORMS {
        text = text.replace(form, "");
    }
    WHITESPACE_RE.replace_all(&text, "").to_lowercase()
}

/// Source of the raw roster document. Implemented by the KIND client and by
/// in-memory fixtures in tests.
#[async_trait]
pub trait RegistryFetcher {
    async fn fetch_listed(&self) -> Result<String, FetchError>;
}

/// HTTP client for the KIND listed-corporation download (EUC-KR encoded).
pub struct KindRegistryClient {
    http: reqwest::Client,
}

impl KindRegistryClient {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: build_http_client()?,
        })
    }
}

#[async_trait]
impl RegistryFetcher for KindRegistryClient {
    async fn fetch_listed(&self) -> Result<String, FetchError> {
        tracing::info!("Fetching listed-corporation roster from KIND");
        let res = self.http.get(KIND_LISTED_URL).send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::error!("HTTP error status {} from {}", status, KIND_LISTED_URL);
            return Err(FetchError::Http(status));
        }
        // The portal serves EUC-KR without a charset header.
        let body = res.text_with_charset("euc-kr").await?;
        tracing::debug!("Downloaded roster document ({} bytes)", body.len());
        Ok(body)
    }
}

/// Pulls normalized company names out of the roster document.
///
/// Handles both observed shapes: the HTML table (where the tokenizer yields
/// one cell per line, so a name line is followed by a six-digit code line)
/// and a delimited dump ("name,005930,..."). Anything that matches neither
/// is skipped.
pub fn parse_listed_names(document: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let lines = tokenizer::html_to_lines(document);

    let mut prev: Option<&str> = None;
    for line in &lines {
        if let Some(caps) = DELIMITED_ROW_RE.captures(line) {
            let normalized = normalize_corp_name(&caps[1]);
            if !normalized.is_empty() {
                names.insert(normalized);
            }
            prev = None;
            continue;
        }

        if ISSUE_CODE_RE.is_match(line) {
            if let Some(name_line) = prev {
                let normalized = normalize_corp_name(name_line);
                if !normalized.is_empty() {
                    names.insert(normalized);
                }
            }
            prev = None;
            continue;
        }

        prev = Some(line);
    }

    names
}

/// The roster set plus the staleness side channel: `stale` means a refresh
/// failed and the previous cached set is being served.
#[derive(Debug, Clone)]
pub struct ListedSnapshot {
    pub names: HashSet<String>,
    pub stale: bool,
}

impl ListedSnapshot {
    pub fn contains(&self, corp_name: &str) -> bool {
        self.names.contains(&normalize_corp_name(corp_name))
    }
}

/// TTL-cached view over a [`RegistryFetcher`].
pub struct ListedRegistry<R> {
    fetcher: R,
    cache: TtlCache<&'static str, HashSet<String>>,
}

impl<R: RegistryFetcher> ListedRegistry<R> {
    pub fn new(fetcher: R) -> Self {
        Self::with_ttl(fetcher, REGISTRY_TTL)
    }

    pub fn with_ttl(fetcher: R, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: TtlCache::new(ttl),
        }
    }

    /// Returns the normalized roster, refreshing it when the TTL has lapsed.
    ///
    /// A refresh failure falls back to the stale cached set (`stale: true`)
    /// rather than propagating; only when no roster has ever been fetched
    /// does the error surface, and the orchestrator then degrades to
    /// skip-filtering-with-warning. An empty parse counts as a failure, not
    /// as an empty roster.
    pub async fn listed_names(&self, now_ms: u64) -> Result<ListedSnapshot, FetchError> {
        if let Some(names) = self.cache.get_fresh(&REGISTRY_CACHE_KEY, now_ms) {
            tracing::debug!("Listed roster served from cache ({} names)", names.len());
            return Ok(ListedSnapshot { names, stale: false });
        }

        let fetched = match self.fetcher.fetch_listed().await {
            Ok(document) => {
                let names = parse_listed_names(&document);
                if names.is_empty() {
                    Err(FetchError::UnexpectedContent(
                        "roster document yielded no company names".to_string(),
                    ))
                } else {
                    Ok(names)
                }
            }
            Err(e) => Err(e),
        };

        match fetched {
            Ok(names) => {
                tracing::info!("Refreshed listed roster: {} names", names.len());
                self.cache.insert(REGISTRY_CACHE_KEY, names.clone(), now_ms);
                Ok(ListedSnapshot { names, stale: false })
            }
            Err(e) => match self.cache.get_stale(&REGISTRY_CACHE_KEY) {
                Some(names) => {
                    tracing::warn!("Roster refresh failed ({}); serving stale set", e);
                    Ok(ListedSnapshot { names, stale: true })
                }
                None => {
                    tracing::warn!("Roster unavailable and no cached copy exists: {}", e);
                    Err(e)
                }
            },
        }
    }
}
