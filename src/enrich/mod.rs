// src/enrich/mod.rs
//! Underwriter / offer-price metadata for subscription events.
//!
//! The 38.co.kr 공모청약일정 table carries, per offering: the company name,
//! the schedule, the confirmed offer price, the hoped-for price band, the
//! competition rate and the underwriters. This module scrapes up to three
//! pages of it (EUC-KR encoded) and attaches what it finds to the matching
//! events. Everything here is best effort: a fetch failure or an
//! unmatchable row produces a warning or a skip, never an error.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dart::client::build_http_client;
use crate::extractors::tokenizer;
use crate::registry::normalize_corp_name;
use crate::utils::error::FetchError;

const FUND_TABLE_URLS: [&str; 3] = [
    "https://www.38.co.kr/html/fund/?o=k",
    "https://www.38.co.kr/html/fund/index.htm?o=k&page=2",
    "https://www.38.co.kr/html/fund/index.htm?o=k&page=3",
];

// Equal-allotment deposit estimate: minimum 10 shares at a 50% margin rate.
const MIN_SUBSCRIPTION_QTY: i64 = 10;
const DEPOSIT_RATE_PCT: i64 = 50;

static TR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("Failed to compile TR_RE")
});

static TD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("Failed to compile TD_RE")
});

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d,]+").expect("Failed to compile PRICE_RE"));

/// Underwriter and offer-price details for one offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingMeta {
    pub underwriters: String,
    pub offer_price_krw: Option<i64>,
    pub min_deposit_krw: Option<i64>,
    pub note: String,
}

/// Source of one raw 공모청약일정 page (1-based). Implemented by the real
/// 38.co.kr client and by fixtures in tests.
#[async_trait]
pub trait MetaFetcher {
    async fn fetch_page(&self, page: usize) -> Result<String, FetchError>;
    fn page_count(&self) -> usize;
}

/// HTTP client for the 38.co.kr 공모청약일정 table pages.
pub struct FundTableClient {
    http: reqwest::Client,
}

impl FundTableClient {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: build_http_client()?,
        })
    }
}

#[async_trait]
impl MetaFetcher for FundTableClient {
    async fn fetch_page(&self, page: usize) -> Result<String, FetchError> {
        let url = FUND_TABLE_URLS
            .get(page - 1)
            .ok_or_else(|| FetchError::UnexpectedContent(format!("no fund-table page {}", page)))?;
        tracing::info!("Fetching offering metadata page {}", page);
        let res = self
            .http
            .get(*url)
            .header("Accept-Language", "ko-KR,ko;q=0.9,en;q=0.8")
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Http(status));
        }
        // The site serves EUC-KR without declaring it.
        Ok(res.text_with_charset("euc-kr").await?)
    }

    fn page_count(&self) -> usize {
        FUND_TABLE_URLS.len()
    }
}

/// Extracts the cleaned cell texts of every table row with at least six
/// cells, which is what the offering rows have. Header rows and layout rows
/// fall short of the cell count and drop out naturally.
pub fn extract_rows(html: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for tr in TR_RE.captures_iter(html) {
        let cells: Vec<String> = TD_RE
            .captures_iter(&tr[1])
            .map(|td| tokenizer::strip_fragment(&td[1]))
            .collect();
        if cells.len() >= 6 {
            rows.push(cells);
        }
    }
    rows
}

/// "17,000" -> 17000. Anything without a digit run yields None.
pub fn parse_price(text: &str) -> Option<i64> {
    let m = PRICE_RE.find(text)?;
    let n = m.as_str().replace(',', "").parse::<i64>().ok()?;
    if n > 0 {
        Some(n)
    } else {
        None
    }
}

/// "12,100~16,600" -> 16600; a single price parses as itself.
pub fn upper_from_range(text: &str) -> Option<i64> {
    let parts: Vec<&str> = text.split('~').map(str::trim).collect();
    if parts.len() == 2 {
        parse_price(parts[1])
    } else {
        parse_price(text)
    }
}

fn meta_from_row(cells: &[String]) -> OfferingMeta {
    // Observed column order: [name, schedule, confirmed price, hoped range,
    // competition, underwriters, ...].
    let fixed = parse_price(&cells[2]);
    let upper = upper_from_range(&cells[3]);
    let offer = fixed.or(upper);

    let (min_deposit, note) = match offer {
        Some(price) => (
            Some(price * MIN_SUBSCRIPTION_QTY * DEPOSIT_RATE_PCT / 100),
            format!(
                "추정치(최소 {}주, 증거금 {}% 가정)",
                MIN_SUBSCRIPTION_QTY, DEPOSIT_RATE_PCT
            ),
        ),
        None => (None, "공모가 미확정/표 정보 부족".to_string()),
    };

    OfferingMeta {
        underwriters: cells[5].clone(),
        offer_price_krw: offer,
        min_deposit_krw: min_deposit,
        note,
    }
}

/// Attaches [`OfferingMeta`] to every event whose company appears in the
/// fund table. Pages are fetched in order and the walk stops as soon as
/// every wanted company has been matched; the first matching row per
/// company wins. Returns warnings for pages that failed to fetch.
pub async fn enrich_events<M: MetaFetcher>(
    fetcher: &M,
    events: &mut [crate::dart::models::SubscriptionEvent],
) -> Vec<String> {
    let mut warnings = Vec::new();
    if events.is_empty() {
        return warnings;
    }

    let mut unmatched: usize = events.iter().filter(|e| e.meta.is_none()).count();

    for page in 1..=fetcher.page_count() {
        if unmatched == 0 {
            break;
        }

        let html = match fetcher.fetch_page(page).await {
            Ok(html) => html,
            Err(e) => {
                warnings.push(format!("offering metadata page {} failed: {}", page, e));
                continue;
            }
        };

        for cells in extract_rows(&html) {
            // The first whitespace-separated word of the name cell is the
            // company; the rest is badges and footnote markers.
            let Some(name_word) = cells[0].split_whitespace().next() else {
                continue;
            };
            let key = normalize_corp_name(name_word);
            if key.is_empty() {
                continue;
            }

            for ev in events.iter_mut() {
                if ev.meta.is_some() || normalize_corp_name(&ev.corp_name) != key {
                    continue;
                }
                ev.meta = Some(meta_from_row(&cells));
                unmatched -= 1;
            }
        }
    }

    let matched = events.iter().filter(|e| e.meta.is_some()).count();
    tracing::info!(
        "Offering metadata matched {}/{} events",
        matched,
        events.len()
    );
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::models::{MarketCode, SubscriptionEvent};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid test date")
    }

    fn event(name: &str) -> SubscriptionEvent {
        SubscriptionEvent::new(name, MarketCode::Kosdaq, d(2026, 2, 3), d(2026, 2, 5))
    }

    const PAGE: &str = r#"
        <table>
          <tr><td>종목명</td><td>공모주일정</td><td>확정공모가</td><td>희망공모가</td><td>청약경쟁률</td><td>주간사</td></tr>
          <tr>
            <td><a href="/c?no=1">가상회사</a> (유가)</td>
            <td>2026.02.03~02.05</td>
            <td>17,000</td>
            <td>12,100~16,600</td>
            <td>-</td>
            <td>미래에셋증권,KB증권</td>
          </tr>
          <tr>
            <td><a href="/c?no=2">미정회사</a></td>
            <td>2026.02.10~02.11</td>
            <td>-</td>
            <td>-</td>
            <td>-</td>
            <td>삼성증권</td>
          </tr>
        </table>
    "#;

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("17,000"), Some(17_000));
        assert_eq!(parse_price(" 1,234,500원 "), Some(1_234_500));
        assert_eq!(parse_price("-"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn range_upper_bound() {
        assert_eq!(upper_from_range("12,100~16,600"), Some(16_600));
        assert_eq!(upper_from_range("15,000"), Some(15_000));
        assert_eq!(upper_from_range("-"), None);
    }

    #[test]
    fn extract_rows_keeps_only_wide_rows() {
        let rows = extract_rows(PAGE);
        // Header row also has 6 cells but is harmless: "종목명" never
        // matches a wanted company.
        assert_eq!(rows.len(), 3);
        assert!(rows[1][0].starts_with("가상회사"));
        assert_eq!(rows[1][5], "미래에셋증권,KB증권");
    }

    struct OnePageFetcher;

    #[async_trait]
    impl MetaFetcher for OnePageFetcher {
        async fn fetch_page(&self, page: usize) -> Result<String, FetchError> {
            if page == 1 {
                Ok(PAGE.to_string())
            } else {
                Err(FetchError::Timeout)
            }
        }

        fn page_count(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn enrichment_attaches_price_and_deposit() {
        let mut events = vec![event("주식회사 가상회사"), event("미정회사"), event("없는회사")];
        let warnings = enrich_events(&OnePageFetcher, &mut events).await;

        let meta = events[0].meta.as_ref().expect("matched meta");
        assert_eq!(meta.offer_price_krw, Some(17_000));
        // 17,000 * 10 shares * 50% margin
        assert_eq!(meta.min_deposit_krw, Some(85_000));
        assert_eq!(meta.underwriters, "미래에셋증권,KB증권");
        assert!(meta.note.contains("추정치"));

        // Confirmed price missing and no usable range: deposit unknown.
        let meta2 = events[1].meta.as_ref().expect("matched meta");
        assert_eq!(meta2.offer_price_krw, None);
        assert_eq!(meta2.min_deposit_krw, None);
        assert!(meta2.note.contains("미확정"));

        // Unmatched event stays bare; pages 2-3 failed and warned.
        assert!(events[2].meta.is_none());
        assert_eq!(warnings.len(), 2);
    }

    #[tokio::test]
    async fn stops_early_when_everything_matched() {
        // Only matched companies requested: page 1 satisfies them, so the
        // failing pages 2-3 are never touched and no warnings appear.
        let mut events = vec![event("가상회사")];
        let warnings = enrich_events(&OnePageFetcher, &mut events).await;

        assert!(events[0].meta.is_some());
        assert!(warnings.is_empty());
    }
}
