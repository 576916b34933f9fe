// src/dart/client.rs
use async_trait::async_trait;
use reqwest::header;
use std::time::Duration;

use crate::utils::error::FetchError;

const DART_CALENDAR_URL: &str = "https://dart.fss.or.kr/dsac008/main.do";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; IpoTracker/0.1)";
// Every outbound request is bounded; a hung fetch becomes a per-month
// warning upstream instead of wedging the whole window.
pub const FETCH_TIMEOUT_SECS: u64 = 9;
// Be polite to the source site between requests.
const REQUEST_DELAY_MS: u64 = 150;

/// Source of one month's worth of raw calendar HTML. Implemented by the
/// real DART client and by in-memory fixtures in tests.
#[async_trait]
pub trait CalendarFetcher {
    async fn fetch_month(&self, year: i32, month: u32) -> Result<String, FetchError>;
}

/// Creates a reqwest client configured for the Korean disclosure sites.
pub fn build_http_client() -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .map_err(FetchError::from)
}

/// HTTP client for the DART subscription calendar (dsac008).
///
/// The page's form parameters are not documented anywhere, so the client
/// walks a list of observed parameter spellings, POST first (which is what
/// usually works), then GET, and accepts the first response that actually
/// looks like the subscription calendar. A final parameterless GET is the
/// last resort.
pub struct DartClient {
    http: reqwest::Client,
}

impl DartClient {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: build_http_client()?,
        })
    }

    fn param_candidates(year: i32, month: u32) -> Vec<Vec<(&'static str, String)>> {
        let y = year.to_string();
        let m = format!("{:02}", month);
        vec![
            vec![("selectYear", y.clone()), ("selectMonth", m.clone())],
            vec![("year", y.clone()), ("month", m.clone())],
            vec![("searchYear", y.clone()), ("searchMonth", m.clone())],
            vec![("sYear", y.clone()), ("sMonth", m.clone())],
            vec![
                ("currentPage", "1".to_string()),
                ("selectYear", y),
                ("selectMonth", m),
            ],
        ]
    }

    /// Heuristic check that a response is the calendar page and not an error
    /// page or a redirect stub.
    fn looks_like_calendar(body: &str) -> bool {
        body.contains("청약") && body.contains("달력")
    }

    async fn try_post(&self, params: &[(&str, String)]) -> Option<String> {
        let res = self
            .http
            .post(DART_CALENDAR_URL)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*")
            .form(params)
            .send()
            .await
            .ok()?;
        if !res.status().is_success() {
            return None;
        }
        res.text().await.ok()
    }

    async fn try_get(&self, params: &[(&str, String)]) -> Option<String> {
        let res = self
            .http
            .get(DART_CALENDAR_URL)
            .query(params)
            .send()
            .await
            .ok()?;
        if !res.status().is_success() {
            return None;
        }
        res.text().await.ok()
    }
}

#[async_trait]
impl CalendarFetcher for DartClient {
    async fn fetch_month(&self, year: i32, month: u32) -> Result<String, FetchError> {
        tracing::info!("Fetching DART calendar for {}-{:02}", year, month);

        let candidates = Self::param_candidates(year, month);

        for params in &candidates {
            tokio::time::sleep(Duration::from_millis(REQUEST_DELAY_MS)).await;
            if let Some(html) = self.try_post(params).await {
                if Self::looks_like_calendar(&html) {
                    tracing::debug!("POST {:?} returned {} bytes", params, html.len());
                    return Ok(html);
                }
            }
        }

        for params in &candidates {
            tokio::time::sleep(Duration::from_millis(REQUEST_DELAY_MS)).await;
            if let Some(html) = self.try_get(params).await {
                if Self::looks_like_calendar(&html) {
                    tracing::debug!("GET {:?} returned {} bytes", params, html.len());
                    return Ok(html);
                }
            }
        }

        // Last resort: the bare page (usually the current month).
        let res = self.http.get(DART_CALENDAR_URL).send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::error!("HTTP error status {} from {}", status, DART_CALENDAR_URL);
            return Err(FetchError::Http(status));
        }
        let body = res.text().await?;
        if Self::looks_like_calendar(&body) {
            Ok(body)
        } else {
            Err(FetchError::UnexpectedContent(format!(
                "dsac008 response for {}-{:02} does not look like the subscription calendar",
                year, month
            )))
        }
    }
}
