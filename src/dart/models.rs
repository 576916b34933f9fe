// src/dart/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::enrich::OfferingMeta;
use crate::registry::normalize_corp_name;

/// Listing venue shorthand as shown on the DART calendar page:
/// 유(유가증권/KOSPI), 코(코스닥), 넥(코넥스), 기(기타).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketCode {
    Kospi,
    Kosdaq,
    Konex,
    Etc,
    Unknown,
}

impl MarketCode {
    /// Maps a single-character page code to a market. Anything unrecognized
    /// maps to `Unknown` rather than erroring.
    pub fn from_short(short: &str) -> Self {
        match short {
            "유" => MarketCode::Kospi,
            "코" => MarketCode::Kosdaq,
            "넥" => MarketCode::Konex,
            "기" => MarketCode::Etc,
            _ => MarketCode::Unknown,
        }
    }
}

/// Whether a calendar mark opens or closes a subscription window
/// (시작 → Start, 종료 → End).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    Start,
    End,
}

/// One observed marker on the calendar grid: company, venue, start-or-end,
/// and the day it sits under. Produced by the extractor, consumed
/// immediately by the pairer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarMark {
    pub corp_name: String,
    pub market: MarketCode,
    pub kind: MarkKind,
    pub date: NaiveDate,
}

/// A paired subscription window. Field names follow the JSON contract the
/// UI layer consumes (`corp_name`, `sbd_start`, `sbd_end`).
///
/// Invariant: `sbd_start <= sbd_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub corp_name: String,
    pub market: MarketCode,
    pub sbd_start: NaiveDate,
    pub sbd_end: NaiveDate,
    /// Underwriter / offer-price enrichment; not part of event identity.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<OfferingMeta>,
}

impl SubscriptionEvent {
    pub fn new(
        corp_name: impl Into<String>,
        market: MarketCode,
        sbd_start: NaiveDate,
        sbd_end: NaiveDate,
    ) -> Self {
        Self {
            corp_name: corp_name.into(),
            market,
            sbd_start,
            sbd_end,
            meta: None,
        }
    }

    /// Identity key used for cross-month deduplication: normalized company
    /// name plus both window bounds. Uses the same normalization as the
    /// listed-registry lookups.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            normalize_corp_name(&self.corp_name),
            self.sbd_start,
            self.sbd_end
        )
    }
}

/// Result of one range acquisition: the merged events plus the counters and
/// warnings the caller surfaces to the user.
#[derive(Debug, Clone, Serialize)]
pub struct EventsReport {
    pub events: Vec<SubscriptionEvent>,
    pub excluded_listed_count: usize,
    pub listed_filter_stale: bool,
    pub warnings: Vec<String>,
}

/// Inclusive day window the caller asks for, e.g. today through the end of
/// next month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}
