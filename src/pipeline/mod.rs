// src/pipeline/mod.rs
//! Range acquisition orchestrator.
//!
//! Decomposes the requested window into months, runs each month's HTML
//! through the tokenizer/extractor/pairer, merges the results, applies the
//! listed-company exclusion, and returns a deduplicated, sorted report.
//! Single-month failures degrade to warnings; the orchestrator only fails
//! outright when every month fails, and it never panics past its boundary.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{Clock, TtlCache};
use crate::dart::client::CalendarFetcher;
use crate::dart::models::{DateRange, EventsReport, SubscriptionEvent};
use crate::extractors::calendar;
use crate::registry::{ListedRegistry, RegistryFetcher};
use crate::utils::error::PipelineError;

// The calendar page changes as filings land, but not minute to minute.
pub const MONTH_HTML_TTL: Duration = Duration::from_secs(10 * 60);

/// Every (year, month) pair the window touches, in order.
pub fn months_in_range(range: &DateRange) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (range.from.year(), range.from.month());
    let end = (range.to.year(), range.to.month());

    while (year, month) <= end {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// The import window the family app uses: today through the last day of
/// next month.
pub fn default_window(today: NaiveDate) -> DateRange {
    let (year, month) = (today.year(), today.month());
    // First day of the month after next, then step back one day.
    let (next_year, next_month) = if month >= 11 {
        (year + 1, month - 10)
    } else {
        (year, month + 2)
    };
    let first_after = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid first-of-month");
    let to = first_after.pred_opt().expect("valid last-of-month");
    DateRange { from: today, to }
}

/// An event survives the window filter when any part of it falls inside the
/// window; partially overlapping and contained windows both count.
fn overlaps_window(ev: &SubscriptionEvent, range: &DateRange) -> bool {
    ev.sbd_start <= range.to && ev.sbd_end >= range.from
}

/// The acquisition pipeline, generic over its external collaborators so
/// tests can inject fixture pages and a manual clock.
pub struct SubscriptionPipeline<F, R, C> {
    fetcher: F,
    registry: ListedRegistry<R>,
    month_cache: TtlCache<String, String>,
    clock: C,
}

impl<F, R, C> SubscriptionPipeline<F, R, C>
where
    F: CalendarFetcher,
    R: RegistryFetcher,
    C: Clock,
{
    pub fn new(fetcher: F, registry: ListedRegistry<R>, clock: C) -> Self {
        Self::with_month_ttl(fetcher, registry, clock, MONTH_HTML_TTL)
    }

    pub fn with_month_ttl(
        fetcher: F,
        registry: ListedRegistry<R>,
        clock: C,
        month_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            registry,
            month_cache: TtlCache::new(month_ttl),
            clock,
        }
    }

    /// The sole entry point: acquire all subscription events overlapping
    /// `range`, with exclusion counters, staleness flag and warnings.
    pub async fn fetch_subscription_events(
        &self,
        range: &DateRange,
    ) -> Result<EventsReport, PipelineError> {
        if range.from > range.to {
            return Err(PipelineError::InvalidRange {
                from: range.from.to_string(),
                to: range.to.to_string(),
            });
        }

        let months = months_in_range(range);
        let mut warnings = Vec::new();
        let mut collected: Vec<SubscriptionEvent> = Vec::new();
        let mut months_ok = 0usize;

        for (year, month) in &months {
            if let Some(html) = self.month_html(*year, *month, &mut warnings).await {
                months_ok += 1;
                collected.extend(calendar::events_for_month(&html, *year, *month));
            }
        }

        if months_ok == 0 {
            return Err(PipelineError::AllMonthsFailed {
                months: months.len(),
                detail: warnings.join("; "),
            });
        }

        collected.retain(|ev| overlaps_window(ev, range));

        // Cross-month dedup by identity key; later months reflect a fuller
        // view of boundary-spanning windows, so last seen wins.
        let mut by_key: HashMap<String, SubscriptionEvent> = HashMap::new();
        for ev in collected {
            by_key.insert(ev.dedup_key(), ev);
        }

        // Exclude rights offerings of already-listed companies.
        let mut excluded_listed_count = 0usize;
        let mut listed_filter_stale = false;
        let mut events: Vec<SubscriptionEvent> = match self
            .registry
            .listed_names(self.clock.now_epoch_ms())
            .await
        {
            Ok(snapshot) => {
                listed_filter_stale = snapshot.stale;
                by_key
                    .into_values()
                    .filter(|ev| {
                        if snapshot.contains(&ev.corp_name) {
                            tracing::debug!("Excluding already-listed company: {}", ev.corp_name);
                            excluded_listed_count += 1;
                            false
                        } else {
                            true
                        }
                    })
                    .collect()
            }
            Err(e) => {
                warnings.push(format!(
                    "listed-company roster unavailable, rights offerings are not filtered out: {}",
                    e
                ));
                by_key.into_values().collect()
            }
        };

        events.sort_by(|a, b| {
            a.sbd_start
                .cmp(&b.sbd_start)
                .then_with(|| a.corp_name.cmp(&b.corp_name))
                .then_with(|| a.sbd_end.cmp(&b.sbd_end))
        });

        tracing::info!(
            "Acquired {} events over {} months ({} excluded as listed, {} warnings)",
            events.len(),
            months.len(),
            excluded_listed_count,
            warnings.len()
        );

        Ok(EventsReport {
            events,
            excluded_listed_count,
            listed_filter_stale,
            warnings,
        })
    }

    /// One month's HTML through the cache: fresh hit, else fetch-and-store,
    /// else stale fallback, else a warning and None.
    async fn month_html(
        &self,
        year: i32,
        month: u32,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let key = format!("{:04}-{:02}", year, month);

        if let Some(html) = self.month_cache.get_fresh(&key, self.clock.now_epoch_ms()) {
            tracing::debug!("Calendar page {} served from cache", key);
            return Some(html);
        }

        match self.fetcher.fetch_month(year, month).await {
            Ok(html) => {
                self.month_cache
                    .insert(key, html.clone(), self.clock.now_epoch_ms());
                Some(html)
            }
            Err(e) => match self.month_cache.get_stale(&key) {
                Some(html) => {
                    tracing::warn!("Calendar fetch for {} failed ({}); serving stale page", key, e);
                    warnings.push(format!(
                        "{}: serving cached page after fetch failure: {}",
                        key, e
                    ));
                    Some(html)
                }
                None => {
                    tracing::warn!("Calendar fetch for {} failed: {}", key, e);
                    warnings.push(format!("{}: calendar fetch failed: {}", key, e));
                    None
                }
            },
        }
    }
}
