// src/extractors/calendar.rs
//! Turns the tokenized calendar page into subscription events.
//!
//! The page is a month grid: a day-number token precedes the marks for that
//! day, and each mark reads `"<market> <company> [시작|종료]"`. Some layouts
//! put the market code on its own line with the company and status on the
//! next one; both shapes are handled by the same scanner. Tokens matching
//! neither shape are noise and are skipped without comment.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use super::tokenizer;
use crate::dart::models::{CalendarMark, MarkKind, MarketCode, SubscriptionEvent};

// Combined single-token form, e.g. "기 케이뱅크 [시작]". Trailing text after
// the status bracket is tolerated.
static COMBINED_MARK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(유|코|넥|기)\s+(.+?)\s*\[(시작|종료)\]")
        .expect("Failed to compile COMBINED_MARK_RE")
});

// Market code alone on its line; the company + status follow on the next.
static MARKET_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(유|코|넥|기)$").expect("Failed to compile MARKET_ONLY_RE"));

// Company + status with no market prefix; only meaningful while a market
// code is pending from the previous line.
static BARE_MARK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*\[(시작|종료)\]").expect("Failed to compile BARE_MARK_RE")
});

// Day-number label on the calendar grid: a token that is nothing but 1-2
// digits.
static DAY_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}$").expect("Failed to compile DAY_LABEL_RE"));

fn mark_kind(status: &str) -> MarkKind {
    if status == "시작" {
        MarkKind::Start
    } else {
        MarkKind::End
    }
}

/// Scans the token stream for day labels and subscription marks.
///
/// Maintains a single mutable "current day"; marks seen before any day label
/// have no date and are discarded, as are day/month combinations that do not
/// form a real calendar date.
pub fn extract_marks(lines: &[String], year: i32, month: u32) -> Vec<CalendarMark> {
    let mut marks = Vec::new();
    let mut current_day: Option<u32> = None;
    let mut pending_market: Option<MarketCode> = None;

    for line in lines {
        if DAY_LABEL_RE.is_match(line) {
            match line.parse::<u32>() {
                Ok(day) if (1..=31).contains(&day) => current_day = Some(day),
                _ => {}
            }
            continue;
        }

        if let Some(caps) = COMBINED_MARK_RE.captures(line) {
            push_mark(
                &mut marks,
                year,
                month,
                current_day,
                MarketCode::from_short(&caps[1]),
                caps[2].trim(),
                mark_kind(&caps[3]),
            );
            pending_market = None;
            continue;
        }

        if let Some(caps) = MARKET_ONLY_RE.captures(line) {
            pending_market = Some(MarketCode::from_short(&caps[1]));
            continue;
        }

        if let Some(market) = pending_market {
            if let Some(caps) = BARE_MARK_RE.captures(line) {
                push_mark(
                    &mut marks,
                    year,
                    month,
                    current_day,
                    market,
                    caps[1].trim(),
                    mark_kind(&caps[2]),
                );
                pending_market = None;
                continue;
            }
        }
        // Anything else is page noise.
    }

    marks
}

fn push_mark(
    marks: &mut Vec<CalendarMark>,
    year: i32,
    month: u32,
    current_day: Option<u32>,
    market: MarketCode,
    corp_name: &str,
    kind: MarkKind,
) {
    let Some(day) = current_day else {
        tracing::debug!("Discarding mark for '{}' seen before any day label", corp_name);
        return;
    };
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        tracing::debug!("Discarding mark for '{}' on impossible day {}-{}-{}", corp_name, year, month, day);
        return;
    };
    if corp_name.is_empty() {
        return;
    }
    marks.push(CalendarMark {
        corp_name: corp_name.to_string(),
        market,
        kind,
        date,
    });
}

/// Pairs start/end marks into inclusive date ranges, one group per company.
///
/// Within a group, marks are processed in date order with a pending start:
/// the last unconsumed start wins, an end with no start becomes a single-day
/// window (the visible tail of a range that began in an unfetched month),
/// and a dangling start becomes a single-day window at the start date. The
/// market code is the most recently observed one for the company.
pub fn pair_marks(marks: &[CalendarMark]) -> Vec<SubscriptionEvent> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&CalendarMark>> = HashMap::new();
    for mark in marks {
        groups
            .entry(mark.corp_name.as_str())
            .or_insert_with(|| {
                order.push(mark.corp_name.as_str());
                Vec::new()
            })
            .push(mark);
    }

    let mut events = Vec::new();
    for corp_name in order {
        let group = &groups[corp_name];
        // Codes may repeat across a company's marks; the latest in document
        // order is authoritative.
        let market = group.last().map(|m| m.market).unwrap_or(MarketCode::Unknown);

        let mut by_date: Vec<&CalendarMark> = group.clone();
        by_date.sort_by_key(|m| m.date);

        let mut pending_start: Option<NaiveDate> = None;
        for mark in by_date {
            match mark.kind {
                MarkKind::Start => {
                    // Last start wins if one was already pending.
                    pending_start = Some(mark.date);
                }
                MarkKind::End => {
                    let start = pending_start.take().unwrap_or(mark.date);
                    events.push(SubscriptionEvent::new(corp_name, market, start, mark.date));
                }
            }
        }
        if let Some(start) = pending_start {
            events.push(SubscriptionEvent::new(corp_name, market, start, start));
        }
    }

    // Drop identical (company, start, end) triples within the month.
    let mut seen = HashSet::new();
    events.retain(|ev| seen.insert((ev.corp_name.clone(), ev.sbd_start, ev.sbd_end)));
    events
}

/// Full per-month parse: tokenize, extract marks, pair into events.
pub fn events_for_month(html: &str, year: i32, month: u32) -> Vec<SubscriptionEvent> {
    let lines = tokenizer::html_to_lines(html);
    let marks = extract_marks(&lines, year, month);
    let events = pair_marks(&marks);
    tracing::debug!(
        "Parsed {}-{:02}: {} lines -> {} marks -> {} events",
        year,
        month,
        lines.len(),
        marks.len(),
        events.len()
    );
    events
}
