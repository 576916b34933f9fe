// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::dart::models::{DateRange, EventsReport};
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Writes the acquisition report as a pretty-printed JSON file named
    /// after the requested window, and returns the path.
    pub fn save_report(
        &self,
        report: &EventsReport,
        range: &DateRange,
    ) -> Result<PathBuf, StorageError> {
        let filename = format!("ipo_events_{}_{}.json", range.from, range.to);
        let file_path = self.base_dir.join(filename);

        let payload = serde_json::json!({
            "ok": true,
            "source": "dart-dsac008",
            "range": { "from": range.from, "to": range.to },
            "count": report.events.len(),
            "excluded_listed_count": report.excluded_listed_count,
            "listed_filter_stale": report.listed_filter_stale,
            "warnings": report.warnings,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "items": report.events,
        });

        let body = serde_json::to_string_pretty(&payload)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, body).map_err(StorageError::IoError)?;

        tracing::info!("Saved report to {}", file_path.display());

        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::models::{MarketCode, SubscriptionEvent};
    use chrono::NaiveDate;

    #[test]
    fn report_round_trips_through_json() {
        let d = |m: u32, day: u32| NaiveDate::from_ymd_opt(2026, m, day).expect("valid date");
        let report = EventsReport {
            events: vec![SubscriptionEvent::new(
                "가상회사",
                MarketCode::Kosdaq,
                d(2, 3),
                d(2, 5),
            )],
            excluded_listed_count: 1,
            listed_filter_stale: false,
            warnings: vec!["2026-01: calendar fetch failed: Request timed out".to_string()],
        };

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["events"][0]["corp_name"], "가상회사");
        assert_eq!(json["events"][0]["market"], "KOSDAQ");
        assert_eq!(json["events"][0]["sbd_start"], "2026-02-03");
        assert_eq!(json["excluded_listed_count"], 1);
        // Bare events carry no meta key at all.
        assert!(json["events"][0].get("meta").is_none());
    }
}
