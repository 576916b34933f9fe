// src/main.rs
mod cache;
mod dart;
mod enrich;
mod extractors;
mod pipeline;
mod registry;
mod storage;
mod utils;

use chrono::NaiveDate;
use clap::Parser;

use cache::SystemClock;
use dart::client::DartClient;
use dart::models::DateRange;
use enrich::FundTableClient;
use pipeline::{default_window, SubscriptionPipeline};
use registry::{KindRegistryClient, ListedRegistry};
use storage::StorageManager;
use utils::AppError;

/// Command Line Interface for the IPO subscription-calendar tracker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First day of the acquisition window, YYYY-MM-DD (default: today)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the acquisition window, YYYY-MM-DD (default: end of next month)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Also look up underwriters and offer prices for each event
    #[arg(long)]
    meta: bool,

    /// Output directory for the JSON report
    #[arg(short, long, default_value = "./output")]
    output_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting acquisition for args: {:?}", args);

    // 3. Resolve the acquisition window
    let today = chrono::Local::now().date_naive();
    let window = default_window(today);
    let range = DateRange {
        from: args.from.unwrap_or(window.from),
        to: args.to.unwrap_or(window.to),
    };
    if range.from > range.to {
        return Err(AppError::Config(format!(
            "--from {} is after --to {}",
            range.from, range.to
        )));
    }
    tracing::info!("Acquisition window: {} ~ {}", range.from, range.to);

    // 4. Initialize storage
    let storage = StorageManager::new(&args.output_dir)?;

    // 5. Build the pipeline with its live collaborators
    let pipeline = SubscriptionPipeline::new(
        DartClient::new()?,
        ListedRegistry::new(KindRegistryClient::new()?),
        SystemClock,
    );

    // 6. Acquire the events
    let mut report = pipeline.fetch_subscription_events(&range).await?;

    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }
    if report.listed_filter_stale {
        tracing::warn!("Listed-company roster is stale; exclusion used the last good copy");
    }

    // 7. Optionally attach underwriter / offer-price metadata
    if args.meta && !report.events.is_empty() {
        let meta_client = FundTableClient::new()?;
        let meta_warnings = enrich::enrich_events(&meta_client, &mut report.events).await;
        for warning in &meta_warnings {
            tracing::warn!("{}", warning);
        }
        report.warnings.extend(meta_warnings);
    }

    // 8. Persist and summarize
    let path = storage.save_report(&report, &range)?;

    if report.events.is_empty() {
        // A clean empty result means there genuinely are no windows in
        // range; a fetch failure would have errored out above.
        tracing::info!("No subscription windows in {} ~ {}", range.from, range.to);
    } else {
        tracing::info!(
            "Done: {} events ({} listed companies excluded), report at {}",
            report.events.len(),
            report.excluded_listed_count,
            path.display()
        );
    }

    Ok(())
}
