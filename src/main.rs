use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use osrs_ge_tracker::config::Config;
use osrs_ge_tracker::flips::roi_output;
use osrs_ge_tracker::format::{distance_to_now_strict, format_gp};
use osrs_ge_tracker::loader::WikiClient;
use osrs_ge_tracker::logging::{self, LogFormat};
use osrs_ge_tracker::poller::{MarketSnapshots, Poller, Source};
use osrs_ge_tracker::presets::PresetManager;
use osrs_ge_tracker::store::{PersistenceAdapter, SessionStore, SqliteStore};
use osrs_ge_tracker::table::{page_size_option, TableView, PAGE_SIZES};
use osrs_ge_tracker::tracker::Tracker;

#[derive(Parser, Debug)]
#[command(name = "osrs_ge_tracker", version, about = "Live Grand Exchange flipping table")]
struct Args {
    /// JSON config file
    #[arg(short, long, env = "GE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Preset to apply on start (default, highAlchProfit)
    #[arg(long)]
    preset: Option<String>,

    /// Page to show, starting at 1
    #[arg(long)]
    page: Option<usize>,

    /// Rows per page
    #[arg(long, env = "GE_TRACKER_PAGE_SIZE", value_parser = parse_page_size)]
    page_size: Option<usize>,

    /// Only show items whose name contains this text
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long, env = "GE_TRACKER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Print one page once every source has reported, then exit
    #[arg(long)]
    once: bool,
}

fn parse_page_size(raw: &str) -> Result<usize, String> {
    let size = raw
        .parse()
        .map_err(|_| format!("expected one of {PAGE_SIZES:?}"))?;
    page_size_option(size).map_err(|e| e.to_string())
}

fn gp(value: Option<i64>) -> String {
    value.map(|v| format_gp(v as f64)).unwrap_or_else(|| "-".to_string())
}

fn render(view: &TableView, preset: Option<&str>) {
    info!(
        page = view.page_index + 1,
        pages = view.page_count,
        matching = view.filtered_count,
        items = view.total_count,
        preset = preset.unwrap_or("custom"),
        "item table"
    );
    for row in &view.rows {
        info!(
            id = row.id.0,
            name = %row.name,
            buy = %gp(row.insta_buy_price),
            sell = %gp(row.insta_sell_price),
            profit = %gp(row.profit),
            roi = %roi_output(row.roi).unwrap_or_else(|| "-".to_string()),
            volume = %gp(row.daily_volume),
            limit = ?row.limit,
            last_buy = %distance_to_now_strict(row.insta_buy_time, true).unwrap_or_default(),
            last_sell = %distance_to_now_strict(row.insta_sell_time, true).unwrap_or_default(),
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("failed to load config")?;
    logging::init(&config.log_filter, args.log_format.unwrap_or(config.log_format));

    let durable: Arc<dyn PersistenceAdapter> = Arc::new(
        SqliteStore::open(&config.prefs_path)
            .with_context(|| format!("failed to open {}", config.prefs_path.display()))?,
    );
    let session: Arc<dyn PersistenceAdapter> = Arc::new(SessionStore::new());
    let snapshots = Arc::new(MarketSnapshots::new());
    let mut tracker = Tracker::new(
        snapshots.clone(),
        durable,
        session,
        PresetManager::builtin(),
        config.default_page_size,
    );

    if let Some(id) = &args.preset {
        tracker.apply_preset(id)?;
    }
    if let Some(size) = args.page_size {
        tracker.table_mut().set_page_size(size);
    }
    if let Some(text) = &args.search {
        tracker.table_mut().set_search(text);
    }
    if let Some(page) = args.page {
        tracker.table_mut().set_page_index(page.saturating_sub(1));
    }

    let feed = Arc::new(WikiClient::new(&config)?);
    let poller = Poller::new(feed, snapshots.clone(), &config).spawn();
    info!(prices = %config.prices_url, "polling started");

    let mut updates = snapshots.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("snapshot channel closed");
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
        if !tracker.is_ready() {
            continue;
        }
        let complete = [Source::Metadata, Source::Prices, Source::Volumes, Source::Reference]
            .into_iter()
            .all(|source| snapshots.has(source));
        if args.once && !complete {
            continue;
        }

        let view = tracker.view();
        render(&view, tracker.current_preset_id());
        if args.once {
            break;
        }
    }

    poller.shutdown();
    Ok(())
}
