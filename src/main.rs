use clap::Parser;
use perpbot::api::BybitPublicClient;
use perpbot::config::AppConfig;
use perpbot::execution::{
    load_all_candles, load_instrument_metadata, read_registry, InstrumentRegistry, OrderExecutor,
    PaperGateway, SharedRegistry,
};
use perpbot::feed::{replay_file, FeedRouter};
use perpbot::strategy::{EntryGate, EntrySignal, EntryStrategy};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Duration, Instant};

const FEED_CHANNEL_CAPACITY: usize = 1024;

/// Perpetual futures market-state tracker with a trend-gated paper trader
#[derive(Parser, Debug)]
#[command(name = "perpbot", long_about = None)]
struct Args {
    /// TOML configuration file (defaults and PERPBOT_* environment still apply)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay a JSON-lines push capture after the snapshot load
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Evaluate the entry gate and place paper orders
    #[arg(long)]
    trade: bool,

    /// Override the position statistics interval; 0 disables it
    #[arg(long)]
    stats_minutes: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();
    let args = Args::parse();

    tracing::info!("🚀 perpbot starting");

    let config = AppConfig::load(args.config.as_deref())?;
    for instrument in &config.instruments {
        tracing::info!(
            symbol = %instrument.symbol,
            intervals = ?instrument.intervals,
            history = instrument.candle_history_limit,
            "instrument configured"
        );
    }

    let registry = InstrumentRegistry::from_config(&config.instruments)?.shared();
    let client = Arc::new(BybitPublicClient::new(&config.exchange)?);

    match load_instrument_metadata(&registry, client.as_ref(), client.category()).await {
        Ok(count) => tracing::info!(count, "instrument metadata loaded"),
        Err(e) => tracing::warn!(error = %e, "instrument metadata unavailable, orders disabled"),
    }

    // Positions and live orders are not pulled at startup: the signed account
    // endpoints are not implemented, so no `AccountSource` exists here yet.
    // `reload_positions`/`reload_orders` take one once it does; until then
    // account state arrives only through the push feed.

    // Snapshots must be complete before any push update is applied
    let report = load_all_candles(&registry, client.clone()).await?;
    if !report.is_complete() {
        tracing::warn!(degraded = ?report.degraded, "some intervals failed to load");
    }

    let (feed_tx, router) = FeedRouter::channel(registry.clone(), FEED_CHANNEL_CAPACITY);
    let router_task = tokio::spawn(router.run());
    if let Some(path) = args.replay.clone() {
        let tx = feed_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = replay_file(&path, &tx).await {
                tracing::error!(path = %path.display(), error = %e, "replay failed");
            }
        });
    }
    drop(feed_tx);

    let stats_minutes = args.stats_minutes.unwrap_or(config.stats_interval_minutes);
    let stats_task = (stats_minutes > 0).then(|| {
        let registry = registry.clone();
        tokio::spawn(async move {
            stats_loop(registry, stats_minutes).await;
        })
    });

    let trading_task = args.trade.then(|| {
        let registry = registry.clone();
        let every = config.trading.evaluate_every_secs.max(1);
        tokio::spawn(async move {
            trading_loop(registry, every).await;
        })
    });

    tracing::info!("✅ Running. Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = wait_optional(stats_task) => {
            tracing::error!("Stats loop exited: {:?}", result);
        }
        result = wait_optional(trading_task) => {
            tracing::error!("Trading loop exited: {:?}", result);
        }
    }

    router_task.abort();
    print_stats(&registry);
    tracing::info!("👋 perpbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("perpbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Never completes for a task that was not started
async fn wait_optional(task: Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn stats_loop(registry: SharedRegistry, minutes: u64) {
    let period = Duration::from_secs(minutes * 60);
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        print_stats(&registry);
    }
}

fn print_stats(registry: &SharedRegistry) {
    let Ok(guard) = read_registry(registry) else {
        tracing::error!("registry lock poisoned, cannot print stats");
        return;
    };
    for book in guard.books() {
        let pnl = book.pnl_summary();
        tracing::info!(
            symbol = %book.symbol(),
            long = pnl.long,
            short = pnl.short,
            total = pnl.total,
            positions = book.positions().len(),
            live_orders = book.orders().len(),
            "📊 position stats"
        );
    }
}

async fn trading_loop(registry: SharedRegistry, every_secs: u64) {
    let gateway = Arc::new(PaperGateway::new());
    let period = Duration::from_secs(every_secs);
    let mut ticker = interval_at(Instant::now() + period, period);
    // One gate per symbol, kept across ticks so a signal fires once per bar
    let mut gates: HashMap<String, EntryGate> = HashMap::new();

    loop {
        ticker.tick().await;

        for (symbol, signal) in collect_signals(&registry, &mut gates) {
            let executor = match OrderExecutor::for_instrument(&symbol, registry.clone(), gateway.clone()) {
                Ok(executor) => executor,
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "cannot build executor");
                    continue;
                }
            };
            match executor.execute(signal.side, signal.reference_price, signal.qty).await {
                Ok(outcome) => tracing::info!(
                    symbol = %symbol,
                    order_id = %outcome.order_id,
                    filled = outcome.filled_qty,
                    remaining = outcome.remaining_qty,
                    attempts = outcome.attempts,
                    "💹 entry executed"
                ),
                Err(e) => tracing::error!(symbol = %symbol, error = %e, "entry failed"),
            }
        }
    }
}

/// Evaluate every tracked book under one read lock
fn collect_signals(
    registry: &SharedRegistry,
    gates: &mut HashMap<String, EntryGate>,
) -> Vec<(String, EntrySignal)> {
    let Ok(guard) = read_registry(registry) else {
        tracing::error!("registry lock poisoned, skipping evaluation");
        return Vec::new();
    };

    guard
        .books()
        .filter(|book| book.is_tracked())
        .filter_map(|book| {
            let gate = gates
                .entry(book.symbol().to_string())
                .or_insert_with(|| EntryGate::from_config(book.config()));
            match gate.signal(book) {
                Ok(signal) => signal.map(|s| (book.symbol().to_string(), s)),
                Err(e) => {
                    tracing::warn!(symbol = %book.symbol(), error = %e, "entry gate failed");
                    None
                }
            }
        })
        .collect()
}
