//! Area Trader — support/resistance breakout trading on Binance market data
//!
//! Usage:
//!   area-trader backtest --symbol BTCUSDT --from 2020-01-01 --to 2022-01-01
//!   area-trader live --symbol BTCUSDT --from 2020-01-01 --port 3002

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use engine::aggregator::day_start;
use engine::{
    BacktestEngine, BacktestResult, BinanceClient, BotStatus, EngineConfig, MarketDataSource,
    PriceStream, TradeAction, TradingBot,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "area-trader")]
#[command(about = "Support/resistance area detection and breakout trading", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the initial balance
    #[arg(long, global = true)]
    balance: Option<Decimal>,

    /// Override the breakout distance required before entering
    #[arg(long, global = true)]
    min_difference: Option<Decimal>,

    /// Override the largest gap over which areas are merged
    #[arg(long, global = true)]
    max_range: Option<Decimal>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay intraday candles against levels built from daily history
    Backtest {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        /// First day of the daily history (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// End of the daily history; observations run from here to now
        #[arg(long)]
        to: NaiveDate,
        /// Observation resolution: 1, 5, 15, 30, 60, D or a Binance interval
        #[arg(long, default_value = "30")]
        resolution: String,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Trade the live Binance trade stream
    Live {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        /// First day of the daily history (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Port of the status server
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
        /// Log the bot status every N ticks (0 disables)
        #[arg(long, default_value_t = 1000)]
        status_every: u64,
    },
}

#[derive(Clone)]
struct AppState {
    symbol: String,
    bot: Arc<RwLock<TradingBot>>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,area_trader=debug")
    } else {
        EnvFilter::new("info,engine=info,area_trader=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Backtest {
            symbol,
            from,
            to,
            resolution,
            export,
        } => {
            cmd_backtest(config, &symbol, from, to, &resolution, export).await?;
        }
        Commands::Live {
            symbol,
            from,
            port,
            status_every,
        } => {
            cmd_live(config, symbol, from, port, status_every).await?;
        }
    }

    Ok(())
}

/// Defaults, then the JSON file, then CLI overrides
fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    apply_overrides(&mut config, cli.balance, cli.min_difference, cli.max_range);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(
    config: &mut EngineConfig,
    balance: Option<Decimal>,
    min_difference: Option<Decimal>,
    max_range: Option<Decimal>,
) {
    if let Some(balance) = balance {
        config.initial_balance = balance;
    }
    if let Some(min_difference) = min_difference {
        config.trading.min_difference = min_difference;
    }
    if let Some(max_range) = max_range {
        config.areas.max_range = max_range;
    }
}

fn binance_client() -> BinanceClient {
    match std::env::var("BINANCE_BASE_URL") {
        Ok(url) => {
            info!(url = %url, "Using custom Binance endpoint");
            BinanceClient::with_base_url(url)
        }
        Err(_) => BinanceClient::new(),
    }
}

/// Midnight UTC of `date` in Unix seconds
fn day_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

// ============================================================================
// Backtest command
// ============================================================================

async fn cmd_backtest(
    config: EngineConfig,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
    resolution: &str,
    export: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("\n=== Area Trader v{} ===", APP_VERSION);

    let (from_ts, to_ts) = (day_timestamp(from), day_timestamp(to));
    if from_ts >= to_ts {
        anyhow::bail!("--from ({}) must be before --to ({})", from, to);
    }

    let source = binance_client();
    let history = source.fetch_history(symbol, "D", from_ts, to_ts).await?;
    let observations = source
        .fetch_history(symbol, resolution, to_ts, Utc::now().timestamp())
        .await?;

    println!(
        "Symbol: {} | History: {} daily candles | Observations: {} x {}",
        symbol,
        history.len(),
        observations.len(),
        resolution
    );

    let result = BacktestEngine::run(&config, history, &observations)?;
    print_summary(&result);

    if let Some(export_path) = export {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&export_path, &json)?;
        println!("\nResults exported to {}", export_path.display());
    }

    Ok(())
}

fn print_summary(result: &BacktestResult) {
    println!("\nAreas: {} | Key levels: {}", result.interest_areas, result.key_levels);
    println!(
        "Balance: {} -> {} ({:+.2}, {:+.2}%)",
        result.initial_balance,
        result.final_balance.round_dp(2),
        result.total_pnl,
        result.total_pnl_pct
    );
    println!(
        "Trades: {} | Wins: {} | Losses: {} | Win rate: {:.1}%",
        result.total_trades, result.winning_trades, result.losing_trades, result.win_rate
    );
    println!(
        "Max drawdown: {:.2} ({:.2}%) | Profit factor: {:.2}",
        result.max_drawdown, result.max_drawdown_pct, result.profit_factor
    );

    if result.trades.is_empty() {
        return;
    }

    println!(
        "\n  {:>3}  {:<5} {:>12} {:>12} {:>10} {:<11}",
        "#", "Side", "Entry", "Exit", "PnL", "Reason"
    );
    println!("  {}", "-".repeat(60));
    for (i, t) in result.trades.iter().enumerate() {
        println!(
            "  {:>3}  {:<5} {:>12.2} {:>12.2} {:>+10.2} {:<11}",
            i + 1,
            t.direction.to_string(),
            t.entry_price,
            t.exit_price,
            t.pnl,
            format!("{:?}", t.exit_reason),
        );
    }
}

// ============================================================================
// Live command — trade stream plus status server
// ============================================================================

async fn cmd_live(
    config: EngineConfig,
    symbol: String,
    from: NaiveDate,
    port: u16,
    status_every: u64,
) -> anyhow::Result<()> {
    info!("Area Trader v{} starting...", APP_VERSION);

    let source = binance_client();
    // Complete days only; the running day is built from ticks
    let today = day_start(Utc::now().timestamp());
    let history = source
        .fetch_history(&symbol, "D", day_timestamp(from), today)
        .await?;

    let mut bot = TradingBot::new(config)?;
    bot.load_history(history)?;
    bot.log_status();

    match source.get_price(&symbol).await {
        Ok(price) => info!(symbol = %symbol, price = %price, "Current price"),
        Err(e) => warn!(error = %e, "Could not fetch current price"),
    }

    let state = AppState {
        symbol: symbol.clone(),
        bot: Arc::new(RwLock::new(bot)),
    };

    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_status(server_state, port).await {
            error!(error = %e, "Status server stopped");
        }
    });

    let stream = match std::env::var("BINANCE_STREAM_URL") {
        Ok(url) => PriceStream::with_base_url(&url, &symbol),
        Err(_) => PriceStream::new(&symbol),
    };
    let mut ticks = stream.spawn(1024);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut processed: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Ctrl+C received, stopping...");
                break;
            }
            tick = ticks.recv() => {
                let Some(tick) = tick else {
                    warn!("Tick stream ended");
                    break;
                };

                let mut bot = state.bot.write().await;
                match bot.on_price(tick.price, tick.observed_at) {
                    Ok(actions) => actions.iter().for_each(log_action),
                    Err(e) => warn!(error = %e, "Tick rejected"),
                }

                processed += 1;
                if status_every > 0 && processed % status_every == 0 {
                    bot.log_status();
                }
            }
        }
    }

    let bot = state.bot.read().await;
    println!("\n{}", bot.describe());
    Ok(())
}

fn log_action(action: &TradeAction) {
    match action {
        TradeAction::Opened {
            direction,
            entry_price,
            stop_loss,
            take_profit,
            ..
        } => info!(
            "{} opened at {} (SL {}, TP {})",
            direction,
            entry_price,
            stop_loss.round_dp(2),
            take_profit.round_dp(2)
        ),
        TradeAction::Closed(trade) => info!(
            "{} closed at {} ({:?}), PnL {}",
            trade.direction,
            trade.exit_price.round_dp(2),
            trade.exit_reason,
            trade.pnl.round_dp(2)
        ),
    }
}

async fn serve_status(state: AppState, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/status", get(api_status))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    println!("\n=== Area Trader v{} ===", APP_VERSION);
    println!("Status server on http://{}", addr);
    println!("  GET  /api/health  - Health check");
    println!("  GET  /api/status  - Bot status");
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "area-trader",
        "version": APP_VERSION,
        "symbol": state.symbol,
    }))
}

/// GET /api/status
async fn api_status(State(state): State<AppState>) -> Json<BotStatus> {
    Json(state.bot.read().await.describe())
}
