use alertwatch::alerts::{AlertCache, SqliteAlertStore, TriggerCoordinator};
use alertwatch::api::binance::BinanceTrades;
use alertwatch::api::upbit::UpbitTrades;
use alertwatch::api::{HttpMarketSource, MarketSource};
use alertwatch::broadcast::{self, ViewerHub};
use alertwatch::config::AppConfig;
use alertwatch::ingest::{spawn_supervised, standard_jobs, FeedConnector, Poller, Venue};
use alertwatch::market::SharedSnapshot;
use alertwatch::{notify, AlertEngine};
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("alertwatch", LevelFilter::Debug)
        .filter_module("tungstenite", LevelFilter::Warn)
        .parse_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting alertwatch...");
    let config = AppConfig::from_env();

    let store = Arc::new(SqliteAlertStore::open(&config.db_path)?);
    let source: Arc<dyn MarketSource> = Arc::new(HttpMarketSource::new(config.api.clone())?);
    let notifier = notify::from_config(&config)?;

    let snapshot = Arc::new(SharedSnapshot::new(config.default_usd_krw_rate));
    let cache = Arc::new(AlertCache::new(
        store.clone(),
        config.alert_cache_ttl,
        config.store_timeout,
    ));
    let coordinator = Arc::new(TriggerCoordinator::new(
        store,
        cache.clone(),
        notifier,
        config.store_timeout,
        config.notify_timeout,
    ));
    let viewers = Arc::new(ViewerHub::new());
    let engine = Arc::new(AlertEngine::new(
        snapshot.clone(),
        cache,
        coordinator,
        viewers.clone(),
    ));

    if let Err(e) = engine.warm_up().await {
        warn!("Initial alert cache build failed, will retry on first update: {}", e);
    }

    // Feeds
    let venues: [Arc<dyn Venue>; 2] = [
        Arc::new(UpbitTrades::new(&config.api.upbit_ws_url, &config.api.upbit_market)),
        Arc::new(BinanceTrades::new(&config.api.binance_ws_url, &config.api.binance_symbol)),
    ];
    let mut tasks = Vec::new();
    for venue in venues {
        let name = format!("feed-{}", venue.name());
        let connector = FeedConnector::new(
            venue,
            engine.clone(),
            source.clone(),
            config.reconnect_delay,
            config.change_refresh,
        );
        tasks.push(spawn_supervised(name, config.supervisor_restart_delay, move || {
            connector.clone().run()
        }));
    }

    // Pollers
    for job in standard_jobs(source.clone(), config.rolling_high_days) {
        let poller = Poller::new(job, engine.clone(), config.poll_timeout);
        tasks.push(spawn_supervised(
            poller.name(),
            config.supervisor_restart_delay,
            move || poller.clone().run(),
        ));
    }

    // Broadcast
    let interval = config.broadcast_interval;
    tasks.push(spawn_supervised("broadcast", config.supervisor_restart_delay, move || {
        broadcast::run_broadcast(viewers.clone(), snapshot.clone(), interval)
    }));

    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    let server_handle = tokio::spawn(broadcast::server::serve(listener, engine.clone()));
    info!("{} supervised tasks running", tasks.len());

    tokio::select! {
        result = server_handle => match result {
            Ok(Ok(())) => info!("Viewer server stopped"),
            Ok(Err(e)) => error!("Viewer server failed: {}", e),
            Err(e) => error!("Viewer server task failed: {}", e),
        },
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    };

    for task in tasks {
        task.abort();
    }
    info!("Shutdown complete");
    Ok(())
}
