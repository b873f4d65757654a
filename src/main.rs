use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, KeyCode};
use tokio::sync::watch;

use ticker_board::config::Config;
use ticker_board::feed::control::ControlWsClient;
use ticker_board::feed::ws::{now_ms, FeedWsClient};
use ticker_board::render::surface::FrameBuffer;
use ticker_board::render::BoardLayout;
use ticker_board::scheduler::{BoardSnapshot, Scheduler};
use ticker_board::session::{ConnectionState, Session};
use ticker_board::store::{PriceStore, SqlitePriceStore};
use ticker_board::sync::SyncParams;
use ticker_board::ui;

const UI_REFRESH_MS: u64 = 100;
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(3);

async fn wait_for_terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

fn run_terminal(
    snapshots: &watch::Receiver<BoardSnapshot>,
    shutdown_tx: &watch::Sender<bool>,
) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = (|| -> Result<()> {
        loop {
            if *shutdown_tx.borrow() {
                return Ok(());
            }
            let snapshot = snapshots.borrow().clone();
            terminal.draw(|frame| ui::render(frame, &snapshot))?;

            if crossterm::event::poll(Duration::from_millis(UI_REFRESH_MS))? {
                if let Event::Key(key) = crossterm::event::read()? {
                    if matches!(
                        key.code,
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc
                    ) {
                        tracing::info!("User quit");
                        let _ = shutdown_tx.send(true);
                        return Ok(());
                    }
                }
            }
        }
    })();
    ratatui::restore();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure .env file exists with FINNHUB_API_TOKEN");
            std::process::exit(1);
        }
    };

    // Log to file so it doesn't interfere with the terminal preview
    let log_file = std::fs::File::create("ticker-board.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| "info".parse().unwrap())
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let control_endpoint = config.control.endpoint();
    tracing::info!(
        ws_url = %config.feed.ws_base_url,
        symbols = config.feed.symbols.len(),
        control = control_endpoint.is_some(),
        interval_secs = config.sync.interval_secs,
        tolerance_secs = config.sync.tolerance_secs,
        "Starting ticker-board"
    );

    let store: Arc<dyn PriceStore> = Arc::new(
        SqlitePriceStore::open(&config.storage.path, config.sync.interval_secs)
            .context("failed to open price store")?,
    );

    // With a control channel the symbol set arrives from it.
    let initial_symbols = if control_endpoint.is_some() {
        Vec::new()
    } else {
        config.feed.symbol_entries()
    };
    let session = Arc::new(Session::new(
        initial_symbols,
        config.display.switch_time_secs,
        now_ms(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let feed = FeedWsClient::from_config(&config.feed);
    let feed_session = session.clone();
    let feed_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = feed.connect_and_run(feed_session, feed_shutdown).await {
            tracing::error!(error = %format!("{:#}", e), "Feed task failed");
        }
    }));

    if let Some(url) = control_endpoint {
        let control = ControlWsClient::new(
            &url,
            Duration::from_secs(config.feed.reconnect_delay_secs),
        );
        let control_session = session.clone();
        let control_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = control
                .connect_and_run(control_session, control_shutdown)
                .await
            {
                tracing::error!(error = %format!("{:#}", e), "Control task failed");
            }
        }));
    }

    let layout = BoardLayout::from(&config.display);
    let (snapshot_tx, snapshot_rx) = watch::channel(BoardSnapshot {
        frame: FrameBuffer::new(layout.width, layout.height),
        state: ConnectionState::Disconnected,
        primary: None,
        skipped_cycles: 0,
    });
    let scheduler = Scheduler::new(
        session.clone(),
        store.clone(),
        layout,
        SyncParams::from(&config.sync),
        Duration::from_millis(config.sync.tick_ms),
    )
    .with_snapshots(snapshot_tx);
    tasks.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));

    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_terminate().await;
        tracing::info!("Interrupt signal received, stopping");
        let _ = signal_shutdown.send(true);
    });

    let ui_result = run_terminal(&snapshot_rx, &shutdown_tx);
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if tokio::time::timeout(TASK_STOP_TIMEOUT, task).await.is_err() {
            tracing::warn!("Task did not stop in time");
        }
    }
    tracing::info!(state = session.state().await.label(), "Session stopped");
    ui_result
}
