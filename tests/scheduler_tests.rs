use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ticker_board::error::BoardError;
use ticker_board::model::{Bucket, SymbolEntry};
use ticker_board::render::surface::FrameBuffer;
use ticker_board::render::BoardLayout;
use ticker_board::scheduler::{BoardSnapshot, CycleOutcome, Scheduler};
use ticker_board::session::{ConnectionState, Session};
use ticker_board::store::{PriceStore, SqlitePriceStore};
use ticker_board::sync::SyncParams;

const NOW: i64 = 1_700_000_000_000;

fn layout() -> BoardLayout {
    BoardLayout {
        width: 64,
        height: 32,
        chart_height: 17,
        logo_size: 20,
        render_logos: true,
    }
}

fn board(names: &[&str]) -> (Arc<Session>, Arc<dyn PriceStore>, Scheduler) {
    let symbols = names.iter().map(|n| SymbolEntry::plain(n)).collect();
    let session = Arc::new(Session::new(symbols, 10, NOW));
    let store: Arc<dyn PriceStore> = Arc::new(SqlitePriceStore::open_in_memory(60).unwrap());
    let scheduler = Scheduler::new(
        session.clone(),
        store.clone(),
        layout(),
        SyncParams::new(60, 5),
        Duration::from_millis(1_000),
    );
    (session, store, scheduler)
}

#[tokio::test]
/// Verifies a cycle is skipped, not delayed, while the session lock is held.
async fn busy_session_skips_cycle() {
    let (session, _store, mut scheduler) = board(&["AAPL"]);
    {
        let _guard = session.lock().await;
        assert_eq!(scheduler.run_cycle(NOW), CycleOutcome::Skipped);
        assert_eq!(scheduler.run_cycle(NOW + 1_000), CycleOutcome::Skipped);
    }
    assert_eq!(scheduler.skipped_cycles(), 2);
    assert!(matches!(scheduler.run_cycle(NOW + 2_000), CycleOutcome::Ran { .. }));
}

#[tokio::test]
/// Verifies an empty symbol set leaves the board idle.
async fn no_symbols_is_idle() {
    let (_session, _store, mut scheduler) = board(&[]);
    assert_eq!(scheduler.run_cycle(NOW), CycleOutcome::Idle);
    assert_eq!(scheduler.frame().lit_pixels(), 0);
}

#[tokio::test]
/// Verifies confirmed prices are persisted and rolled into the chart, and
/// an untraded confirmed bucket becomes a gap.
async fn confirmation_persists_and_rolls_chart() {
    let (session, store, mut scheduler) = board(&["AAPL"]);
    session.lock().await.latest.set("AAPL", 100.0);

    assert_eq!(
        scheduler.run_cycle(NOW),
        CycleOutcome::Ran {
            confirmed: true,
            rotated: false
        }
    );
    assert_eq!(store.last_price("AAPL").unwrap(), Some(100.0));
    assert_eq!(session.lock().await.latest.get("AAPL"), None);
    let window = scheduler.renderer().window("AAPL").unwrap();
    assert_eq!(window.len(), 64);
    assert_eq!(window.back().copied().flatten(), Some(100.0));

    // Mid-interval trade only previews.
    session.lock().await.latest.set("AAPL", 101.0);
    assert_eq!(
        scheduler.run_cycle(NOW + 20_000),
        CycleOutcome::Ran {
            confirmed: false,
            rotated: true
        }
    );
    assert_eq!(session.lock().await.latest.get("AAPL"), Some(101.0));

    session.lock().await.latest.clear("AAPL");
    let outcome = scheduler.run_cycle(NOW + 60_000);
    assert!(matches!(outcome, CycleOutcome::Ran { confirmed: true, .. }));
    let window = scheduler.renderer().window("AAPL").unwrap();
    assert_eq!(window.len(), 64);
    assert_eq!(window.back().copied().flatten(), None);
    assert_eq!(window.get(62).copied().flatten(), Some(100.0));
}

#[tokio::test]
/// Verifies the primary symbol rotates after the switch time and the
/// snapshot follows it.
async fn rotation_advances_primary() {
    let (session, _store, scheduler) = board(&["AAPL", "MSFT"]);
    let (tx, rx) = watch::channel(BoardSnapshot {
        frame: FrameBuffer::new(64, 32),
        state: ConnectionState::Disconnected,
        primary: None,
        skipped_cycles: 0,
    });
    let mut scheduler = scheduler.with_snapshots(tx);

    scheduler.run_cycle(NOW);
    assert_eq!(rx.borrow().primary.as_deref(), Some("AAPL"));

    scheduler.run_cycle(NOW + 5_000);
    assert_eq!(rx.borrow().primary.as_deref(), Some("AAPL"));

    assert!(matches!(
        scheduler.run_cycle(NOW + 10_000),
        CycleOutcome::Ran { rotated: true, .. }
    ));
    assert_eq!(rx.borrow().primary.as_deref(), Some("MSFT"));
    assert!(rx.borrow().frame.texts().iter().any(|t| t.text == "MSFT"));

    scheduler.run_cycle(NOW + 20_000);
    assert_eq!(rx.borrow().primary.as_deref(), Some("AAPL"));
    assert_eq!(session.lock().await.visible_index, 0);
}

#[tokio::test]
/// Verifies a control push that only relabels symbols still redraws the
/// primary view with the new label.
async fn relabel_redraws_primary_view() {
    let (session, _store, mut scheduler) = board(&["AAPL"]);
    scheduler.run_cycle(NOW);
    assert!(scheduler.frame().texts().iter().any(|t| t.text == "AAPL"));

    let outcome = session
        .apply_control_message(
            r#"{"type":"config","id":1,"subs":["Apple"],"api_names":["AAPL"],"logo_names":["apple"]}"#,
        )
        .await
        .unwrap();
    assert!(!outcome.symbols_changed);

    scheduler.run_cycle(NOW + 1_000);
    let texts: Vec<&str> = scheduler
        .frame()
        .texts()
        .iter()
        .map(|t| t.text.as_str())
        .collect();
    assert!(texts.contains(&"Apple"));
    assert!(!texts.contains(&"AAPL"));
    assert_eq!(scheduler.frame().images().len(), 1);
}

#[tokio::test]
/// Verifies a feed reconnect right after a confirmation does not confirm
/// the same interval boundary a second time.
async fn reconnect_does_not_reconfirm_boundary() {
    let (session, store, mut scheduler) = board(&["AAPL"]);
    store.write("AAPL", 99.0, NOW - 600_000).unwrap();

    assert!(matches!(scheduler.run_cycle(NOW), CycleOutcome::Ran { confirmed: true, .. }));
    assert!(matches!(
        scheduler.run_cycle(NOW + 60_000),
        CycleOutcome::Ran { confirmed: true, .. }
    ));
    let before = scheduler.renderer().window("AAPL").unwrap().clone();

    session.lock().await.clear_in_flight();
    assert!(matches!(
        scheduler.run_cycle(NOW + 62_000),
        CycleOutcome::Ran { confirmed: false, .. }
    ));
    assert_eq!(scheduler.renderer().window("AAPL").unwrap(), &before);
}

/// Store that cannot report its last write.
struct NoHistoryStore;

impl PriceStore for NoHistoryStore {
    fn write(&self, _symbol: &str, _price: f64, _ts_ms: i64) -> Result<(), BoardError> {
        Ok(())
    }

    fn read_window(&self, _symbol: &str, length: usize, _now_ms: i64) -> Result<Vec<Bucket>, BoardError> {
        Ok(vec![None; length])
    }

    fn seconds_since_last_write(&self, _now_ms: i64) -> Result<Option<u64>, BoardError> {
        Err(BoardError::StoreUnavailable("database is locked".to_string()))
    }

    fn last_price(&self, _symbol: &str) -> Result<Option<f64>, BoardError> {
        Ok(None)
    }

    fn reference_price(&self, _symbol: &str, _now_ms: i64) -> Result<Option<f64>, BoardError> {
        Ok(None)
    }
}

#[tokio::test]
/// Verifies a failed synchronization still renders and publishes the
/// primary view from the in-flight price.
async fn sync_failure_still_renders_frame() {
    let session = Arc::new(Session::new(vec![SymbolEntry::plain("AAPL")], 10, NOW));
    let (tx, rx) = watch::channel(BoardSnapshot {
        frame: FrameBuffer::new(64, 32),
        state: ConnectionState::Disconnected,
        primary: None,
        skipped_cycles: 0,
    });
    let mut scheduler = Scheduler::new(
        session.clone(),
        Arc::new(NoHistoryStore),
        layout(),
        SyncParams::new(60, 5),
        Duration::from_millis(1_000),
    )
    .with_snapshots(tx);
    session.lock().await.latest.set("AAPL", 100.0);

    assert_eq!(
        scheduler.run_cycle(NOW),
        CycleOutcome::Ran {
            confirmed: false,
            rotated: false
        }
    );
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.primary.as_deref(), Some("AAPL"));
    assert!(snapshot.frame.texts().iter().any(|t| t.text == "100.00"));
    assert!(snapshot.frame.lit_pixels() > 0);
    assert_eq!(session.lock().await.latest.get("AAPL"), Some(100.0));
}
