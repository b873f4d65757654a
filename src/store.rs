use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::BoardError;
use crate::model::Bucket;

/// Closed-market window used for the day-gain reference, in UTC hours.
const CLOSED_MARKET_START_HOUR: u32 = 21;
const CLOSED_MARKET_END_HOUR: u32 = 8;

/// Durable, bucketed price history.
///
/// Implementations serialize their own I/O; callers never hold a lock
/// of theirs while calling in.
pub trait PriceStore: Send + Sync {
    fn write(&self, symbol: &str, price: f64, ts_ms: i64) -> Result<(), BoardError>;

    /// Dense window of `length` buckets ending at `now_ms`, oldest first.
    /// Buckets without a confirmed write are `None`.
    fn read_window(&self, symbol: &str, length: usize, now_ms: i64)
        -> Result<Vec<Bucket>, BoardError>;

    /// Whole seconds since the most recent write for any symbol.
    /// `None` when nothing was ever written.
    fn seconds_since_last_write(&self, now_ms: i64) -> Result<Option<u64>, BoardError>;

    fn last_price(&self, symbol: &str) -> Result<Option<f64>, BoardError>;

    /// Price the day-gain is measured against.
    fn reference_price(&self, symbol: &str, now_ms: i64) -> Result<Option<f64>, BoardError>;
}

pub struct SqlitePriceStore {
    path: Option<PathBuf>,
    interval_ms: i64,
    conn: Mutex<Connection>,
}

fn open_connection(path: Option<&Path>) -> rusqlite::Result<Connection> {
    let conn = match path {
        Some(path) => Connection::open(path)?,
        None => Connection::open_in_memory()?,
    };
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ticker_history (
            symbol TEXT NOT NULL,
            ts_ms INTEGER NOT NULL,
            price REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ticker_history_symbol_ts
            ON ticker_history(symbol, ts_ms);

        CREATE INDEX IF NOT EXISTS idx_ticker_history_ts
            ON ticker_history(ts_ms);
        "#,
    )?;
    Ok(conn)
}

impl SqlitePriceStore {
    pub fn open(path: &Path, interval_secs: u64) -> Result<Self, BoardError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = open_connection(Some(path))?;
        tracing::info!(path = %path.display(), "Opened price store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            interval_ms: interval_secs as i64 * 1_000,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory(interval_secs: u64) -> Result<Self, BoardError> {
        Ok(Self {
            path: None,
            interval_ms: interval_secs as i64 * 1_000,
            conn: Mutex::new(open_connection(None)?),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f`, reopening a file-backed connection once on failure.
    fn with_conn<T>(
        &self,
        op: &'static str,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, BoardError> {
        let mut conn = self.lock();
        let first_err = match f(&conn) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        let Some(path) = &self.path else {
            return Err(BoardError::StoreUnavailable(format!("{}: {}", op, first_err)));
        };
        tracing::warn!(op, error = %first_err, "Price store query failed, reopening connection");
        match open_connection(Some(path)) {
            Ok(fresh) => {
                *conn = fresh;
                f(&conn).map_err(|e| BoardError::StoreUnavailable(format!("{}: {}", op, e)))
            }
            Err(e) => Err(BoardError::StoreUnavailable(format!(
                "{}: reopen failed: {}",
                op, e
            ))),
        }
    }
}

/// Map a timestamp into a window of `length` buckets ending at `now_ms`.
/// Bucket `length - 1` is the one closing at `now_ms` (inclusive).
pub fn bucket_index(ts_ms: i64, now_ms: i64, interval_ms: i64, length: usize) -> Option<usize> {
    if length == 0 || interval_ms <= 0 || ts_ms > now_ms {
        return None;
    }
    let age = now_ms - ts_ms;
    let from_end = if age == 0 { 0 } else { (age - 1) / interval_ms };
    let from_end = usize::try_from(from_end).ok()?;
    if from_end >= length {
        return None;
    }
    Some(length - 1 - from_end)
}

fn closed_market_window(now: DateTime<Utc>) -> (i64, i64) {
    let today = now.date_naive();
    let start = (today - Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
        + Duration::hours(CLOSED_MARKET_START_HOUR as i64);
    let end = today.and_time(NaiveTime::MIN).and_utc() + Duration::hours(CLOSED_MARKET_END_HOUR as i64);
    (start.timestamp_millis(), end.timestamp_millis())
}

impl PriceStore for SqlitePriceStore {
    fn write(&self, symbol: &str, price: f64, ts_ms: i64) -> Result<(), BoardError> {
        self.with_conn("write", |conn| {
            conn.execute(
                "INSERT INTO ticker_history (symbol, ts_ms, price) VALUES (?1, ?2, ?3)",
                params![symbol, ts_ms, price],
            )
            .map(|_| ())
        })
    }

    fn read_window(
        &self,
        symbol: &str,
        length: usize,
        now_ms: i64,
    ) -> Result<Vec<Bucket>, BoardError> {
        let mut window: Vec<Bucket> = vec![None; length];
        if length == 0 {
            return Ok(window);
        }
        let interval_ms = self.interval_ms;
        let since_ms = now_ms - interval_ms * length as i64;

        let rows = self.with_conn("read_window", |conn| {
            let mut stmt = conn.prepare_cached(
                r#"
                SELECT ts_ms, price
                FROM ticker_history
                WHERE symbol = ?1 AND ts_ms > ?2 AND ts_ms <= ?3
                ORDER BY ts_ms ASC
                "#,
            )?;
            let rows = stmt.query_map(params![symbol, since_ms, now_ms], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        // Ascending order: the latest sample in a bucket wins.
        for (ts_ms, price) in rows {
            if let Some(idx) = bucket_index(ts_ms, now_ms, interval_ms, length) {
                window[idx] = Some(price);
            }
        }
        Ok(window)
    }

    fn seconds_since_last_write(&self, now_ms: i64) -> Result<Option<u64>, BoardError> {
        let last = self.with_conn("seconds_since_last_write", |conn| {
            conn.query_row("SELECT MAX(ts_ms) FROM ticker_history", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
        })?;
        Ok(last.map(|ts| (now_ms.saturating_sub(ts).max(0) / 1_000) as u64))
    }

    fn last_price(&self, symbol: &str) -> Result<Option<f64>, BoardError> {
        self.with_conn("last_price", |conn| {
            conn.query_row(
                r#"
                SELECT price FROM ticker_history
                WHERE symbol = ?1
                ORDER BY ts_ms DESC LIMIT 1
                "#,
                [symbol],
                |row| row.get::<_, f64>(0),
            )
            .optional()
        })
    }

    fn reference_price(&self, symbol: &str, now_ms: i64) -> Result<Option<f64>, BoardError> {
        let Some(now) = DateTime::<Utc>::from_timestamp_millis(now_ms) else {
            return Ok(None);
        };
        let (closed_start, closed_end) = closed_market_window(now);
        let day_start = now
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis();

        self.with_conn("reference_price", |conn| {
            let closed = conn
                .query_row(
                    r#"
                    SELECT price FROM ticker_history
                    WHERE symbol = ?1 AND ts_ms BETWEEN ?2 AND ?3
                    ORDER BY ts_ms DESC LIMIT 1
                    "#,
                    params![symbol, closed_start, closed_end],
                    |row| row.get::<_, f64>(0),
                )
                .optional()?;
            if closed.is_some() {
                return Ok(closed);
            }
            conn.query_row(
                r#"
                SELECT price FROM ticker_history
                WHERE symbol = ?1 AND ts_ms >= ?2
                ORDER BY ts_ms ASC LIMIT 1
                "#,
                params![symbol, day_start],
                |row| row.get::<_, f64>(0),
            )
            .optional()
        })
    }
}
