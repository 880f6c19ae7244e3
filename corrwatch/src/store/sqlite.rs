use std::{collections::BTreeMap, path::Path, time::Duration};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use super::SampleStore;
use crate::{
    error::PersistenceError,
    sample::{Sample, Symbol, SymbolPair},
};

const TABLE: &str = "prices";

/// How long a connection waits on a lock held by another connection before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`SampleStore`] backed by a single SQLite table, one row per sample:
///
/// ```text
/// prices (timestamp TEXT, "<symbol a>" REAL, "<symbol b>" REAL)
/// ```
///
/// The database runs in WAL mode so a reader in another process (eg/ the dashboard) never blocks
/// the collector's appends. Timestamps are stored as RFC 3339 UTC with microsecond precision, so
/// lexical order equals chronological order.
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
    pair: SymbolPair,
}

impl std::fmt::Debug for SqliteSampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSampleStore")
            .field("pair", &self.pair)
            .finish_non_exhaustive()
    }
}

impl SqliteSampleStore {
    /// Open (or create) the database at `path` for the given symbol pair.
    pub fn open(path: impl AsRef<Path>, pair: SymbolPair) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        info!(path = %path.display(), %pair, "sample store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            pair,
        })
    }

    pub fn pair(&self) -> &SymbolPair {
        &self.pair
    }

    fn columns(&self) -> (String, String) {
        (quote_ident(&self.pair.a), quote_ident(&self.pair.b))
    }
}

impl SampleStore for SqliteSampleStore {
    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let (column_a, column_b) = self.columns();
        let conn = self.conn.lock();

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (timestamp TEXT, {column_a} REAL, {column_b} REAL)"
        ))?;

        let existing: Vec<String> = {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
            let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
            names.collect::<Result<_, _>>()?
        };

        if !existing.iter().any(|name| name.eq_ignore_ascii_case("timestamp")) {
            return Err(PersistenceError::Schema(format!(
                "table {TABLE} exists without a timestamp column"
            )));
        }

        for symbol in self.pair.symbols() {
            if existing
                .iter()
                .any(|name| name.eq_ignore_ascii_case(symbol.as_str()))
            {
                continue;
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {TABLE} ADD COLUMN {} REAL",
                quote_ident(symbol)
            ))?;
            info!(%symbol, "added price column for new symbol");
        }

        Ok(())
    }

    fn append(&self, sample: &Sample) -> Result<(), PersistenceError> {
        let (column_a, column_b) = self.columns();
        let conn = self.conn.lock();

        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {TABLE} (timestamp, {column_a}, {column_b}) VALUES (?1, ?2, ?3)"
        ))?;
        stmt.execute(params![
            format_timestamp(sample.timestamp),
            sample.price(&self.pair.a),
            sample.price(&self.pair.b),
        ])?;

        debug!(timestamp = %sample.timestamp, "sample appended");
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<Sample>, PersistenceError> {
        let (column_a, column_b) = self.columns();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<(Option<String>, Option<f64>, Option<f64>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT timestamp, {column_a}, {column_b} FROM {TABLE} \
                 ORDER BY timestamp DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map([limit], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let mut samples: Vec<Sample> = rows
            .into_iter()
            .filter_map(|(timestamp, price_a, price_b)| {
                let timestamp = match timestamp.as_deref().map(parse_timestamp) {
                    Some(Ok(timestamp)) => timestamp,
                    Some(Err(error)) => {
                        warn!(%error, "skipping stored sample");
                        return None;
                    }
                    None => {
                        warn!("skipping stored sample without timestamp");
                        return None;
                    }
                };
                let values: BTreeMap<Symbol, f64> = [
                    (self.pair.a.clone(), price_a),
                    (self.pair.b.clone(), price_b),
                ]
                .into_iter()
                .filter_map(|(symbol, price)| Some((symbol, price?)))
                .collect();
                Some(Sample::new(timestamp, values))
            })
            .collect();

        samples.sort_by_key(|sample| sample.timestamp);
        Ok(samples)
    }

    fn len(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Double-quoted SQL identifier for a symbol column.
fn quote_ident(symbol: &Symbol) -> String {
    format!("\"{}\"", symbol.as_str().replace('"', "\"\""))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse RFC 3339, falling back to a naive ISO 8601 timestamp interpreted as UTC.
fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, PersistenceError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PersistenceError::Corrupt(format!("unparseable timestamp {input:?}")))
}
