//! SQLite-backed cycle ledger

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::core::types::CycleStatus;
use crate::error::{TradingError, TradingResult};
use crate::store::{CycleRecord, LedgerStore};

/// Ledger implementation over a single SQLite connection. The engine is
/// the only writer; the mutex exists for the occasional read from another
/// task (status queries, tests).
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (or create) a ledger database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(SqliteLedger {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory ledger (for testing)
    pub fn new_in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(SqliteLedger {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations to set up or update the schema
    pub fn run_migrations(&self) -> SqlResult<()> {
        let conn = self.conn.lock().unwrap();
        let migration_sql = include_str!("migrations/V1__initial_schema.sql");
        conn.execute_batch(migration_sql)?;
        Ok(())
    }

    /// Get a reference to the connection (for custom queries)
    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Check database health
    pub fn health_check(&self) -> SqlResult<bool> {
        let conn = self.conn.lock().unwrap();
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }

    fn upsert(&self, record: &CycleRecord) -> TradingResult<()> {
        let data = serde_json::to_string(record)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cycles (
                id, bot_id, symbol, magic_number, direction, status,
                total_profit, total_volume, reversal_count, close_reason,
                close_time, data, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                direction = excluded.direction,
                status = excluded.status,
                total_profit = excluded.total_profit,
                total_volume = excluded.total_volume,
                reversal_count = excluded.reversal_count,
                close_reason = excluded.close_reason,
                close_time = excluded.close_time,
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![
                record.id,
                record.bot_id,
                record.symbol,
                record.magic_number,
                record.direction.as_str(),
                record.status.as_str(),
                record.total_profit,
                record.total_volume,
                record.reversal_count,
                record.close_reason,
                record.close_time.map(|t| t.to_rfc3339()),
                data,
            ],
        )?;
        Ok(())
    }

    /// Load one cycle record by id.
    pub fn cycle_by_id(&self, id: &str) -> TradingResult<Option<CycleRecord>> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row("SELECT data FROM cycles WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Total cycles recorded for one bot, any status.
    pub fn cycle_count(&self, bot_id: &str) -> TradingResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cycles WHERE bot_id = ?1",
            params![bot_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl LedgerStore for SqliteLedger {
    fn create_cycle(&self, record: &CycleRecord) -> TradingResult<String> {
        self.upsert(record)?;
        Ok(record.id.clone())
    }

    fn update_cycle(&self, id: &str, record: &CycleRecord) -> TradingResult<()> {
        if id != record.id {
            return Err(TradingError::Store(format!(
                "record id {} does not match update target {}",
                record.id, id
            )));
        }
        self.upsert(record)
    }

    fn active_cycles(&self, bot_id: &str) -> TradingResult<Vec<CycleRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT data FROM cycles WHERE bot_id = ?1 AND status != ?2 ORDER BY updated_at",
        )?;
        let rows = stmt.query_map(params![bot_id, CycleStatus::Closed.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }
}
