//! Local SQLite store for the salon ledger.
//!
//! Uses rusqlite with WAL mode. Document-shaped fields (per-staff summary
//! amounts, gift-card history, client reward history) live in JSON TEXT
//! columns; everything the reconciliation queries touch is a real column.
//! Provides schema migrations, settings helpers, and shared connection state
//! for the service facade.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection, mapping a poisoned mutex to a typed error.
    pub fn lock(&self) -> LedgerResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{data_dir}/ledger.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> LedgerResult<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| LedgerError::Invalid(format!("create data dir: {e}")))?;

    let db_path = data_dir.join("ledger.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open an in-memory database through the same migration path.
/// Used by the service facade's test constructor.
pub fn init_in_memory() -> LedgerResult<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> LedgerResult<Connection> {
    let conn = Connection::open(path)?;

    // busy_timeout doubles as the explicit timeout on a contended store:
    // a stuck writer fails after 5s instead of hanging the caller forever.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: core ledger tables.
fn migrate_v1(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- users (staff roster; role in technician/staff/admin)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'technician',
            commission_rate REAL NOT NULL DEFAULT 0.6,
            check_payout_fraction REAL NOT NULL DEFAULT 0.7,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- earnings (per-visit transaction log, append-only)
        CREATE TABLE IF NOT EXISTS earnings (
            id TEXT PRIMARY KEY,
            staff_name TEXT NOT NULL,
            service TEXT,
            earning REAL NOT NULL DEFAULT 0,
            tip REAL NOT NULL DEFAULT 0,
            date_raw TEXT NOT NULL DEFAULT '',
            day_key TEXT NOT NULL DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- salon_earnings (one summary document per calendar day;
        -- day_key uses the legacy non-padded {year}-{month}-{day} form)
        CREATE TABLE IF NOT EXISTS salon_earnings (
            day_key TEXT PRIMARY KEY,
            staff_json TEXT NOT NULL DEFAULT '{}',
            sell_gift_card REAL NOT NULL DEFAULT 0,
            return_gift_card REAL NOT NULL DEFAULT 0,
            check_total REAL NOT NULL DEFAULT 0,
            no_of_credit REAL NOT NULL DEFAULT 0,
            total_credit REAL NOT NULL DEFAULT 0,
            venmo REAL NOT NULL DEFAULT 0,
            square REAL NOT NULL DEFAULT 0,
            product REAL NOT NULL DEFAULT 0,
            supply REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- gift_cards (balance is a denormalized cache of the history tail)
        CREATE TABLE IF NOT EXISTS gift_cards (
            id TEXT PRIMARY KEY,
            code TEXT UNIQUE NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            balance REAL NOT NULL DEFAULT 0,
            recipient TEXT,
            sender TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            expires_at TEXT,
            history TEXT NOT NULL DEFAULT '[]',
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_earnings_day ON earnings(day_key);
        CREATE INDEX IF NOT EXISTS idx_earnings_staff ON earnings(staff_name);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    Ok(())
}

/// Migration v2: clients table for the two reward schemes.
/// Royalty (points) and cash-reward fields share the row but never each
/// other's columns.
fn migrate_v2(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            phone TEXT UNIQUE NOT NULL,
            name TEXT,
            royalty_points INTEGER NOT NULL DEFAULT 0,
            point_history TEXT NOT NULL DEFAULT '[]',
            cash_reward_balance REAL NOT NULL DEFAULT 0,
            reward_progress INTEGER NOT NULL DEFAULT 0,
            spending_history TEXT NOT NULL DEFAULT '[]',
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_clients_phone ON clients(phone);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;
    Ok(())
}

/// Migration v3: composite index for the merge query's per-day staff sums.
fn migrate_v3(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_earnings_day_staff ON earnings(day_key, staff_name);
        CREATE INDEX IF NOT EXISTS idx_gift_cards_status ON gift_cards(status);

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a setting value, or `None` if unset.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Get a numeric setting with a default.
pub fn get_setting_f64(conn: &Connection, category: &str, key: &str, default: f64) -> f64 {
    get_setting(conn, category, key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_run_clean_on_fresh_db() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        assert!(get_setting(&conn, "rewards", "visit_threshold").is_none());
        set_setting(&conn, "rewards", "visit_threshold", "10").unwrap();
        set_setting(&conn, "rewards", "visit_threshold", "12").unwrap();
        assert_eq!(
            get_setting(&conn, "rewards", "visit_threshold").as_deref(),
            Some("12")
        );
        assert_eq!(
            get_setting_f64(&conn, "rewards", "visit_threshold", 10.0),
            12.0
        );
        assert_eq!(get_setting_f64(&conn, "rewards", "missing", 10.0), 10.0);
    }
}
