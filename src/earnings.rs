//! Per-visit earning records (`earnings` collection).
//!
//! One record per service rendered, written by the check-out flow. Records
//! are append-only apart from explicit edit-and-resave and individual delete.
//! Amounts and dates are normalized at this ingestion boundary; the canonical
//! day key is stored alongside the raw date value the writer supplied.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::{dates, money};

/// Incoming record as the UI writers supply it: amounts and the date arrive
/// as loosely-typed JSON values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningInput {
    #[serde(alias = "staff", alias = "staff_name")]
    pub staff_name: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub earning: Value,
    #[serde(default)]
    pub tip: Value,
    #[serde(default)]
    pub date: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningRecord {
    pub id: String,
    pub staff_name: String,
    pub service: Option<String>,
    pub earning: f64,
    pub tip: f64,
    /// The writer's original date value, kept verbatim.
    pub date_raw: String,
    /// Canonical `YYYY-MM-DD`, or `""` when the raw date was unparseable.
    pub day: String,
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EarningRecord> {
    Ok(EarningRecord {
        id: row.get(0)?,
        staff_name: row.get(1)?,
        service: row.get(2)?,
        earning: row.get(3)?,
        tip: row.get(4)?,
        date_raw: row.get(5)?,
        day: row.get(6)?,
    })
}

const EARNING_COLUMNS: &str = "id, staff_name, service, earning, tip, date_raw, day_key";

fn raw_date_string(date: &Value) -> String {
    match date {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Append one earning record.
pub fn append(conn: &Connection, input: &EarningInput) -> LedgerResult<EarningRecord> {
    let staff_name = input.staff_name.trim();
    if staff_name.is_empty() {
        return Err(LedgerError::Invalid("earning record needs a staff name".into()));
    }
    let record = EarningRecord {
        id: Uuid::new_v4().to_string(),
        staff_name: staff_name.to_string(),
        service: input
            .service
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
        earning: money::parse_money(&input.earning),
        tip: money::parse_money(&input.tip),
        date_raw: raw_date_string(&input.date),
        day: dates::normalize_date(&input.date),
    };
    conn.execute(
        "INSERT INTO earnings (id, staff_name, service, earning, tip, date_raw, day_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.staff_name,
            record.service,
            record.earning,
            record.tip,
            record.date_raw,
            record.day
        ],
    )?;
    info!(staff = %record.staff_name, day = %record.day, earning = record.earning, "Earning recorded");
    Ok(record)
}

/// Edit-and-resave: the whole record is re-normalized from the new input.
pub fn update(conn: &Connection, id: &str, input: &EarningInput) -> LedgerResult<EarningRecord> {
    let staff_name = input.staff_name.trim();
    if staff_name.is_empty() {
        return Err(LedgerError::Invalid("earning record needs a staff name".into()));
    }
    let record = EarningRecord {
        id: id.to_string(),
        staff_name: staff_name.to_string(),
        service: input
            .service
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
        earning: money::parse_money(&input.earning),
        tip: money::parse_money(&input.tip),
        date_raw: raw_date_string(&input.date),
        day: dates::normalize_date(&input.date),
    };
    let changed = conn.execute(
        "UPDATE earnings SET staff_name = ?2, service = ?3, earning = ?4, tip = ?5,
                date_raw = ?6, day_key = ?7, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            record.id,
            record.staff_name,
            record.service,
            record.earning,
            record.tip,
            record.date_raw,
            record.day
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::Invalid(format!("earning record not found: {id}")));
    }
    Ok(record)
}

pub fn delete(conn: &Connection, id: &str) -> LedgerResult<()> {
    let changed = conn.execute("DELETE FROM earnings WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LedgerError::Invalid(format!("earning record not found: {id}")));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> LedgerResult<Option<EarningRecord>> {
    Ok(conn
        .query_row(
            &format!("SELECT {EARNING_COLUMNS} FROM earnings WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?)
}

/// Records within a canonical day-key range, ascending by day then insertion.
/// Records with an empty day key (unparseable dates) only surface when the
/// range starts at `""`.
pub fn list_for_range(conn: &Connection, from: &str, to: &str) -> LedgerResult<Vec<EarningRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EARNING_COLUMNS} FROM earnings
         WHERE day_key >= ?1 AND day_key <= ?2
         ORDER BY day_key ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map(params![from, to], row_to_record)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Live transaction table: most recent first by insertion order.
pub fn list_recent(conn: &Connection, limit: usize) -> LedgerResult<Vec<EarningRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EARNING_COLUMNS} FROM earnings ORDER BY rowid DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], row_to_record)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ===========================================================================
// Tests
// ===========================================================================
