//! Daily summary documents (`salon_earnings` collection).
//!
//! One document per calendar day, written by the manual daily-report form as
//! a series of partial-field upserts. Per-staff amounts are keyed by the
//! lower-cased display name; the remaining fields are the non-commission
//! revenue buckets (gift-card sales, card/check/electronic totals, product,
//! supply).
//!
//! Document keys keep the legacy non-padded `{year}-{month}-{day}` form, which
//! does not sort lexicographically — range queries parse keys instead of
//! comparing them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::LedgerResult;
use crate::{dates, money};

/// Non-commission revenue buckets carried on every summary document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryTotals {
    pub sell_gift_card: f64,
    pub return_gift_card: f64,
    pub check: f64,
    pub no_of_credit: f64,
    pub total_credit: f64,
    pub venmo: f64,
    pub square: f64,
    pub product: f64,
    pub supply: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    /// Calendar day this document covers.
    pub day: NaiveDate,
    /// Amount per lower-cased staff display name.
    pub staff: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub totals: SummaryTotals,
}

impl DailySummary {
    fn empty(day: NaiveDate) -> Self {
        DailySummary {
            day,
            staff: BTreeMap::new(),
            totals: SummaryTotals::default(),
        }
    }

    /// Manual amount for a staff member's lower-cased name field, `0` when
    /// the field is absent (the two are indistinguishable by design).
    pub fn staff_amount(&self, field: &str) -> f64 {
        self.staff.get(field).copied().unwrap_or(0.0)
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, DailySummary)> {
    let key: String = row.get(0)?;
    let staff_json: String = row.get(1)?;
    let staff: BTreeMap<String, f64> = serde_json::from_str(&staff_json).unwrap_or_default();
    let day = dates::parse_day_key(&key).unwrap_or(NaiveDate::MIN);
    Ok((
        key,
        DailySummary {
            day,
            staff,
            totals: SummaryTotals {
                sell_gift_card: row.get(2)?,
                return_gift_card: row.get(3)?,
                check: row.get(4)?,
                no_of_credit: row.get(5)?,
                total_credit: row.get(6)?,
                venmo: row.get(7)?,
                square: row.get(8)?,
                product: row.get(9)?,
                supply: row.get(10)?,
            },
        },
    ))
}

const SUMMARY_COLUMNS: &str = "day_key, staff_json, sell_gift_card, return_gift_card, check_total, \
                               no_of_credit, total_credit, venmo, square, product, supply";

/// Fetch the summary document for a day, if one exists.
pub fn get(conn: &Connection, day: NaiveDate) -> LedgerResult<Option<DailySummary>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SUMMARY_COLUMNS} FROM salon_earnings WHERE day_key = ?1"),
            params![dates::summary_key(day)],
            row_to_summary,
        )
        .optional()?
        .map(|(_, summary)| summary))
}

/// All summary documents whose day falls in `[from, to]`, keyed by day.
pub fn list_range(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> LedgerResult<BTreeMap<NaiveDate, DailySummary>> {
    let mut stmt = conn.prepare(&format!("SELECT {SUMMARY_COLUMNS} FROM salon_earnings"))?;
    let rows = stmt.query_map([], row_to_summary)?;
    let mut out = BTreeMap::new();
    for row in rows.flatten() {
        let (_, summary) = row;
        if summary.day >= from && summary.day <= to {
            out.insert(summary.day, summary);
        }
    }
    Ok(out)
}

/// Partial-field upsert, the way the daily-report form writes.
///
/// Known bucket names (camelCase) update their columns; any other field is
/// treated as a lower-cased staff name. Only the fields present in the patch
/// change; everything else on the document is left as is. Values go through
/// the money parser, so currency strings are accepted.
pub fn upsert_fields(
    conn: &Connection,
    day: NaiveDate,
    fields: &Map<String, Value>,
) -> LedgerResult<DailySummary> {
    let mut summary = get(conn, day)?.unwrap_or_else(|| DailySummary::empty(day));

    for (key, value) in fields {
        let amount = money::parse_money(value);
        match key.as_str() {
            "sellGiftCard" => summary.totals.sell_gift_card = amount,
            "returnGiftCard" => summary.totals.return_gift_card = amount,
            "check" => summary.totals.check = amount,
            "noOfCredit" => summary.totals.no_of_credit = amount,
            "totalCredit" => summary.totals.total_credit = amount,
            "venmo" => summary.totals.venmo = amount,
            "square" => summary.totals.square = amount,
            "product" => summary.totals.product = amount,
            "supply" => summary.totals.supply = amount,
            staff_field => {
                summary
                    .staff
                    .insert(staff_field.trim().to_lowercase(), amount);
            }
        }
    }

    write(conn, &summary)?;
    info!(day = %dates::day_key(day), fields = fields.len(), "Daily summary upserted");
    Ok(summary)
}

/// Add `delta` to one staff field, creating the document if needed.
/// Used by the check-out flow's companion write.
pub fn add_staff_amount(
    conn: &Connection,
    day: NaiveDate,
    staff_field: &str,
    delta: f64,
) -> LedgerResult<DailySummary> {
    let mut summary = get(conn, day)?.unwrap_or_else(|| DailySummary::empty(day));
    let field = staff_field.trim().to_lowercase();
    let next = summary.staff_amount(&field) + delta;
    summary.staff.insert(field, next);
    write(conn, &summary)?;
    Ok(summary)
}

fn write(conn: &Connection, summary: &DailySummary) -> LedgerResult<()> {
    let staff_json = serde_json::to_string(&summary.staff)?;
    let t = &summary.totals;
    conn.execute(
        "INSERT INTO salon_earnings
            (day_key, staff_json, sell_gift_card, return_gift_card, check_total,
             no_of_credit, total_credit, venmo, square, product, supply, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, datetime('now'))
         ON CONFLICT(day_key) DO UPDATE SET
            staff_json = excluded.staff_json,
            sell_gift_card = excluded.sell_gift_card,
            return_gift_card = excluded.return_gift_card,
            check_total = excluded.check_total,
            no_of_credit = excluded.no_of_credit,
            total_credit = excluded.total_credit,
            venmo = excluded.venmo,
            square = excluded.square,
            product = excluded.product,
            supply = excluded.supply,
            updated_at = excluded.updated_at",
        params![
            dates::summary_key(summary.day),
            staff_json,
            t.sell_gift_card,
            t.return_gift_card,
            t.check,
            t.no_of_credit,
            t.total_credit,
            t.venmo,
            t.square,
            t.product,
            t.supply
        ],
    )?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn partial_upserts_merge_over_time() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let d = day(2025, 3, 2);

        upsert_fields(&conn, d, &patch(json!({"linda": 120, "sellGiftCard": 20}))).unwrap();
        upsert_fields(&conn, d, &patch(json!({"amy": "80", "check": "$10"}))).unwrap();

        let doc = get(&conn, d).unwrap().unwrap();
        assert_eq!(doc.staff_amount("linda"), 120.0);
        assert_eq!(doc.staff_amount("amy"), 80.0);
        assert_eq!(doc.totals.sell_gift_card, 20.0);
        assert_eq!(doc.totals.check, 10.0);
        // Untouched fields stay at their defaults
        assert_eq!(doc.totals.venmo, 0.0);
    }

    #[test]
    fn staff_fields_are_lowercased() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let d = day(2025, 3, 2);
        upsert_fields(&conn, d, &patch(json!({"Linda ": 45}))).unwrap();
        let doc = get(&conn, d).unwrap().unwrap();
        assert_eq!(doc.staff_amount("linda"), 45.0);
    }

    #[test]
    fn document_key_is_non_padded() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let d = day(2025, 3, 2);
        upsert_fields(&conn, d, &patch(json!({"linda": 1}))).unwrap();
        let key: String = conn
            .query_row("SELECT day_key FROM salon_earnings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(key, "2025-3-2");
    }

    #[test]
    fn range_query_parses_keys_instead_of_sorting_them() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        // "2025-10-1" < "2025-2-1" lexicographically; the range must not care
        upsert_fields(&conn, day(2025, 2, 1), &patch(json!({"linda": 1}))).unwrap();
        upsert_fields(&conn, day(2025, 10, 1), &patch(json!({"linda": 2}))).unwrap();

        let feb = list_range(&conn, day(2025, 2, 1), day(2025, 2, 28)).unwrap();
        assert_eq!(feb.len(), 1);
        let oct = list_range(&conn, day(2025, 10, 1), day(2025, 10, 31)).unwrap();
        assert_eq!(oct.len(), 1);
        assert_eq!(oct[&day(2025, 10, 1)].staff_amount("linda"), 2.0);
    }

    #[test]
    fn add_staff_amount_accumulates() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let d = day(2025, 3, 2);
        add_staff_amount(&conn, d, "Linda", 45.0).unwrap();
        add_staff_amount(&conn, d, "linda", 30.0).unwrap();
        let doc = get(&conn, d).unwrap().unwrap();
        assert_eq!(doc.staff_amount("linda"), 75.0);
    }
}
