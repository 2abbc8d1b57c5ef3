//! Reconciliation of the two earning writers.
//!
//! Staff earnings arrive through two independent, eventually-consistent
//! paths: the per-visit entry screen (live `earnings` records) and the manual
//! daily-report form (`salon_earnings` documents). For any staff-day the
//! canonical amount is resolved as:
//!
//! > **if the live sum is greater than zero it wins; otherwise the manual
//! > field is used.**
//!
//! This rule is the conflict-resolution policy for the two writers and must
//! not be replaced with a timestamp-based merge — that would change reported
//! totals. It carries a known quirk: a manual correction reverted to exactly
//! `0` can never override a positive live total, and a manual `0` is
//! indistinguishable from "no entry", so a $0 correction is impossible to
//! record.
//!
//! Merged rows are derived on every read and never stored.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::daily_summary::{self, SummaryTotals};
use crate::error::{LedgerError, LedgerResult};
use crate::{dates, earnings, staff};

/// Which writer supplied the canonical amount for a staff-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountSource {
    Live,
    Manual,
}

/// Both candidate amounts for a staff-day plus the resolution.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAmount {
    pub live: f64,
    pub manual: f64,
    pub resolved: f64,
    /// Accumulated tips from the live records (the manual form carries none).
    pub tips: f64,
    pub source: AmountSource,
}

/// One ledger row per calendar day, covering every commissioned staff member.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDay {
    /// Canonical `YYYY-MM-DD`.
    pub day: String,
    /// Resolution per staff display name.
    pub staff: BTreeMap<String, ResolvedAmount>,
    /// Live amounts whose staff name matched nobody on the roster. Surfaced
    /// and counted into revenue rather than silently dropped.
    pub unmatched: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub totals: SummaryTotals,
    pub total_revenue: f64,
    pub non_cash_total: f64,
    pub total_cash: f64,
    /// True when no summary document exists for the day — the day appears
    /// only through live records (or not at all) and is still fully computed.
    pub is_missing_report: bool,
}

/// The resolution rule, isolated so it cannot drift between call sites.
pub fn resolve_amount(live: f64, manual: f64) -> (f64, AmountSource) {
    if live > 0.0 {
        (live, AmountSource::Live)
    } else {
        (manual, AmountSource::Manual)
    }
}

/// Merge a whole calendar month, rows ascending by day.
pub fn merge_month(conn: &Connection, year: i32, month: u32) -> LedgerResult<Vec<MergedDay>> {
    let (from, to) = dates::month_range(year, month)
        .ok_or_else(|| LedgerError::Invalid(format!("invalid month: {year}-{month}")))?;
    merge_range(conn, from, to)
}

/// Merge an inclusive date range into one row per day, ascending by day.
pub fn merge_range(conn: &Connection, from: NaiveDate, to: NaiveDate) -> LedgerResult<Vec<MergedDay>> {
    if from > to {
        return Err(LedgerError::Invalid("range start is after range end".into()));
    }

    let roster = staff::list_commissioned(conn)?;
    let records = earnings::list_for_range(conn, &dates::day_key(from), &dates::day_key(to))?;
    let summaries = daily_summary::list_range(conn, from, to)?;

    // Live sums per (day, lower-cased name): (earnings, tips, display spelling)
    let mut live: BTreeMap<(String, String), (f64, f64, String)> = BTreeMap::new();
    for rec in &records {
        let display = rec.staff_name.trim().to_string();
        let entry = live
            .entry((rec.day.clone(), display.to_lowercase()))
            .or_insert((0.0, 0.0, display));
        entry.0 += rec.earning;
        entry.1 += rec.tip;
    }

    let mut rows = Vec::new();
    for day in dates::days_between(from, to) {
        let key = dates::day_key(day);
        let summary = summaries.get(&day);
        let is_missing_report = summary.is_none();
        let totals = summary.map(|s| s.totals).unwrap_or_default();

        let mut staff_amounts = BTreeMap::new();
        let mut resolved_sum = 0.0;
        for member in &roster {
            let field = member.summary_field();
            let (live_sum, tips) = live
                .get(&(key.clone(), field.clone()))
                .map(|(e, t, _)| (*e, *t))
                .unwrap_or((0.0, 0.0));
            let manual = summary.map(|s| s.staff_amount(&field)).unwrap_or(0.0);
            let (resolved, source) = resolve_amount(live_sum, manual);
            resolved_sum += resolved;
            staff_amounts.insert(
                member.name.clone(),
                ResolvedAmount {
                    live: live_sum,
                    manual,
                    resolved,
                    tips,
                    source,
                },
            );
        }

        // Live entries with no roster match: keep them visible and counted.
        let mut unmatched = BTreeMap::new();
        for ((rec_day, lower), (sum, _tips, display_name)) in &live {
            if rec_day != &key {
                continue;
            }
            if roster.iter().any(|m| &m.summary_field() == lower) {
                continue;
            }
            warn!(day = %key, staff = %display_name, amount = sum, "Earning for unknown staff name");
            unmatched.insert(display_name.clone(), *sum);
        }
        let unmatched_sum: f64 = unmatched.values().sum();

        let total_revenue = resolved_sum + unmatched_sum + totals.sell_gift_card;
        let non_cash_total =
            totals.total_credit + totals.check + totals.venmo + totals.square + totals.return_gift_card;
        let total_cash = total_revenue - non_cash_total;

        rows.push(MergedDay {
            day: key,
            staff: staff_amounts,
            unmatched,
            totals,
            total_revenue,
            non_cash_total,
            total_cash,
            is_missing_report,
        });
    }

    debug!(
        from = %dates::day_key(from),
        to = %dates::day_key(to),
        rows = rows.len(),
        "Ledger range merged"
    );
    Ok(rows)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::earnings::EarningInput;
    use crate::staff::StaffRole;
    use serde_json::{json, Value};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_earning(conn: &Connection, staff: &str, amount: f64, date: &str) {
        earnings::append(
            conn,
            &EarningInput {
                staff_name: staff.to_string(),
                service: None,
                earning: json!(amount),
                tip: Value::Null,
                date: json!(date),
            },
        )
        .unwrap();
    }

    fn patch(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn live_beats_manual_when_positive() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "Linda", 45.0, "2025-03-02");
        daily_summary::upsert_fields(&conn, day(2025, 3, 2), &patch(json!({"linda": 999}))).unwrap();

        let rows = merge_range(&conn, day(2025, 3, 2), day(2025, 3, 2)).unwrap();
        let linda = &rows[0].staff["Linda"];
        assert_eq!(linda.resolved, 45.0);
        assert_eq!(linda.source, AmountSource::Live);
        assert_eq!(linda.manual, 999.0);
    }

    #[test]
    fn manual_used_when_live_is_zero_or_absent() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        staff::create(&conn, "Amy", StaffRole::Staff, 0.6, 0.7).unwrap();
        // Amy has a live record of exactly 0 — the manual entry still wins
        add_earning(&conn, "Amy", 0.0, "2025-03-02");
        daily_summary::upsert_fields(
            &conn,
            day(2025, 3, 2),
            &patch(json!({"linda": 150, "amy": 80})),
        )
        .unwrap();

        let rows = merge_range(&conn, day(2025, 3, 2), day(2025, 3, 2)).unwrap();
        assert_eq!(rows[0].staff["Linda"].resolved, 150.0);
        assert_eq!(rows[0].staff["Linda"].source, AmountSource::Manual);
        assert_eq!(rows[0].staff["Amy"].resolved, 80.0);
        assert_eq!(rows[0].staff["Amy"].source, AmountSource::Manual);
    }

    #[test]
    fn linda_scenario_from_two_writers() {
        // EarningRecord {Linda, 45} on 2025-03-02; summary 2025-3-2 has
        // {linda: 0, sellGiftCard: 20, check: 10} -> Linda 45, revenue 65,
        // cash 55.
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "Linda", 45.0, "2025-03-02");
        daily_summary::upsert_fields(
            &conn,
            day(2025, 3, 2),
            &patch(json!({"linda": 0, "sellGiftCard": 20, "check": 10})),
        )
        .unwrap();

        let rows = merge_month(&conn, 2025, 3).unwrap();
        let row = rows.iter().find(|r| r.day == "2025-03-02").unwrap();
        assert_eq!(row.staff["Linda"].resolved, 45.0);
        assert_eq!(row.total_revenue, 65.0);
        assert_eq!(row.non_cash_total, 10.0);
        assert_eq!(row.total_cash, 55.0);
        assert!(!row.is_missing_report);
    }

    #[test]
    fn cash_identity_holds_for_every_row() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "Linda", 45.5, "2025-03-02");
        add_earning(&conn, "Linda", 30.25, "2025-03-05");
        daily_summary::upsert_fields(
            &conn,
            day(2025, 3, 5),
            &patch(json!({"totalCredit": 12.5, "venmo": 3, "square": 1.25, "check": 4})),
        )
        .unwrap();

        for row in merge_month(&conn, 2025, 3).unwrap() {
            assert_eq!(row.total_revenue - row.non_cash_total, row.total_cash);
        }
    }

    #[test]
    fn live_only_day_is_flagged_missing_but_computed() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "linda ", 45.0, "2025-03-02");

        let rows = merge_range(&conn, day(2025, 3, 2), day(2025, 3, 2)).unwrap();
        assert!(rows[0].is_missing_report);
        // Case-insensitive, trimmed name matching
        assert_eq!(rows[0].staff["Linda"].resolved, 45.0);
        assert_eq!(rows[0].total_revenue, 45.0);
        assert_eq!(rows[0].total_cash, 45.0);
    }

    #[test]
    fn unmatched_names_are_surfaced_not_dropped() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "Linda", 40.0, "2025-03-02");
        add_earning(&conn, "Guest Tech", 25.0, "2025-03-02");

        let rows = merge_range(&conn, day(2025, 3, 2), day(2025, 3, 2)).unwrap();
        assert_eq!(rows[0].unmatched["Guest Tech"], 25.0);
        assert_eq!(rows[0].total_revenue, 65.0);
    }

    #[test]
    fn month_rows_ascend_and_cover_every_day() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        add_earning(&conn, "Linda", 10.0, "2025-03-20");
        add_earning(&conn, "Linda", 10.0, "2025-03-01");

        let rows = merge_month(&conn, 2025, 3).unwrap();
        assert_eq!(rows.len(), 31);
        assert_eq!(rows.first().unwrap().day, "2025-03-01");
        assert_eq!(rows.last().unwrap().day, "2025-03-31");
        let mut sorted = rows.iter().map(|r| r.day.clone()).collect::<Vec<_>>();
        sorted.sort();
        assert_eq!(sorted, rows.iter().map(|r| r.day.clone()).collect::<Vec<_>>());
    }

    #[test]
    fn tips_accumulate_separately_from_earnings() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        staff::create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        earnings::append(
            &conn,
            &EarningInput {
                staff_name: "Linda".into(),
                service: None,
                earning: json!(40),
                tip: json!(8),
                date: json!("2025-03-02"),
            },
        )
        .unwrap();

        let rows = merge_range(&conn, day(2025, 3, 2), day(2025, 3, 2)).unwrap();
        assert_eq!(rows[0].staff["Linda"].tips, 8.0);
        // Tips never count into day revenue
        assert_eq!(rows[0].total_revenue, 40.0);
    }
}
