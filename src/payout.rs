//! Commission payouts over merged ledger rows.
//!
//! `payout = revenue × rate`, split into a check portion
//! (`payout × checkFraction`) and a cash portion (the remainder). The staff
//! dashboard folds accumulated tips into the cash portion; the admin daily
//! table does not.
//!
//! Commission rates are stored ambiguously in legacy data: `60` and `0.6`
//! both mean 60%. Normalization happens here, exactly once per computation —
//! callers must pass the stored value through untouched so it can never be
//! scaled twice.

use chrono::Datelike;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::LedgerResult;
use crate::reconcile::{self, MergedDay};
use crate::staff::StaffMember;

/// Which report is asking. The contexts differ only in tip handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutContext {
    /// Staff-facing dashboard: tips ride along in the cash portion.
    StaffDashboard,
    /// Admin daily-report table: payout figures only.
    AdminReport,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutBreakdown {
    pub revenue: f64,
    pub tips: f64,
    pub payout: f64,
    pub check_portion: f64,
    pub cash_portion: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPayout {
    pub staff_id: String,
    pub staff_name: String,
    #[serde(flatten)]
    pub breakdown: PayoutBreakdown,
}

/// One point of the per-staff yearly trend chart.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub month: u32,
    pub revenue: f64,
    pub payout: f64,
}

/// `60` and `0.6` both mean 60%: anything above `1` is a percentage.
pub fn normalize_commission_rate(rate: f64) -> f64 {
    if rate > 1.0 {
        rate / 100.0
    } else {
        rate
    }
}

/// Compute one payout from already-aggregated revenue and tips.
/// `commission_rate` and `check_fraction` are the stored values.
pub fn compute(
    revenue: f64,
    tips: f64,
    commission_rate: f64,
    check_fraction: f64,
    context: PayoutContext,
) -> PayoutBreakdown {
    let rate = normalize_commission_rate(commission_rate);
    let payout = revenue * rate;
    let check_portion = payout * check_fraction;
    let mut cash_portion = payout - check_portion;
    if context == PayoutContext::StaffDashboard {
        cash_portion += tips;
    }
    PayoutBreakdown {
        revenue,
        tips,
        payout,
        check_portion,
        cash_portion,
    }
}

/// Sum one staff member's resolved revenue and tips across merged rows.
pub fn staff_revenue(rows: &[MergedDay], member: &StaffMember) -> (f64, f64) {
    let mut revenue = 0.0;
    let mut tips = 0.0;
    for row in rows {
        if let Some(amount) = row.staff.get(&member.name) {
            revenue += amount.resolved;
            tips += amount.tips;
        }
    }
    (revenue, tips)
}

/// Payout per roster member over a merged row set (a day, a month — any
/// range the caller assembled).
pub fn payouts_for_rows(
    rows: &[MergedDay],
    roster: &[StaffMember],
    context: PayoutContext,
) -> Vec<StaffPayout> {
    roster
        .iter()
        .map(|member| {
            let (revenue, tips) = staff_revenue(rows, member);
            StaffPayout {
                staff_id: member.id.clone(),
                staff_name: member.name.clone(),
                breakdown: compute(
                    revenue,
                    tips,
                    member.commission_rate,
                    member.check_payout_fraction,
                    context,
                ),
            }
        })
        .collect()
}

/// Twelve monthly points for one staff member's trend chart. Future months
/// of the current year come back as zeros, which is what the chart plots.
pub fn yearly_trend(
    conn: &Connection,
    member: &StaffMember,
    year: i32,
) -> LedgerResult<Vec<TrendPoint>> {
    let mut points = Vec::with_capacity(12);
    for month in 1..=12 {
        let rows = reconcile::merge_month(conn, year, month)?;
        let (revenue, tips) = staff_revenue(&rows, member);
        let breakdown = compute(
            revenue,
            tips,
            member.commission_rate,
            member.check_payout_fraction,
            PayoutContext::AdminReport,
        );
        points.push(TrendPoint {
            month,
            revenue,
            payout: breakdown.payout,
        });
    }
    Ok(points)
}

/// Yearly rollup for the trend header: sum of the monthly points.
pub fn yearly_total(points: &[TrendPoint]) -> (f64, f64) {
    points
        .iter()
        .fold((0.0, 0.0), |(rev, pay), p| (rev + p.revenue, pay + p.payout))
}

impl TrendPoint {
    /// Month label as plotted, e.g. `2025-03`.
    pub fn label(&self, year: i32) -> String {
        let day = chrono::NaiveDate::from_ymd_opt(year, self.month, 1);
        match day {
            Some(d) => format!("{}-{:02}", d.year(), d.month()),
            None => String::new(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earnings::EarningInput;
    use crate::staff::StaffRole;
    use crate::{db, earnings, staff};
    use serde_json::json;

    #[test]
    fn rate_normalization_accepts_both_units() {
        assert_eq!(normalize_commission_rate(0.6), 0.6);
        assert_eq!(normalize_commission_rate(60.0), 0.6);
        assert_eq!(normalize_commission_rate(1.0), 1.0);
        assert_eq!(normalize_commission_rate(100.0), 1.0);
    }

    #[test]
    fn percentage_rate_scenario() {
        // rate 70, check fraction 0.7, monthly revenue 1000
        let b = compute(1000.0, 0.0, 70.0, 0.7, PayoutContext::AdminReport);
        assert_eq!(b.payout, 700.0);
        assert_eq!(b.check_portion, 490.0);
        assert!((b.cash_portion - 210.0).abs() < 1e-9);
    }

    #[test]
    fn fraction_and_percentage_rates_agree() {
        let a = compute(850.0, 0.0, 0.6, 0.7, PayoutContext::AdminReport);
        let b = compute(850.0, 0.0, 60.0, 0.7, PayoutContext::AdminReport);
        assert_eq!(a.payout, b.payout);
        assert_eq!(a.check_portion, b.check_portion);
    }

    #[test]
    fn tips_land_in_cash_only_on_the_dashboard() {
        let admin = compute(1000.0, 55.0, 0.6, 0.7, PayoutContext::AdminReport);
        let dash = compute(1000.0, 55.0, 0.6, 0.7, PayoutContext::StaffDashboard);
        assert!((admin.cash_portion - 180.0).abs() < 1e-9);
        assert!((dash.cash_portion - 235.0).abs() < 1e-9);
        // The payout itself never includes tips
        assert_eq!(admin.payout, dash.payout);
    }

    #[test]
    fn monthly_rollup_and_yearly_trend_sum_days() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let linda = staff::create(&conn, "Linda", StaffRole::Technician, 70.0, 0.7).unwrap();
        for (amount, date) in [(400.0, "2025-03-02"), (600.0, "2025-03-15")] {
            earnings::append(
                &conn,
                &EarningInput {
                    staff_name: "Linda".into(),
                    service: None,
                    earning: json!(amount),
                    tip: json!(0),
                    date: json!(date),
                },
            )
            .unwrap();
        }

        let rows = crate::reconcile::merge_month(&conn, 2025, 3).unwrap();
        let payouts = payouts_for_rows(&rows, &[linda.clone()], PayoutContext::AdminReport);
        assert_eq!(payouts[0].breakdown.revenue, 1000.0);
        assert_eq!(payouts[0].breakdown.payout, 700.0);
        assert_eq!(payouts[0].breakdown.check_portion, 490.0);

        let trend = yearly_trend(&conn, &linda, 2025).unwrap();
        assert_eq!(trend.len(), 12);
        assert_eq!(trend[2].month, 3);
        assert_eq!(trend[2].revenue, 1000.0);
        assert_eq!(trend[0].revenue, 0.0);
        let (year_rev, year_pay) = yearly_total(&trend);
        assert_eq!(year_rev, 1000.0);
        assert_eq!(year_pay, 700.0);
        assert_eq!(trend[2].label(2025), "2025-03");
    }
}
