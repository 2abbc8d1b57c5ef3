//! Service facade for UI collaborators.
//!
//! The calendar, check-in queue, and report screens never touch the stores
//! directly; they call through `LedgerService`. Reads hand back merged ledger
//! rows plus payout rollups; writes are attempted exactly once and report a
//! typed result synchronously — there is no retry policy anywhere.

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::daily_summary::{self, DailySummary};
use crate::db::{self, DbState};
use crate::earnings::{self, EarningInput, EarningRecord};
use crate::error::{LedgerError, LedgerResult};
use crate::gift_cards::{self, GiftCard, IssueRequest, TxType};
use crate::payout::{self, PayoutContext, StaffPayout, TrendPoint};
use crate::reconcile::{self, MergedDay};
use crate::staff::{self, StaffMember, StaffRole};
use crate::{clients, dates};

/// Merged rows plus rollups for one requested range.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub days: Vec<MergedDay>,
    pub payouts: Vec<StaffPayout>,
    pub total_revenue: f64,
    pub total_cash: f64,
}

pub struct LedgerService {
    db: DbState,
}

impl LedgerService {
    /// Open (or create) the ledger database under `data_dir`.
    pub fn open(data_dir: &Path) -> LedgerResult<Self> {
        Ok(LedgerService {
            db: db::init(data_dir)?,
        })
    }

    /// In-memory instance running the same migrations. Used by tests and the
    /// console's demo mode.
    pub fn in_memory() -> LedgerResult<Self> {
        Ok(LedgerService {
            db: db::init_in_memory()?,
        })
    }

    // -----------------------------------------------------------------------
    // Ledger reads
    // -----------------------------------------------------------------------

    /// Merged rows and admin payout rollups for a calendar month.
    pub fn ledger_month(&self, year: i32, month: u32) -> LedgerResult<LedgerView> {
        let (from, to) = dates::month_range(year, month)
            .ok_or_else(|| LedgerError::Invalid(format!("invalid month: {year}-{month}")))?;
        self.ledger_range(from, to)
    }

    /// Merged rows and admin payout rollups for an inclusive date range.
    pub fn ledger_range(&self, from: NaiveDate, to: NaiveDate) -> LedgerResult<LedgerView> {
        let conn = self.db.lock()?;
        let days = reconcile::merge_range(&conn, from, to)?;
        let roster = staff::list_commissioned(&conn)?;
        let payouts = payout::payouts_for_rows(&days, &roster, PayoutContext::AdminReport);
        let total_revenue = days.iter().map(|d| d.total_revenue).sum();
        let total_cash = days.iter().map(|d| d.total_cash).sum();
        Ok(LedgerView {
            days,
            payouts,
            total_revenue,
            total_cash,
        })
    }

    /// Live transaction table, most recent first.
    pub fn recent_earnings(&self, limit: usize) -> LedgerResult<Vec<EarningRecord>> {
        let conn = self.db.lock()?;
        earnings::list_recent(&conn, limit)
    }

    /// Staff-facing monthly payout: tips ride in the cash portion here.
    pub fn staff_dashboard(&self, staff_id: &str, year: i32, month: u32) -> LedgerResult<StaffPayout> {
        let conn = self.db.lock()?;
        let member = staff::get(&conn, staff_id)?;
        let rows = reconcile::merge_month(&conn, year, month)?;
        let mut payouts =
            payout::payouts_for_rows(&rows, std::slice::from_ref(&member), PayoutContext::StaffDashboard);
        Ok(payouts.remove(0))
    }

    /// Twelve monthly points for the per-staff trend chart.
    pub fn staff_trend(&self, staff_id: &str, year: i32) -> LedgerResult<Vec<TrendPoint>> {
        let conn = self.db.lock()?;
        let member = staff::get(&conn, staff_id)?;
        payout::yearly_trend(&conn, &member, year)
    }

    // -----------------------------------------------------------------------
    // Ledger writes
    // -----------------------------------------------------------------------

    /// Check-out write: append the earning record and bump the matching
    /// staff field on the day's summary document. The legacy console issued
    /// these as two separate writes; with a local store both land in one SQL
    /// transaction. The merge rule is unaffected either way.
    pub fn record_visit(&self, input: &EarningInput) -> LedgerResult<EarningRecord> {
        let conn = self.db.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> LedgerResult<EarningRecord> {
            let record = earnings::append(&conn, input)?;
            if let Some(day) = dates::parse_day_key(&record.day) {
                daily_summary::add_staff_amount(&conn, day, &record.staff_name, record.earning)?;
            }
            Ok(record)
        })();
        match result {
            Ok(record) => {
                conn.execute_batch("COMMIT")?;
                Ok(record)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Edit-and-resave an earning record. The summary document is not
    /// touched; reconciliation re-reads both sources on every view.
    pub fn edit_earning(&self, id: &str, input: &EarningInput) -> LedgerResult<EarningRecord> {
        let conn = self.db.lock()?;
        earnings::update(&conn, id, input)
    }

    pub fn delete_earning(&self, id: &str) -> LedgerResult<()> {
        let conn = self.db.lock()?;
        earnings::delete(&conn, id)
    }

    /// Daily-report form write: partial-field upsert of one day's document.
    pub fn submit_daily_report(
        &self,
        day: NaiveDate,
        fields: &Map<String, Value>,
    ) -> LedgerResult<DailySummary> {
        let conn = self.db.lock()?;
        daily_summary::upsert_fields(&conn, day, fields)
    }

    // -----------------------------------------------------------------------
    // Staff roster
    // -----------------------------------------------------------------------

    pub fn add_staff(
        &self,
        name: &str,
        role: StaffRole,
        commission_rate: f64,
        check_payout_fraction: f64,
    ) -> LedgerResult<StaffMember> {
        let conn = self.db.lock()?;
        staff::create(&conn, name, role, commission_rate, check_payout_fraction)
    }

    pub fn update_staff(&self, member: &StaffMember) -> LedgerResult<()> {
        let conn = self.db.lock()?;
        staff::update(&conn, member)
    }

    pub fn staff_roster(&self) -> LedgerResult<Vec<StaffMember>> {
        let conn = self.db.lock()?;
        staff::list(&conn)
    }

    // -----------------------------------------------------------------------
    // Gift cards
    // -----------------------------------------------------------------------

    pub fn issue_gift_cards(&self, req: &IssueRequest) -> LedgerResult<Vec<GiftCard>> {
        let conn = self.db.lock()?;
        gift_cards::issue_batch(&conn, req)
    }

    pub fn gift_card_transaction(
        &self,
        card_id: &str,
        tx_type: TxType,
        amount: f64,
        note: &str,
    ) -> LedgerResult<GiftCard> {
        let conn = self.db.lock()?;
        gift_cards::apply_transaction(&conn, card_id, tx_type, amount, note)
    }

    pub fn activate_gift_card(&self, card_id: &str) -> LedgerResult<GiftCard> {
        let conn = self.db.lock()?;
        gift_cards::activate(&conn, card_id)
    }

    pub fn set_gift_card_code(&self, card_id: &str, code: &str) -> LedgerResult<GiftCard> {
        let conn = self.db.lock()?;
        gift_cards::set_code(&conn, card_id, code)
    }

    pub fn find_gift_card(&self, code: &str) -> LedgerResult<GiftCard> {
        let conn = self.db.lock()?;
        gift_cards::get_by_code(&conn, code)
    }

    pub fn gift_cards(&self) -> LedgerResult<Vec<GiftCard>> {
        let conn = self.db.lock()?;
        gift_cards::list(&conn)
    }

    // -----------------------------------------------------------------------
    // Client rewards
    // -----------------------------------------------------------------------

    pub fn accrue_points(&self, phone: &str, amount: f64, note: &str) -> LedgerResult<clients::Client> {
        let conn = self.db.lock()?;
        clients::accrue_points(&conn, phone, amount, note)
    }

    pub fn redeem_points(&self, phone: &str, points: i64, note: &str) -> LedgerResult<clients::Client> {
        let conn = self.db.lock()?;
        clients::redeem_points(&conn, phone, points, note)
    }

    pub fn record_reward_visit(&self, phone: &str, amount: f64, note: &str) -> LedgerResult<clients::Client> {
        let conn = self.db.lock()?;
        clients::record_visit(&conn, phone, amount, note)
    }

    pub fn spend_cash_reward(&self, phone: &str, amount: f64) -> LedgerResult<clients::Client> {
        let conn = self.db.lock()?;
        clients::spend_cash_reward(&conn, phone, amount)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn visit(staff: &str, amount: f64, date: &str) -> EarningInput {
        EarningInput {
            staff_name: staff.to_string(),
            service: Some("Full set".to_string()),
            earning: json!(amount),
            tip: json!(0),
            date: json!(date),
        }
    }

    #[test]
    fn record_visit_writes_both_stores() {
        let svc = LedgerService::in_memory().unwrap();
        svc.add_staff("Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        svc.record_visit(&visit("Linda", 45.0, "2025-03-02")).unwrap();
        svc.record_visit(&visit("Linda", 30.0, "2025-03-02")).unwrap();

        let view = svc.ledger_month(2025, 3).unwrap();
        let row = view.days.iter().find(|d| d.day == "2025-03-02").unwrap();
        // Live sum and the companion summary field agree
        assert_eq!(row.staff["Linda"].live, 75.0);
        assert_eq!(row.staff["Linda"].manual, 75.0);
        assert!(!row.is_missing_report);
        assert_eq!(view.total_revenue, 75.0);
    }

    #[test]
    fn view_rolls_up_admin_payouts() {
        let svc = LedgerService::in_memory().unwrap();
        let linda = svc.add_staff("Linda", StaffRole::Technician, 70.0, 0.7).unwrap();
        svc.record_visit(&visit("Linda", 1000.0, "2025-03-02")).unwrap();

        let view = svc.ledger_month(2025, 3).unwrap();
        let p = view.payouts.iter().find(|p| p.staff_id == linda.id).unwrap();
        assert_eq!(p.breakdown.payout, 700.0);
        assert_eq!(p.breakdown.check_portion, 490.0);
        assert!((p.breakdown.cash_portion - 210.0).abs() < 1e-9);
    }

    #[test]
    fn dashboard_and_trend_cover_a_staff_year() {
        let svc = LedgerService::in_memory().unwrap();
        let linda = svc.add_staff("Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        svc.record_visit(&EarningInput {
            staff_name: "Linda".into(),
            service: None,
            earning: json!(100),
            tip: json!(20),
            date: json!("2025-03-02"),
        })
        .unwrap();

        let dash = svc.staff_dashboard(&linda.id, 2025, 3).unwrap();
        assert_eq!(dash.breakdown.payout, 60.0);
        // Dashboard folds tips into cash: 60 - 42 + 20
        assert!((dash.breakdown.cash_portion - 38.0).abs() < 1e-9);

        let trend = svc.staff_trend(&linda.id, 2025).unwrap();
        assert_eq!(trend.len(), 12);
        assert_eq!(trend[2].revenue, 100.0);
    }

    #[test]
    fn gift_card_flow_through_the_facade() {
        let svc = LedgerService::in_memory().unwrap();
        let cards = svc
            .issue_gift_cards(&IssueRequest {
                quantity: 2,
                amount: 50.0,
                manual_start: None,
                recipient: None,
                sender: None,
                expires_at: None,
            })
            .unwrap();
        let card = svc.activate_gift_card(&cards[0].id).unwrap();
        let card = svc
            .gift_card_transaction(&card.id, TxType::Redeem, 20.0, "polish change")
            .unwrap();
        assert_eq!(card.balance, 30.0);
        assert!(svc.find_gift_card("GC-000002").is_ok());
        assert!(matches!(
            svc.gift_card_transaction(&card.id, TxType::Redeem, 31.0, ""),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(svc.gift_cards().unwrap().len(), 2);
    }

    #[test]
    fn manual_report_alone_still_produces_a_ledger() {
        let svc = LedgerService::in_memory().unwrap();
        svc.add_staff("Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let fields = json!({"linda": 150, "sellGiftCard": 20, "check": 10});
        svc.submit_daily_report(day, fields.as_object().unwrap()).unwrap();

        let view = svc.ledger_range(day, day).unwrap();
        assert_eq!(view.days[0].staff["Linda"].resolved, 150.0);
        assert_eq!(view.days[0].total_revenue, 170.0);
        assert_eq!(view.days[0].total_cash, 160.0);
    }
}
