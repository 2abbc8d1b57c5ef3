//! Client reward schemes (`clients` collection).
//!
//! Clients are merged on their phone number after stripping every non-digit.
//! Two independent schemes live on the same row and never touch each other's
//! fields: the points-based royalty program (1 point per whole dollar spent,
//! redeemable, with an append-only point history) and the threshold-based
//! cash reward (a visit counter that converts into a fixed credit every
//! `visit_threshold` visits). Whether the two should ever be unified is an
//! open product question; they are kept deliberately separate here.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{LedgerError, LedgerResult};

/// Default visits needed for one cash reward; override via the
/// `rewards`/`visit_threshold` setting.
const DEFAULT_VISIT_THRESHOLD: i64 = 10;
/// Default credit granted at the threshold; override via `rewards`/`reward_amount`.
const DEFAULT_REWARD_AMOUNT: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointEntry {
    pub timestamp: String,
    pub delta: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendEntry {
    pub timestamp: String,
    pub amount: f64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    /// Digits-only merge key.
    pub phone: String,
    pub name: Option<String>,
    // Royalty scheme
    pub royalty_points: i64,
    pub point_history: Vec<PointEntry>,
    // Cash-reward scheme
    pub cash_reward_balance: f64,
    pub reward_progress: i64,
    pub spending_history: Vec<SpendEntry>,
}

/// Strip everything but ASCII digits.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
    let point_json: String = row.get(4)?;
    let spend_json: String = row.get(7)?;
    Ok(Client {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        royalty_points: row.get(3)?,
        point_history: serde_json::from_str(&point_json).unwrap_or_default(),
        cash_reward_balance: row.get(5)?,
        reward_progress: row.get(6)?,
        spending_history: serde_json::from_str(&spend_json).unwrap_or_default(),
    })
}

const CLIENT_COLUMNS: &str = "id, phone, name, royalty_points, point_history, \
                              cash_reward_balance, reward_progress, spending_history";

pub fn get_by_phone(conn: &Connection, phone: &str) -> LedgerResult<Option<Client>> {
    let key = normalize_phone(phone);
    if key.is_empty() {
        return Err(LedgerError::Invalid("phone number has no digits".into()));
    }
    Ok(conn
        .query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE phone = ?1"),
            params![key],
            row_to_client,
        )
        .optional()?)
}

/// Find-or-create by normalized phone. A supplied name refreshes the stored
/// one; differently formatted phone spellings merge onto the same row.
pub fn upsert_by_phone(conn: &Connection, phone: &str, name: Option<&str>) -> LedgerResult<Client> {
    let key = normalize_phone(phone);
    if key.is_empty() {
        return Err(LedgerError::Invalid("phone number has no digits".into()));
    }
    if let Some(mut existing) = get_by_phone(conn, &key)? {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            conn.execute(
                "UPDATE clients SET name = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![existing.id, name],
            )?;
            existing.name = Some(name.to_string());
        }
        return Ok(existing);
    }
    let client = Client {
        id: Uuid::new_v4().to_string(),
        phone: key,
        name: name.map(str::trim).filter(|n| !n.is_empty()).map(String::from),
        royalty_points: 0,
        point_history: Vec::new(),
        cash_reward_balance: 0.0,
        reward_progress: 0,
        spending_history: Vec::new(),
    };
    conn.execute(
        "INSERT INTO clients (id, phone, name) VALUES (?1, ?2, ?3)",
        params![client.id, client.phone, client.name],
    )?;
    info!(phone = %client.phone, "Client created");
    Ok(client)
}

fn write_royalty(conn: &Connection, client: &Client) -> LedgerResult<()> {
    conn.execute(
        "UPDATE clients SET royalty_points = ?2, point_history = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            client.id,
            client.royalty_points,
            serde_json::to_string(&client.point_history)?
        ],
    )?;
    Ok(())
}

fn write_cash_reward(conn: &Connection, client: &Client) -> LedgerResult<()> {
    conn.execute(
        "UPDATE clients SET cash_reward_balance = ?2, reward_progress = ?3,
                spending_history = ?4, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            client.id,
            client.cash_reward_balance,
            client.reward_progress,
            serde_json::to_string(&client.spending_history)?
        ],
    )?;
    Ok(())
}

/// Royalty scheme: accrue 1 point per whole dollar spent.
pub fn accrue_points(
    conn: &Connection,
    phone: &str,
    amount_spent: f64,
    note: &str,
) -> LedgerResult<Client> {
    let mut client = upsert_by_phone(conn, phone, None)?;
    let delta = amount_spent.max(0.0).floor() as i64;
    client.royalty_points += delta;
    client.point_history.push(PointEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        delta,
        note: note.to_string(),
    });
    write_royalty(conn, &client)?;
    Ok(client)
}

/// Royalty scheme: spend points against the balance.
pub fn redeem_points(conn: &Connection, phone: &str, points: i64, note: &str) -> LedgerResult<Client> {
    let key = normalize_phone(phone);
    let mut client =
        get_by_phone(conn, &key)?.ok_or_else(|| LedgerError::ClientNotFound(key.clone()))?;
    if points <= 0 {
        return Err(LedgerError::Invalid("point redemption must be positive".into()));
    }
    if points > client.royalty_points {
        return Err(LedgerError::InsufficientPoints {
            phone: client.phone.clone(),
            points: client.royalty_points,
            requested: points,
        });
    }
    client.royalty_points -= points;
    client.point_history.push(PointEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        delta: -points,
        note: note.to_string(),
    });
    write_royalty(conn, &client)?;
    Ok(client)
}

/// Cash-reward scheme: count one visit; at the configured threshold the
/// counter converts into a fixed credit and resets.
pub fn record_visit(
    conn: &Connection,
    phone: &str,
    amount_spent: f64,
    note: &str,
) -> LedgerResult<Client> {
    let mut client = upsert_by_phone(conn, phone, None)?;
    let threshold = db::get_setting_f64(
        conn,
        "rewards",
        "visit_threshold",
        DEFAULT_VISIT_THRESHOLD as f64,
    ) as i64;
    let reward = db::get_setting_f64(conn, "rewards", "reward_amount", DEFAULT_REWARD_AMOUNT);

    client.reward_progress += 1;
    if client.reward_progress >= threshold.max(1) {
        client.cash_reward_balance += reward;
        client.reward_progress = 0;
        info!(phone = %client.phone, reward, "Cash reward granted");
    }
    client.spending_history.push(SpendEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        amount: amount_spent,
        note: note.to_string(),
    });
    write_cash_reward(conn, &client)?;
    Ok(client)
}

/// Cash-reward scheme: spend accumulated reward credit.
pub fn spend_cash_reward(conn: &Connection, phone: &str, amount: f64) -> LedgerResult<Client> {
    let key = normalize_phone(phone);
    let mut client =
        get_by_phone(conn, &key)?.ok_or_else(|| LedgerError::ClientNotFound(key.clone()))?;
    if amount <= 0.0 {
        return Err(LedgerError::Invalid("reward spend must be positive".into()));
    }
    if amount > client.cash_reward_balance {
        return Err(LedgerError::Invalid(format!(
            "cash reward spend {amount:.2} exceeds balance {:.2}",
            client.cash_reward_balance
        )));
    }
    client.cash_reward_balance -= amount;
    client.spending_history.push(SpendEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        amount: -amount,
        note: "reward spend".to_string(),
    });
    write_cash_reward(conn, &client)?;
    Ok(client)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn phone_spellings_merge_onto_one_client() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let a = upsert_by_phone(&conn, "(555) 010-2233", Some("Mia")).unwrap();
        let b = upsert_by_phone(&conn, "555.010.2233", None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.phone, "5550102233");
        assert_eq!(b.name.as_deref(), Some("Mia"));
        assert!(upsert_by_phone(&conn, "ext only", None).is_err());
    }

    #[test]
    fn points_accrue_per_whole_dollar_and_redeem() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        accrue_points(&conn, "5550102233", 45.99, "gel set").unwrap();
        let client = accrue_points(&conn, "5550102233", 10.0, "polish").unwrap();
        assert_eq!(client.royalty_points, 55);
        assert_eq!(client.point_history.len(), 2);

        let client = redeem_points(&conn, "5550102233", 50, "discount").unwrap();
        assert_eq!(client.royalty_points, 5);
        assert_eq!(client.point_history.last().unwrap().delta, -50);

        let err = redeem_points(&conn, "5550102233", 6, "").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPoints { .. }));
    }

    #[test]
    fn tenth_visit_converts_into_cash_reward() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        for i in 0..9 {
            let c = record_visit(&conn, "5550102233", 30.0, "visit").unwrap();
            assert_eq!(c.reward_progress, i + 1);
            assert_eq!(c.cash_reward_balance, 0.0);
        }
        let c = record_visit(&conn, "5550102233", 30.0, "visit").unwrap();
        assert_eq!(c.reward_progress, 0);
        assert_eq!(c.cash_reward_balance, 10.0);
        assert_eq!(c.spending_history.len(), 10);
        // Royalty fields are untouched by the cash scheme
        assert_eq!(c.royalty_points, 0);
        assert!(c.point_history.is_empty());
    }

    #[test]
    fn threshold_and_reward_are_configurable() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        db::set_setting(&conn, "rewards", "visit_threshold", "2").unwrap();
        db::set_setting(&conn, "rewards", "reward_amount", "25").unwrap();
        record_visit(&conn, "5550102233", 30.0, "").unwrap();
        let c = record_visit(&conn, "5550102233", 30.0, "").unwrap();
        assert_eq!(c.cash_reward_balance, 25.0);
    }

    #[test]
    fn reward_spend_is_guarded() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        db::set_setting(&conn, "rewards", "visit_threshold", "1").unwrap();
        record_visit(&conn, "5550102233", 30.0, "").unwrap();

        assert!(spend_cash_reward(&conn, "5550102233", 20.0).is_err());
        let c = spend_cash_reward(&conn, "5550102233", 10.0).unwrap();
        assert_eq!(c.cash_reward_balance, 0.0);
        assert!(matches!(
            spend_cash_reward(&conn, "5559999999", 1.0),
            Err(LedgerError::ClientNotFound(_))
        ));
    }
}
