//! Gift card ledger (`gift_cards` collection).
//!
//! Every card carries an append-only transaction history; its balance is the
//! tail of that history. There is deliberately no operation that writes the
//! balance without appending a matching history entry computed from the same
//! pre-image — the legacy console had two screens that overwrote the balance
//! directly and let it drift from the history, which is the bug this layout
//! makes unrepresentable. The `balance` column is only a denormalized cache
//! for listing queries and is written in the same SQL transaction as the
//! history.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::codes;
use crate::error::{LedgerError, LedgerResult};

/// Transaction types as they appear in stored history entries. The literal
/// spellings are legacy data and must round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    Created,
    Redemption,
    #[serde(rename = "Manual Edit")]
    ManualEdit,
    #[serde(rename = "Add Value")]
    AddValue,
    #[serde(rename = "Info Update")]
    InfoUpdate,
    Redeem,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Created => "Created",
            TxType::Redemption => "Redemption",
            TxType::ManualEdit => "Manual Edit",
            TxType::AddValue => "Add Value",
            TxType::InfoUpdate => "Info Update",
            TxType::Redeem => "Redeem",
        }
    }

    /// `Redeem` and `Redemption` are the same operation under two legacy
    /// names; both debit the card.
    pub fn is_redemption(&self) -> bool {
        matches!(self, TxType::Redeem | TxType::Redemption)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardTransaction {
    /// RFC 3339 instant of the append.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub old_balance: f64,
    pub new_balance: f64,
    #[serde(default)]
    pub note: String,
}

impl GiftCardTransaction {
    pub fn delta(&self) -> f64 {
        self.new_balance - self.old_balance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCard {
    pub id: String,
    pub code: String,
    /// Original issued amount.
    pub amount: f64,
    /// Always the `newBalance` of the last history entry.
    pub balance: f64,
    pub recipient: Option<String>,
    pub sender: Option<String>,
    /// `pending` until activation. Legacy rows carry both `active` and
    /// `Active`; `is_active` treats them as the same state.
    pub status: String,
    pub expires_at: Option<String>,
    pub history: Vec<GiftCardTransaction>,
}

/// Both historical literals mean "active".
pub fn is_active_status(status: &str) -> bool {
    status.eq_ignore_ascii_case("active")
}

impl GiftCard {
    pub fn is_active(&self) -> bool {
        is_active_status(&self.status)
    }

    /// Expiry is derived, never a stored status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at < now)
            .unwrap_or(false)
    }

    /// The ledger invariant: history starts with `Created` taking the card
    /// from 0 to its amount, every entry chains off the previous balance,
    /// and the balance equals the tail.
    pub fn ledger_consistent(&self) -> bool {
        let Some(first) = self.history.first() else {
            return false;
        };
        if first.tx_type != TxType::Created
            || first.old_balance != 0.0
            || first.new_balance != self.amount
        {
            return false;
        }
        let chained = self
            .history
            .windows(2)
            .all(|w| w[1].old_balance == w[0].new_balance);
        chained
            && self
                .history
                .last()
                .map(|t| t.new_balance == self.balance)
                .unwrap_or(false)
    }
}

fn row_to_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<GiftCard> {
    let history_json: String = row.get(8)?;
    let history: Vec<GiftCardTransaction> = serde_json::from_str(&history_json).unwrap_or_default();
    let cached: f64 = row.get(3)?;
    // The history tail is authoritative; the column is just a cache.
    let balance = history.last().map(|t| t.new_balance).unwrap_or(cached);
    Ok(GiftCard {
        id: row.get(0)?,
        code: row.get(1)?,
        amount: row.get(2)?,
        balance,
        recipient: row.get(4)?,
        sender: row.get(5)?,
        status: row.get(6)?,
        expires_at: row.get(7)?,
        history,
    })
}

const CARD_COLUMNS: &str = "id, code, amount, balance, recipient, sender, status, expires_at, history";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub quantity: usize,
    pub amount: f64,
    /// Manual starting number; `None` continues after the highest suffix
    /// already issued.
    #[serde(default)]
    pub manual_start: Option<u64>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    /// RFC 3339 expiration instant.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Issue a batch of cards with sequential collision-free codes. Each card
/// starts `pending` with exactly one `Created` history entry.
pub fn issue_batch(conn: &Connection, req: &IssueRequest) -> LedgerResult<Vec<GiftCard>> {
    if req.quantity == 0 {
        return Err(LedgerError::Invalid("batch quantity must be at least 1".into()));
    }
    if req.amount < 0.0 {
        return Err(LedgerError::Invalid("card amount cannot be negative".into()));
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> LedgerResult<Vec<GiftCard>> {
        let mut stmt = conn.prepare("SELECT code FROM gift_cards")?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let batch_codes = codes::allocate(&existing, req.manual_start, req.quantity);
        let now = Utc::now().to_rfc3339();
        let mut cards = Vec::with_capacity(req.quantity);
        for code in batch_codes {
            let history = vec![GiftCardTransaction {
                timestamp: now.clone(),
                tx_type: TxType::Created,
                old_balance: 0.0,
                new_balance: req.amount,
                note: String::new(),
            }];
            let card = GiftCard {
                id: Uuid::new_v4().to_string(),
                code,
                amount: req.amount,
                balance: req.amount,
                recipient: req.recipient.clone(),
                sender: req.sender.clone(),
                status: "pending".to_string(),
                expires_at: req.expires_at.clone(),
                history,
            };
            conn.execute(
                "INSERT INTO gift_cards
                    (id, code, amount, balance, recipient, sender, status, expires_at, history)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    card.id,
                    card.code,
                    card.amount,
                    card.balance,
                    card.recipient,
                    card.sender,
                    card.status,
                    card.expires_at,
                    serde_json::to_string(&card.history)?
                ],
            )?;
            cards.push(card);
        }
        Ok(cards)
    })();

    match result {
        Ok(cards) => {
            conn.execute_batch("COMMIT")?;
            info!(count = cards.len(), amount = req.amount, "Gift card batch issued");
            Ok(cards)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

pub fn get(conn: &Connection, id: &str) -> LedgerResult<GiftCard> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE id = ?1"),
        params![id],
        row_to_card,
    )
    .optional()?
    .ok_or_else(|| LedgerError::CardNotFound(id.to_string()))
}

pub fn get_by_code(conn: &Connection, code: &str) -> LedgerResult<GiftCard> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE code = ?1"),
        params![code.trim()],
        row_to_card,
    )
    .optional()?
    .ok_or_else(|| LedgerError::CardNotFound(code.trim().to_string()))
}

pub fn list(conn: &Connection) -> LedgerResult<Vec<GiftCard>> {
    let mut stmt = conn.prepare(&format!("SELECT {CARD_COLUMNS} FROM gift_cards ORDER BY code"))?;
    let rows = stmt.query_map([], row_to_card)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Apply one balance transaction. The new balance is computed from the same
/// pre-image the history entry records, and both are persisted together.
///
/// `Redeem`/`Redemption` over the balance is rejected with
/// `InsufficientBalance` and mutates nothing.
pub fn apply_transaction(
    conn: &Connection,
    card_id: &str,
    tx_type: TxType,
    amount: f64,
    note: &str,
) -> LedgerResult<GiftCard> {
    if tx_type == TxType::Created {
        return Err(LedgerError::Invalid(
            "Created entries are written only at issuance".into(),
        ));
    }
    if amount < 0.0 {
        return Err(LedgerError::Invalid("transaction amount cannot be negative".into()));
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> LedgerResult<GiftCard> {
        let mut card = get(conn, card_id)?;
        let old_balance = card.balance;

        let new_balance = if tx_type.is_redemption() {
            if amount > old_balance {
                return Err(LedgerError::InsufficientBalance {
                    code: card.code.clone(),
                    balance: old_balance,
                    requested: amount,
                });
            }
            old_balance - amount
        } else {
            match tx_type {
                TxType::AddValue => old_balance + amount,
                TxType::ManualEdit => amount,
                TxType::InfoUpdate => old_balance,
                // Created and redemptions handled above
                _ => old_balance,
            }
        };

        card.history.push(GiftCardTransaction {
            timestamp: Utc::now().to_rfc3339(),
            tx_type,
            old_balance,
            new_balance,
            note: note.to_string(),
        });
        card.balance = new_balance;

        conn.execute(
            "UPDATE gift_cards SET balance = ?2, history = ?3, updated_at = datetime('now')
             WHERE id = ?1",
            params![card.id, card.balance, serde_json::to_string(&card.history)?],
        )?;
        Ok(card)
    })();

    match result {
        Ok(card) => {
            conn.execute_batch("COMMIT")?;
            info!(
                code = %card.code,
                tx = tx_type.as_str(),
                balance = card.balance,
                "Gift card transaction applied"
            );
            Ok(card)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Reassign a card's code. Balance and history are untouched; collisions
/// with any other card are rejected.
pub fn set_code(conn: &Connection, card_id: &str, new_code: &str) -> LedgerResult<GiftCard> {
    let new_code = new_code.trim();
    if new_code.is_empty() {
        return Err(LedgerError::Invalid("gift card code cannot be empty".into()));
    }
    let clash: Option<String> = conn
        .query_row(
            "SELECT id FROM gift_cards WHERE code = ?1 AND id != ?2",
            params![new_code, card_id],
            |row| row.get(0),
        )
        .optional()?;
    if clash.is_some() {
        return Err(LedgerError::DuplicateCode(new_code.to_string()));
    }
    let changed = conn.execute(
        "UPDATE gift_cards SET code = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![card_id, new_code],
    )?;
    if changed == 0 {
        return Err(LedgerError::CardNotFound(card_id.to_string()));
    }
    get(conn, card_id)
}

/// Transition `pending` -> `active`. Already-active cards (either legacy
/// spelling) pass through unchanged.
pub fn activate(conn: &Connection, card_id: &str) -> LedgerResult<GiftCard> {
    let card = get(conn, card_id)?;
    if card.is_active() {
        return Ok(card);
    }
    conn.execute(
        "UPDATE gift_cards SET status = 'active', updated_at = datetime('now') WHERE id = ?1",
        params![card_id],
    )?;
    info!(code = %card.code, "Gift card activated");
    get(conn, card_id)
}

// ===========================================================================
// Tests
// ===========================================================================
