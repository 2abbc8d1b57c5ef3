//! Staff roster (`users` collection).
//!
//! Administrators create and edit staff members; every other module reads
//! them. Earning records reference staff by display name (free text), so the
//! lookup here is trimmed and case-insensitive.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Technician,
    Staff,
    Admin,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Technician => "technician",
            StaffRole::Staff => "staff",
            StaffRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "technician" => Some(StaffRole::Technician),
            "staff" => Some(StaffRole::Staff),
            "admin" => Some(StaffRole::Admin),
            _ => None,
        }
    }

    /// Whether this role earns commission and appears on ledger rows.
    pub fn is_commissioned(&self) -> bool {
        matches!(self, StaffRole::Technician | StaffRole::Staff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: StaffRole,
    /// Stored ambiguously in legacy data: `0.6` and `60` both mean 60%.
    /// Left as stored; the payout calculator normalizes exactly once.
    pub commission_rate: f64,
    #[serde(default = "default_check_fraction")]
    pub check_payout_fraction: f64,
}

fn default_check_fraction() -> f64 {
    0.70
}

impl StaffMember {
    /// Lower-cased display name — the key used by summary documents and the
    /// merge step.
    pub fn summary_field(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

fn row_to_staff(row: &rusqlite::Row<'_>) -> rusqlite::Result<StaffMember> {
    let role_raw: String = row.get(2)?;
    Ok(StaffMember {
        id: row.get(0)?,
        name: row.get(1)?,
        role: StaffRole::parse(&role_raw).unwrap_or(StaffRole::Technician),
        commission_rate: row.get(3)?,
        check_payout_fraction: row.get(4)?,
    })
}

const STAFF_COLUMNS: &str = "id, name, role, commission_rate, check_payout_fraction";

/// Create a staff member. The display name is trimmed before storage.
pub fn create(
    conn: &Connection,
    name: &str,
    role: StaffRole,
    commission_rate: f64,
    check_payout_fraction: f64,
) -> LedgerResult<StaffMember> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Invalid("staff name cannot be empty".into()));
    }
    let member = StaffMember {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        role,
        commission_rate,
        check_payout_fraction,
    };
    conn.execute(
        "INSERT INTO users (id, name, role, commission_rate, check_payout_fraction)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            member.id,
            member.name,
            member.role.as_str(),
            member.commission_rate,
            member.check_payout_fraction
        ],
    )?;
    info!(staff = %member.name, role = member.role.as_str(), "Staff member created");
    Ok(member)
}

/// Overwrite an existing staff member's editable fields.
pub fn update(conn: &Connection, member: &StaffMember) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE users SET name = ?2, role = ?3, commission_rate = ?4,
                check_payout_fraction = ?5, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            member.id,
            member.name.trim(),
            member.role.as_str(),
            member.commission_rate,
            member.check_payout_fraction
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::StaffNotFound(member.id.clone()));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> LedgerResult<StaffMember> {
    conn.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        row_to_staff,
    )
    .optional()?
    .ok_or_else(|| LedgerError::StaffNotFound(id.to_string()))
}

/// Case-insensitive, trimmed display-name lookup.
pub fn get_by_name(conn: &Connection, name: &str) -> LedgerResult<Option<StaffMember>> {
    Ok(conn
        .query_row(
            &format!("SELECT {STAFF_COLUMNS} FROM users WHERE lower(trim(name)) = ?1 LIMIT 1"),
            params![name.trim().to_lowercase()],
            row_to_staff,
        )
        .optional()?)
}

/// All staff, alphabetical.
pub fn list(conn: &Connection) -> LedgerResult<Vec<StaffMember>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {STAFF_COLUMNS} FROM users ORDER BY lower(name)"))?;
    let rows = stmt.query_map([], row_to_staff)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Staff who earn commission (role technician or staff), alphabetical.
/// This is the roster the merge step covers.
pub fn list_commissioned(conn: &Connection) -> LedgerResult<Vec<StaffMember>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAFF_COLUMNS} FROM users WHERE role IN ('technician', 'staff') ORDER BY lower(name)"
    ))?;
    let rows = stmt.query_map([], row_to_staff)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete(conn: &Connection, id: &str) -> LedgerResult<()> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LedgerError::StaffNotFound(id.to_string()));
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn create_and_lookup_by_name_is_case_insensitive() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let linda = create(&conn, "  Linda ", StaffRole::Technician, 0.6, 0.7).unwrap();
        assert_eq!(linda.name, "Linda");
        assert_eq!(linda.summary_field(), "linda");

        let found = get_by_name(&conn, "LINDA ").unwrap().unwrap();
        assert_eq!(found.id, linda.id);
        assert!(get_by_name(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn commissioned_roster_excludes_admins() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        create(&conn, "Linda", StaffRole::Technician, 0.6, 0.7).unwrap();
        create(&conn, "Amy", StaffRole::Staff, 60.0, 0.7).unwrap();
        create(&conn, "Boss", StaffRole::Admin, 0.0, 0.7).unwrap();

        let roster = list_commissioned(&conn).unwrap();
        let names: Vec<&str> = roster.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Linda"]);
        assert_eq!(list(&conn).unwrap().len(), 3);
    }

    #[test]
    fn update_and_delete_report_missing_ids() {
        let db = db::init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let mut amy = create(&conn, "Amy", StaffRole::Staff, 0.5, 0.7).unwrap();
        amy.commission_rate = 0.65;
        update(&conn, &amy).unwrap();
        assert_eq!(get(&conn, &amy.id).unwrap().commission_rate, 0.65);

        delete(&conn, &amy.id).unwrap();
        assert!(matches!(
            get(&conn, &amy.id),
            Err(LedgerError::StaffNotFound(_))
        ));
        assert!(matches!(
            delete(&conn, &amy.id),
            Err(LedgerError::StaffNotFound(_))
        ));
    }
}
