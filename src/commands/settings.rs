use chrono::Utc;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::error::{JournalError, Result};
use crate::models::{AdjustmentKind, BalanceAdjustment, UpdateSettingsInput, UserSettings};
use crate::Journal;

fn map_row_to_settings(row: &rusqlite::Row) -> rusqlite::Result<UserSettings> {
    Ok(UserSettings {
        user_id: row.get(0)?,
        starting_balance: row.get(1)?,
        currency: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_row_to_adjustment(row: &rusqlite::Row) -> rusqlite::Result<BalanceAdjustment> {
    let kind: String = row.get(2)?;
    let kind = AdjustmentKind::from_label(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown adjustment kind: {}", kind).into(),
        )
    })?;

    Ok(BalanceAdjustment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        amount: row.get(3)?,
        note: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Load a user's settings, creating the default row on first access.
pub(crate) fn ensure_settings(conn: &Connection, user_id: &str, config: &AppConfig) -> Result<UserSettings> {
    let now = Utc::now().timestamp();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_settings (user_id, starting_balance, currency, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
        rusqlite::params![
            user_id,
            config.default_starting_balance,
            config.default_currency,
            now,
            now
        ],
    )?;
    if inserted > 0 {
        log::info!(
            "Created default settings for user {} ({} {})",
            user_id,
            config.default_starting_balance,
            config.default_currency
        );
    }

    let settings = conn.query_row(
        "SELECT user_id, starting_balance, currency, created_at, updated_at FROM user_settings WHERE user_id = ?",
        [user_id],
        map_row_to_settings,
    )?;
    Ok(settings)
}

fn insert_adjustment(conn: &Connection, adjustment: &BalanceAdjustment) -> Result<()> {
    conn.execute(
        "INSERT INTO balance_adjustments (id, user_id, kind, amount, note, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            adjustment.id,
            adjustment.user_id,
            adjustment.kind.as_str(),
            adjustment.amount,
            adjustment.note,
            adjustment.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn new_adjustment_id() -> String {
    format!("ADJ-{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
}

fn require_finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(JournalError::Validation(format!("{} must be a finite number", field)))
    }
}

/// Apply `delta` to the starting balance and log it in the ledger, atomically.
fn apply_adjustment(
    conn: &mut Connection,
    journal: &Journal,
    user_id: &str,
    kind: AdjustmentKind,
    delta: f64,
    note: Option<String>,
) -> Result<BalanceAdjustment> {
    let tx = conn.transaction()?;
    ensure_settings(&tx, user_id, &journal.config)?;

    let now = Utc::now().timestamp();
    tx.execute(
        "UPDATE user_settings SET starting_balance = starting_balance + ?, updated_at = ? WHERE user_id = ?",
        rusqlite::params![delta, now, user_id],
    )?;

    let adjustment = BalanceAdjustment {
        id: new_adjustment_id(),
        user_id: user_id.to_string(),
        kind,
        amount: delta,
        note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        created_at: now,
    };
    insert_adjustment(&tx, &adjustment)?;
    tx.commit()?;

    log::info!("Balance {} of {} for user {}", kind.as_str(), delta, user_id);
    Ok(adjustment)
}

pub async fn get_settings(journal: &Journal, user_id: &str) -> Result<UserSettings> {
    let conn = journal.db.conn.lock()?;
    ensure_settings(&conn, user_id, &journal.config)
}

pub async fn update_settings(journal: &Journal, user_id: &str, settings: UpdateSettingsInput) -> Result<UserSettings> {
    let conn = journal.db.conn.lock()?;
    ensure_settings(&conn, user_id, &journal.config)?;

    // Build dynamic UPDATE query
    let mut updates = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(val) = settings.starting_balance {
        updates.push("starting_balance = ?");
        values.push(Box::new(require_finite("starting_balance", val)?));
    }
    if let Some(val) = settings.currency {
        let val = val.trim().to_uppercase();
        if val.is_empty() {
            return Err(JournalError::Validation("currency must not be empty".to_string()));
        }
        updates.push("currency = ?");
        values.push(Box::new(val));
    }

    updates.push("updated_at = ?");
    values.push(Box::new(Utc::now().timestamp()));
    values.push(Box::new(user_id.to_string()));

    let query = format!("UPDATE user_settings SET {} WHERE user_id = ?", updates.join(", "));
    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&query, params.as_slice())?;

    ensure_settings(&conn, user_id, &journal.config)
}

/// Record a deposit, withdrawal or manual correction against the starting balance.
pub async fn adjust_balance(
    journal: &Journal,
    user_id: &str,
    kind: AdjustmentKind,
    amount: f64,
    note: Option<String>,
) -> Result<BalanceAdjustment> {
    let amount = require_finite("amount", amount)?;
    if amount == 0.0 {
        return Err(JournalError::Validation("amount must not be zero".to_string()));
    }

    let mut conn = journal.db.conn.lock()?;
    apply_adjustment(&mut conn, journal, user_id, kind, kind.signed(amount), note)
}

/// Set the current balance directly. The starting balance is back-solved as
/// `current - total pnl` so the equity curve ends at the requested figure.
pub async fn set_current_balance(journal: &Journal, user_id: &str, current_balance: f64) -> Result<UserSettings> {
    let current_balance = require_finite("current_balance", current_balance)?;

    let mut conn = journal.db.conn.lock()?;
    let settings = ensure_settings(&conn, user_id, &journal.config)?;
    let total_pnl: f64 = conn.query_row(
        "SELECT COALESCE(SUM(pnl), 0) FROM trades WHERE user_id = ?",
        [user_id],
        |row| row.get(0),
    )?;

    let delta = (current_balance - total_pnl) - settings.starting_balance;
    if delta == 0.0 {
        return Ok(settings);
    }

    apply_adjustment(
        &mut conn,
        journal,
        user_id,
        AdjustmentKind::Correction,
        delta,
        Some(format!("Current balance set to {}", current_balance)),
    )?;
    ensure_settings(&conn, user_id, &journal.config)
}

/// Ledger entries, newest first.
pub(crate) fn query_adjustments(conn: &Connection, user_id: &str) -> Result<Vec<BalanceAdjustment>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, amount, note, created_at FROM balance_adjustments
         WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )?;
    let adjustments = stmt
        .query_map([user_id], map_row_to_adjustment)?
        .collect::<rusqlite::Result<Vec<BalanceAdjustment>>>()?;
    Ok(adjustments)
}

pub async fn get_balance_adjustments(journal: &Journal, user_id: &str) -> Result<Vec<BalanceAdjustment>> {
    let conn = journal.db.conn.lock()?;
    query_adjustments(&conn, user_id)
}
