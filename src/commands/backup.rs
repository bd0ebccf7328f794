use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commands::settings::{ensure_settings, new_adjustment_id, query_adjustments};
use crate::commands::trades::{query_trades, upsert_trade};
use crate::error::{JournalError, Result};
use crate::models::{
    BalanceAdjustment, RawTradeRecord, RejectedRecord, Trade, UpdateSettingsInput, UserSettings,
    new_trade_id, normalize_records,
};
use crate::{Journal, ScreenshotStore};

const BACKUP_VERSION: &str = "1.1.0";
/// Separator accepted in hand-written CSV tag columns. Exports use a JSON array.
const TAG_SEPARATOR: char = ';';

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupData {
    pub settings: UserSettings,
    pub adjustments: Vec<BalanceAdjustment>,
    pub trades: Vec<Trade>,
    pub export_date: String,
    pub version: String,
}

/// What `import_all_data` reads. Older bundles may lack adjustments, and
/// trades go through record normalisation instead of strict deserialisation.
#[derive(Debug, Deserialize)]
struct BackupImport {
    settings: Option<UpdateSettingsInput>,
    #[serde(default)]
    adjustments: Vec<BalanceAdjustment>,
    #[serde(default)]
    trades: Vec<RawTradeRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub settings_updated: bool,
    pub imported: usize,
    pub adjustments_imported: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Flat CSV row. Every column is optional text so malformed rows reach
/// record normalisation instead of failing the whole file. `tags` holds a
/// JSON array of strings.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CsvTradeRow {
    id: Option<String>,
    date: Option<String>,
    pair: Option<String>,
    #[serde(rename = "type")]
    trade_type: Option<String>,
    entry: Option<String>,
    exit: Option<String>,
    pnl: Option<String>,
    outcome: Option<String>,
    setup: Option<String>,
    session: Option<String>,
    mistake: Option<String>,
    notes: Option<String>,
    learnings: Option<String>,
    tags: Option<String>,
    screenshot_url: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl TryFrom<&Trade> for CsvTradeRow {
    type Error = serde_json::Error;

    fn try_from(trade: &Trade) -> std::result::Result<Self, Self::Error> {
        let tags = if trade.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&trade.tags)?)
        };
        Ok(CsvTradeRow {
            id: Some(trade.id.clone()),
            date: Some(trade.date.format("%Y-%m-%d").to_string()),
            pair: Some(trade.pair.clone()),
            trade_type: Some(trade.trade_type.as_str().to_string()),
            entry: trade.entry.map(|v| v.to_string()),
            exit: trade.exit.map(|v| v.to_string()),
            pnl: Some(trade.pnl.to_string()),
            outcome: Some(trade.outcome.as_str().to_string()),
            setup: trade.setup.clone(),
            session: trade.session.map(|s| s.label().to_string()),
            mistake: trade.mistake.clone(),
            notes: trade.notes.clone(),
            learnings: trade.learnings.clone(),
            tags,
            screenshot_url: trade.screenshot_url.clone(),
            created_at: Some(trade.created_at.to_string()),
            updated_at: Some(trade.updated_at.to_string()),
        })
    }
}

fn parse_csv_tags(column: &str) -> Vec<String> {
    if column.starts_with('[') {
        if let Ok(tags) = serde_json::from_str::<Vec<String>>(column) {
            return tags;
        }
    }
    column.split(TAG_SEPARATOR).map(str::to_string).collect()
}

impl From<CsvTradeRow> for RawTradeRecord {
    fn from(row: CsvTradeRow) -> Self {
        let text = |v: Option<String>| v.map(serde_json::Value::String);
        RawTradeRecord {
            id: text(row.id),
            user_id: None,
            date: row.date,
            pair: row.pair,
            trade_type: row.trade_type,
            entry: text(row.entry),
            exit: text(row.exit),
            pnl: text(row.pnl),
            outcome: row.outcome,
            setup: row.setup,
            session: row.session,
            mistake: row.mistake,
            notes: row.notes,
            learnings: row.learnings,
            tags: row.tags.as_deref().map(parse_csv_tags),
            screenshot_url: row.screenshot_url,
            created_at: text(row.created_at),
            updated_at: text(row.updated_at),
        }
    }
}

/// Later records win when a batch repeats an id.
fn dedupe_by_id(trades: Vec<Trade>) -> Vec<Trade> {
    let mut batch: Vec<Trade> = Vec::with_capacity(trades.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for trade in trades {
        match positions.get(&trade.id) {
            Some(&idx) => {
                log::warn!("Trade id {} repeated in import batch, keeping the later record", trade.id);
                batch[idx] = trade;
            }
            None => {
                positions.insert(trade.id.clone(), batch.len());
                batch.push(trade);
            }
        }
    }

    batch
}

/// Write normalised trades for `user_id`. An id already owned by another
/// user is replaced with a fresh one rather than overwriting their trade,
/// and screenshots the user does not own are dropped.
fn store_imported(
    conn: &Connection,
    screenshots: &dyn ScreenshotStore,
    user_id: &str,
    trades: Vec<Trade>,
) -> Result<usize> {
    let now = Utc::now().timestamp();
    let mut imported = 0;

    for mut trade in dedupe_by_id(trades) {
        let owner: Option<String> = conn
            .query_row("SELECT user_id FROM trades WHERE id = ?", [&trade.id], |row| row.get(0))
            .optional()?;
        if owner.is_some_and(|owner| owner != user_id) {
            log::warn!("Trade id {} belongs to another user, assigning a new id", trade.id);
            trade.id = new_trade_id();
        }

        trade.user_id = user_id.to_string();
        if trade.screenshot_url.as_deref().is_some_and(|url| !screenshots.owns(user_id, url)) {
            log::warn!("Dropping screenshot of trade {} not owned by user {}", trade.id, user_id);
            trade.screenshot_url = None;
        }
        if trade.created_at == 0 {
            trade.created_at = now;
            trade.updated_at = now;
        }

        upsert_trade(conn, &trade)?;
        imported += 1;
    }

    Ok(imported)
}

/// Export settings, ledger and trades as a pretty-printed JSON bundle.
pub async fn export_all_data(journal: &Journal, user_id: &str) -> Result<String> {
    let backup = {
        let conn = journal.db.conn.lock()?;
        BackupData {
            settings: ensure_settings(&conn, user_id, &journal.config)?,
            adjustments: query_adjustments(&conn, user_id)?,
            trades: query_trades(&conn, user_id, None)?,
            export_date: Utc::now().to_rfc3339(),
            version: BACKUP_VERSION.to_string(),
        }
    };

    log::info!(
        "Exported {} trades and {} adjustments for user {}",
        backup.trades.len(),
        backup.adjustments.len(),
        user_id
    );
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// Import a JSON bundle. Existing trades with the same id are replaced;
/// malformed trade records are reported and skipped.
pub async fn import_all_data(journal: &Journal, user_id: &str, json_data: &str) -> Result<ImportResult> {
    let backup: BackupImport = serde_json::from_str(json_data)?;
    let (trades, rejected) = normalize_records(backup.trades);

    let mut conn = journal.db.conn.lock()?;
    let tx = conn.transaction()?;
    ensure_settings(&tx, user_id, &journal.config)?;

    let mut settings_updated = false;
    if let Some(settings) = backup.settings {
        let now = Utc::now().timestamp();
        if let Some(balance) = settings.starting_balance.filter(|b| b.is_finite()) {
            tx.execute(
                "UPDATE user_settings SET starting_balance = ?, updated_at = ? WHERE user_id = ?",
                rusqlite::params![balance, now, user_id],
            )?;
            settings_updated = true;
        }
        if let Some(currency) = settings.currency.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()) {
            tx.execute(
                "UPDATE user_settings SET currency = ?, updated_at = ? WHERE user_id = ?",
                rusqlite::params![currency, now, user_id],
            )?;
            settings_updated = true;
        }
    }

    let mut adjustments_imported = 0;
    for adjustment in &backup.adjustments {
        let owner: Option<String> = tx
            .query_row(
                "SELECT user_id FROM balance_adjustments WHERE id = ?",
                [&adjustment.id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match owner {
            // Re-importing our own ledger entry is a no-op
            Some(owner) if owner == user_id => continue,
            Some(_) => {
                log::warn!("Adjustment id {} belongs to another user, assigning a new id", adjustment.id);
                new_adjustment_id()
            }
            None => adjustment.id.clone(),
        };

        tx.execute(
            "INSERT INTO balance_adjustments (id, user_id, kind, amount, note, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                id,
                user_id,
                adjustment.kind.as_str(),
                adjustment.amount,
                adjustment.note,
                adjustment.created_at,
            ],
        )?;
        adjustments_imported += 1;
    }

    let imported = store_imported(&tx, journal.screenshots.as_ref(), user_id, trades)?;
    tx.commit()?;

    log::info!(
        "Imported {} trades for user {} ({} rejected)",
        imported,
        user_id,
        rejected.len()
    );

    Ok(ImportResult {
        settings_updated,
        imported,
        adjustments_imported,
        rejected,
    })
}

pub async fn export_trades_csv(journal: &Journal, user_id: &str) -> Result<String> {
    let trades = {
        let conn = journal.db.conn.lock()?;
        query_trades(&conn, user_id, None)?
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    for trade in &trades {
        writer.serialize(CsvTradeRow::try_from(trade)?)?;
    }
    let bytes = writer.into_inner().map_err(|e| JournalError::Io(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| JournalError::Validation(format!("CSV export is not UTF-8: {}", e)))
}

pub async fn import_trades_csv(journal: &Journal, user_id: &str, csv_data: &str) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let records = reader
        .deserialize::<CsvTradeRow>()
        .map(|row| row.map(RawTradeRecord::from))
        .collect::<std::result::Result<Vec<RawTradeRecord>, csv::Error>>()?;
    let (trades, rejected) = normalize_records(records);

    let imported = {
        let mut conn = journal.db.conn.lock()?;
        let tx = conn.transaction()?;
        let imported = store_imported(&tx, journal.screenshots.as_ref(), user_id, trades)?;
        tx.commit()?;
        imported
    };

    log::info!("Imported {} trades from CSV ({} rejected)", imported, rejected.len());

    Ok(ImportResult {
        settings_updated: false,
        imported,
        adjustments_imported: 0,
        rejected,
    })
}
