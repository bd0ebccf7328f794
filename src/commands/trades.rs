use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{JournalError, Result};
use crate::models::{Outcome, Session, Trade, TradeFilters, TradeInput, TradeType, new_trade_id};
use crate::Journal;

pub(crate) const TRADE_COLUMNS: &str = "id, user_id, date, pair, trade_type, entry_price, exit_price, pnl, outcome, \
     setup, session, mistake, notes, learnings, tags, screenshot_url, created_at, updated_at";

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Helper function to map a database row to a Trade struct
pub(crate) fn map_row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<Trade> {
    let date: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(2, e))?;

    let tags: String = row.get(14)?;
    let tags: Vec<String> = serde_json::from_str(&tags).map_err(|e| conversion_error(14, e))?;

    let pnl: f64 = row.get(7)?;
    let outcome: String = row.get(8)?;

    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date,
        pair: row.get(3)?,
        trade_type: TradeType::from_label(&row.get::<_, String>(4)?).unwrap_or_default(),
        entry: row.get(5)?,
        exit: row.get(6)?,
        pnl,
        outcome: Outcome::from_label(&outcome).unwrap_or_else(|| Outcome::from_pnl(pnl)),
        setup: row.get(9)?,
        session: row.get::<_, Option<String>>(10)?.as_deref().and_then(Session::from_label),
        mistake: row.get(11)?,
        notes: row.get(12)?,
        learnings: row.get(13)?,
        tags,
        screenshot_url: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// Insert or overwrite a trade row.
pub(crate) fn upsert_trade(conn: &Connection, trade: &Trade) -> Result<()> {
    let tags = serde_json::to_string(&trade.tags)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO trades ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TRADE_COLUMNS
        ),
        rusqlite::params![
            trade.id,
            trade.user_id,
            trade.date.format("%Y-%m-%d").to_string(),
            trade.pair,
            trade.trade_type.as_str(),
            trade.entry,
            trade.exit,
            trade.pnl,
            trade.outcome.as_str(),
            trade.setup,
            trade.session.map(|s| s.label()),
            trade.mistake,
            trade.notes,
            trade.learnings,
            tags,
            trade.screenshot_url,
            trade.created_at,
            trade.updated_at,
        ],
    )?;
    Ok(())
}

/// Every trade a user owns, newest first.
pub(crate) fn query_trades(conn: &Connection, user_id: &str, filters: Option<&TradeFilters>) -> Result<Vec<Trade>> {
    let mut query = format!("SELECT {} FROM trades WHERE user_id = ?", TRADE_COLUMNS);
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];

    if let Some(f) = filters {
        if let Some(search) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            conditions.push("(LOWER(pair) LIKE ? OR LOWER(COALESCE(setup, '')) LIKE ?)");
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }
        if let Some(outcome) = f.outcome {
            conditions.push("outcome = ?");
            params.push(Box::new(outcome.as_str()));
        }
        if let Some(start_date) = f.start_date {
            conditions.push("date >= ?");
            params.push(Box::new(start_date.format("%Y-%m-%d").to_string()));
        }
        if let Some(end_date) = f.end_date {
            conditions.push("date <= ?");
            params.push(Box::new(end_date.format("%Y-%m-%d").to_string()));
        }
    }

    if !conditions.is_empty() {
        query.push_str(&format!(" AND {}", conditions.join(" AND ")));
    }

    query.push_str(" ORDER BY date DESC, created_at DESC");

    if let Some(f) = filters {
        if let (Some(page), Some(limit)) = (f.page, f.limit) {
            let limit = limit.max(1);
            let offset = (page.max(1) - 1)
                .checked_mul(limit)
                .ok_or_else(|| JournalError::Validation(format!("Page {} of size {} is out of range", page, limit)))?;
            query.push_str(" LIMIT ? OFFSET ?");
            params.push(Box::new(limit));
            params.push(Box::new(offset));
        }
    }

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query)?;
    let trades = stmt
        .query_map(param_refs.as_slice(), map_row_to_trade)?
        .collect::<rusqlite::Result<Vec<Trade>>>()?;

    Ok(trades)
}

fn query_trade(conn: &Connection, user_id: &str, id: &str) -> Result<Trade> {
    conn.query_row(
        &format!("SELECT {} FROM trades WHERE id = ? AND user_id = ?", TRADE_COLUMNS),
        [id, user_id],
        map_row_to_trade,
    )
    .optional()?
    .ok_or_else(|| JournalError::trade_not_found(id))
}

fn screenshot_in_use(conn: &Connection, url: &str) -> Result<bool> {
    let in_use: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trades WHERE screenshot_url = ?)",
        [url],
        |row| row.get(0),
    )?;
    Ok(in_use)
}

/// A trade may only reference screenshots its owner uploaded.
fn check_screenshot_owner(journal: &Journal, user_id: &str, trade: &Trade) -> Result<()> {
    match &trade.screenshot_url {
        Some(url) if !journal.screenshots.owns(user_id, url) => Err(JournalError::Validation(format!(
            "Screenshot {} does not belong to user {}",
            url, user_id
        ))),
        _ => Ok(()),
    }
}

/// Remove a screenshot that is no longer referenced. Failures are logged only:
/// the trade row is already gone or updated at this point.
async fn release_screenshot(journal: &Journal, user_id: &str, url: &str) {
    if !journal.screenshots.owns(user_id, url) {
        log::warn!("Not releasing screenshot {} not owned by user {}", url, user_id);
        return;
    }
    if let Err(e) = journal.screenshots.remove(user_id, url).await {
        log::warn!("Failed to delete screenshot {}: {}", url, e);
    }
}

pub async fn get_trades(journal: &Journal, user_id: &str, filters: Option<TradeFilters>) -> Result<Vec<Trade>> {
    let conn = journal.db.conn.lock()?;
    query_trades(&conn, user_id, filters.as_ref())
}

pub async fn get_trade(journal: &Journal, user_id: &str, id: &str) -> Result<Trade> {
    let conn = journal.db.conn.lock()?;
    query_trade(&conn, user_id, id)
}

pub async fn create_trade(journal: &Journal, user_id: &str, input: TradeInput) -> Result<Trade> {
    let now = Utc::now().timestamp();
    let trade = input.into_trade(new_trade_id(), user_id, now, now)?;
    check_screenshot_owner(journal, user_id, &trade)?;

    let conn = journal.db.conn.lock()?;
    upsert_trade(&conn, &trade)?;
    log::debug!("Created trade {} ({} {})", trade.id, trade.pair, trade.pnl);

    query_trade(&conn, user_id, &trade.id)
}

/// Replace every field of an existing trade. A screenshot that the new
/// version no longer references is released.
pub async fn update_trade(journal: &Journal, user_id: &str, id: &str, input: TradeInput) -> Result<Trade> {
    let (updated, replaced_screenshot) = {
        let conn = journal.db.conn.lock()?;
        let existing = query_trade(&conn, user_id, id)?;

        let trade = input.into_trade(existing.id.clone(), user_id, existing.created_at, Utc::now().timestamp())?;
        if trade.screenshot_url != existing.screenshot_url {
            check_screenshot_owner(journal, user_id, &trade)?;
        }
        upsert_trade(&conn, &trade)?;

        let replaced = match existing.screenshot_url {
            Some(old) if !screenshot_in_use(&conn, &old)? => Some(old),
            _ => None,
        };
        (query_trade(&conn, user_id, id)?, replaced)
    };

    if let Some(url) = replaced_screenshot {
        release_screenshot(journal, user_id, &url).await;
    }

    Ok(updated)
}

/// Delete the row first, then its screenshot.
pub async fn delete_trade(journal: &Journal, user_id: &str, id: &str) -> Result<()> {
    let screenshot_url = {
        let conn = journal.db.conn.lock()?;
        let trade = query_trade(&conn, user_id, id)?;
        conn.execute("DELETE FROM trades WHERE id = ? AND user_id = ?", [id, user_id])?;
        match trade.screenshot_url {
            Some(url) if !screenshot_in_use(&conn, &url)? => Some(url),
            _ => None,
        }
    };

    if let Some(url) = screenshot_url {
        release_screenshot(journal, user_id, &url).await;
    }

    Ok(())
}

pub async fn delete_all_trades(journal: &Journal, user_id: &str) -> Result<usize> {
    let (count, screenshots) = {
        let conn = journal.db.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT screenshot_url FROM trades WHERE user_id = ? AND screenshot_url IS NOT NULL")?;
        let urls = stmt
            .query_map([user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        let count = conn.execute("DELETE FROM trades WHERE user_id = ?", [user_id])?;
        (count, urls)
    };

    for url in &screenshots {
        release_screenshot(journal, user_id, url).await;
    }

    log::info!("Deleted {} trades for user {}", count, user_id);
    Ok(count)
}

pub async fn upload_screenshot(journal: &Journal, user_id: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
    journal.screenshots.upload(user_id, file_name, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{input, journal};
    use crate::{AppConfig, FsScreenshotStore};
    use std::sync::Arc;

    fn fs_journal(dir: &std::path::Path) -> Journal {
        let store = FsScreenshotStore::new(dir.to_path_buf(), "local://screenshots");
        Journal::in_memory(AppConfig::default(), Arc::new(store)).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_trade() {
        let (journal, _) = journal();

        let created = create_trade(
            &journal,
            "user-1",
            TradeInput {
                tags: vec!["a+".into(), "a+".into(), "news".into()],
                session: Some(Session::London),
                setup: Some("  ".into()),
                ..input("2024-01-02", "EUR/USD", -12.5)
            },
        )
        .await
        .unwrap();

        assert!(created.id.starts_with("TRADE-"));
        assert_eq!(created.outcome, Outcome::Loss);
        assert_eq!(created.tags, vec!["a+".to_string(), "news".to_string()]);
        assert_eq!(created.setup, None);

        let fetched = get_trade(&journal, "user-1", &created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_trades_are_scoped_to_owner() {
        let (journal, _) = journal();
        let trade = create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 10.0))
            .await
            .unwrap();

        assert!(matches!(
            get_trade(&journal, "user-2", &trade.id).await,
            Err(JournalError::NotFound { .. })
        ));
        assert!(get_trades(&journal, "user-2", None).await.unwrap().is_empty());
        assert!(delete_trade(&journal, "user-2", &trade.id).await.is_err());
    }

    #[tokio::test]
    async fn test_get_trades_filters_and_orders() {
        let (journal, _) = journal();
        for (date, pair, pnl, setup) in [
            ("2024-01-02", "EUR/USD", 10.0, Some("Liquidity Sweep")),
            ("2024-01-05", "GBP/JPY", -20.0, None),
            ("2024-01-03", "XAU/USD", 0.0, Some("Gap Fill")),
        ] {
            let input = TradeInput {
                setup: setup.map(String::from),
                ..input(date, pair, pnl)
            };
            create_trade(&journal, "user-1", input).await.unwrap();
        }

        let all = get_trades(&journal, "user-1", None).await.unwrap();
        let dates: Vec<String> = all.iter().map(|t| t.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-05", "2024-01-03", "2024-01-02"]);

        let search = TradeFilters {
            search: Some("sweep".into()),
            ..Default::default()
        };
        let found = get_trades(&journal, "user-1", Some(search)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pair, "EUR/USD");

        let breakeven = TradeFilters {
            outcome: Some(Outcome::Breakeven),
            ..Default::default()
        };
        assert_eq!(get_trades(&journal, "user-1", Some(breakeven)).await.unwrap()[0].pair, "XAU/USD");

        let page_two = TradeFilters {
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        let page = get_trades(&journal, "user-1", Some(page_two)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].pair, "EUR/USD");
    }

    #[tokio::test]
    async fn test_update_is_full_replacement() {
        let (journal, store) = journal();
        let original = create_trade(
            &journal,
            "user-1",
            TradeInput {
                mistake: Some("FOMO".into()),
                screenshot_url: Some("mem://public/user-1/a.png".into()),
                ..input("2024-01-02", "EUR/USD", 10.0)
            },
        )
        .await
        .unwrap();

        let updated = update_trade(&journal, "user-1", &original.id, input("2024-01-04", "EUR/USD", -5.0))
            .await
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.outcome, Outcome::Loss);
        assert_eq!(updated.mistake, None);
        assert_eq!(store.removed(), vec!["mem://public/user-1/a.png".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_releases_screenshot() {
        let (journal, store) = journal();
        let url = upload_screenshot(&journal, "user-1", "setup.png", b"img").await.unwrap();
        let trade = create_trade(
            &journal,
            "user-1",
            TradeInput {
                screenshot_url: Some(url.clone()),
                ..input("2024-01-02", "EUR/USD", 10.0)
            },
        )
        .await
        .unwrap();

        delete_trade(&journal, "user-1", &trade.id).await.unwrap();

        assert!(get_trades(&journal, "user-1", None).await.unwrap().is_empty());
        assert_eq!(store.removed(), vec![url]);
    }

    #[tokio::test]
    async fn test_delete_survives_storage_failure() {
        let (journal, store) = journal();
        store.fail_removals();
        let trade = create_trade(
            &journal,
            "user-1",
            TradeInput {
                screenshot_url: Some("mem://public/user-1/b.png".into()),
                ..input("2024-01-02", "EUR/USD", 10.0)
            },
        )
        .await
        .unwrap();

        assert!(delete_trade(&journal, "user-1", &trade.id).await.is_ok());
        assert!(get_trades(&journal, "user-1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_trades_only_touches_owner() {
        let (journal, _) = journal();
        create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 1.0)).await.unwrap();
        create_trade(&journal, "user-1", input("2024-01-03", "EUR/USD", 2.0)).await.unwrap();
        create_trade(&journal, "user-2", input("2024-01-03", "EUR/USD", 3.0)).await.unwrap();

        assert_eq!(delete_all_trades(&journal, "user-1").await.unwrap(), 2);
        assert_eq!(get_trades(&journal, "user-2", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_pair() {
        let (journal, _) = journal();
        let result = create_trade(&journal, "user-1", input("2024-01-02", "  ", 1.0)).await;
        assert!(matches!(result, Err(JournalError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_cannot_attach_another_users_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let journal = fs_journal(dir.path());
        let theirs = upload_screenshot(&journal, "user-2", "chart.png", b"img").await.unwrap();

        let created = create_trade(
            &journal,
            "user-1",
            TradeInput {
                screenshot_url: Some(theirs.clone()),
                ..input("2024-01-02", "EUR/USD", 10.0)
            },
        )
        .await;
        assert!(matches!(created, Err(JournalError::Validation(_))));

        let mine = create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 10.0)).await.unwrap();
        let updated = update_trade(
            &journal,
            "user-1",
            &mine.id,
            TradeInput {
                screenshot_url: Some(theirs),
                ..input("2024-01-02", "EUR/USD", 10.0)
            },
        )
        .await;
        assert!(matches!(updated, Err(JournalError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_keeps_another_users_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let journal = fs_journal(dir.path());
        let theirs = upload_screenshot(&journal, "user-2", "chart.png", b"img").await.unwrap();
        let path = FsScreenshotStore::new(dir.path().to_path_buf(), "local://screenshots")
            .path_for_url(&theirs)
            .unwrap();

        // Row written before ownership was checked
        let stale = TradeInput {
            screenshot_url: Some(theirs),
            ..input("2024-01-02", "EUR/USD", 10.0)
        }
        .into_trade("stale-1".into(), "user-1", 1, 1)
        .unwrap();
        upsert_trade(&journal.db.conn.lock().unwrap(), &stale).unwrap();

        delete_trade(&journal, "user-1", "stale-1").await.unwrap();

        assert!(get_trades(&journal, "user-1", None).await.unwrap().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_shared_screenshot_released_with_last_trade() {
        let (journal, store) = journal();
        let url = upload_screenshot(&journal, "user-1", "setup.png", b"img").await.unwrap();
        let mut ids = Vec::new();
        for day in ["2024-01-02", "2024-01-03"] {
            let input = TradeInput {
                screenshot_url: Some(url.clone()),
                ..input(day, "EUR/USD", 5.0)
            };
            ids.push(create_trade(&journal, "user-1", input).await.unwrap().id);
        }

        delete_trade(&journal, "user-1", &ids[0]).await.unwrap();
        assert!(store.removed().is_empty());

        delete_trade(&journal, "user-1", &ids[1]).await.unwrap();
        assert_eq!(store.removed(), vec![url]);
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_rejected() {
        let (journal, _) = journal();
        create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 1.0)).await.unwrap();

        let filters = TradeFilters {
            page: Some(i64::MAX),
            limit: Some(2),
            ..Default::default()
        };
        let result = get_trades(&journal, "user-1", Some(filters)).await;
        assert!(matches!(result, Err(JournalError::Validation(_))));

        // The connection is still usable afterwards
        assert_eq!(get_trades(&journal, "user-1", None).await.unwrap().len(), 1);
    }
}
