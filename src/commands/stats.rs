use chrono::{NaiveDate, Utc};

use crate::analytics::{Dashboard, DateRange, EquityPoint, MonthGrid, compute_calendar_buckets, compute_equity_curve_as_of};
use crate::commands::settings::ensure_settings;
use crate::commands::trades::query_trades;
use crate::error::{JournalError, Result};
use crate::models::{Trade, UserSettings};
use crate::Journal;

/// Settings and trades read under a single lock.
fn load_snapshot(journal: &Journal, user_id: &str) -> Result<(UserSettings, Vec<Trade>)> {
    let conn = journal.db.conn.lock()?;
    let settings = ensure_settings(&conn, user_id, &journal.config)?;
    let trades = query_trades(&conn, user_id, None)?;
    Ok((settings, trades))
}

/// Trades inside the window, plus the balance the window opens at: the
/// starting balance carried forward by every earlier trade.
fn windowed(trades: &[Trade], starting_balance: f64, range: DateRange, today: NaiveDate) -> (Vec<Trade>, f64) {
    match range.start(today) {
        Some(start) => {
            let carried: f64 = trades.iter().filter(|t| t.date < start).map(|t| t.pnl).sum();
            (range.filter(trades, today), starting_balance + carried)
        }
        None => (trades.to_vec(), starting_balance),
    }
}

fn dashboard_as_of(settings: &UserSettings, trades: &[Trade], range: DateRange, today: NaiveDate) -> Dashboard {
    let (trades, opening_balance) = windowed(trades, settings.starting_balance, range, today);
    Dashboard::compute(&trades, opening_balance, today)
}

pub async fn get_dashboard(journal: &Journal, user_id: &str, date_range: Option<String>) -> Result<Dashboard> {
    let (settings, trades) = load_snapshot(journal, user_id)?;
    let range = DateRange::from_key(date_range.as_deref());

    log::debug!("Computing dashboard for {} over {:?} ({} trades)", user_id, range, trades.len());
    Ok(dashboard_as_of(&settings, &trades, range, Utc::now().date_naive()))
}

pub async fn get_equity_curve(journal: &Journal, user_id: &str, date_range: Option<String>) -> Result<Vec<EquityPoint>> {
    let (settings, trades) = load_snapshot(journal, user_id)?;
    let today = Utc::now().date_naive();
    let (trades, opening_balance) = windowed(&trades, settings.starting_balance, DateRange::from_key(date_range.as_deref()), today);
    Ok(compute_equity_curve_as_of(&trades, opening_balance, today))
}

pub async fn get_calendar_month(journal: &Journal, user_id: &str, year: i32, month: u32) -> Result<MonthGrid> {
    let (_, trades) = load_snapshot(journal, user_id)?;
    compute_calendar_buckets(&trades)
        .month_grid(year, month)
        .ok_or_else(|| JournalError::Validation(format!("Invalid calendar month: {}-{}", year, month)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{input, journal};
    use crate::commands::trades::create_trade;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_uses_stored_balance() {
        let (journal, _) = journal();
        create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 100.0)).await.unwrap();
        create_trade(&journal, "user-1", input("2024-01-03", "GBP/USD", -40.0)).await.unwrap();

        let dashboard = get_dashboard(&journal, "user-1", None).await.unwrap();

        assert_eq!(dashboard.starting_balance, 5000.0);
        assert_eq!(dashboard.current_balance, 5060.0);
        assert_eq!(dashboard.kpis.total_trades, 2);
        assert_eq!(dashboard.pairs.most_profitable.as_ref().unwrap().pair, "EUR/USD");
    }

    #[tokio::test]
    async fn test_empty_journal_dashboard() {
        let (journal, _) = journal();
        let dashboard = get_dashboard(&journal, "user-1", Some("month".into())).await.unwrap();

        assert_eq!(dashboard.kpis.total_trades, 0);
        assert_eq!(dashboard.equity_curve.len(), 1);
        assert_eq!(dashboard.equity_curve[0].balance, 5000.0);
    }

    #[test]
    fn test_window_carries_earlier_pnl() {
        let settings = UserSettings {
            user_id: "user-1".into(),
            starting_balance: 1000.0,
            currency: "USD".into(),
            created_at: 0,
            updated_at: 0,
        };
        let trades: Vec<Trade> = [("2024-01-01", 200.0), ("2024-06-20", 50.0), ("2024-06-28", -10.0)]
            .into_iter()
            .enumerate()
            .map(|(i, (d, pnl))| {
                input(d, "EUR/USD", pnl)
                    .into_trade(format!("t{}", i), "user-1", i as i64, i as i64)
                    .unwrap()
            })
            .collect();

        let dashboard = dashboard_as_of(&settings, &trades, DateRange::Week, day("2024-06-30"));

        assert_eq!(dashboard.kpis.total_trades, 1);
        assert_eq!(dashboard.starting_balance, 1250.0);
        assert_eq!(dashboard.current_balance, 1240.0);

        let all = dashboard_as_of(&settings, &trades, DateRange::All, day("2024-06-30"));
        assert_eq!(all.current_balance, dashboard.current_balance);
    }

    #[tokio::test]
    async fn test_calendar_month() {
        let (journal, _) = journal();
        create_trade(&journal, "user-1", input("2024-02-05", "EUR/USD", 30.0)).await.unwrap();
        create_trade(&journal, "user-1", input("2024-02-05", "EUR/USD", -10.0)).await.unwrap();

        let grid = get_calendar_month(&journal, "user-1", 2024, 2).await.unwrap();
        assert_eq!(grid.month_pnl, 20.0);
        assert_eq!(grid.month_trades, 2);

        assert!(matches!(
            get_calendar_month(&journal, "user-1", 2024, 13).await,
            Err(JournalError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_equity_curve_ends_at_current_balance() {
        let (journal, _) = journal();
        create_trade(&journal, "user-1", input("2024-01-02", "EUR/USD", 100.0)).await.unwrap();
        create_trade(&journal, "user-1", input("2024-01-05", "EUR/USD", 25.0)).await.unwrap();

        let curve = get_equity_curve(&journal, "user-1", None).await.unwrap();
        assert_eq!(curve.last().unwrap().balance, 5125.0);
    }
}
