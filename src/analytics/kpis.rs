use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Baseline used for the pnl percentage when the starting balance is not positive.
pub const FALLBACK_BALANCE: f64 = 5000.0;

/// Headline performance numbers for a set of trades.
///
/// Ratios that have a profit side but no loss side (`risk_reward`,
/// `profit_factor`) are `None`, meaning "no data" rather than infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_trades: usize,
    pub wins_count: usize,
    pub losses_count: usize,
    pub breakeven_count: usize,
    pub total_pnl: f64,
    pub pnl_percentage: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub risk_reward: Option<f64>,
    pub expectancy: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: Option<f64>,
    pub best_trade: f64,
    pub worst_trade: f64,
}

pub fn compute_kpis(trades: &[Trade], starting_balance: f64) -> Kpis {
    let total_trades = trades.len();

    let mut wins_count = 0usize;
    let mut losses_count = 0usize;
    let mut total_pnl = 0.0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut best_trade: Option<f64> = None;
    let mut worst_trade: Option<f64> = None;

    for trade in trades {
        total_pnl += trade.pnl;
        if trade.is_win() {
            wins_count += 1;
            gross_profit += trade.pnl;
        } else if trade.is_loss() {
            losses_count += 1;
            gross_loss += trade.pnl.abs();
        }
        best_trade = Some(best_trade.map_or(trade.pnl, |b| b.max(trade.pnl)));
        worst_trade = Some(worst_trade.map_or(trade.pnl, |w| w.min(trade.pnl)));
    }

    let breakeven_count = total_trades - wins_count - losses_count;

    let win_rate = if total_trades > 0 {
        wins_count as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let avg_win = if wins_count > 0 { gross_profit / wins_count as f64 } else { 0.0 };
    let avg_loss = if losses_count > 0 { gross_loss / losses_count as f64 } else { 0.0 };

    let (win_prob, loss_prob) = if total_trades > 0 {
        (
            wins_count as f64 / total_trades as f64,
            losses_count as f64 / total_trades as f64,
        )
    } else {
        (0.0, 0.0)
    };

    let base = if starting_balance > 0.0 { starting_balance } else { FALLBACK_BALANCE };

    Kpis {
        total_trades,
        wins_count,
        losses_count,
        breakeven_count,
        total_pnl,
        pnl_percentage: total_pnl / base * 100.0,
        win_rate,
        avg_win,
        avg_loss,
        risk_reward: ratio(avg_win, avg_loss),
        expectancy: avg_win * win_prob - avg_loss * loss_prob,
        gross_profit,
        gross_loss,
        profit_factor: ratio(gross_profit, gross_loss),
        best_trade: best_trade.unwrap_or(0.0),
        worst_trade: worst_trade.unwrap_or(0.0),
    }
}

/// `gain / loss`, `None` when only the gain side has data, `0` when neither does.
fn ratio(gain: f64, loss: f64) -> Option<f64> {
    if loss > 0.0 {
        Some(gain / loss)
    } else if gain > 0.0 {
        None
    } else {
        Some(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_helpers::{eurusd_pair, trade};

    #[test]
    fn test_two_trade_scenario() {
        let kpis = compute_kpis(&eurusd_pair(), 1000.0);

        assert_eq!(kpis.total_pnl, 60.0);
        assert_eq!(kpis.win_rate, 50.0);
        assert_eq!(kpis.wins_count, 1);
        assert_eq!(kpis.losses_count, 1);
        assert_eq!(kpis.total_trades, 2);
        assert_eq!(kpis.avg_win, 100.0);
        assert_eq!(kpis.avg_loss, 40.0);
        assert_eq!(kpis.risk_reward, Some(2.5));
        assert!((kpis.pnl_percentage - 6.0).abs() < 1e-9);
        // 100 * 0.5 - 40 * 0.5
        assert_eq!(kpis.expectancy, 30.0);
        assert_eq!(kpis.best_trade, 100.0);
        assert_eq!(kpis.worst_trade, -40.0);
    }

    #[test]
    fn test_empty_input_has_no_division_fault() {
        let kpis = compute_kpis(&[], 5000.0);

        assert_eq!(kpis.total_pnl, 0.0);
        assert_eq!(kpis.win_rate, 0.0);
        assert_eq!(kpis.total_trades, 0);
        assert_eq!(kpis.risk_reward, Some(0.0));
        assert_eq!(kpis.profit_factor, Some(0.0));
        assert_eq!(kpis.expectancy, 0.0);
        assert!(kpis.pnl_percentage.is_finite());
    }

    #[test]
    fn test_breakeven_excluded_from_wins_and_losses() {
        let trades = vec![
            trade("2024-03-01", "EUR/USD", 50.0),
            trade("2024-03-01", "EUR/USD", 0.0),
            trade("2024-03-02", "GBP/USD", -25.0),
        ];
        let kpis = compute_kpis(&trades, 1000.0);

        assert_eq!(kpis.breakeven_count, 1);
        assert!(kpis.wins_count + kpis.losses_count <= trades.len());
        assert!((kpis.win_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_winners_reports_no_data_risk_reward() {
        let trades = vec![trade("2024-03-01", "EUR/USD", 50.0), trade("2024-03-02", "EUR/USD", 10.0)];
        let kpis = compute_kpis(&trades, 1000.0);

        assert_eq!(kpis.risk_reward, None);
        assert_eq!(kpis.profit_factor, None);
        assert_eq!(serde_json::to_value(&kpis).unwrap()["risk_reward"], serde_json::Value::Null);
    }

    #[test]
    fn test_non_positive_balance_uses_fallback() {
        let trades = vec![trade("2024-03-01", "EUR/USD", 500.0)];

        assert!((compute_kpis(&trades, 0.0).pnl_percentage - 10.0).abs() < 1e-9);
        assert!((compute_kpis(&trades, -200.0).pnl_percentage - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent() {
        let trades = eurusd_pair();
        assert_eq!(compute_kpis(&trades, 1000.0), compute_kpis(&trades, 1000.0));
    }
}
