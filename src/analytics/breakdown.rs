use chrono::{Datelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::{Session, Trade, UNSPECIFIED};

/// Summed pnl for one bucket of trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStat {
    pub label: String,
    pub pnl: f64,
    pub trade_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAndStrategyAnalytics {
    /// Asian, London, NYC, Close, then Unspecified; empty sessions omitted
    pub by_session: Vec<BucketStat>,
    /// Monday first; days without trades omitted
    pub by_day_of_week: Vec<BucketStat>,
    /// Descending by pnl
    pub by_strategy: Vec<BucketStat>,
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

pub fn compute_time_and_strategy_analytics(trades: &[Trade]) -> TimeAndStrategyAnalytics {
    TimeAndStrategyAnalytics {
        by_session: by_session(trades),
        by_day_of_week: by_day_of_week(trades),
        by_strategy: by_strategy(trades),
    }
}

fn by_session(trades: &[Trade]) -> Vec<BucketStat> {
    // Slot 4 is Unspecified
    let mut slots = [(0.0f64, 0usize); 5];
    for trade in trades {
        let slot = match trade.session {
            Some(session) => Session::ALL.iter().position(|s| *s == session).unwrap_or(4),
            None => 4,
        };
        slots[slot].0 += trade.pnl;
        slots[slot].1 += 1;
    }

    let labels = Session::ALL.iter().map(|s| s.label()).chain(std::iter::once(UNSPECIFIED));
    labels
        .zip(slots)
        .filter(|(_, (_, count))| *count > 0)
        .map(|(label, (pnl, trade_count))| BucketStat {
            label: label.to_string(),
            pnl,
            trade_count,
        })
        .collect()
}

/// Trade dates are plain calendar dates, so the weekday is the UTC weekday
/// regardless of where this runs.
fn by_day_of_week(trades: &[Trade]) -> Vec<BucketStat> {
    let mut slots = [(0.0f64, 0usize); 7];
    for trade in trades {
        let slot = trade.date.weekday().num_days_from_monday() as usize;
        slots[slot].0 += trade.pnl;
        slots[slot].1 += 1;
    }

    WEEK.iter()
        .zip(slots)
        .filter(|(_, (_, count))| *count > 0)
        .map(|(day, (pnl, trade_count))| BucketStat {
            label: weekday_label(*day).to_string(),
            pnl,
            trade_count,
        })
        .collect()
}

fn by_strategy(trades: &[Trade]) -> Vec<BucketStat> {
    let mut stats: Vec<BucketStat> = Vec::new();
    for trade in trades {
        let label = trade.setup_label();
        match stats.iter_mut().find(|s| s.label == label) {
            Some(stat) => {
                stat.pnl += trade.pnl;
                stat.trade_count += 1;
            }
            None => stats.push(BucketStat {
                label: label.to_string(),
                pnl: trade.pnl,
                trade_count: 1,
            }),
        }
    }

    stats.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_helpers::trade;

    fn labels(stats: &[BucketStat]) -> Vec<&str> {
        stats.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_sessions_follow_canonical_order() {
        let trades = vec![
            Trade { session: Some(Session::Close), ..trade("2024-01-02", "EUR/USD", 5.0) },
            trade("2024-01-02", "EUR/USD", 7.0),
            Trade { session: Some(Session::Asian), ..trade("2024-01-02", "EUR/USD", -3.0) },
            Trade { session: Some(Session::Nyc), ..trade("2024-01-03", "EUR/USD", 12.0) },
            Trade { session: Some(Session::Asian), ..trade("2024-01-04", "EUR/USD", 1.0) },
        ];

        let analytics = compute_time_and_strategy_analytics(&trades);

        assert_eq!(labels(&analytics.by_session), vec!["Asian", "NYC", "Close", "Unspecified"]);
        assert_eq!(analytics.by_session[0].pnl, -2.0);
        assert_eq!(analytics.by_session[0].trade_count, 2);
    }

    #[test]
    fn test_day_of_week_is_monday_first_and_sparse() {
        // 2024-01-07 is a Sunday, 2024-01-08 a Monday, 2024-01-10 a Wednesday
        let trades = vec![
            trade("2024-01-07", "EUR/USD", 4.0),
            trade("2024-01-10", "EUR/USD", -6.0),
            trade("2024-01-08", "EUR/USD", 10.0),
            trade("2024-01-15", "EUR/USD", 1.0),
        ];

        let analytics = compute_time_and_strategy_analytics(&trades);

        assert_eq!(labels(&analytics.by_day_of_week), vec!["Mon", "Wed", "Sun"]);
        assert_eq!(analytics.by_day_of_week[0].pnl, 11.0);
        assert_eq!(analytics.by_day_of_week[0].trade_count, 2);
    }

    #[test]
    fn test_strategies_sorted_by_pnl_with_unspecified_bucket() {
        let trades = vec![
            Trade { setup: Some("Liquidity Sweep".into()), ..trade("2024-01-02", "EUR/USD", -20.0) },
            trade("2024-01-02", "EUR/USD", 15.0),
            Trade { setup: Some("Break & Retest".into()), ..trade("2024-01-03", "EUR/USD", 40.0) },
            Trade { setup: Some("Liquidity Sweep".into()), ..trade("2024-01-04", "EUR/USD", 5.0) },
        ];

        let analytics = compute_time_and_strategy_analytics(&trades);

        assert_eq!(
            labels(&analytics.by_strategy),
            vec!["Break & Retest", "Unspecified", "Liquidity Sweep"]
        );
        assert_eq!(analytics.by_strategy[2].pnl, -15.0);
    }

    #[test]
    fn test_empty_input() {
        let analytics = compute_time_and_strategy_analytics(&[]);

        assert!(analytics.by_session.is_empty());
        assert!(analytics.by_day_of_week.is_empty());
        assert!(analytics.by_strategy.is_empty());
    }
}
