use serde::{Deserialize, Serialize};

use crate::models::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeStat {
    pub mistake: String,
    pub count: usize,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeAnalytics {
    /// Usually negative, but a mistake can still end in a winner
    pub total_mistake_pnl: f64,
    pub mistake_free_pnl: f64,
    /// Descending by count; equal counts keep first-seen order
    pub frequency_by_mistake: Vec<MistakeStat>,
    pub mistake_trades: Vec<Trade>,
}

pub fn compute_mistake_analytics(trades: &[Trade]) -> MistakeAnalytics {
    let mut total_mistake_pnl = 0.0;
    let mut mistake_free_pnl = 0.0;
    let mut frequency_by_mistake: Vec<MistakeStat> = Vec::new();
    let mut mistake_trades = Vec::new();

    for trade in trades {
        let Some(label) = trade.mistake_label() else {
            mistake_free_pnl += trade.pnl;
            continue;
        };

        total_mistake_pnl += trade.pnl;
        match frequency_by_mistake.iter_mut().find(|m| m.mistake == label) {
            Some(stat) => {
                stat.count += 1;
                stat.pnl += trade.pnl;
            }
            None => frequency_by_mistake.push(MistakeStat {
                mistake: label.to_string(),
                count: 1,
                pnl: trade.pnl,
            }),
        }
        mistake_trades.push(trade.clone());
    }

    frequency_by_mistake.sort_by(|a, b| b.count.cmp(&a.count));

    MistakeAnalytics {
        total_mistake_pnl,
        mistake_free_pnl,
        frequency_by_mistake,
        mistake_trades,
    }
}
