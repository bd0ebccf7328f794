use serde::{Deserialize, Serialize};

use crate::models::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairStat {
    pub pair: String,
    pub pnl: f64,
    pub trade_count: usize,
    pub wins: usize,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalytics {
    pub most_profitable: Option<PairStat>,
    pub worst_performing: Option<PairStat>,
    /// Descending by pnl; equal pnl keeps first-seen order
    pub ranked: Vec<PairStat>,
}

pub fn compute_pair_analytics(trades: &[Trade]) -> PairAnalytics {
    let mut ranked: Vec<PairStat> = Vec::new();

    for trade in trades {
        let idx = match ranked.iter().position(|p| p.pair == trade.pair) {
            Some(idx) => idx,
            None => {
                ranked.push(PairStat {
                    pair: trade.pair.clone(),
                    pnl: 0.0,
                    trade_count: 0,
                    wins: 0,
                    win_rate: 0.0,
                });
                ranked.len() - 1
            }
        };
        let stat = &mut ranked[idx];
        stat.pnl += trade.pnl;
        stat.trade_count += 1;
        if trade.is_win() {
            stat.wins += 1;
        }
    }

    for stat in &mut ranked {
        stat.win_rate = stat.wins as f64 / stat.trade_count as f64 * 100.0;
    }

    // Stable sort keeps first-seen order on ties
    ranked.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));

    PairAnalytics {
        most_profitable: ranked.first().cloned(),
        worst_performing: ranked.last().cloned(),
        ranked,
    }
}
