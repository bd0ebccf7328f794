use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DayBucket {
    pub pnl: f64,
    pub trade_count: usize,
}

/// Per-day pnl keyed by "YYYY-MM-DD".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarBuckets {
    pub days: BTreeMap<String, DayBucket>,
    /// Largest absolute daily pnl, never below 1
    pub max_abs_pnl: f64,
}

impl CalendarBuckets {
    pub fn get(&self, date: &str) -> Option<&DayBucket> {
        self.days.get(date)
    }

    /// Heatmap intensity in [0, 1].
    pub fn intensity(&self, date: &str) -> f64 {
        self.days
            .get(date)
            .map(|b| (b.pnl.abs() / self.max_abs_pnl).min(1.0))
            .unwrap_or(0.0)
    }

    /// Monday-first grid for one month, padded with days of the
    /// neighbouring months so every week row has seven cells.
    /// Returns `None` for an invalid year/month.
    pub fn month_grid(&self, year: i32, month: u32) -> Option<MonthGrid> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };

        let leading = first.weekday().num_days_from_monday() as u64;
        let mut day = first.checked_sub_days(Days::new(leading))?;

        let mut cells = Vec::new();
        while day < next_first || cells.len() % 7 != 0 {
            cells.push(self.cell(day, day.month() == month));
            day = day.succ_opt()?;
        }

        let weeks = cells.chunks(7).map(|w| w.to_vec()).collect();
        let (month_pnl, month_trades) = self
            .days
            .range(first.to_string()..next_first.to_string())
            .fold((0.0, 0), |(pnl, count), (_, b)| (pnl + b.pnl, count + b.trade_count));

        Some(MonthGrid {
            year,
            month,
            weeks,
            month_pnl,
            month_trades,
        })
    }

    fn cell(&self, date: NaiveDate, in_month: bool) -> CalendarCell {
        if !in_month {
            return CalendarCell {
                date,
                in_month,
                bucket: None,
                intensity: 0.0,
                tone: DayTone::Empty,
            };
        }

        let key = date.to_string();
        let bucket = self.days.get(&key).copied().filter(|b| b.trade_count > 0);
        let tone = match bucket {
            None => DayTone::Empty,
            Some(b) if b.pnl > 0.0 => DayTone::Profit,
            Some(b) if b.pnl < 0.0 => DayTone::Loss,
            Some(_) => DayTone::Flat,
        };

        CalendarCell {
            date,
            in_month,
            bucket,
            intensity: self.intensity(&key),
            tone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayTone {
    Profit,
    Loss,
    Flat,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarCell {
    pub date: NaiveDate,
    /// False for padding days from the neighbouring months
    pub in_month: bool,
    pub bucket: Option<DayBucket>,
    pub intensity: f64,
    pub tone: DayTone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<CalendarCell>>,
    pub month_pnl: f64,
    pub month_trades: usize,
}

pub fn compute_calendar_buckets(trades: &[Trade]) -> CalendarBuckets {
    let mut days: BTreeMap<String, DayBucket> = BTreeMap::new();
    for trade in trades {
        let bucket = days.entry(trade.date.to_string()).or_default();
        bucket.pnl += trade.pnl;
        bucket.trade_count += 1;
    }

    let max_abs_pnl = days.values().map(|b| b.pnl.abs()).fold(1.0, f64::max);

    CalendarBuckets { days, max_abs_pnl }
}
