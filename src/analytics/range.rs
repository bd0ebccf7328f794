use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Dashboard look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
}

impl DateRange {
    /// Parses the range keys used by the dashboard ("week", "3months", ...).
    /// Anything unrecognised means all time.
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some("today") => DateRange::Today,
            Some("week") => DateRange::Week,
            Some("month") => DateRange::Month,
            Some("3months") => DateRange::ThreeMonths,
            Some("6months") => DateRange::SixMonths,
            Some("year") => DateRange::Year,
            _ => DateRange::All,
        }
    }

    /// First date included in the window ending at `today`.
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        let days = match self {
            DateRange::All => return None,
            DateRange::Today => 0,
            DateRange::Week => 7,
            DateRange::Month => 30,
            DateRange::ThreeMonths => 90,
            DateRange::SixMonths => 180,
            DateRange::Year => 365,
        };
        today.checked_sub_days(Days::new(days))
    }

    pub fn filter(&self, trades: &[Trade], today: NaiveDate) -> Vec<Trade> {
        match self.start(today) {
            Some(start) => trades.iter().filter(|t| t.date >= start).cloned().collect(),
            None => trades.to_vec(),
        }
    }
}
