use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bucket label for trades without a setup or session.
pub const UNSPECIFIED: &str = "Unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TradeType {
    #[default]
    Long,
    Short,
}

impl TradeType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "long" | "buy" => Some(TradeType::Long),
            "short" | "sell" => Some(TradeType::Short),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Long => "Long",
            TradeType::Short => "Short",
        }
    }
}

/// Three-state outcome. Always derived from the sign of pnl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Breakeven,
}

impl Outcome {
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 {
            Outcome::Win
        } else if pnl < 0.0 {
            Outcome::Loss
        } else {
            Outcome::Breakeven
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Breakeven => "BREAKEVEN",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "WIN" => Some(Outcome::Win),
            "LOSS" => Some(Outcome::Loss),
            "BREAKEVEN" | "BE" => Some(Outcome::Breakeven),
            _ => None,
        }
    }
}

/// Trading-hours window a trade was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    Asian,
    London,
    #[serde(rename = "NYC")]
    Nyc,
    Close,
}

impl Session {
    /// Canonical display order.
    pub const ALL: [Session; 4] = [Session::Asian, Session::London, Session::Nyc, Session::Close];

    pub fn label(&self) -> &'static str {
        match self {
            Session::Asian => "Asian",
            Session::London => "London",
            Session::Nyc => "NYC",
            Session::Close => "Close",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "asian" | "asia" => Some(Session::Asian),
            "london" => Some(Session::London),
            "nyc" | "ny" | "new york" => Some(Session::Nyc),
            "close" => Some(Session::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub date: NaiveDate,
    pub pair: String,
    #[serde(rename = "type", default)]
    pub trade_type: TradeType,
    pub entry: Option<f64>,
    pub exit: Option<f64>,
    pub pnl: f64,
    pub outcome: Outcome,
    pub setup: Option<String>,
    pub session: Option<Session>,
    pub mistake: Option<String>,
    pub notes: Option<String>,
    pub learnings: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub screenshot_url: Option<String>,

    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    pub fn setup_label(&self) -> &str {
        self.setup.as_deref().unwrap_or(UNSPECIFIED)
    }

    pub fn session_label(&self) -> &'static str {
        self.session.map(|s| s.label()).unwrap_or(UNSPECIFIED)
    }

    /// The mistake label, if one was recorded. "None" counts as no mistake.
    pub fn mistake_label(&self) -> Option<&str> {
        self.mistake
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("none"))
    }
}

/// Input for creating or fully replacing a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeInput {
    pub date: NaiveDate,
    pub pair: String,
    #[serde(rename = "type", default)]
    pub trade_type: TradeType,
    pub entry: Option<f64>,
    pub exit: Option<f64>,
    pub pnl: f64,
    pub setup: Option<String>,
    pub session: Option<Session>,
    pub mistake: Option<String>,
    pub notes: Option<String>,
    pub learnings: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub screenshot_url: Option<String>,
}

impl TradeInput {
    /// Validate and stamp the input. Outcome is derived from pnl here and nowhere else.
    pub fn into_trade(self, id: String, user_id: &str, created_at: i64, updated_at: i64) -> Result<Trade, RecordError> {
        if !self.pnl.is_finite() {
            return Err(RecordError::InvalidNumber {
                field: "pnl",
                value: self.pnl.to_string(),
            });
        }
        let pair = self.pair.trim().to_string();
        if pair.is_empty() {
            return Err(RecordError::MissingField("pair"));
        }

        Ok(Trade {
            id,
            user_id: user_id.to_string(),
            date: self.date,
            pair,
            trade_type: self.trade_type,
            entry: self.entry.filter(|v| v.is_finite()),
            exit: self.exit.filter(|v| v.is_finite()),
            pnl: self.pnl,
            outcome: Outcome::from_pnl(self.pnl),
            setup: clean_text(self.setup),
            session: self.session,
            mistake: clean_text(self.mistake),
            notes: clean_text(self.notes),
            learnings: clean_text(self.learnings),
            tags: normalize_tags(self.tags),
            screenshot_url: clean_text(self.screenshot_url),
            created_at,
            updated_at,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilters {
    /// Case-insensitive substring match against pair or setup
    pub search: Option<String>,
    pub outcome: Option<Outcome>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a finite number: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid calendar date: {0}")]
    InvalidDate(String),
}

/// A record excluded from a batch, with its position in the input.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub id: Option<String>,
    pub error: RecordError,
}

/// Loosely-shaped trade as it arrives from exports, backups or a hosted backend.
///
/// Numbers may be JSON numbers or numeric strings and ids may be numeric
/// (older exports used millisecond timestamps as ids).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTradeRecord {
    pub id: Option<serde_json::Value>,
    pub user_id: Option<String>,
    pub date: Option<String>,
    pub pair: Option<String>,
    #[serde(rename = "type")]
    pub trade_type: Option<String>,
    pub entry: Option<serde_json::Value>,
    pub exit: Option<serde_json::Value>,
    pub pnl: Option<serde_json::Value>,
    pub outcome: Option<String>,
    pub setup: Option<String>,
    pub session: Option<String>,
    pub mistake: Option<String>,
    pub notes: Option<String>,
    pub learnings: Option<String>,
    pub tags: Option<Vec<String>>,
    pub screenshot_url: Option<String>,
    pub created_at: Option<serde_json::Value>,
    pub updated_at: Option<serde_json::Value>,
}

impl RawTradeRecord {
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Strict per-record normalisation: required fields must be recoverable,
    /// optional ones fall back to neutral defaults.
    pub fn normalize(self) -> Result<Trade, RecordError> {
        let pnl = match &self.pnl {
            Some(value) => parse_number(value)
                .ok_or_else(|| RecordError::InvalidNumber {
                    field: "pnl",
                    value: value.to_string(),
                })?,
            None => return Err(RecordError::MissingField("pnl")),
        };

        let date_str = self.date.as_deref().map(str::trim).unwrap_or("");
        if date_str.is_empty() {
            return Err(RecordError::MissingField("date"));
        }
        let date = parse_trade_date(date_str)?;

        let pair = self.pair.as_deref().map(str::trim).unwrap_or("");
        if pair.is_empty() {
            return Err(RecordError::MissingField("pair"));
        }

        let id = self.id_string().unwrap_or_else(new_trade_id);
        let trade_type = self
            .trade_type
            .as_deref()
            .and_then(TradeType::from_label)
            .unwrap_or_default();
        let session = self.session.as_deref().and_then(Session::from_label);
        let created_at = self.created_at.as_ref().and_then(parse_timestamp).unwrap_or(0);
        let updated_at = self
            .updated_at
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Ok(Trade {
            id,
            user_id: self.user_id.unwrap_or_default(),
            date,
            pair: pair.to_string(),
            trade_type,
            entry: self.entry.as_ref().and_then(parse_number),
            exit: self.exit.as_ref().and_then(parse_number),
            pnl,
            outcome: Outcome::from_pnl(pnl),
            setup: clean_text(self.setup),
            session,
            mistake: clean_text(self.mistake),
            notes: clean_text(self.notes),
            learnings: clean_text(self.learnings),
            tags: normalize_tags(self.tags.unwrap_or_default()),
            screenshot_url: clean_text(self.screenshot_url),
            created_at,
            updated_at,
        })
    }
}

impl From<&Trade> for RawTradeRecord {
    fn from(trade: &Trade) -> Self {
        RawTradeRecord {
            id: Some(serde_json::Value::String(trade.id.clone())),
            user_id: Some(trade.user_id.clone()),
            date: Some(trade.date.format("%Y-%m-%d").to_string()),
            pair: Some(trade.pair.clone()),
            trade_type: Some(trade.trade_type.as_str().to_string()),
            entry: trade.entry.map(serde_json::Value::from),
            exit: trade.exit.map(serde_json::Value::from),
            pnl: Some(serde_json::Value::from(trade.pnl)),
            outcome: Some(trade.outcome.as_str().to_string()),
            setup: trade.setup.clone(),
            session: trade.session.map(|s| s.label().to_string()),
            mistake: trade.mistake.clone(),
            notes: trade.notes.clone(),
            learnings: trade.learnings.clone(),
            tags: Some(trade.tags.clone()),
            screenshot_url: trade.screenshot_url.clone(),
            created_at: Some(serde_json::Value::from(trade.created_at)),
            updated_at: Some(serde_json::Value::from(trade.updated_at)),
        }
    }
}

/// Normalise a batch, keeping every valid record and reporting the rest.
pub fn normalize_records(records: Vec<RawTradeRecord>) -> (Vec<Trade>, Vec<RejectedRecord>) {
    let mut trades = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let id = record.id_string();
        match record.normalize() {
            Ok(trade) => trades.push(trade),
            Err(error) => {
                log::warn!("Skipping trade record {} ({:?}): {}", index, id, error);
                rejected.push(RejectedRecord { index, id, error });
            }
        }
    }

    (trades, rejected)
}

/// Parse a JSON array of loosely-shaped trade records.
pub fn parse_trades_json(json: &str) -> Result<(Vec<Trade>, Vec<RejectedRecord>), serde_json::Error> {
    let records: Vec<RawTradeRecord> = serde_json::from_str(json)?;
    Ok(normalize_records(records))
}

pub fn new_trade_id() -> String {
    format!("TRADE-{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
}

/// Accepts "YYYY-MM-DD" and full timestamps whose first ten characters are a date.
pub fn parse_trade_date(value: &str) -> Result<NaiveDate, RecordError> {
    let trimmed = value.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| RecordError::InvalidDate(trimmed.to_string()))
}

fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn parse_timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| chrono::DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp())),
        _ => None,
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Trim, drop empties and remove duplicates keeping the first occurrence.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
