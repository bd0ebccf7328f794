use std::path::PathBuf;

/// Default starting balance for a user without a settings row.
pub const DEFAULT_STARTING_BALANCE: f64 = 5000.0;

/// Configuration loaded from environment variables (and `.env` if present).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Holds the database, migration backups and screenshots
    pub data_dir: PathBuf,
    pub default_starting_balance: f64,
    pub default_currency: String,
    /// Prefix of the urls handed out for stored screenshots
    pub screenshot_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./journal-data"),
            default_starting_balance: DEFAULT_STARTING_BALANCE,
            default_currency: "USD".to_string(),
            screenshot_base_url: "local://screenshots".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            data_dir: lookup("TRADE_JOURNAL_DATA_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            default_starting_balance: lookup("TRADE_JOURNAL_DEFAULT_BALANCE")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(defaults.default_starting_balance),
            default_currency: lookup("TRADE_JOURNAL_CURRENCY")
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.default_currency),
            screenshot_base_url: lookup("TRADE_JOURNAL_SCREENSHOT_BASE_URL")
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.screenshot_base_url),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("trade_journal.db")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database_path(), PathBuf::from("./journal-data/trade_journal.db"));
    }

    #[test]
    fn test_reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRADE_JOURNAL_DATA_DIR", "/tmp/journal"),
            ("TRADE_JOURNAL_DEFAULT_BALANCE", "12500.50"),
            ("TRADE_JOURNAL_CURRENCY", "eur"),
            ("TRADE_JOURNAL_SCREENSHOT_BASE_URL", "https://cdn.example.com/shots/"),
        ]);

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.screenshot_dir(), PathBuf::from("/tmp/journal/screenshots"));
        assert_eq!(config.default_starting_balance, 12500.50);
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.screenshot_base_url, "https://cdn.example.com/shots");
    }

    #[test]
    fn test_bad_balance_falls_back() {
        let config = AppConfig::from_lookup(|k| (k == "TRADE_JOURNAL_DEFAULT_BALANCE").then(|| "lots".to_string()));
        assert_eq!(config.default_starting_balance, DEFAULT_STARTING_BALANCE);
    }
}
