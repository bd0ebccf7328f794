use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{JournalError, Result};
use crate::models::TradeInput;
use crate::{AppConfig, Journal, ScreenshotStore};

/// Screenshot store that keeps blobs in memory and records removals.
#[derive(Default)]
pub struct RecordingStore {
    removed: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingStore {
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn fail_removals(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScreenshotStore for RecordingStore {
    async fn upload(&self, user_id: &str, file_name: &str, _bytes: &[u8]) -> Result<String> {
        Ok(format!("mem://public/{}/{}", user_id, file_name))
    }

    async fn remove(&self, _user_id: &str, url: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(JournalError::Storage("bucket unavailable".to_string()));
        }
        self.removed.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub fn journal() -> (Journal, Arc<RecordingStore>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(RecordingStore::default());
    let journal = Journal::in_memory(AppConfig::default(), store.clone()).unwrap();
    (journal, store)
}

pub fn input(date: &str, pair: &str, pnl: f64) -> TradeInput {
    TradeInput {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        pair: pair.to_string(),
        trade_type: Default::default(),
        entry: None,
        exit: None,
        pnl,
        setup: None,
        session: None,
        mistake: None,
        notes: None,
        learnings: None,
        tags: Vec::new(),
        screenshot_url: None,
    }
}
