pub mod analytics;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod storage;

use std::sync::Arc;

pub use config::AppConfig;
pub use db::Database;
pub use error::{JournalError, Result};
pub use storage::{FsScreenshotStore, ScreenshotStore};

/// Shared state every command runs against.
pub struct Journal {
    pub db: Database,
    pub screenshots: Arc<dyn ScreenshotStore>,
    pub config: AppConfig,
}

impl Journal {
    /// Open (or create) the journal under `config.data_dir`.
    pub fn open(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.database_path();
        log::info!("Database path: {:?}", db_path);

        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| JournalError::Validation(format!("Database path is not valid UTF-8: {:?}", db_path)))?;

        let db = match Database::new(db_path_str) {
            Ok(db) => db,
            Err(e) => {
                log::error!("Database initialization failed: {}", e);
                log::error!("This might be due to a failed migration or database corruption.");
                log::error!(
                    "Backups are in {:?}; replace trade_journal.db with the most recent one and retry.",
                    config.data_dir.join("backups")
                );
                return Err(e.into());
            }
        };

        let screenshots = Arc::new(FsScreenshotStore::new(
            config.screenshot_dir(),
            config.screenshot_base_url.clone(),
        ));

        Ok(Self {
            db,
            screenshots,
            config,
        })
    }

    /// In-memory database with the given screenshot store.
    pub fn in_memory(config: AppConfig, screenshots: Arc<dyn ScreenshotStore>) -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            screenshots,
            config,
        })
    }
}
