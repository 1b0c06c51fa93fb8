use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub catalog_db_path: PathBuf,
    pub store_db_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub log_level: String,
    pub max_concurrent_backups: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            catalog_db_path: data_dir.join("backup-catalog.db"),
            store_db_path: PathBuf::from(
                std::env::var("STORE_DB_PATH")
                    .unwrap_or_else(|_| data_dir.join("crm.db").to_string_lossy().into_owned()),
            ),
            artifacts_dir: PathBuf::from(
                std::env::var("ARTIFACTS_DIR")
                    .unwrap_or_else(|_| data_dir.join("artifacts").to_string_lossy().into_owned()),
            ),
            data_dir,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            max_concurrent_backups: std::env::var("MAX_CONCURRENT_BACKUPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}
