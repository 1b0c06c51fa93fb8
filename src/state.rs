use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::events::EventBroadcaster;
use crate::services::orchestrator::RestoreTracker;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct AppState {
    /// Backup metadata catalog. The registry owns every BackupRecord.
    pub catalog: DbPool,
    /// The CRM data store being backed up and restored.
    pub store: DbPool,
    pub config: AppConfig,
    pub events: EventBroadcaster,
    /// One permit: at most one restore may snapshot/apply at a time.
    pub restore_lock: Arc<Semaphore>,
    /// Bounds concurrent backup generations.
    pub generation_semaphore: Arc<Semaphore>,
    pub restores: RestoreTracker,
}

impl AppState {
    pub fn new(catalog: DbPool, store: DbPool, config: AppConfig) -> Self {
        let max_backups = config.max_concurrent_backups;
        Self {
            catalog,
            store,
            config,
            events: EventBroadcaster::new(),
            restore_lock: Arc::new(Semaphore::new(1)),
            generation_semaphore: Arc::new(Semaphore::new(max_backups)),
            restores: RestoreTracker::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::db::connection::create_pool;
    use crate::db::migrate::{migrate_catalog, migrate_store};
    use tempfile::TempDir;

    pub fn test_state() -> (TempDir, Arc<AppState>) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            port: 0,
            data_dir: dir.path().to_path_buf(),
            catalog_db_path: dir.path().join("catalog.db"),
            store_db_path: dir.path().join("crm.db"),
            artifacts_dir: dir.path().join("artifacts"),
            log_level: "info".into(),
            max_concurrent_backups: 4,
        };
        std::fs::create_dir_all(&config.artifacts_dir).unwrap();

        let catalog = create_pool(config.catalog_db_path.to_str().unwrap()).unwrap();
        let store = create_pool(config.store_db_path.to_str().unwrap()).unwrap();
        migrate_catalog(&catalog).unwrap();
        migrate_store(&store).unwrap();

        (dir, Arc::new(AppState::new(catalog, store, config)))
    }

    pub fn seed_store(state: &AppState) {
        let conn = state.store.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, full_name, email) VALUES
               (1, 'Ada Lovelace', 'ada@example.com'),
               (2, 'Edsger Dijkstra', 'edsger@example.com');
             INSERT INTO clients (id, name, company, owner_id) VALUES
               (1, 'Grace Hopper', 'Navy Systems', 1),
               (2, 'Alan Kay', 'Viewpoints', 2);
             INSERT INTO deals (id, client_id, title, value_cents, stage) VALUES
               (1, 1, 'Compiler contract', 500000, 'won');",
        )
        .unwrap();
    }
}
