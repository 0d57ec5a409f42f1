//! Application State
//!
//! Composition root for an embedding application: lazily-initialized
//! storage and configuration services, plus construction of a workflow
//! controller wired to the HTTP remote services.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::remote::{
    ExecutionService, HttpAnalysisApi, JobStatusChannel, PlanningService, QueueService,
};
use crate::services::session::SessionPersistence;
use crate::services::workflow::{WorkflowConfig, WorkflowController};
use crate::storage::{ConfigService, Database};
use crate::utils::error::{AppError, AppResult};

/// Application state shared with the presentation layer
pub struct AppState {
    /// SQLite database with connection pool
    database: Arc<RwLock<Option<Database>>>,
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            database: Arc::new(RwLock::new(None)),
            config: Arc::new(RwLock::new(None)),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Initialize all services
    pub async fn initialize(&self) -> AppResult<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        // Initialize database
        {
            let db = Database::new()?;
            let mut db_lock = self.database.write().await;
            *db_lock = Some(db);
        }

        // Initialize config
        {
            let config = ConfigService::new()?;
            let mut config_lock = self.config.write().await;
            *config_lock = Some(config);
        }

        *initialized = true;
        Ok(())
    }

    /// Check if database is healthy
    pub fn is_database_healthy(&self) -> bool {
        // Use try_read to avoid blocking
        if let Ok(guard) = self.database.try_read() {
            if let Some(ref db) = *guard {
                return db.is_healthy();
            }
        }
        false
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config_clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Get database access for direct queries
    pub async fn with_database<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T>,
    {
        let guard = self.database.read().await;
        match &*guard {
            Some(db) => f(db),
            None => Err(AppError::database("Database not initialized")),
        }
    }

    /// Get mutable config service access for settings import
    pub async fn with_config_mut<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut ConfigService) -> AppResult<T>,
    {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => f(config),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Build a workflow controller wired to the configured HTTP services
    /// and database-backed session persistence.
    pub async fn build_workflow(&self) -> AppResult<WorkflowController> {
        let config = self.get_config().await?;
        let database = {
            let guard = self.database.read().await;
            match &*guard {
                Some(db) => db.clone(),
                None => return Err(AppError::database("Database not initialized")),
            }
        };

        let api = Arc::new(HttpAnalysisApi::new(&config)?);
        let planning: Arc<dyn PlanningService> = api.clone();
        let execution: Arc<dyn ExecutionService> = api.clone();
        let channel: Arc<dyn JobStatusChannel> = api.clone();
        let queue: Arc<dyn QueueService> = api;

        let persistence = SessionPersistence::new(Arc::new(database));
        let workflow_config = WorkflowConfig {
            case_limit_quiet_period: std::time::Duration::from_millis(
                config.case_limit_debounce_ms,
            ),
            default_notification_email: config.notification_email.clone(),
        };

        Ok(WorkflowController::with_config(
            planning,
            execution,
            channel,
            queue,
            persistence,
            workflow_config,
        ))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("initialized", &self.initialized)
            .finish()
    }
}
