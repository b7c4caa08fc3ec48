/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::AppConfig,
    db,
    error::ApiResult,
    event::EventManager,
    mailer::Mailer,
    query::QueryManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub event_manager: Arc<EventManager>,
    pub query_manager: Arc<QueryManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AppConfig) -> ApiResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.database.path, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let event_manager = Arc::new(EventManager::new(db.clone()));
        let query_manager = Arc::new(QueryManager::new(db.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config,
            db,
            account_manager,
            event_manager,
            query_manager,
            rate_limiter,
            mailer,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
