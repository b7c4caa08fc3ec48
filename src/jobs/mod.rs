/// Background jobs
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_token_cleanup_job(Arc::clone(&self)));
    }

    /// Sweep expired refresh and email tokens (runs every hour).
    /// Expiry is enforced lazily at resolve time; this keeps the tables
    /// from growing without bound.
    async fn expired_token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match scheduler
                .context
                .account_manager
                .cleanup_expired_tokens()
                .await
            {
                Ok((refresh, email)) => {
                    if refresh > 0 || email > 0 {
                        info!(refresh, email, "cleaned up expired tokens");
                    }
                }
                Err(e) => error!("Failed to cleanup expired tokens: {}", e),
            }
        }
    }
}
