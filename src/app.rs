//! Service assembly from a loaded [`AppConfig`].

use std::sync::Arc;

use axum::Router;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{Extractor, FailoverDispatcher, HttpProviderClient};
use crate::notify::HttpNotifier;
use crate::pipeline::{EmailIntake, RepeatGate};
use crate::routes::app_routes;
use crate::store::{Database, LibSqlBackend};

/// A wired service: HTTP router plus the store it shares with background tasks.
pub struct App {
    pub router: Router,
    pub db: Arc<dyn Database>,
}

impl App {
    /// Open the database and build every component the router needs.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        if config.credentials.is_empty() {
            warn!("no provider credentials configured, every extraction will fail");
        }

        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

        let client = Arc::new(HttpProviderClient::new(config.providers.clone())?);
        let dispatcher = Arc::new(FailoverDispatcher::new(client, config.credentials.clone()));
        let extractor = Arc::new(Extractor::new(dispatcher, config.retry.clone()));

        let gate = RepeatGate::new(Arc::clone(&db), config.gate.clone());
        let notifier = Arc::new(HttpNotifier::new(config.providers.request_timeout)?);
        let intake = Arc::new(EmailIntake::new(
            Arc::clone(&db),
            extractor,
            gate,
            notifier,
            config.notify.clone(),
        ));

        Ok(Self {
            router: app_routes(intake, Arc::clone(&db)),
            db,
        })
    }
}
