pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod providers;

use crate::config::Config;
use crate::db::Database;
use crate::gateway::GatewayHandler;
use crate::ledger::{SqliteLedgerStore, UsageLedger};
use crate::providers::{AdapterRegistry, PricingCatalog, RequestNormalizer};

use std::sync::Arc;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<GatewayHandler>,
    pub ledger: UsageLedger,
    pub pricing: Arc<PricingCatalog>,
}

impl AppState {
    /// Wire adapters, normalizer and ledger together from loaded configuration.
    pub fn build(config: Config, db: Database, pricing: Arc<PricingCatalog>) -> anyhow::Result<Self> {
        let registry = AdapterRegistry::from_config(&config.providers)?;
        let normalizer = RequestNormalizer::new(&config.normalizer);
        let store = Arc::new(SqliteLedgerStore::new(db));
        let ledger = UsageLedger::new(store, Arc::clone(&pricing), &config.ledger);
        let gateway = GatewayHandler::new(registry, normalizer, ledger.clone());

        Ok(Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            ledger,
            pricing,
        })
    }
}
