//! Per-user usage ledger.
//!
//! [`UsageLedger`] prices token usage with the [`PricingCatalog`] and applies
//! the resulting cost to the user's ledger document and history in one atomic
//! store update. Storage calls run on the blocking pool and are bounded by the
//! configured deadline.

pub mod document;
pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ExistencePolicy, LedgerConfig};
use crate::providers::pricing::PricingError;
use crate::providers::types::TokenUsage;
use crate::providers::{PricingCatalog, Provider};

use self::document::{restore_key, sanitize_key, Increment};
pub use self::store::{LedgerStore, LedgerUpdate, SqliteLedgerStore, StoredLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("User {0} already exists")]
    UserExists(String),

    #[error("Invalid ledger key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Ledger storage error: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(format!("corrupt ledger document: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One billed call, as appended to the user's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful [`UsageLedger::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_input_cost: f64,
    pub total_output_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_cost: f64,
    #[serde(default)]
    pub output_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    #[serde(default)]
    pub input_cost: f64,
    #[serde(default)]
    pub output_cost: f64,
    #[serde(default)]
    pub models: BTreeMap<String, ModelUsage>,
}

/// A user's ledger with model names restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLedger {
    pub user_id: String,
    #[serde(default)]
    pub total_input_cost: f64,
    #[serde(default)]
    pub total_output_cost: f64,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderUsage>,
    #[serde(skip_deserializing)]
    pub history: Vec<HistoryRecord>,
    #[serde(skip_deserializing)]
    pub created_at: String,
    #[serde(skip_deserializing)]
    pub updated_at: String,
}

impl UserLedger {
    fn from_stored(stored: StoredLedger) -> Result<Self, LedgerError> {
        let mut ledger: UserLedger = serde_json::from_value(stored.document)?;
        for usage in ledger.providers.values_mut() {
            usage.models = std::mem::take(&mut usage.models)
                .into_iter()
                .map(|(k, v)| (restore_key(&k), v))
                .collect();
        }
        ledger.history = stored.history;
        ledger.created_at = stored.created_at;
        ledger.updated_at = stored.updated_at;
        Ok(ledger)
    }

    /// Copy with every cost rounded to `precision` decimals.
    pub fn rounded(&self, precision: u32) -> Self {
        let r = |x: f64| round_to(x, precision);
        let mut out = self.clone();
        out.total_input_cost = r(out.total_input_cost);
        out.total_output_cost = r(out.total_output_cost);
        for usage in out.providers.values_mut() {
            usage.input_cost = r(usage.input_cost);
            usage.output_cost = r(usage.output_cost);
            for model in usage.models.values_mut() {
                model.input_cost = r(model.input_cost);
                model.output_cost = r(model.output_cost);
            }
        }
        for record in &mut out.history {
            record.input_cost = r(record.input_cost);
            record.output_cost = r(record.output_cost);
        }
        out
    }
}

pub fn round_to(x: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    (x * factor).round() / factor
}

/// Reject model names that would not survive key sanitization.
pub fn validate_model_key(model: &str) -> Result<(), LedgerError> {
    if document::contains_placeholder(model) {
        return Err(LedgerError::InvalidKey(format!(
            "model name {model:?} contains a reserved character"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// UsageLedger
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn LedgerStore>,
    pricing: Arc<PricingCatalog>,
    policy: ExistencePolicy,
    timeout: Duration,
    display_precision: u32,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn LedgerStore>, pricing: Arc<PricingCatalog>, config: &LedgerConfig) -> Self {
        Self {
            store,
            pricing,
            policy: config.existence_policy,
            timeout: Duration::from_secs(config.update_timeout_secs),
            display_precision: config.display_precision,
        }
    }

    pub fn policy(&self) -> ExistencePolicy {
        self.policy
    }

    pub fn pricing(&self) -> &PricingCatalog {
        &self.pricing
    }

    /// Price `usage` and record it against `user_id`.
    ///
    /// Totals, provider and model counters and the history record change in
    /// one transaction; on error nothing is written.
    pub async fn apply(
        &self,
        user_id: &str,
        provider: Provider,
        model: &str,
        usage: TokenUsage,
    ) -> Result<LedgerTotals, LedgerError> {
        validate_model_key(model)?;
        let price = self.pricing.lookup(provider, model)?;
        let (input_cost, output_cost) = price.cost(usage);

        let p = provider.as_str();
        let key = sanitize_key(model);
        let update = LedgerUpdate {
            user_id: user_id.to_string(),
            increments: vec![
                Increment::amount("total_input_cost", input_cost),
                Increment::amount("total_output_cost", output_cost),
                Increment::amount(format!("providers.{p}.input_cost"), input_cost),
                Increment::amount(format!("providers.{p}.output_cost"), output_cost),
                Increment::count(format!("providers.{p}.models.{key}.input_tokens"), usage.input_tokens),
                Increment::count(format!("providers.{p}.models.{key}.output_tokens"), usage.output_tokens),
                Increment::amount(format!("providers.{p}.models.{key}.input_cost"), input_cost),
                Increment::amount(format!("providers.{p}.models.{key}.output_cost"), output_cost),
            ],
            record: HistoryRecord {
                provider: p.to_string(),
                model: model.to_string(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                input_cost,
                output_cost,
                timestamp: Utc::now(),
            },
        };

        let policy = self.policy;
        let document = self.run(move |store| store.apply(&update, policy)).await?;

        let totals = LedgerTotals {
            input_cost,
            output_cost,
            total_input_cost: document["total_input_cost"].as_f64().unwrap_or_default(),
            total_output_cost: document["total_output_cost"].as_f64().unwrap_or_default(),
        };
        debug!(
            user_id,
            provider = %provider,
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            input_cost,
            output_cost,
            "Ledger updated"
        );
        Ok(totals)
    }

    pub async fn create_user(&self, user_id: &str) -> Result<(), LedgerError> {
        let id = user_id.to_string();
        self.run(move |store| store.create(&id)).await?;
        info!(user_id, "Created user ledger");
        Ok(())
    }

    pub async fn user_exists(&self, user_id: &str) -> Result<bool, LedgerError> {
        let id = user_id.to_string();
        self.run(move |store| store.exists(&id)).await
    }

    /// Load a ledger with full-precision costs.
    pub async fn load(&self, user_id: &str) -> Result<UserLedger, LedgerError> {
        let id = user_id.to_string();
        let stored = self
            .run(move |store| store.load(&id))
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;
        UserLedger::from_stored(stored)
    }

    /// Load a ledger rounded for presentation.
    pub async fn load_for_display(&self, user_id: &str) -> Result<UserLedger, LedgerError> {
        Ok(self.load(user_id).await?.rounded(self.display_precision))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LedgerStore) -> Result<T, LedgerError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LedgerError::Persistence(format!("ledger task failed: {e}"))),
            Err(_) => Err(LedgerError::Persistence(format!(
                "ledger operation timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
