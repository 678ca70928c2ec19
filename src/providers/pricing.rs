//! Model pricing catalog.
//!
//! Prices are in USD per 1M tokens (input/output), keyed by provider and
//! model. The catalog is loaded once at startup, either from a JSON file or
//! from the built-in table, and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::providers::types::TokenUsage;
use crate::providers::Provider;

// MARK: - Types

/// Price of one model, in USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEntry {
    pub provider: Provider,
    pub model: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

impl PriceEntry {
    /// Input and output cost for the given usage at full precision.
    pub fn cost(&self, usage: TokenUsage) -> (f64, f64) {
        (
            usage.input_tokens as f64 * (self.input_price_per_million / 1_000_000.0),
            usage.output_tokens as f64 * (self.output_price_per_million / 1_000_000.0),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("No pricing for {provider} model {model}")]
    NotFound { provider: Provider, model: String },

    #[error("Invalid pricing table: {0}")]
    Invalid(String),

    #[error("Failed to read pricing file: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk shape: `{ "<provider>": { "<model>": { "input": f64, "output": f64 } } }`.
#[derive(Debug, Deserialize)]
struct FilePrice {
    input: f64,
    output: f64,
}

type PricingFile = BTreeMap<String, BTreeMap<String, FilePrice>>;

/// Immutable (provider, model) -> price table.
#[derive(Debug, Clone, Default)]
pub struct PricingCatalog {
    prices: BTreeMap<(Provider, String), PriceEntry>,
}

// MARK: - Built-in table

const BUILTIN_PRICES: &[(Provider, &str, f64, f64)] = &[
    // https://openai.com/api/pricing
    (Provider::OpenAi, "gpt-4o", 2.50, 10.00),
    (Provider::OpenAi, "gpt-4o-mini", 0.15, 0.60),
    (Provider::OpenAi, "gpt-4-turbo", 10.00, 30.00),
    (Provider::OpenAi, "gpt-3.5-turbo", 0.50, 1.50),
    (Provider::OpenAi, "o3-mini", 1.10, 4.40),
    // https://ai.google.dev/pricing
    (Provider::Google, "gemini-1.5-flash", 0.075, 0.30),
    (Provider::Google, "gemini-1.5-pro", 1.25, 5.00),
    (Provider::Google, "gemini-2.0-flash", 0.10, 0.40),
    (Provider::Google, "gemini-2.5-flash", 0.30, 2.50),
    (Provider::Google, "gemini-2.5-pro", 1.25, 10.00),
    // https://www.anthropic.com/pricing
    (Provider::Anthropic, "claude-3-5-haiku-20241022", 0.80, 4.00),
    (Provider::Anthropic, "claude-3-5-sonnet-20241022", 3.00, 15.00),
    (Provider::Anthropic, "claude-3-opus-20240229", 15.00, 75.00),
    (Provider::Anthropic, "claude-sonnet-4-20250514", 3.00, 15.00),
    (Provider::Anthropic, "claude-opus-4-20250514", 15.00, 75.00),
];

// MARK: - Implementation

impl PricingCatalog {
    /// Catalog populated from the built-in price table.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for &(provider, model, input, output) in BUILTIN_PRICES {
            catalog.insert(provider, model, input, output);
        }
        catalog
    }

    /// Load from `path` when given, otherwise use the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, PricingError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let catalog = Self::from_json(&raw)?;
                info!(path = %path.display(), entries = catalog.len(), "Loaded pricing file");
                Ok(catalog)
            }
            None => {
                let catalog = Self::builtin();
                debug!(entries = catalog.len(), "Using built-in pricing table");
                Ok(catalog)
            }
        }
    }

    /// Parse and validate a JSON pricing table.
    pub fn from_json(raw: &str) -> Result<Self, PricingError> {
        let file: PricingFile =
            serde_json::from_str(raw).map_err(|e| PricingError::Invalid(e.to_string()))?;

        let mut catalog = Self::default();
        for (provider_name, models) in file {
            let provider: Provider = provider_name.parse().map_err(PricingError::Invalid)?;
            for (model, price) in models {
                if model.is_empty() {
                    return Err(PricingError::Invalid(format!(
                        "empty model name under {provider}"
                    )));
                }
                for (side, value) in [("input", price.input), ("output", price.output)] {
                    if !value.is_finite() || value < 0.0 {
                        return Err(PricingError::Invalid(format!(
                            "{provider}/{model}: {side} price must be a finite non-negative number, got {value}"
                        )));
                    }
                }
                catalog.insert(provider, &model, price.input, price.output);
            }
        }
        Ok(catalog)
    }

    fn insert(&mut self, provider: Provider, model: &str, input: f64, output: f64) {
        self.prices.insert(
            (provider, model.to_string()),
            PriceEntry {
                provider,
                model: model.to_string(),
                input_price_per_million: input,
                output_price_per_million: output,
            },
        );
    }

    pub fn lookup(&self, provider: Provider, model: &str) -> Result<&PriceEntry, PricingError> {
        self.prices
            .get(&(provider, model.to_string()))
            .ok_or_else(|| PricingError::NotFound {
                provider,
                model: model.to_string(),
            })
    }

    /// All entries, ordered by provider then model.
    pub fn entries(&self) -> Vec<&PriceEntry> {
        self.prices.values().collect()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

// MARK: - Tests
