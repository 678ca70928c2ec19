use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::providers::Provider;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Setting key (e.g. "server.host") to the env var that overrode it.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderEndpointConfig,
    #[serde(default)]
    pub google: ProviderEndpointConfig,
    #[serde(default)]
    pub anthropic: AnthropicEndpointConfig,
}

impl ProvidersConfig {
    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpointConfig {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Google => &self.google,
            Provider::Anthropic => &self.anthropic.endpoint,
        }
    }

    fn endpoint_mut(&mut self, provider: Provider) -> &mut ProviderEndpointConfig {
        match provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Google => &mut self.google,
            Provider::Anthropic => &mut self.anthropic.endpoint,
        }
    }
}

/// Connection settings shared by every provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpointConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override of the provider's public API root (useful for proxies and tests).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderEndpointConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicEndpointConfig {
    #[serde(flatten)]
    pub endpoint: ProviderEndpointConfig,
    #[serde(default = "default_anthropic_version")]
    pub version: String,
}

impl Default for AnthropicEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: ProviderEndpointConfig::default(),
            version: default_anthropic_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
    /// Applied when a request leaves `output_json` unset.
    #[serde(default = "default_true")]
    pub json_mode_default: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
            json_mode_default: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingConfig {
    /// JSON price table. The built-in table is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// What a ledger update does when the user has no ledger yet.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExistencePolicy {
    /// Reject calls for unknown users.
    #[default]
    Strict,
    /// Create the ledger on first write.
    Upsert,
}

impl std::fmt::Display for ExistencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Upsert => write!(f, "upsert"),
        }
    }
}

impl FromStr for ExistencePolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "upsert" => Ok(Self::Upsert),
            _ => Err(format!("Unknown existence policy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub existence_policy: ExistencePolicy,
    #[serde(default = "default_update_timeout")]
    pub update_timeout_secs: u64,
    /// Decimal places used when presenting costs.
    #[serde(default = "default_display_precision")]
    pub display_precision: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            existence_policy: ExistencePolicy::default(),
            update_timeout_secs: default_update_timeout(),
            display_precision: default_display_precision(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("gatemeter.db")
}
const fn default_true() -> bool {
    true
}
const fn default_provider_timeout() -> u64 {
    120
}
fn default_anthropic_version() -> String {
    crate::providers::anthropic::DEFAULT_VERSION.to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
const fn default_update_timeout() -> u64 {
    10
}
const fn default_display_precision() -> u32 {
    8
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading, env overrides, validation
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `GATEMETER_` (and the provider
    /// credential variables) takes precedence over the file value and is
    /// tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Reject settings that would only fail later, at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        for provider in Provider::ALL {
            let endpoint = self.providers.endpoint(provider);
            if let Some(base) = &endpoint.base_url {
                url::Url::parse(base)
                    .map_err(|e| anyhow::anyhow!("providers.{provider}.base_url {base:?}: {e}"))?;
            }
            if endpoint.timeout_secs == 0 {
                anyhow::bail!("providers.{provider}.timeout_secs must be greater than zero");
            }
        }
        if self.ledger.update_timeout_secs == 0 {
            anyhow::bail!("ledger.update_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Server --
        env_str!("server.host", "GATEMETER_SERVER_HOST", self.server.host);
        env_parse!("server.port", "GATEMETER_SERVER_PORT", self.server.port);
        if let Ok(val) = std::env::var("GATEMETER_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            ov.record("server.cors_origins", "GATEMETER_SERVER_CORS_ORIGINS");
        }

        // -- Database --
        env_path!("database.path", "GATEMETER_DATABASE_PATH", self.database.path);

        // -- Providers --
        for provider in Provider::ALL {
            let name = provider.as_str();
            let upper = name.to_uppercase();
            let endpoint = self.providers.endpoint_mut(provider);

            env_opt_str!(&format!("providers.{name}.api_key"), provider.credential_env(), endpoint.api_key);
            env_opt_str!(
                &format!("providers.{name}.base_url"),
                &format!("GATEMETER_{upper}_BASE_URL"),
                endpoint.base_url
            );
            env_parse!(
                &format!("providers.{name}.timeout_secs"),
                &format!("GATEMETER_{upper}_TIMEOUT_SECS"),
                endpoint.timeout_secs
            );
        }
        env_str!(
            "providers.anthropic.version",
            "GATEMETER_ANTHROPIC_VERSION",
            self.providers.anthropic.version
        );

        // -- Normalizer --
        env_str!(
            "normalizer.default_system_prompt",
            "GATEMETER_DEFAULT_SYSTEM_PROMPT",
            self.normalizer.default_system_prompt
        );
        env_bool!(
            "normalizer.json_mode_default",
            "GATEMETER_JSON_MODE_DEFAULT",
            self.normalizer.json_mode_default
        );

        // -- Pricing --
        if let Ok(val) = std::env::var("GATEMETER_PRICING_PATH") {
            self.pricing.path = (!val.is_empty()).then(|| PathBuf::from(val));
            ov.record("pricing.path", "GATEMETER_PRICING_PATH");
        }

        // -- Ledger --
        env_parse!(
            "ledger.existence_policy",
            "GATEMETER_LEDGER_EXISTENCE_POLICY",
            self.ledger.existence_policy
        );
        env_parse!(
            "ledger.update_timeout_secs",
            "GATEMETER_LEDGER_UPDATE_TIMEOUT_SECS",
            self.ledger.update_timeout_secs
        );
        env_parse!(
            "ledger.display_precision",
            "GATEMETER_LEDGER_DISPLAY_PRECISION",
            self.ledger.display_precision
        );

        // -- Logging --
        env_str!("logging.level", "GATEMETER_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "GATEMETER_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
