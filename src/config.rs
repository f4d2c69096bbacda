use crate::chain_client::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// On-chain endpoints and contract addresses
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub price_contract: Address,
    pub entropy_contract: Address,
    pub entropy_provider: Address,
    /// Provider revelation service; unset means the placeholder reveal is used
    pub fortuna_url: Option<String>,
    pub fortuna_chain: Option<String>,
    pub receipt_timeout_secs: u64,
}

/// Chat-completion endpoint settings
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub model: String,
    /// Held in memory only, never written anywhere
    pub api_key: Option<String>,
}

/// Polling cadence for prices and randomness requests
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub price_interval_secs: u64,
    pub price_max_age_secs: u64,
    pub randomness_max_attempts: u32,
    pub randomness_interval_ms: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub hermes_url: String,
    pub chain: ChainConfig,
    pub chat: ChatConfig,
    pub polling: PollingConfig,
    pub http_timeout_secs: u64,
    pub http_port: u16,
    pub log_level: String,
    pub environment: String,
}

pub const DEFAULT_HERMES_URL: &str = "https://hermes.pyth.network";
pub const DEFAULT_PRICE_CONTRACT: &str = "0xDd24F84d36BF92C65F92307595335bdFab5Bbd21";
pub const DEFAULT_ENTROPY_CONTRACT: &str = "0x549Ebba8036Ab746611B4fFA1423eb0A4Df61440";
pub const DEFAULT_ENTROPY_PROVIDER: &str = "0x6CC14824Ea2918f5De5C2f75A9Da968ad4BD6344";
pub const DEFAULT_CHAT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_address(key: &str, default: &str) -> Result<Address, String> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Address::from_str(&raw).map_err(|e| format!("Invalid {}: {}", key, e))
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl ChainConfig {
    /// Create chain config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let rpc_url = env::var("RPC_URL").unwrap_or_else(|_| "http://localhost:8545".to_string());
        let price_contract = parse_address("PRICE_CONTRACT_ADDRESS", DEFAULT_PRICE_CONTRACT)?;
        let entropy_contract = parse_address("ENTROPY_CONTRACT_ADDRESS", DEFAULT_ENTROPY_CONTRACT)?;
        let entropy_provider = parse_address("ENTROPY_PROVIDER_ADDRESS", DEFAULT_ENTROPY_PROVIDER)?;
        let fortuna_url = non_empty("FORTUNA_URL");
        let fortuna_chain = non_empty("FORTUNA_CHAIN");
        let receipt_timeout_secs = parse_env("RECEIPT_TIMEOUT_SECS", 120u64);

        if fortuna_url.is_some() && fortuna_chain.is_none() {
            return Err("FORTUNA_CHAIN is required when FORTUNA_URL is set".to_string());
        }

        if receipt_timeout_secs == 0 {
            return Err("RECEIPT_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            rpc_url,
            price_contract,
            entropy_contract,
            entropy_provider,
            fortuna_url,
            fortuna_chain,
            receipt_timeout_secs,
        })
    }

    /// Get receipt timeout as Duration
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            price_contract: Address::from_str(DEFAULT_PRICE_CONTRACT).unwrap_or_default(),
            entropy_contract: Address::from_str(DEFAULT_ENTROPY_CONTRACT).unwrap_or_default(),
            entropy_provider: Address::from_str(DEFAULT_ENTROPY_PROVIDER).unwrap_or_default(),
            fortuna_url: None,
            fortuna_chain: None,
            receipt_timeout_secs: 120,
        }
    }
}

impl ChatConfig {
    /// Create chat config from environment variables
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("CHAT_API_URL").unwrap_or_else(|_| DEFAULT_CHAT_API_URL.to_string()),
            model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            api_key: non_empty("CHAT_API_KEY"),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CHAT_API_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl PollingConfig {
    /// Create polling config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            price_interval_secs: parse_env("PRICE_POLL_INTERVAL_SECS", 10u64),
            price_max_age_secs: parse_env("PRICE_MAX_AGE_SECS", 60u64),
            randomness_max_attempts: parse_env("RANDOMNESS_MAX_ATTEMPTS", 10u32),
            randomness_interval_ms: parse_env("RANDOMNESS_POLL_INTERVAL_MS", 5000u64),
        };

        if config.price_interval_secs == 0 {
            return Err("PRICE_POLL_INTERVAL_SECS must be greater than 0".to_string());
        }

        if config.randomness_max_attempts == 0 {
            return Err("RANDOMNESS_MAX_ATTEMPTS must be greater than 0".to_string());
        }

        Ok(config)
    }

    /// Get price poll interval as Duration
    pub fn price_interval(&self) -> Duration {
        Duration::from_secs(self.price_interval_secs)
    }

    /// Get randomness poll interval as Duration
    pub fn randomness_interval(&self) -> Duration {
        Duration::from_millis(self.randomness_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            price_interval_secs: 10,
            price_max_age_secs: 60,
            randomness_max_attempts: 10,
            randomness_interval_ms: 5000,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let chain = ChainConfig::from_env()?;
        let polling = PollingConfig::from_env()?;
        let chat = ChatConfig::from_env();

        let hermes_url = env::var("HERMES_URL").unwrap_or_else(|_| DEFAULT_HERMES_URL.to_string());
        let http_timeout_secs = parse_env("HTTP_TIMEOUT_SECS", 10u64);
        let http_port = parse_env("HTTP_PORT", 8080u16);

        let log_level = env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        if http_timeout_secs == 0 {
            return Err("HTTP_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            hermes_url: hermes_url.trim_end_matches('/').to_string(),
            chain,
            chat,
            polling,
            http_timeout_secs,
            http_port,
            log_level: log_level.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hermes_url: DEFAULT_HERMES_URL.to_string(),
            chain: ChainConfig::default(),
            chat: ChatConfig::default(),
            polling: PollingConfig::default(),
            http_timeout_secs: 10,
            http_port: 8080,
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_config_default() {
        let config = PollingConfig::default();
        assert_eq!(config.randomness_max_attempts, 10);
        assert_eq!(config.randomness_interval(), Duration::from_millis(5000));
        assert_eq!(config.price_max_age_secs, 60);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.http_port, 8080);
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(config.chat.api_key.is_none());
    }

    #[test]
    fn test_chain_config_default_addresses() {
        let config = ChainConfig::default();
        assert_eq!(
            format!("{:#x}", config.entropy_provider),
            DEFAULT_ENTROPY_PROVIDER.to_lowercase()
        );
        assert_ne!(config.price_contract, config.entropy_contract);
    }
}
