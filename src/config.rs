//! Gateway configuration
//! Built once from environment variables and passed by reference into each
//! component; no component reads settings through global lookups.

use std::env;

use crate::order::types::HostStatus;

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub merchant: MerchantConfig,
    pub flow: FlowConfig,
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials and endpoints for the ViaBill API.
#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub api_key: String,
    pub secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub test_mode: bool,
}

/// Order-flow behavior: which host statuses the provider lifecycle maps to
/// and which automatic transitions are enabled.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Host status an order moves to once ViaBill approves the payment.
    pub approved_status: HostStatus,
    /// Host status an order moves to once the full amount is captured.
    pub captured_status: HostStatus,
    /// Capture the full amount immediately after an approved callback.
    pub auto_capture: bool,
    /// Capture the remaining amount when an operator moves the order from
    /// the approved status to the captured status.
    pub capture_on_status_switch: bool,
    /// Refund at ViaBill when an operator moves the order to refunded.
    pub automatic_refund: bool,
    /// Token the operator endpoints require for each action.
    pub admin_token: String,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options.
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(GatewayConfig {
            server: ServerConfig::from_env()?,
            merchant: MerchantConfig::from_env()?,
            flow: FlowConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.merchant.validate()?;
        self.flow.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl MerchantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(MerchantConfig {
            api_key: env::var("VIABILL_API_KEY")
                .map_err(|_| ConfigError::MissingVariable("VIABILL_API_KEY".to_string()))?,
            secret: env::var("VIABILL_SECRET")
                .map_err(|_| ConfigError::MissingVariable("VIABILL_SECRET".to_string()))?,
            base_url: env::var("VIABILL_BASE_URL")
                .unwrap_or_else(|_| "https://secure.viabill.com".to_string()),
            timeout_secs: env::var("VIABILL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VIABILL_TIMEOUT_SECS".to_string()))?,
            test_mode: env::var("VIABILL_TEST_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidValue("VIABILL_API_KEY".to_string()));
        }

        if self.secret.is_empty() {
            return Err(ConfigError::InvalidValue("VIABILL_SECRET".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "VIABILL_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "VIABILL_TIMEOUT_SECS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(FlowConfig {
            approved_status: env::var("ORDER_STATUS_AFTER_AUTHORIZED_PAYMENT")
                .unwrap_or_else(|_| "on-hold".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("ORDER_STATUS_AFTER_AUTHORIZED_PAYMENT".to_string())
                })?,
            captured_status: env::var("ORDER_STATUS_AFTER_CAPTURED_PAYMENT")
                .unwrap_or_else(|_| "processing".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("ORDER_STATUS_AFTER_CAPTURED_PAYMENT".to_string())
                })?,
            auto_capture: flag_from_env("VIABILL_AUTO_CAPTURE"),
            capture_on_status_switch: flag_from_env("VIABILL_CAPTURE_ON_STATUS_SWITCH"),
            automatic_refund: flag_from_env("VIABILL_AUTOMATIC_REFUND"),
            admin_token: env::var("ADMIN_ACTION_TOKEN")
                .map_err(|_| ConfigError::MissingVariable("ADMIN_ACTION_TOKEN".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_token.is_empty() {
            return Err(ConfigError::InvalidValue("ADMIN_ACTION_TOKEN".to_string()));
        }

        if self.approved_status == self.captured_status {
            return Err(ConfigError::InvalidValue(
                "approved and captured statuses must differ".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

fn flag_from_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
