use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL, used to build webhook and redirect URLs handed
    /// to the payment providers.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub session_duration_hours: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    /// Outbound HTTP deadline for provider calls, in seconds. A poll is a
    /// single attempt bounded by this; a human is waiting on the other end.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    pub mollie: Option<MollieConfig>,
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PaypalConfig>,
}

fn default_http_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct MollieConfig {
    #[serde(default)]
    pub enabled: bool,
    pub api_key: String,
    #[serde(default = "default_mollie_api_url")]
    pub api_url: String,
}

fn default_mollie_api_url() -> String {
    "https://api.mollie.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    #[serde(default)]
    pub enabled: bool,
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_stripe_api_url")]
    pub api_url: String,
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaypalConfig {
    #[serde(default)]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_paypal_api_url")]
    pub api_url: String,
}

fn default_paypal_api_url() -> String {
    "https://api-m.paypal.com".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.session_duration_hours", 24)?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (with CLUBPAY__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("CLUBPAY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://clubpay.db".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                session_duration_hours: 24,
            },
            providers: ProviderConfig::default(),
        }
    }
}
