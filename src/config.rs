use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_JWT_TTL_DAYS: i64 = 30;
/// Flat delivery fee in CFA francs, charged once per order.
const DEFAULT_DELIVERY_FEE: i64 = 1000;
const DEFAULT_FEDAPAY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_WEBHOOK_RETRY_INTERVAL_SECS: u64 = 30;
const DEFAULT_WEBHOOK_MAX_ATTEMPTS: i32 = 8;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub orders: OrdersConfig,
    pub fedapay: FedaPayConfig,
    pub webhooks: WebhookConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer. Empty means same-origin only.
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct OrdersConfig {
    pub delivery_fee: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FedaPayEnvironment {
    Sandbox,
    Live,
}

#[derive(Debug, Clone)]
pub struct FedaPayConfig {
    pub environment: FedaPayEnvironment,
    /// Overrides the environment's API base, e.g. for a local stub.
    pub base_url: Option<String>,
    pub private_key: String,
    pub webhook_secret: Option<String>,
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub retry_interval: Duration,
    pub max_attempts: i32,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

impl FedaPayConfig {
    pub fn api_base_url(&self) -> String {
        if let Some(base_url) = &self.base_url {
            return base_url.trim_end_matches('/').to_string();
        }
        match self.environment {
            FedaPayEnvironment::Sandbox => "https://sandbox-api.fedapay.com/v1".to_string(),
            FedaPayEnvironment::Live => "https://api.fedapay.com/v1".to_string(),
        }
    }
}

/// Reads the configuration from the process environment.
///
/// Call [`crate::bootstrap::init_env`] first so values from `.env` are visible.
pub fn load() -> Result<Config> {
    load_from(|key| std::env::var(key).ok())
}

/// Same as [`load`] with an explicit variable source.
pub fn load_from(var: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let get = |key: &str| var(key).filter(|value| !value.trim().is_empty());
    let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

    let environment = match get("FEDAPAY_ENVIRONMENT").as_deref() {
        None | Some("sandbox") => FedaPayEnvironment::Sandbox,
        Some("live") | Some("production") => FedaPayEnvironment::Live,
        Some(other) => bail!("FEDAPAY_ENVIRONMENT must be sandbox or live, got {other}"),
    };

    Ok(Config {
        server: ServerConfig {
            host: get("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, "SERVER_PORT", DEFAULT_PORT)?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        },
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
        },
        auth: AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_days: parse_or(&get, "JWT_TTL_DAYS", DEFAULT_JWT_TTL_DAYS)?,
        },
        orders: OrdersConfig {
            delivery_fee: parse_or(&get, "DELIVERY_FEE", DEFAULT_DELIVERY_FEE)?,
        },
        fedapay: FedaPayConfig {
            environment,
            base_url: get("FEDAPAY_BASE_URL"),
            private_key: required("FEDAPAY_PRIVATE_KEY")?,
            webhook_secret: get("FEDAPAY_WEBHOOK_SECRET"),
            callback_url: get("FEDAPAY_CALLBACK_URL"),
            timeout: Duration::from_secs(parse_or(
                &get,
                "FEDAPAY_TIMEOUT_SECS",
                DEFAULT_FEDAPAY_TIMEOUT_SECS,
            )?),
        },
        webhooks: WebhookConfig {
            retry_interval: Duration::from_secs(parse_or(
                &get,
                "WEBHOOK_RETRY_INTERVAL_SECS",
                DEFAULT_WEBHOOK_RETRY_INTERVAL_SECS,
            )?),
            max_attempts: parse_or(&get, "WEBHOOK_MAX_ATTEMPTS", DEFAULT_WEBHOOK_MAX_ATTEMPTS)?,
        },
    })
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const MINIMAL: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/freshmarket"),
        ("JWT_SECRET", "secret"),
        ("FEDAPAY_PRIVATE_KEY", "sk_sandbox_x"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config = load_from(source(&MINIMAL)).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.orders.delivery_fee, 1000);
        assert_eq!(config.auth.jwt_ttl_days, 30);
        assert_eq!(config.fedapay.environment, FedaPayEnvironment::Sandbox);
        assert_eq!(
            config.fedapay.api_base_url(),
            "https://sandbox-api.fedapay.com/v1"
        );
        assert!(config.fedapay.webhook_secret.is_none());
        assert!(config.server.cors_allowed_origins.is_empty());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = load_from(source(&MINIMAL[..2])).unwrap_err();
        assert!(err.to_string().contains("FEDAPAY_PRIVATE_KEY"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("FEDAPAY_ENVIRONMENT", "live"),
            ("DELIVERY_FEE", "1500"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("FEDAPAY_BASE_URL", "http://127.0.0.1:9000/v1/"),
        ]);
        let config = load_from(source(&pairs)).unwrap();
        assert_eq!(config.fedapay.environment, FedaPayEnvironment::Live);
        assert_eq!(config.orders.delivery_fee, 1500);
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.fedapay.api_base_url(), "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("SERVER_PORT", "eighty"));
        assert!(load_from(source(&pairs)).is_err());
    }
}
