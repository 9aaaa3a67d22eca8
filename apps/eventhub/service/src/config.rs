use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "text";
const DEFAULT_AUTH_PROVIDER_MODE: &str = "firebase";
const DEFAULT_FIREBASE_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_AUTH_COOKIE_NAME: &str = "eh_id_token";
const DEFAULT_ADMIN_EMAILS: &str = "";
const DEFAULT_PAYMENT_GATEWAY_MODE: &str = "razorpay";
const DEFAULT_RAZORPAY_API_BASE_URL: &str = "https://api.razorpay.com";
const DEFAULT_CASHFREE_ENVIRONMENT: &str = "sandbox";
const DEFAULT_CASHFREE_API_VERSION: &str = "2023-08-01";
const DEFAULT_PAYMENT_CURRENCY: &str = "INR";
const DEFAULT_PAYMENT_MARKUP_BPS: u32 = 500;
const DEFAULT_PAYMENT_RETURN_URL: &str = "http://localhost:3000/payment/status";
const DEFAULT_PAYMENT_HTTP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PAYMENT_RECONCILE_GRACE_SECONDS: u64 = 120;
const DEFAULT_PAYMENT_PENDING_HOLD_SECONDS: u64 = 30 * 60;
const DEFAULT_HACKATHON_TEAM_MIN_SIZE: usize = 2;
const DEFAULT_HACKATHON_TEAM_MAX_SIZE: usize = 4;
const DEFAULT_THROTTLE_REGISTRATION_LIMIT: usize = 20;
const DEFAULT_THROTTLE_REGISTRATION_WINDOW_SECONDS: i64 = 60;
const DEFAULT_THROTTLE_PAYMENT_LIMIT: usize = 10;
const DEFAULT_THROTTLE_PAYMENT_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub log_format: String,
    pub auth_provider_mode: String,
    pub firebase_api_key: Option<String>,
    pub firebase_identity_base_url: String,
    pub auth_cookie_name: String,
    pub admin_emails: Vec<String>,
    pub cors_allowed_origins: Vec<String>,
    pub domain_store_path: Option<PathBuf>,
    pub event_catalog_path: Option<PathBuf>,
    pub payment_gateway_mode: String,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_webhook_secret: Option<String>,
    pub razorpay_api_base_url: String,
    pub cashfree_client_id: Option<String>,
    pub cashfree_client_secret: Option<String>,
    pub cashfree_environment: String,
    pub cashfree_api_base_url: Option<String>,
    pub cashfree_api_version: String,
    pub payment_currency: String,
    pub payment_markup_bps: u32,
    pub payment_return_url: String,
    pub payment_http_timeout_ms: u64,
    pub payment_reconcile_grace_seconds: u64,
    /// How long an open order freezes its registration or event team.
    pub payment_pending_hold_seconds: u64,
    pub hackathon_team_min_size: usize,
    pub hackathon_team_max_size: usize,
    pub throttle_registration_limit: usize,
    pub throttle_registration_window_seconds: i64,
    pub throttle_payment_limit: usize,
    pub throttle_payment_window_seconds: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid EH_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid {key} value '{value}': expected a non-negative integer")]
    InvalidNumber { key: &'static str, value: String },
    #[error("invalid {key} value '{value}': expected one of {allowed}")]
    InvalidMode {
        key: &'static str,
        value: String,
        allowed: String,
    },
    #[error("EH_HACKATHON_TEAM_MIN_SIZE ({min}) exceeds EH_HACKATHON_TEAM_MAX_SIZE ({max})")]
    InvalidTeamBounds { min: usize, max: usize },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("EH_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter = env::var("EH_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_format = mode_env("EH_LOG_FORMAT", DEFAULT_LOG_FORMAT, &["text", "json"])?;

        let auth_provider_mode = mode_env(
            "EH_AUTH_PROVIDER_MODE",
            DEFAULT_AUTH_PROVIDER_MODE,
            &["firebase", "mock"],
        )?;

        let firebase_api_key = optional_env("EH_FIREBASE_API_KEY");

        let firebase_identity_base_url = env::var("EH_FIREBASE_IDENTITY_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FIREBASE_IDENTITY_BASE_URL.to_string());

        let auth_cookie_name = env::var("EH_AUTH_COOKIE_NAME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_COOKIE_NAME.to_string());

        let admin_emails = parse_csv(
            env::var("EH_ADMIN_EMAILS")
                .ok()
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAILS.to_string()),
        )
        .into_iter()
        .map(|email| email.to_lowercase())
        .collect();

        let cors_allowed_origins =
            parse_csv(env::var("EH_CORS_ALLOWED_ORIGINS").ok().unwrap_or_default());

        let domain_store_path = optional_env("EH_DOMAIN_STORE_PATH").map(PathBuf::from);
        let event_catalog_path = optional_env("EH_EVENT_CATALOG_PATH").map(PathBuf::from);

        let payment_gateway_mode = mode_env(
            "EH_PAYMENT_GATEWAY_MODE",
            DEFAULT_PAYMENT_GATEWAY_MODE,
            &["razorpay", "cashfree", "mock"],
        )?;

        let razorpay_key_id = optional_env("EH_RAZORPAY_KEY_ID");
        let razorpay_key_secret = optional_env("EH_RAZORPAY_KEY_SECRET");
        let razorpay_webhook_secret = optional_env("EH_RAZORPAY_WEBHOOK_SECRET");
        let razorpay_api_base_url = env::var("EH_RAZORPAY_API_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE_URL.to_string());

        let cashfree_client_id = optional_env("EH_CASHFREE_CLIENT_ID");
        let cashfree_client_secret = optional_env("EH_CASHFREE_CLIENT_SECRET");
        let cashfree_environment = mode_env(
            "EH_CASHFREE_ENVIRONMENT",
            DEFAULT_CASHFREE_ENVIRONMENT,
            &["sandbox", "production"],
        )?;
        let cashfree_api_base_url = optional_env("EH_CASHFREE_API_BASE_URL");
        let cashfree_api_version = env::var("EH_CASHFREE_API_VERSION")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CASHFREE_API_VERSION.to_string());

        let payment_currency = env::var("EH_PAYMENT_CURRENCY")
            .ok()
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_CURRENCY.to_string());

        let payment_markup_bps = number_env("EH_PAYMENT_MARKUP_BPS", DEFAULT_PAYMENT_MARKUP_BPS)?;

        let payment_return_url = env::var("EH_PAYMENT_RETURN_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_RETURN_URL.to_string());

        let payment_http_timeout_ms =
            number_env("EH_PAYMENT_HTTP_TIMEOUT_MS", DEFAULT_PAYMENT_HTTP_TIMEOUT_MS)?;
        let payment_reconcile_grace_seconds = number_env(
            "EH_PAYMENT_RECONCILE_GRACE_SECONDS",
            DEFAULT_PAYMENT_RECONCILE_GRACE_SECONDS,
        )?;
        let payment_pending_hold_seconds = number_env(
            "EH_PAYMENT_PENDING_HOLD_SECONDS",
            DEFAULT_PAYMENT_PENDING_HOLD_SECONDS,
        )?;

        let hackathon_team_min_size =
            number_env("EH_HACKATHON_TEAM_MIN_SIZE", DEFAULT_HACKATHON_TEAM_MIN_SIZE)?;
        let hackathon_team_max_size =
            number_env("EH_HACKATHON_TEAM_MAX_SIZE", DEFAULT_HACKATHON_TEAM_MAX_SIZE)?;
        if hackathon_team_min_size > hackathon_team_max_size {
            return Err(ConfigError::InvalidTeamBounds {
                min: hackathon_team_min_size,
                max: hackathon_team_max_size,
            });
        }

        let throttle_registration_limit = number_env(
            "EH_THROTTLE_REGISTRATION_LIMIT",
            DEFAULT_THROTTLE_REGISTRATION_LIMIT,
        )?;
        let throttle_registration_window_seconds = number_env(
            "EH_THROTTLE_REGISTRATION_WINDOW_SECONDS",
            DEFAULT_THROTTLE_REGISTRATION_WINDOW_SECONDS,
        )?;
        let throttle_payment_limit =
            number_env("EH_THROTTLE_PAYMENT_LIMIT", DEFAULT_THROTTLE_PAYMENT_LIMIT)?;
        let throttle_payment_window_seconds = number_env(
            "EH_THROTTLE_PAYMENT_WINDOW_SECONDS",
            DEFAULT_THROTTLE_PAYMENT_WINDOW_SECONDS,
        )?;

        Ok(Self {
            bind_addr,
            log_filter,
            log_format,
            auth_provider_mode,
            firebase_api_key,
            firebase_identity_base_url,
            auth_cookie_name,
            admin_emails,
            cors_allowed_origins,
            domain_store_path,
            event_catalog_path,
            payment_gateway_mode,
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_webhook_secret,
            razorpay_api_base_url,
            cashfree_client_id,
            cashfree_client_secret,
            cashfree_environment,
            cashfree_api_base_url,
            cashfree_api_version,
            payment_currency,
            payment_markup_bps,
            payment_return_url,
            payment_http_timeout_ms,
            payment_reconcile_grace_seconds,
            payment_pending_hold_seconds,
            hackathon_team_min_size,
            hackathon_team_max_size,
            throttle_registration_limit,
            throttle_registration_window_seconds,
            throttle_payment_limit,
            throttle_payment_window_seconds,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let normalized = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == normalized)
    }
}

#[cfg(test)]
impl Config {
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            auth_provider_mode: "mock".to_string(),
            firebase_api_key: None,
            firebase_identity_base_url: DEFAULT_FIREBASE_IDENTITY_BASE_URL.to_string(),
            auth_cookie_name: DEFAULT_AUTH_COOKIE_NAME.to_string(),
            admin_emails: vec!["admin@eventhub.test".to_string()],
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            domain_store_path: None,
            event_catalog_path: None,
            payment_gateway_mode: "mock".to_string(),
            razorpay_key_id: Some("rzp_test_key".to_string()),
            razorpay_key_secret: Some("rzp-test-secret".to_string()),
            razorpay_webhook_secret: Some("rzp-webhook-secret".to_string()),
            razorpay_api_base_url: DEFAULT_RAZORPAY_API_BASE_URL.to_string(),
            cashfree_client_id: None,
            cashfree_client_secret: None,
            cashfree_environment: DEFAULT_CASHFREE_ENVIRONMENT.to_string(),
            cashfree_api_base_url: None,
            cashfree_api_version: DEFAULT_CASHFREE_API_VERSION.to_string(),
            payment_currency: DEFAULT_PAYMENT_CURRENCY.to_string(),
            payment_markup_bps: DEFAULT_PAYMENT_MARKUP_BPS,
            payment_return_url: "https://eventhub.test/payment/status".to_string(),
            payment_http_timeout_ms: 2_000,
            payment_reconcile_grace_seconds: 0,
            payment_pending_hold_seconds: DEFAULT_PAYMENT_PENDING_HOLD_SECONDS,
            hackathon_team_min_size: DEFAULT_HACKATHON_TEAM_MIN_SIZE,
            hackathon_team_max_size: DEFAULT_HACKATHON_TEAM_MAX_SIZE,
            throttle_registration_limit: DEFAULT_THROTTLE_REGISTRATION_LIMIT,
            throttle_registration_window_seconds: DEFAULT_THROTTLE_REGISTRATION_WINDOW_SECONDS,
            throttle_payment_limit: DEFAULT_THROTTLE_PAYMENT_LIMIT,
            throttle_payment_window_seconds: DEFAULT_THROTTLE_PAYMENT_WINDOW_SECONDS,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn mode_env(
    key: &'static str,
    default: &str,
    allowed: &[&str],
) -> Result<String, ConfigError> {
    let value = optional_env(key)
        .map(|value| value.to_lowercase())
        .unwrap_or_else(|| default.to_string());

    if allowed.contains(&value.as_str()) {
        return Ok(value);
    }

    Err(ConfigError::InvalidMode {
        key,
        value,
        allowed: allowed.join(", "),
    })
}

fn number_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_env(key) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
    }
}

fn parse_csv(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}
