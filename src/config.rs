//! Runtime configuration
//!
//! Everything the services need is read once at startup into [`AppConfig`]
//! and handed to each service at construction.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// ZhipuAI open platform, paas v4
const DEFAULT_GENERATOR_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
const DEFAULT_IMAGE_MODEL: &str = "cogview-3-flash";
const DEFAULT_VIDEO_MODEL: &str = "cogvideox-flash";

const PAYPAL_SANDBOX_URL: &str = "https://api-m.sandbox.paypal.com";
const PAYPAL_LIVE_URL: &str = "https://api-m.paypal.com";

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STORAGE_DIR: &str = "public/generated";

/// Public URL prefix the storage directory is served under
pub const PUBLIC_PREFIX: &str = "/generated";

/// Fixed delay between two status queries (seconds)
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 900;

const DEFAULT_ORDER_TTL_SECS: u64 = 3600;

const DEFAULT_WHITELIST_IPS: &str = "127.0.0.1,localhost,::1";

const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_API_KEY: &str = "ZHIPUAI_API_KEY";
const ENV_GENERATOR_BASE_URL: &str = "GENERATOR_BASE_URL";
const ENV_IMAGE_MODEL: &str = "IMAGE_MODEL";
const ENV_VIDEO_MODEL: &str = "VIDEO_MODEL";
const ENV_PAYPAL_CLIENT_ID: &str = "PAYPAL_CLIENT_ID";
const ENV_PAYPAL_CLIENT_SECRET: &str = "PAYPAL_CLIENT_SECRET";
const ENV_PAYPAL_MODE: &str = "PAYPAL_MODE";
const ENV_PAYPAL_BASE_URL: &str = "PAYPAL_BASE_URL";
const ENV_PUBLIC_BASE_URL: &str = "PUBLIC_BASE_URL";
const ENV_STORAGE_DIR: &str = "STORAGE_DIR";
const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECS";
const ENV_POLL_MAX_ATTEMPTS: &str = "POLL_MAX_ATTEMPTS";
const ENV_POLL_TIMEOUT: &str = "POLL_TIMEOUT_SECS";
const ENV_ORDER_TTL: &str = "ORDER_TTL_SECS";
const ENV_REQUIRE_CAPTURED_ORDER: &str = "REQUIRE_CAPTURED_ORDER";
const ENV_WHITELIST_ENABLED: &str = "PAYMENT_WHITELIST_ENABLED";
const ENV_WHITELIST_IPS: &str = "PAYMENT_WHITELIST_IPS";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub video_model: String,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    /// Base URL of this server, used to build return/cancel redirects
    pub return_base_url: String,
}

/// Poll loop limits
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Payment gate settings
#[derive(Debug, Clone)]
pub struct PaymentGateConfig {
    /// When false, the presence of an order id is enough to pass the gate
    pub require_captured_order: bool,
    pub order_ttl: Duration,
    pub whitelist_enabled: bool,
    pub whitelisted_ips: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub generator: GeneratorConfig,
    pub paypal: PayPalConfig,
    pub poll: PollConfig,
    pub payment_gate: PaymentGateConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

impl Default for PaymentGateConfig {
    fn default() -> Self {
        Self {
            require_captured_order: true,
            order_ttl: Duration::from_secs(DEFAULT_ORDER_TTL_SECS),
            whitelist_enabled: false,
            whitelisted_ips: split_list(DEFAULT_WHITELIST_IPS),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            generator: GeneratorConfig {
                api_key: String::new(),
                base_url: DEFAULT_GENERATOR_BASE_URL.to_string(),
                image_model: DEFAULT_IMAGE_MODEL.to_string(),
                video_model: DEFAULT_VIDEO_MODEL.to_string(),
            },
            paypal: PayPalConfig {
                client_id: String::new(),
                client_secret: String::new(),
                base_url: PAYPAL_SANDBOX_URL.to_string(),
                return_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            },
            poll: PollConfig::default(),
            payment_gate: PaymentGateConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string_or = |key: &str, default: String| {
            lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default)
        };
        let parsed_or = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let flag_or = |key: &str, default: bool| {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(default)
        };

        let paypal_base_url = match lookup(ENV_PAYPAL_BASE_URL).filter(|v| !v.is_empty()) {
            Some(url) => url,
            None => match lookup(ENV_PAYPAL_MODE).as_deref() {
                Some("live") | Some("production") => PAYPAL_LIVE_URL.to_string(),
                _ => PAYPAL_SANDBOX_URL.to_string(),
            },
        };

        let poll = PollConfig {
            interval: Duration::from_secs(parsed_or(
                ENV_POLL_INTERVAL,
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            max_attempts: parsed_or(ENV_POLL_MAX_ATTEMPTS, DEFAULT_POLL_MAX_ATTEMPTS as u64)
                .min(u32::MAX as u64) as u32,
            timeout: Duration::from_secs(parsed_or(
                ENV_POLL_TIMEOUT,
                DEFAULT_POLL_TIMEOUT_SECS,
            )),
        };

        let payment_gate = PaymentGateConfig {
            require_captured_order: flag_or(
                ENV_REQUIRE_CAPTURED_ORDER,
                defaults.payment_gate.require_captured_order,
            ),
            order_ttl: Duration::from_secs(parsed_or(
                ENV_ORDER_TTL,
                DEFAULT_ORDER_TTL_SECS,
            )),
            whitelist_enabled: flag_or(ENV_WHITELIST_ENABLED, false),
            whitelisted_ips: lookup(ENV_WHITELIST_IPS)
                .map(|v| split_list(&v))
                .unwrap_or(defaults.payment_gate.whitelisted_ips),
        };

        Self {
            bind_addr: string_or(ENV_BIND_ADDR, defaults.bind_addr),
            storage_dir: lookup(ENV_STORAGE_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            generator: GeneratorConfig {
                api_key: lookup(ENV_API_KEY).unwrap_or_default(),
                base_url: string_or(ENV_GENERATOR_BASE_URL, defaults.generator.base_url),
                image_model: string_or(ENV_IMAGE_MODEL, defaults.generator.image_model),
                video_model: string_or(ENV_VIDEO_MODEL, defaults.generator.video_model),
            },
            paypal: PayPalConfig {
                client_id: lookup(ENV_PAYPAL_CLIENT_ID).unwrap_or_default(),
                client_secret: lookup(ENV_PAYPAL_CLIENT_SECRET).unwrap_or_default(),
                base_url: paypal_base_url,
                return_base_url: string_or(
                    ENV_PUBLIC_BASE_URL,
                    defaults.paypal.return_base_url,
                ),
            },
            poll,
            payment_gate,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
