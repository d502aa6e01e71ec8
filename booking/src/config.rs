//! Environment-driven configuration.
//!
//! Values come from process environment variables with sane defaults for
//! local development. Secrets default to obviously-fake values so a missing
//! variable shows up in callback verification failures, not in silence.

use std::env;
use std::time::Duration;

/// Runtime configuration for the booking engine
#[derive(Clone, Debug)]
pub struct Config {
    /// How long placed orders hold their seats
    pub hold_ttl: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
    /// HMAC secret shared with the bank gateway
    pub bank_secret: String,
    /// Callback key shared with MobiPay
    pub mobipay_key: String,
    /// Callback key shared with ZenPay
    pub zenpay_key: String,
    /// Salt mixed into wallet PIN digests
    pub pin_salt: String,
    /// Log filter, `tracing_subscriber::EnvFilter` syntax
    pub log_level: String,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Unset variables fall back to development defaults; malformed numeric
    /// values fall back the same way rather than aborting startup.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            hold_ttl: Duration::from_secs(env_u64("CINEBOOK_HOLD_TTL_SECS", 600)),
            sweep_interval: Duration::from_secs(env_u64("CINEBOOK_SWEEP_INTERVAL_SECS", 30)),
            bank_secret: env_string("CINEBOOK_BANK_SECRET", "dev-bank-secret"),
            mobipay_key: env_string("CINEBOOK_MOBIPAY_KEY", "dev-mobipay-key"),
            zenpay_key: env_string("CINEBOOK_ZENPAY_KEY", "dev-zenpay-key"),
            pin_salt: env_string("CINEBOOK_PIN_SALT", "dev-pin-salt"),
            log_level: env_string("CINEBOOK_LOG", "info"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            bank_secret: "dev-bank-secret".into(),
            mobipay_key: "dev-mobipay-key".into(),
            zenpay_key: "dev-zenpay-key".into(),
            pin_salt: "dev-pin-salt".into(),
            log_level: "info".into(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
