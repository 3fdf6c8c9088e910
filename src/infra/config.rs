use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    /// HS256 key for the app's bearer tokens.
    pub jwt_secret: SecretString,
    /// Without it the webhook endpoint answers 500 `NOT_CONFIGURED`.
    pub stripe_webhook_secret: Option<SecretString>,
    /// Maximum age of a signed webhook timestamp, in seconds.
    pub stripe_webhook_tolerance_secs: i64,
    /// Without it checkout is disabled.
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_price_monthly: Option<String>,
    pub stripe_price_yearly: Option<String>,
    /// Discount carried by referral promotion codes, in percent.
    pub referral_percent_off: u32,
    pub trial_days: i64,
    pub status_stream_poll_secs: u64,
    pub status_stream_keepalive_secs: u64,
    pub telegram_bot_token: Option<SecretString>,
    pub telegram_chat_id: Option<String>,
    pub notify_timeout_ms: u64,
    /// Emit JSON log lines on stdout instead of the pretty console output.
    pub log_json: bool,
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:8000".parse().unwrap());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let jwt_secret = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let stripe_webhook_secret =
            optional_env("STRIPE_WEBHOOK_SECRET").map(|s| SecretString::new(s.into()));
        let stripe_webhook_tolerance_secs: i64 =
            get_env_default("STRIPE_WEBHOOK_TOLERANCE_SECS", 300);
        let stripe_secret_key =
            optional_env("STRIPE_SECRET_KEY").map(|s| SecretString::new(s.into()));
        let stripe_price_monthly = optional_env("STRIPE_PRICE_MONTHLY");
        let stripe_price_yearly = optional_env("STRIPE_PRICE_YEARLY");
        let referral_percent_off: u32 = get_env_default("REFERRAL_PERCENT_OFF", 10);

        let trial_days: i64 = get_env_default("TRIAL_DAYS", 7);
        let status_stream_poll_secs: u64 = get_env_default("STATUS_STREAM_POLL_SECS", 10);
        let status_stream_keepalive_secs: u64 = get_env_default("STATUS_STREAM_KEEPALIVE_SECS", 25);

        let telegram_bot_token =
            optional_env("TELEGRAM_BOT_TOKEN").map(|s| SecretString::new(s.into()));
        let telegram_chat_id = optional_env("TELEGRAM_CHAT_ID");
        let notify_timeout_ms: u64 = get_env_default("NOTIFY_TIMEOUT_MS", 3_000);

        let log_json: bool = get_env_default("LOG_JSON", false);

        Self {
            database_url,
            bind_addr,
            cors_origin,
            jwt_secret,
            stripe_webhook_secret,
            stripe_webhook_tolerance_secs,
            stripe_secret_key,
            stripe_price_monthly,
            stripe_price_yearly,
            referral_percent_off,
            trial_days,
            status_stream_poll_secs,
            status_stream_keepalive_secs,
            telegram_bot_token,
            telegram_chat_id,
            notify_timeout_ms,
            log_json,
        }
    }
}
