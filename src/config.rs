use dotenvy::dotenv;
use std::env;

pub const DEFAULT_REFUND_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_SWEEP_STALE_AFTER_MINUTES: i64 = 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_webhook_secret: String,
    /// Service that owns referenced content/session objects. Without it, all
    /// references are accepted and completion side effects are skipped.
    pub reference_service_url: Option<String>,
    pub refund_window_days: i64,
    pub sweep_stale_after_minutes: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_base_url: env::var("GATEWAY_BASE_URL")?,
            gateway_api_key: env::var("GATEWAY_API_KEY")?,
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")?,
            reference_service_url: env::var("REFERENCE_SERVICE_URL").ok(),
            refund_window_days: env::var("REFUND_WINDOW_DAYS")
                .unwrap_or_else(|_| DEFAULT_REFUND_WINDOW_DAYS.to_string())
                .parse()?,
            sweep_stale_after_minutes: env::var("SWEEP_STALE_AFTER_MINUTES")
                .unwrap_or_else(|_| DEFAULT_SWEEP_STALE_AFTER_MINUTES.to_string())
                .parse()?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
                .parse()?,
        })
    }
}
