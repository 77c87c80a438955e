//! API configuration.

use std::time::Duration;

use cg_media::DEFAULT_FRAME_LIMIT;
use cg_notify::monitor::DEFAULT_COOLDOWN;
use cg_store::StoreBackend;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Timeout for CRUD and account requests. Streams and analysis are exempt.
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Frames examined per uploaded clip
    pub analysis_frame_limit: u32,
    /// Wall-clock cap for one upload analysis
    pub analysis_time_budget: Duration,
    /// JPEG quality for live feeds (1-100)
    pub stream_jpeg_quality: u8,
    /// Raise SMS alerts from live feeds
    pub live_alerts_enabled: bool,
    pub live_alert_cooldown: Duration,
    pub store_backend: StoreBackend,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:4200".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 200 * 1024 * 1024, // 200MB
            environment: "development".to_string(),
            analysis_frame_limit: DEFAULT_FRAME_LIMIT,
            analysis_time_budget: Duration::from_secs(60),
            stream_jpeg_quality: 80,
            live_alerts_enabled: false,
            live_alert_cooldown: DEFAULT_COOLDOWN,
            store_backend: StoreBackend::Memory,
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// Fails only on an unknown `STORE_BACKEND`; other malformed values fall
    /// back to their defaults.
    pub fn from_env() -> Result<Self, cg_store::StoreError> {
        let defaults = Self::default();
        let store_backend = std::env::var("STORE_BACKEND")
            .unwrap_or_default()
            .parse::<StoreBackend>()?;

        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            analysis_frame_limit: env_parse::<u32>("ANALYSIS_FRAME_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.analysis_frame_limit),
            analysis_time_budget: env_parse("ANALYSIS_TIME_BUDGET_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.analysis_time_budget),
            stream_jpeg_quality: env_parse::<u8>("STREAM_JPEG_QUALITY")
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.stream_jpeg_quality),
            live_alerts_enabled: env_flag("LIVE_ALERTS_ENABLED")
                .unwrap_or(defaults.live_alerts_enabled),
            live_alert_cooldown: env_parse("LIVE_ALERT_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.live_alert_cooldown),
            store_backend,
            metrics_enabled: env_flag("METRICS_ENABLED").unwrap_or(defaults.metrics_enabled),
        })
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
