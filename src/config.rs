use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: Option<String>,
    pub analytics: AnalyticsSettings,
}

/// Knobs for session bucketing and the windowed classifier.
#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub session_idle: Duration,
    pub session_per_module: bool,
    pub window_days: i64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            session_idle: Duration::from_secs(60 * 60),
            session_per_module: false,
            window_days: 7,
        }
    }
}

impl AnalyticsSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let session_idle = env_u64("SESSION_IDLE_MINUTES")
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(minutes * 60))
            .unwrap_or(defaults.session_idle);

        let session_per_module =
            env_bool("SESSION_SCOPE_PER_MODULE").unwrap_or(defaults.session_per_module);

        let window_days = env_u64("ANALYTICS_WINDOW_DAYS")
            .filter(|days| (1..=365).contains(days))
            .map(|days| days as i64)
            .unwrap_or(defaults.window_days);

        Self {
            session_idle,
            session_per_module,
            window_days,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            host,
            port,
            log_level,
            jwt_secret,
            analytics: AnalyticsSettings::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}
