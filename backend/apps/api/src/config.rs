//! Server configuration from the process environment (after `.env`)

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use auth::{AuthConfig, Environment};
use platform::rate_limit::RateLimitConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:40922,http://127.0.0.1:40922";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub sweep_interval: Duration,
    pub rate_limit: RateLimitConfig,
    /// Peers whose X-Forwarded-For is honoured; empty means none
    pub trusted_proxies: Vec<IpAddr>,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let frontend_origins = optional("FRONTEND_ORIGINS")
            .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig::new(
            parsed("RATE_LIMIT_BURST")?.unwrap_or(defaults.capacity),
            parsed("RATE_LIMIT_PER_SEC")?.unwrap_or(defaults.refill_per_sec),
        );

        let trusted_proxies = optional("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|proxy| !proxy.is_empty())
            .map(|proxy| {
                proxy
                    .parse::<IpAddr>()
                    .with_context(|| format!("TRUSTED_PROXIES has an invalid address '{proxy}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let log_format = match optional("LOG_FORMAT").as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };

        let sweep_interval = seconds("SWEEP_INTERVAL_SECS")?.unwrap_or(Duration::from_secs(300));
        if sweep_interval.is_zero() {
            bail!("SWEEP_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            database_url,
            bind_addr,
            frontend_origins,
            sweep_interval,
            rate_limit,
            trusted_proxies,
            request_timeout: seconds("REQUEST_TIMEOUT_SECS")?.unwrap_or(Duration::from_secs(30)),
            log_format,
            auth: auth_config_from_env()?,
        })
    }
}

/// Read the auth settings, starting from [`AuthConfig::default`]
pub fn auth_config_from_env() -> anyhow::Result<AuthConfig> {
    let mut config = AuthConfig::default();

    if let Some(env_name) = optional("APP_ENV") {
        config.environment = Environment::from_str(&env_name)?;
    }
    if let Some(secret) = optional("JWT_SECRET") {
        config.jwt_secret = secret;
    }
    if let Some(issuer) = optional("JWT_ISSUER") {
        config.jwt_issuer = issuer;
    }
    if let Some(ttl) = seconds("JWT_TTL_SECS")? {
        config.token_ttl = ttl;
    }
    if let Some(leeway) = seconds("JWT_LEEWAY_SECS")? {
        config.clock_skew_leeway = leeway;
    }
    if let Some(ttl) = seconds("OTP_TTL_SECS")? {
        config.otp_ttl = ttl;
    }
    if let Some(length) = parsed("OTP_LENGTH")? {
        config.otp_length = length;
    }
    if let Some(threshold) = parsed("LOCKOUT_THRESHOLD")? {
        config.lockout_threshold = threshold;
    }
    if let Some(duration) = seconds("LOCKOUT_DURATION_SECS")? {
        config.lockout_duration = duration;
    }
    if let Some(ttl) = seconds("SESSION_TTL_SECS")? {
        config.session_ttl = ttl;
    }
    if let Some(track) = parsed("TRACK_SESSIONS")? {
        config.track_sessions = track;
    }
    config.password_pepper = optional("PASSWORD_PEPPER").map(String::into_bytes);

    config.validate()?;
    Ok(config)
}

/// Unset and empty are the same
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{key} has an invalid value"))
}

fn seconds(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(parsed::<u64>(key)?.map(Duration::from_secs))
}
