use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 12000;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 2_000;
const PRODUCTION_YAML_PATH: &str = "/usr/src/app/machines.yml";
const DEVELOPMENT_YAML_PATH: &str = "machines.yml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer (got {value:?})")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub broadcast_interval: Duration,
    pub batch_size: usize,
    pub probe_timeout: Duration,
    pub watch_interval: Duration,
    pub yaml_path: PathBuf,
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast_interval: Duration::from_millis(DEFAULT_BROADCAST_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            watch_interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            yaml_path: PathBuf::from(DEVELOPMENT_YAML_PATH),
            environment: "development".into(),
        }
    }
}

impl ServerConfig {
    /// Lit la configuration depuis les variables d'environnement (après dotenvy)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("APP_ENV")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "development".into());

        // YAML_PATH explicite > chemin selon l'environnement
        let yaml_path = lookup("YAML_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                if environment == "production" {
                    PathBuf::from(PRODUCTION_YAML_PATH)
                } else {
                    PathBuf::from(DEVELOPMENT_YAML_PATH)
                }
            });

        Ok(Self {
            port: positive(&lookup, "PORT", DEFAULT_PORT as u64, u16::MAX as u64)? as u16,
            broadcast_interval: Duration::from_millis(positive(
                &lookup,
                "BROADCAST_INTERVAL_MS",
                DEFAULT_BROADCAST_INTERVAL_MS,
                u64::MAX,
            )?),
            batch_size: positive(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE as u64, u64::MAX)? as usize,
            probe_timeout: Duration::from_secs(positive(&lookup, "PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT_SECS, u64::MAX)?),
            watch_interval: Duration::from_millis(positive(&lookup, "WATCH_INTERVAL_MS", DEFAULT_WATCH_INTERVAL_MS, u64::MAX)?),
            yaml_path,
            environment,
        })
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: u64, max: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 && value <= max => Ok(value),
        _ => Err(ConfigError::InvalidNumber { name, value: raw }),
    }
}
