use crate::domain::entities::LockSettings;
use regex::Regex;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

const RESOURCE_KEY_SUFFIX: &str = "uploaded-image";
const LOCK_KEY_SUFFIX: &str = "image-upload-mutex";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Namespace prefixed to every storage key.
    pub image_path: String,
    pub store_backend: StoreBackend,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub database_url: String,
    pub mutex_waiting_period: Duration,
    pub mutex_ttl: Duration,
    pub mutex_poll_interval: Duration,
    pub max_upload_bytes: usize,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |keys: &[&str], default: &str| -> (String, String) {
            for key in keys {
                if let Some(value) = lookup(*key).filter(|v| !v.is_empty()) {
                    return (key.to_string(), value);
                }
            }
            (keys[0].to_string(), default.to_string())
        };

        let (_, server_host) = var(&["SERVER_HOST"], "0.0.0.0");

        let (key, value) = var(&["PORT"], "3000");
        let server_port: u16 = parse_number(&key, &value)?;

        let (_, image_path) = var(&["IMAGE_PATH"], "tmp-image");

        let (_, backend) = var(&["STORE_BACKEND"], "redis");
        let store_backend = backend.parse::<StoreBackend>()?;

        let (_, redis_host) = var(&["REDIS_HOST"], "localhost");

        let (key, value) = var(&["REDIS_PORT"], "6379");
        let redis_port: u16 = parse_number(&key, &value)?;

        let (key, value) = var(&["REDIS_DB"], "0");
        let redis_db: i64 = parse_number(&key, &value)?;

        let (_, database_url) = var(&["DATABASE_URL"], "sqlite://imgmutex.db?mode=rwc");

        let (key, value) = var(&["MUTEX_WAITING_PERIOD", "MUTEX-WAITING-PERIOD"], "10s");
        let mutex_waiting_period = parse_env_duration(&key, &value)?;

        let (key, value) = var(&["MUTEX_TTL", "MUTEX-TTL"], "30s");
        let mutex_ttl = parse_env_duration(&key, &value)?;
        if mutex_ttl < Duration::from_millis(2) {
            return Err(ConfigError::InvalidDuration {
                key,
                value,
                reason: "TTL must be at least 2ms".to_string(),
            });
        }

        let (key, value) = var(&["MUTEX_POLL_INTERVAL"], "1s");
        let mutex_poll_interval = parse_env_duration(&key, &value)?;

        let (key, value) = var(&["MAX_UPLOAD_BYTES"], "10485760");
        let max_upload_bytes: usize = parse_number(&key, &value)?;

        let otel_exporter_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty());

        let (_, service_name) = var(&["SERVICE_NAME"], "imgmutex");

        Ok(Config {
            server_host,
            server_port,
            image_path,
            store_backend,
            redis_host,
            redis_port,
            redis_db,
            database_url,
            mutex_waiting_period,
            mutex_ttl,
            mutex_poll_interval,
            max_upload_bytes,
            otel_exporter_endpoint,
            service_name,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        )
    }

    pub fn resource_key(&self) -> String {
        format!("{}:{}", self.image_path, RESOURCE_KEY_SUFFIX)
    }

    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.image_path, LOCK_KEY_SUFFIX)
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings::new(
            self.mutex_ttl,
            self.mutex_waiting_period,
            self.mutex_poll_interval,
        )
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_env_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|reason| ConfigError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}

/// Longest accepted lock duration (TTL, wait or poll interval).
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Parse `<number><unit>` where unit is one of `ms`, `s`, `m`, `h`.
/// Values must be non-zero and no longer than [`MAX_DURATION`].
pub fn parse_duration(duration_str: &str) -> Result<Duration, String> {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = DURATION_REGEX
        .get_or_init(|| Regex::new(r"^(\d+)(ms|s|m|h)$").expect("Invalid duration regex"));

    let caps = re.captures(duration_str.trim()).ok_or_else(|| {
        format!(
            "Invalid duration format: {}. Expected format: <number><ms|s|m|h>",
            duration_str
        )
    })?;

    let number: u64 = caps[1]
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", &caps[1]))?;

    let too_long = || format!("Duration must be at most {:?}", MAX_DURATION);
    let duration = match &caps[2] {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number.checked_mul(60).ok_or_else(too_long)?),
        "h" => Duration::from_secs(number.checked_mul(60 * 60).ok_or_else(too_long)?),
        unit => return Err(format!("Invalid duration unit: {}", unit)),
    };

    if duration.is_zero() {
        return Err("Duration must be greater than 0".to_string());
    }
    if duration > MAX_DURATION {
        return Err(too_long());
    }

    Ok(duration)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} is not a valid duration ({value:?}): {reason}")]
    InvalidDuration {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown STORE_BACKEND {0:?}, expected redis, sqlite or memory")]
    InvalidBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.redis_url(), "redis://localhost:6379/0");
        assert_eq!(config.mutex_waiting_period, Duration::from_secs(10));
        assert_eq!(config.mutex_ttl, Duration::from_secs(30));
        assert_eq!(config.mutex_poll_interval, Duration::from_secs(1));
        assert_eq!(config.resource_key(), "tmp-image:uploaded-image");
        assert_eq!(config.lock_key(), "tmp-image:image-upload-mutex");
    }

    #[test]
    fn test_dashed_aliases_are_accepted() {
        let config = config_from(&[("MUTEX-WAITING-PERIOD", "5s"), ("MUTEX-TTL", "2m")]).unwrap();
        assert_eq!(config.mutex_waiting_period, Duration::from_secs(5));
        assert_eq!(config.mutex_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_underscore_name_wins_over_alias() {
        let config = config_from(&[("MUTEX_TTL", "10s"), ("MUTEX-TTL", "20s")]).unwrap();
        assert_eq!(config.mutex_ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_abort() {
        assert!(matches!(
            config_from(&[("PORT", "http")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("REDIS_DB", "one")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("MUTEX_TTL", "forever")]),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(matches!(
            config_from(&[("MUTEX_TTL", "1ms")]),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(matches!(
            config_from(&[("STORE_BACKEND", "etcd")]),
            Err(ConfigError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("1d").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert!(parse_duration("400000000000000000m").is_err());
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn test_parse_duration_upper_bound() {
        assert_eq!(parse_duration("168h").unwrap(), MAX_DURATION);
        assert_eq!(parse_duration("10080m").unwrap(), MAX_DURATION);
        assert!(parse_duration("169h").is_err());
        assert!(parse_duration("18446744073709551615s").is_err());
        assert!(parse_duration("18446744073709551615ms").is_err());
    }

    #[test]
    fn test_oversized_lock_durations_abort() {
        for key in ["MUTEX_TTL", "MUTEX_WAITING_PERIOD", "MUTEX_POLL_INTERVAL"] {
            assert!(
                matches!(
                    config_from(&[(key, "18446744073709551615s")]),
                    Err(ConfigError::InvalidDuration { .. })
                ),
                "{} accepted an oversized duration",
                key
            );
        }
        assert!(matches!(
            config_from(&[("MUTEX_TTL", "400000000000000000m")]),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}
