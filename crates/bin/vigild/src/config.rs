//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `vigil.toml` in the working directory, or at the path named by
//! `VIGIL_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use vigil_app::coordinator::EscalationSettings;
use vigil_domain::alarm::{AlarmSettings, AlarmType, DEFAULT_PANIC_RULE_TEMPLATES};
use vigil_domain::call_tree::Person;
use vigil_domain::escalation::{
    BackoffPolicy, DEFAULT_ATTEMPT_TTL, DEFAULT_MAX_BACKOFF_DELAY, DEFAULT_MAX_RETRIES,
    EscalationPolicy, NotificationMethod,
};
use vigil_domain::id::{PersonId, PlaceId};

const DEFAULT_CONFIG_PATH: &str = "vigil.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Per alarm type overrides.
    pub alarms: AlarmsConfig,
    pub escalation: EscalationConfig,
    /// People provisioned at startup.
    pub people: Vec<PersonConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Alarm registry overrides, keyed by alarm type name (`SMOKE`, `co`, ...).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlarmsConfig {
    /// PREALERT dwell in seconds.
    pub dwell_secs: HashMap<String, u64>,
    /// Trigger predicate text.
    pub predicates: HashMap<String, String>,
    /// Rule templates that enable PANIC at a place without a keypad.
    pub panic_rule_templates: Vec<String>,
}

/// Call tree walking and retry settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub max_backoff_secs: u64,
    /// Dispatches per recipient, first one included.
    pub max_retries: u32,
    /// How long a recipient has to acknowledge.
    pub attempt_ttl_secs: u64,
    pub policy: EscalationPolicy,
    pub method: NotificationMethod,
}

/// A person of a place, as declared in `[[people]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonConfig {
    pub id: PersonId,
    pub place_id: PlaceId,
    pub first_name: String,
    pub last_name: String,
    /// Account owner; enabled by default in new call tree entries.
    #[serde(default)]
    pub owner: bool,
}

impl Config {
    /// Load configuration from `vigil.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("VIGIL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIGIL_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("VIGIL_PORT")
            && let Ok(port) = val.parse()
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("VIGIL_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("VIGIL_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("VIGIL_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.escalation.max_retries == 0 {
            return Err(ConfigError::Validation(
                "escalation.max_retries must be at least 1".to_string(),
            ));
        }
        if self.escalation.attempt_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "escalation.attempt_ttl_secs must be non-zero".to_string(),
            ));
        }
        self.alarm_settings()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Registry settings with alarm type names resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown alarm type name.
    pub fn alarm_settings(&self) -> Result<AlarmSettings, ConfigError> {
        let dwell: HashMap<AlarmType, Duration> = self
            .alarms
            .dwell_secs
            .iter()
            .map(|(name, secs)| parse_alarm_type(name).map(|t| (t, Duration::from_secs(*secs))))
            .collect::<Result<_, _>>()?;
        let predicates: HashMap<AlarmType, String> = self
            .alarms
            .predicates
            .iter()
            .map(|(name, text)| parse_alarm_type(name).map(|t| (t, text.clone())))
            .collect::<Result<_, _>>()?;

        Ok(AlarmSettings {
            dwell,
            predicates,
            panic_rule_templates: self.alarms.panic_rule_templates.clone(),
        })
    }

    #[must_use]
    pub fn escalation_settings(&self) -> EscalationSettings {
        EscalationSettings {
            policy: self.escalation.policy,
            backoff: BackoffPolicy {
                max_backoff: Duration::from_secs(self.escalation.max_backoff_secs),
                max_retries: self.escalation.max_retries,
                attempt_ttl: Duration::from_secs(self.escalation.attempt_ttl_secs),
            },
            method: self.escalation.method,
        }
    }
}

fn parse_alarm_type(name: &str) -> Result<AlarmType, ConfigError> {
    AlarmType::from_str(name).map_err(|err| ConfigError::Validation(err.to_string()))
}

impl PersonConfig {
    #[must_use]
    pub fn to_person(&self) -> Person {
        Person {
            id: self.id,
            place_id: self.place_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:vigil.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "vigild=info,vigil_app=info,vigil_adapter_storage_sqlite_sqlx=info,tower_http=debug"
                .to_string(),
        }
    }
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            dwell_secs: HashMap::new(),
            predicates: HashMap::new(),
            panic_rule_templates: DEFAULT_PANIC_RULE_TEMPLATES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_backoff_secs: DEFAULT_MAX_BACKOFF_DELAY.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_ttl_secs: DEFAULT_ATTEMPT_TTL.as_secs(),
            policy: EscalationPolicy::default(),
            method: NotificationMethod::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
