use std::fmt;
use std::time::Duration;

use crate::limits::MAX_LOCATIONS;
use crate::model::ResourceId;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOCATIONS: [&str; 3] = ["Kitchen", "Washroom", "Hall"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String, reason: String },
    Client(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "{var} is not set"),
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "invalid {var}={value:?}: {reason}")
            }
            ConfigError::Client(e) => write!(f, "cannot build HTTP client: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Session configuration, read from `HOUSESLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    /// House whose schedules the session works on. Required for HTTP.
    pub house_id: Option<String>,
    /// Bearer token. Obtaining and storing it is the caller's business.
    pub token: Option<String>,
    pub timeout: Duration,
    /// Bookable locations; the first is selected on startup.
    pub locations: Vec<ResourceId>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            house_id: None,
            token: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            locations: DEFAULT_LOCATIONS
                .iter()
                .filter_map(|l| ResourceId::parse(l).ok())
                .collect(),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("HOUSESLOT_API_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    var: "HOUSESLOT_API_URL",
                    value: url,
                    reason: "expected an http(s) URL".into(),
                });
            }
            config.api_url = url.trim_end_matches('/').to_string();
        }
        config.house_id = get("HOUSESLOT_HOUSE_ID").map(|s| s.trim().to_string());
        config.token = get("HOUSESLOT_TOKEN");

        if let Some(raw) = get("HOUSESLOT_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "HOUSESLOT_TIMEOUT_MS",
                value: raw.clone(),
                reason: "expected milliseconds".into(),
            })?;
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = get("HOUSESLOT_LOCATIONS") {
            config.locations = parse_locations(&raw)?;
        }
        if let Some(raw) = get("HOUSESLOT_METRICS_PORT") {
            let port = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "HOUSESLOT_METRICS_PORT",
                value: raw.clone(),
                reason: "expected a port number".into(),
            })?;
            config.metrics_port = Some(port);
        }
        Ok(config)
    }

    pub fn require_house_id(&self) -> Result<&str, ConfigError> {
        self.house_id.as_deref().ok_or(ConfigError::Missing("HOUSESLOT_HOUSE_ID"))
    }
}

/// Comma separated, duplicates dropped, order kept.
fn parse_locations(raw: &str) -> Result<Vec<ResourceId>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "HOUSESLOT_LOCATIONS",
        value: raw.to_string(),
        reason,
    };
    let mut locations: Vec<ResourceId> = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let id = ResourceId::parse(part).map_err(|e| invalid(e.to_string()))?;
        if !locations.contains(&id) {
            locations.push(id);
        }
    }
    if locations.is_empty() {
        return Err(invalid("no locations listed".into()));
    }
    if locations.len() > MAX_LOCATIONS {
        return Err(invalid(format!("more than {MAX_LOCATIONS} locations")));
    }
    Ok(locations)
}
