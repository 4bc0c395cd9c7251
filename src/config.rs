//! Engine configuration read from the environment.

use std::env;

const DEFAULT_OPTIMIZER_MAX_PASSES: usize = 32;

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    Off,
    /// Log denials but allow requests (testing mode)
    Advisory,
    /// Raise access denied errors (production mode)
    #[default]
    Strict,
}

impl AuthzMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "off" => AuthzMode::Off,
            "advisory" => AuthzMode::Advisory,
            _ => AuthzMode::Strict,
        }
    }

    pub fn from_env() -> Self {
        env::var("AUTHZ_MODE")
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub mode: AuthzMode,
    /// Memoize resolutions per session identity.
    pub cache: bool,
    /// Run the optimizer over resolutions rendered into query filters.
    pub optimize_db_filters: bool,
    pub optimizer_max_passes: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            mode: AuthzMode::Strict,
            cache: true,
            optimize_db_filters: true,
            optimizer_max_passes: DEFAULT_OPTIMIZER_MAX_PASSES,
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mode: AuthzMode::from_env(),
            cache: env_flag("AUTHZ_CACHE").unwrap_or(defaults.cache),
            optimize_db_filters: env_flag("AUTHZ_OPTIMIZE_DB_FILTERS")
                .unwrap_or(defaults.optimize_db_filters),
            optimizer_max_passes: env::var("AUTHZ_OPTIMIZER_MAX_PASSES")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|passes| *passes > 0)
                .unwrap_or(defaults.optimizer_max_passes),
        }
    }

    pub fn with_mode(mut self, mode: AuthzMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
