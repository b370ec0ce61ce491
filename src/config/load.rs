use std::{env, path::PathBuf};

use super::schema::Settings;

/// Configuration loading helpers.
///
/// `Settings::load` starts from struct defaults, overlays the optional config
/// file, then overlays environment variables (prefix `DECKSYNC__`). Later
/// layers win, so the environment overrides the file.
impl Settings {
    /// Load settings from environment and optional config file.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("DECKSYNC")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Reject combinations the dispatcher, scorer or guard cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        let d = &self.dispatcher;
        if d.backoff_min_ms > d.backoff_max_ms {
            return Err("dispatcher.backoff_min_ms must be <= dispatcher.backoff_max_ms".to_string());
        }
        if d.verification_delay_ms > d.verification_timeout_ms {
            return Err(
                "dispatcher.verification_delay_ms must be <= dispatcher.verification_timeout_ms"
                    .to_string(),
            );
        }
        if d.history_capacity == 0 {
            return Err("dispatcher.history_capacity must be >= 1".to_string());
        }

        let s = &self.scoring;
        if !(s.key_weight >= 0.0 && s.tempo_weight >= 0.0) || s.key_weight + s.tempo_weight <= 0.0
        {
            return Err("scoring weights must be non-negative with a positive sum".to_string());
        }
        if !(s.tempo_tolerance >= 0.0) {
            return Err("scoring.tempo_tolerance must be >= 0".to_string());
        }
        if !(0.0..100.0).contains(&s.ratio_tolerance_pct) {
            return Err("scoring.ratio_tolerance_pct must be in [0, 100)".to_string());
        }

        if self.guard.enabled && self.guard.history_size == 0 {
            return Err("guard.history_size must be >= 1 when the guard is enabled".to_string());
        }
        Ok(())
    }
}

/// Resolve the config path from `DECKSYNC_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("DECKSYNC_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/decksync/config.toml`
/// or `~/.config/decksync/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("decksync").join("config.toml"))
}
