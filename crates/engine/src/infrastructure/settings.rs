//! Engine configuration from environment variables.

use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:treeline.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ID_ALLOC_MAX_RETRIES: u32 = 16;
pub const DEFAULT_GAP_SCAN_LIMIT: u32 = 8;

/// Runtime settings for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// sqlx connection URL for the SQLite database.
    pub database_url: String,
    pub max_connections: u32,
    /// Fresh draws allowed after node-id collisions before giving up.
    pub id_alloc_max_retries: u32,
    /// How many between-row gaps the id allocator looks at.
    pub gap_scan_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            id_alloc_max_retries: DEFAULT_ID_ALLOC_MAX_RETRIES,
            gap_scan_limit: DEFAULT_GAP_SCAN_LIMIT,
        }
    }
}

impl EngineSettings {
    /// Create settings from environment variables.
    ///
    /// Uses `TREELINE_DATABASE_URL`, `TREELINE_MAX_CONNECTIONS`,
    /// `TREELINE_ID_ALLOC_MAX_RETRIES` and `TREELINE_GAP_SCAN_LIMIT`, falling back
    /// to defaults when unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineSettings::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("TREELINE_DATABASE_URL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.database_url),
            max_connections: parse_or(
                &lookup,
                "TREELINE_MAX_CONNECTIONS",
                defaults.max_connections,
            )
            .max(1),
            id_alloc_max_retries: parse_or(
                &lookup,
                "TREELINE_ID_ALLOC_MAX_RETRIES",
                defaults.id_alloc_max_retries,
            )
            .max(1),
            gap_scan_limit: parse_or(&lookup, "TREELINE_GAP_SCAN_LIMIT", defaults.gap_scan_limit),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, default = %default, "Invalid setting, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn unset_variables_give_defaults() {
        let settings = EngineSettings::from_lookup(lookup(&[]));
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.id_alloc_max_retries, 16);
        assert_eq!(settings.gap_scan_limit, 8);
    }

    #[test]
    fn variables_override_defaults() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("TREELINE_DATABASE_URL", "sqlite::memory:"),
            ("TREELINE_MAX_CONNECTIONS", "2"),
            ("TREELINE_ID_ALLOC_MAX_RETRIES", "4"),
            ("TREELINE_GAP_SCAN_LIMIT", " 3 "),
        ]));
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.max_connections, 2);
        assert_eq!(settings.id_alloc_max_retries, 4);
        assert_eq!(settings.gap_scan_limit, 3);
    }

    #[test]
    fn garbage_falls_back_and_zero_retries_is_clamped() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("TREELINE_MAX_CONNECTIONS", "many"),
            ("TREELINE_ID_ALLOC_MAX_RETRIES", "0"),
            ("TREELINE_DATABASE_URL", "   "),
        ]));
        assert_eq!(settings.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(settings.id_alloc_max_retries, 1);
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
    }
}
