//! Database URL resolution.
//!
//! Config YAML stores only the NAME of the environment variable holding the
//! connection URL (`/database/url_env`, default `WMS_DATABASE_URL`). The URL
//! itself is read once at startup and passed to the pool constructor.
//! `Debug` redacts it and errors mention the variable name only.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_DATABASE_URL_ENV: &str = "WMS_DATABASE_URL";

#[derive(Clone)]
pub struct DatabaseUrl {
    /// Variable the URL came from.
    pub env_var: String,
    url: String,
}

impl DatabaseUrl {
    pub fn expose(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseUrl")
            .field("env_var", &self.env_var)
            .field("url", &"<REDACTED>")
            .finish()
    }
}

fn env_var_name(config_json: &Value) -> String {
    config_json
        .pointer("/database/url_env")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DATABASE_URL_ENV)
        .to_string()
}

/// Resolve the connection URL named by the config.
pub fn resolve_database_url(config_json: &Value) -> Result<DatabaseUrl> {
    let env_var = env_var_name(config_json);
    match std::env::var(&env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(DatabaseUrl {
            env_var,
            url: v.trim().to_string(),
        }),
        _ => bail!("DATABASE_URL_MISSING: env var '{}' is not set or empty", env_var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_names_the_variable() {
        let cfg = serde_json::json!({ "database": { "url_env": "WMS_TEST_DB_URL_RESOLVE" } });
        std::env::set_var("WMS_TEST_DB_URL_RESOLVE", "postgres://localhost/wms_test");
        let url = resolve_database_url(&cfg).unwrap();
        assert_eq!(url.env_var, "WMS_TEST_DB_URL_RESOLVE");
        assert_eq!(url.expose(), "postgres://localhost/wms_test");
        assert!(!format!("{url:?}").contains("localhost"));
    }

    #[test]
    fn missing_variable_reports_name_only() {
        let cfg = serde_json::json!({ "database": { "url_env": "WMS_TEST_DB_URL_UNSET_XYZ" } });
        std::env::remove_var("WMS_TEST_DB_URL_UNSET_XYZ");
        let err = resolve_database_url(&cfg).unwrap_err().to_string();
        assert!(err.contains("WMS_TEST_DB_URL_UNSET_XYZ"));
    }

    #[test]
    fn default_variable_name() {
        assert_eq!(env_var_name(&serde_json::json!({})), DEFAULT_DATABASE_URL_ENV);
    }
}
