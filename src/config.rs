use crate::ranking::RankingWeights;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
    pub host: String,
    pub port: u16,
    /// SQLite catalog database. Without it the catalog is memory-only and
    /// feedback endpoints answer `StorageNotReady`.
    pub database_path: Option<PathBuf>,
    /// Descriptor directories synced at startup and on a bare reload.
    pub catalog_dirs: Vec<PathBuf>,
    pub catalog_recursive: bool,
    /// Optional MCP-style endpoint synced at startup.
    pub mcp_tools_url: Option<String>,
    pub mcp_timeout_secs: u64,
    /// Directory holding `atdf_schema.json` / `enhanced_atdf_schema.json`.
    /// Bundled schemas are used when unset.
    pub schema_dir: Option<PathBuf>,
    pub shutdown_timeout_secs: u64,
    pub feedback_cap: u64,
    pub feedback_success_weight: f64,
    pub feedback_error_weight: f64,
}

impl Default for Config {
    fn default() -> Self {
        let weights = RankingWeights::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_path: None,
            catalog_dirs: Vec::new(),
            catalog_recursive: true,
            mcp_tools_url: None,
            mcp_timeout_secs: 10,
            schema_dir: None,
            shutdown_timeout_secs: 30,
            feedback_cap: weights.feedback_cap,
            feedback_success_weight: weights.feedback_success,
            feedback_error_weight: weights.feedback_error,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// `CATALOG_DIRS` uses the platform path-list separator (`:` on Unix).
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()?,
            database_path: non_empty_var("SELECTOR_DB").map(PathBuf::from),
            catalog_dirs: non_empty_var("CATALOG_DIRS")
                .map(|dirs| env::split_paths(&dirs).collect())
                .unwrap_or_default(),
            catalog_recursive: parse_bool(
                "CATALOG_RECURSIVE",
                env::var("CATALOG_RECURSIVE").ok(),
                defaults.catalog_recursive,
            )?,
            mcp_tools_url: non_empty_var("MCP_TOOLS_URL"),
            mcp_timeout_secs: env::var("MCP_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.mcp_timeout_secs.to_string())
                .parse()?,
            schema_dir: non_empty_var("SCHEMA_DIR").map(PathBuf::from),
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| defaults.shutdown_timeout_secs.to_string())
                .parse()?,
            feedback_cap: env::var("FEEDBACK_CAP")
                .unwrap_or_else(|_| defaults.feedback_cap.to_string())
                .parse()?,
            feedback_success_weight: env::var("FEEDBACK_SUCCESS_WEIGHT")
                .unwrap_or_else(|_| defaults.feedback_success_weight.to_string())
                .parse()?,
            feedback_error_weight: env::var("FEEDBACK_ERROR_WEIGHT")
                .unwrap_or_else(|_| defaults.feedback_error_weight.to_string())
                .parse()?,
        })
    }

    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_timeout_secs)
    }

    /// Ranking weights with the configured feedback overrides applied.
    pub fn ranking_weights(&self) -> RankingWeights {
        RankingWeights {
            feedback_cap: self.feedback_cap,
            feedback_success: self.feedback_success_weight,
            feedback_error: self.feedback_error_weight,
            ..RankingWeights::default()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> anyhow::Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{key} must be a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", None, true).unwrap());
        assert!(!parse_bool("X", Some("off".into()), true).unwrap());
        assert!(parse_bool("X", Some(" YES ".into()), false).unwrap());
        assert!(parse_bool("X", Some("".into()), true).unwrap());
        assert!(parse_bool("X", Some("maybe".into()), true).is_err());
    }

    #[test]
    fn test_ranking_weights_apply_feedback_overrides() {
        let config = Config {
            feedback_cap: 5,
            feedback_error_weight: 2.0,
            ..Config::default()
        };

        let weights = config.ranking_weights();
        assert_eq!(weights.feedback_cap, 5);
        assert_eq!(weights.feedback_error, 2.0);
        assert_eq!(weights.feedback_success, 0.5);
        assert_eq!(weights.tool_id_match, 3.0);
    }
}
