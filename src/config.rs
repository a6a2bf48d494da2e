//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::str::FromStr;

use anyhow::Context;

use crate::dashboard::DEFAULT_MIN_RISK;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MIN_RISK: &str = "ACADEMIC_RISK_MIN_RISK";
pub const LOG_FORMAT: &str = "ACADEMIC_RISK_LOG_FORMAT";
pub const MAX_CONNECTIONS: &str = "ACADEMIC_RISK_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Parses an alert threshold, which must lie in `0..=1`.
pub fn parse_min_risk(raw: &str) -> Result<f64, String> {
    let parsed: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("min risk must be a number, got '{raw}'"))?;
    if (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("min risk must be between 0 and 1, got {parsed}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub min_risk: f64,
    pub log_format: LogFormat,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            min_risk: DEFAULT_MIN_RISK,
            log_format: LogFormat::Text,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let min_risk = match value(MIN_RISK) {
            Some(raw) => parse_min_risk(&raw).map_err(anyhow::Error::msg)?,
            None => defaults.min_risk,
        };

        let log_format: LogFormat = match value(LOG_FORMAT) {
            Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            None => defaults.log_format,
        };

        let max_connections: u32 = match value(MAX_CONNECTIONS) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{MAX_CONNECTIONS} must be a positive integer"))?,
            None => defaults.max_connections,
        };
        anyhow::ensure!(
            max_connections > 0,
            "{MAX_CONNECTIONS} must be a positive integer, got 0"
        );

        Ok(Self {
            database_url: value(DATABASE_URL),
            min_risk,
            log_format,
            max_connections,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance for this command")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.min_risk, 0.4);
        assert!(config.database_url().is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            (DATABASE_URL, "postgres://localhost/risk"),
            (MIN_RISK, "0.6"),
            (LOG_FORMAT, "JSON"),
            (MAX_CONNECTIONS, "12"),
        ])
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/risk");
        assert_eq!(config.min_risk, 0.6);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_connections, 12);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[(MIN_RISK, "high")]).is_err());
        assert!(config(&[(MIN_RISK, "1.5")]).is_err());
        assert!(config(&[(LOG_FORMAT, "xml")]).is_err());
        assert!(config(&[(MAX_CONNECTIONS, "-1")]).is_err());
        assert!(config(&[(MAX_CONNECTIONS, "0")]).is_err());
    }

    #[test]
    fn min_risk_flag_shares_the_range_check() {
        assert_eq!(parse_min_risk(" 0.55 "), Ok(0.55));
        assert_eq!(parse_min_risk("0"), Ok(0.0));
        assert_eq!(parse_min_risk("1"), Ok(1.0));
        assert!(parse_min_risk("1.2").is_err());
        assert!(parse_min_risk("-0.1").is_err());
        assert!(parse_min_risk("NaN").is_err());
        assert!(parse_min_risk("high").is_err());
    }
}
