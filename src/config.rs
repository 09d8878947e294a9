use std::env;
use std::net::IpAddr;

use crate::error::ConfigError;
use crate::usecases::history_buckets::{
    BucketOptions, DEFAULT_DISPLAY_OFFSET_HOURS, MAX_DISPLAY_OFFSET_HOURS,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_USDT_BRL_RATE: f64 = 5.45;
pub const DEFAULT_PORT: u16 = 3002;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub usdt_brl_rate: f64,
    pub history_offset_hours: i64,
    pub bucket_options: BucketOptions,
    pub bind_address: IpAddr,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("DASHBOARD_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let usdt_brl_rate = match lookup("USDT_BRL_RATE") {
            Some(raw) => parse_var("USDT_BRL_RATE", "a number", &raw)?,
            None => DEFAULT_USDT_BRL_RATE,
        };

        let history_offset_hours = match lookup("HISTORY_TZ_OFFSET_HOURS") {
            Some(raw) => parse_offset_hours(&raw)?,
            None => DEFAULT_DISPLAY_OFFSET_HOURS,
        };
        let bucket_options = BucketOptions::with_offset_hours(history_offset_hours)
            .ok_or_else(|| offset_error(&history_offset_hours.to_string()))?;

        let bind_address = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_address = parse_var("APP_HOST", "a valid IP address", &bind_address)?;

        let port = match lookup("APP_PORT") {
            Some(raw) => parse_var("APP_PORT", "a valid u16 value", &raw)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_url,
            usdt_brl_rate,
            history_offset_hours,
            bucket_options,
            bind_address,
            port,
        })
    }
}

const OFFSET_EXPECTED: &str = "a whole number of hours between -24 and 24";

fn offset_error(raw: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        name: "HISTORY_TZ_OFFSET_HOURS",
        expected: OFFSET_EXPECTED,
        value: raw.to_string(),
    }
}

fn parse_offset_hours(raw: &str) -> Result<i64, ConfigError> {
    let hours: i64 = parse_var("HISTORY_TZ_OFFSET_HOURS", OFFSET_EXPECTED, raw)?;
    if (-MAX_DISPLAY_OFFSET_HOURS..=MAX_DISPLAY_OFFSET_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(offset_error(raw))
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    raw: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
        name,
        expected,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.usdt_brl_rate, DEFAULT_USDT_BRL_RATE);
        assert_eq!(config.history_offset_hours, 3);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind_address.to_string(), "127.0.0.1");
    }

    #[test]
    fn strips_trailing_slash_from_api_url() {
        let config = config_from(&[("DASHBOARD_API_URL", "https://wallet.example.com/")]).unwrap();
        assert_eq!(config.api_url, "https://wallet.example.com");
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("USDT_BRL_RATE", "5.1"),
            ("HISTORY_TZ_OFFSET_HOURS", "0"),
            ("APP_HOST", "0.0.0.0"),
            ("APP_PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(config.usdt_brl_rate, 5.1);
        assert_eq!(config.bucket_options, BucketOptions::with_offset_hours(0).unwrap());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = config_from(&[("APP_PORT", "http")]).unwrap_err();
        assert_eq!(err.to_string(), "APP_PORT must be a valid u16 value, got 'http'");
        assert!(config_from(&[("USDT_BRL_RATE", "five")]).is_err());
        assert!(config_from(&[("APP_HOST", "localhost")]).is_err());
    }

    #[test]
    fn rejects_out_of_range_history_offset() {
        let err = config_from(&[("HISTORY_TZ_OFFSET_HOURS", "10000000000")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "HISTORY_TZ_OFFSET_HOURS must be a whole number of hours between -24 and 24, \
             got '10000000000'"
        );
        assert!(config_from(&[("HISTORY_TZ_OFFSET_HOURS", "9000000000000")]).is_err());
        assert!(config_from(&[("HISTORY_TZ_OFFSET_HOURS", "-25")]).is_err());

        let config = config_from(&[("HISTORY_TZ_OFFSET_HOURS", "-24")]).unwrap();
        assert_eq!(config.bucket_options.display_offset, chrono::TimeDelta::hours(-24));
    }
}
