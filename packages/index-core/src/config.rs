//! Flat `key=value` configuration file loader.
//!
//! Lines starting with `;` or `#` are comments. Values may be wrapped in
//! double quotes; surrounding whitespace on both key and value is trimmed.
//! This grammar is deliberately small and is not a general INI parser.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// Parsed `db_*`, crawl, and server settings shared by `spider` and `searcher`.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub start_page: String,
    pub recursion_depth: u32,
    pub server_port: u16,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw = parse_flat_kv(&contents);
        Self::from_map(&raw)
    }

    fn from_map(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| -> Result<String, ConfigError> {
            raw.get(key)
                .cloned()
                .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
        };
        let get_parsed = |key: &str| -> Result<u16, ConfigError> {
            let value = get(key)?;
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
            })
        };

        let recursion_depth_raw = get("recursion_depth")?;
        let recursion_depth: u32 =
            recursion_depth_raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "recursion_depth".to_string(),
                    value: recursion_depth_raw.clone(),
                })?;
        if recursion_depth < 1 {
            return Err(ConfigError::InvalidValue {
                key: "recursion_depth".to_string(),
                value: recursion_depth_raw,
            });
        }

        Ok(Self {
            db_host: get("db_host")?,
            db_port: get_parsed("db_port")?,
            db_name: get("db_name")?,
            db_user: get("db_user")?,
            db_password: get("db_password")?,
            start_page: get("start_page")?,
            recursion_depth,
            server_port: get_parsed("server_port")?,
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }
}

/// Parse the `key=value` grammar described above into a raw string map.
fn parse_flat_kv(contents: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        out.insert(key.to_string(), value.to_string());
    }
    out
}
