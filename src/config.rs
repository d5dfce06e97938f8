use crate::data::SchoolData;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_LOAD: u32 = 25;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("could not read seed file {path}: {source}")]
    Seed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Runtime settings, read from `TIMETABLE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub addr: SocketAddr,
    /// SQLite database the store persists to. Memory-only when unset.
    pub data_file: Option<PathBuf>,
    /// School data loaded into a database that has not been seeded yet.
    pub seed_file: Option<PathBuf>,
    /// Weekly periods above which a teacher counts as overloaded.
    pub max_recommended_load: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_file: None,
            seed_file: None,
            max_recommended_load: DEFAULT_MAX_LOAD,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let addr = value("TIMETABLE_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "TIMETABLE_ADDR",
                message: e.to_string(),
            })?;

        let max_recommended_load = match value("TIMETABLE_MAX_LOAD") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(load) if load > 0 => load,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TIMETABLE_MAX_LOAD",
                        message: format!("expected a positive number of periods, got '{}'", raw),
                    });
                }
            },
            None => DEFAULT_MAX_LOAD,
        };

        Ok(Config {
            addr,
            data_file: value("TIMETABLE_DATA_FILE").map(PathBuf::from),
            seed_file: value("TIMETABLE_SEED_FILE").map(PathBuf::from),
            max_recommended_load,
        })
    }

    /// Seed school data: the seed file when configured, otherwise an empty
    /// catalog on the default grid.
    pub fn load_seed(&self) -> Result<SchoolData, ConfigError> {
        let Some(path) = &self.seed_file else {
            return Ok(SchoolData::default());
        };
        let seed_error = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::Seed {
            path: path.clone(),
            source,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| seed_error(Box::new(e)))?;
        serde_json::from_str(&raw).map_err(|e| seed_error(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TIMETABLE_ADDR", "0.0.0.0:9000"),
            ("TIMETABLE_MAX_LOAD", "20"),
            ("TIMETABLE_DATA_FILE", "/var/lib/timetable/school.sqlite3"),
        ]))
        .unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.max_recommended_load, 20);
        assert_eq!(
            config.data_file,
            Some(PathBuf::from("/var/lib/timetable/school.sqlite3"))
        );
        assert_eq!(config.seed_file, None);
    }

    #[test]
    fn rejects_zero_load_and_bad_addr() {
        assert!(Config::from_lookup(lookup(&[("TIMETABLE_MAX_LOAD", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TIMETABLE_ADDR", "localhost")])).is_err());
    }

    #[test]
    fn seed_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"subjects":[{"id":"eng","name":"English","periodsPerWeek":5}],"classes":["JS1 gold"]}"#,
        )
        .unwrap();
        let config = Config {
            seed_file: Some(path),
            ..Config::default()
        };
        let seed = config.load_seed().unwrap();
        assert_eq!(seed.subjects.len(), 1);
        assert_eq!(seed.days.len(), 5);
        assert!(seed.periods.contains_key("LUNCH"));
    }
}
