//! Runtime configuration of the collector.
//!
//! The configuration is read from a TOML file named by `BLOCKCOV_CONFIG`, then individual options are overridden by
//! environment variables:
//!
//! | Environment variable | Option |
//! |----------------------|--------|
//! | `BLOCKCOV_OUTPUT` | `output` |
//! | `BLOCKCOV_MERGE` | `merge` |
//! | `BLOCKCOV_SERVER` | `server` |
//! | `BLOCKCOV_SAVE_ATTEMPTS` | `save-attempts` |
//! | `BLOCKCOV_RETRY_DELAY_MS` | `retry-delay-ms` |
//! | `BLOCKCOV_CALLER_FILTER` | `caller-filter` |
//!
//! Malformed values are logged and ignored.

#[cfg(all(feature = "serde", feature = "toml"))]
use error::*;
use snapshot::{FileSink, ResultSink, TcpSink};

use std::env;
use std::fmt::Display;
#[cfg(all(feature = "serde", feature = "toml"))]
use std::fs::File;
#[cfg(all(feature = "serde", feature = "toml"))]
use std::io::Read;
#[cfg(all(feature = "serde", feature = "toml"))]
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Options of a [`Collector`].
///
/// [`Collector`]: ../collector/struct.Collector.html
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "kebab-case"))]
pub struct Config {
    /// Number of counters allocated up front.
    pub initial_capacity: usize,
    /// How many times a snapshot is offered to the sink before giving up.
    pub save_attempts: u32,
    /// Pause between two attempts.
    pub retry_delay_ms: u64,
    /// File receiving the snapshots.
    pub output: Option<PathBuf>,
    /// Whether `output` accumulates snapshots instead of being overwritten.
    pub merge: bool,
    /// `host:port` of a collecting server. Takes precedence over `output`.
    pub server: Option<String>,
    /// Whether tagged hits are checked against the expected caller of the thread.
    pub caller_filter: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            initial_capacity: 1024,
            save_attempts: 3,
            retry_delay_ms: 100,
            output: None,
            merge: false,
            server: None,
            caller_filter: false,
        }
    }
}

impl Config {
    /// Parses a TOML configuration. Missing options keep their default.
    #[cfg(all(feature = "serde", feature = "toml"))]
    pub fn from_toml_str(s: &str) -> Result<Config> {
        Ok(::toml::from_str(s)?)
    }

    /// Reads a TOML configuration file.
    #[cfg(all(feature = "serde", feature = "toml"))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let mut content = String::new();
        File::open(path)?.read_to_string(&mut content)?;
        Config::from_toml_str(&content).chain_err(|| format!("cannot parse configuration {}", path.display()))
    }

    /// Reads the configuration from the environment.
    pub fn from_env() -> Config {
        let mut config = load_env_file().unwrap_or_default();
        config.override_with(|name| env::var(name).ok());
        config
    }

    /// Overrides options from `BLOCKCOV_*` variables, looked up with `var`.
    pub fn override_with<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(output) = var("BLOCKCOV_OUTPUT") {
            self.output = Some(PathBuf::from(output));
        }
        if let Some(server) = var("BLOCKCOV_SERVER") {
            self.server = Some(server);
        }
        if let Some(merge) = parse_var("BLOCKCOV_MERGE", &var) {
            self.merge = merge;
        }
        if let Some(attempts) = parse_var("BLOCKCOV_SAVE_ATTEMPTS", &var) {
            self.save_attempts = attempts;
        }
        if let Some(delay) = parse_var("BLOCKCOV_RETRY_DELAY_MS", &var) {
            self.retry_delay_ms = delay;
        }
        if let Some(filter) = parse_var("BLOCKCOV_CALLER_FILTER", &var) {
            self.caller_filter = filter;
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Creates the sink described by this configuration, if any.
    pub fn sink(&self) -> Option<Box<ResultSink>> {
        let sink: Box<ResultSink> = if let Some(ref server) = self.server {
            Box::new(TcpSink::new(server.clone()))
        } else {
            let path = self.output.clone()?;
            if self.merge {
                Box::new(FileSink::merging(path))
            } else {
                Box::new(FileSink::new(path))
            }
        };
        Some(sink)
    }
}

#[cfg(all(feature = "serde", feature = "toml"))]
fn load_env_file() -> Option<Config> {
    let path = env::var_os("BLOCKCOV_CONFIG")?;
    match Config::load(&path) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("ignoring configuration {:?}: {}", path, e);
            None
        },
    }
}

#[cfg(not(all(feature = "serde", feature = "toml")))]
fn load_env_file() -> Option<Config> {
    None
}

fn parse_var<T, F>(name: &str, var: &F) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = var(name)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("ignoring {}={:?}: {}", name, value, e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    use std::path::PathBuf;

    #[test]
    #[cfg(all(feature = "serde", feature = "toml"))]
    fn test_toml() {
        let config = Config::from_toml_str(
            r#"
                save-attempts = 5
                output = "/tmp/results.bcov"
                caller-filter = true
            "#,
        ).unwrap();
        assert_eq!(config.save_attempts, 5);
        assert_eq!(config.output, Some(PathBuf::from("/tmp/results.bcov")));
        assert!(config.caller_filter);
        assert_eq!(config.retry_delay_ms, Config::default().retry_delay_ms);

        assert!(Config::from_toml_str("save-attempts = \"many\"").is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::default();
        config.override_with(|name| match name {
            "BLOCKCOV_OUTPUT" => Some("out.bcov".to_owned()),
            "BLOCKCOV_SAVE_ATTEMPTS" => Some(" 7 ".to_owned()),
            "BLOCKCOV_RETRY_DELAY_MS" => Some("soon".to_owned()),
            "BLOCKCOV_MERGE" => Some("true".to_owned()),
            _ => None,
        });
        assert_eq!(config.output, Some(PathBuf::from("out.bcov")));
        assert_eq!(config.save_attempts, 7);
        assert_eq!(config.retry_delay_ms, 100);
        assert!(config.merge);
        assert!(config.sink().is_some());
        assert!(Config::default().sink().is_none());
    }
}
