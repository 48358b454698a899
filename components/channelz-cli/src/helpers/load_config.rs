// Local crates
use crate::channelz::{traversal::DEFAULT_RETRY_BASE_TIMEOUT, tree::DEFAULT_MAX_EXPANSION_DEPTH};

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Optional `channelzcli` settings file. Every field is defaulted and command-line
/// flags take precedence over whatever is set here.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub traversal: TraversalConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading channelzcli configuration file"
        );

        let config_str = match fs::read_to_string(path_ref) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read configuration file");
                return Err(e)
                    .with_context(|| format!("Failed to read config file at {:?}", path_ref));
            }
        };
        let config: Config = match toml::from_str(&config_str) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML configuration");
                return Err(e)
                    .with_context(|| format!("Failed to parse TOML from {:?}", path_ref));
            }
        };

        tracing::trace!(configuration_file_path = %path_ref.display(), "channelzcli configuration file loaded successfully");
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub addr: Option<String>,
    pub insecure: bool,
    pub connect_timeout_ms: u64,
    /// Deadline for the whole command, after which in-flight RPCs are cancelled
    pub command_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            addr: None,
            insecure: true,
            connect_timeout_ms: 5_000,
            command_timeout_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalConfig {
    pub retry_base_timeout_ms: u64,
    pub max_expansion_depth: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            retry_base_timeout_ms: u64::try_from(DEFAULT_RETRY_BASE_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

impl TraversalConfig {
    pub fn retry_base_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_base_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Emit log lines as JSON instead of human readable text
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset, e.g. `info,h2=warn`
    pub level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("channelzcli-{}-{name}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let path = write_tmp("empty", "");
        let cfg = Config::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg, Config::default());
        assert!(cfg.connection.insecure);
        assert_eq!(cfg.connection.command_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.traversal.retry_base_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.traversal.max_expansion_depth, 1);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let path = write_tmp(
            "partial",
            r#"
            [connection]
            addr = "localhost:50051"
            insecure = false

            [traversal]
            max_expansion_depth = 2

            [logging]
            level = "info"
            "#,
        );
        let cfg = Config::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg.connection.addr.as_deref(), Some("localhost:50051"));
        assert!(!cfg.connection.insecure);
        assert_eq!(cfg.connection.connect_timeout_ms, 5_000);
        assert_eq!(cfg.traversal.max_expansion_depth, 2);
        assert_eq!(cfg.traversal.retry_base_timeout_ms, 5_000);
        assert_eq!(cfg.logging.level.as_deref(), Some("info"));
        assert!(!cfg.output.json);
    }

    #[test]
    fn traversal_defaults_match_engine_constants() {
        let traversal = TraversalConfig::default();
        assert_eq!(traversal.retry_base_timeout(), DEFAULT_RETRY_BASE_TIMEOUT);
        assert_eq!(traversal.max_expansion_depth, DEFAULT_MAX_EXPANSION_DEPTH);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_tmp("unknown", "[connection]\nport = 1\n");
        let err = Config::load(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(format!("{err:#}").contains("Failed to parse TOML"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load("/nonexistent/channelzcli.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
