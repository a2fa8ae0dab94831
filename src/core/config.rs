use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable prefix for overrides, e.g. TRP_INFRA_TR_RPC_URL.
pub const ENV_PREFIX: &str = "TRP_";
const CONFIG_FILE_NAME: &str = "conf.toml";
const TEMPLATE: &str = include_str!("../../conf.template.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    pub trigger: TriggerConfig,
    pub infra: InfraConfig,

    /// Directory the config was loaded from; also holds the history file.
    #[serde(skip)]
    pub conf_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Tokio worker threads; defaults to the CPU count.
    pub worker_threads: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            worker_threads: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// URL under which this proxy is reachable from Transmission. Ephemeral
    /// .torrent download links are built on top of it.
    #[serde(default = "default_root_url")]
    pub root_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfraConfig {
    pub tr: TrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrConfig {
    pub rpc_url: String,
    /// Seconds between torrent/peer snapshot polls.
    #[serde(default = "default_request_interval")]
    pub request_interval: u64,
    /// Accepted for compatibility; the tracker loop reuses request_interval.
    #[serde(default = "default_transfer_request_interval")]
    pub transfer_request_interval: u64,
    /// Subscription URL serving one tracker URL per line.
    #[serde(default)]
    pub sub_transfer: String,
    /// Default trackers, one URL per line.
    #[serde(default)]
    pub transfer: String,
    /// Label appended to every torrent added through the proxy.
    #[serde(default)]
    pub add_torrent_label: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_root_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_interval() -> u64 {
    5
}

fn default_transfer_request_interval() -> u64 {
    300
}

impl Config {
    /// Load `conf.toml` from the given directory, materialising it from the
    /// embedded template on first start, then apply `TRP_` environment
    /// overrides and validate.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config dir {}", dir.display()))?;
            fs::write(&path, TEMPLATE)
                .with_context(|| format!("failed to materialise {}", path.display()))?;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&content).context("failed to parse config file")?;
        config.conf_dir = dir.to_path_buf();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the filesystem. Used by tests.
    pub fn from_str(content: &str, dir: &Path) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("failed to parse config file")?;
        config.conf_dir = dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        env_string("SERVICE_LOG_LEVEL", &mut self.service.log_level);
        if let Some(threads) = env_parse::<usize>("SERVICE_WORKER_THREADS") {
            self.service.worker_threads = Some(threads);
        }

        env_string("TRIGGER_HTTP_HOST", &mut self.trigger.http.host);
        if let Some(port) = env_parse::<u16>("TRIGGER_HTTP_PORT") {
            self.trigger.http.port = port;
        }
        if let Some(timeout) = env_parse::<u64>("TRIGGER_HTTP_TIMEOUT") {
            self.trigger.http.timeout = timeout;
        }
        env_string("TRIGGER_HTTP_ROOT_URL", &mut self.trigger.http.root_url);

        env_string("INFRA_TR_RPC_URL", &mut self.infra.tr.rpc_url);
        if let Some(interval) = env_parse::<u64>("INFRA_TR_REQUEST_INTERVAL") {
            self.infra.tr.request_interval = interval;
        }
        if let Some(interval) = env_parse::<u64>("INFRA_TR_TRANSFER_REQUEST_INTERVAL") {
            self.infra.tr.transfer_request_interval = interval;
        }
        env_string("INFRA_TR_SUB_TRANSFER", &mut self.infra.tr.sub_transfer);
        env_string("INFRA_TR_TRANSFER", &mut self.infra.tr.transfer);
        env_string("INFRA_TR_ADD_TORRENT_LABEL", &mut self.infra.tr.add_torrent_label);
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.service.log_level.as_str()) {
            bail!(
                "invalid log level '{}', must be one of: trace, debug, info, warn, error",
                self.service.log_level
            );
        }

        if self.trigger.http.port == 0 {
            bail!("trigger.http.port must be greater than 0");
        }
        if self.trigger.http.timeout == 0 {
            bail!("trigger.http.timeout must be greater than 0");
        }
        if reqwest::Url::parse(&self.trigger.http.root_url).is_err() {
            bail!("trigger.http.root_url is not a valid URL: {}", self.trigger.http.root_url);
        }

        if self.infra.tr.rpc_url.is_empty() {
            bail!("infra.tr.rpc_url must not be empty");
        }
        if reqwest::Url::parse(&self.infra.tr.rpc_url).is_err() {
            bail!("infra.tr.rpc_url is not a valid URL: {}", self.infra.tr.rpc_url);
        }
        if self.infra.tr.request_interval == 0 {
            bail!("infra.tr.request_interval must be greater than 0");
        }

        Ok(())
    }
}

fn env_string(suffix: &str, target: &mut String) {
    if let Ok(value) = env::var(format!("{ENV_PREFIX}{suffix}")) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Option<T> {
    env::var(format!("{ENV_PREFIX}{suffix}"))
        .ok()
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[trigger.http]
port = 9090

[infra.tr]
rpc_url = "http://127.0.0.1:9091/transmission/rpc"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_str(MINIMAL, Path::new("/tmp")).unwrap();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.trigger.http.host, "0.0.0.0");
        assert_eq!(config.trigger.http.port, 9090);
        assert_eq!(config.trigger.http.timeout, 30);
        assert_eq!(config.infra.tr.request_interval, 5);
        assert_eq!(config.infra.tr.transfer_request_interval, 300);
        assert!(config.infra.tr.sub_transfer.is_empty());
    }

    #[test]
    fn test_template_parses() {
        let config = Config::from_str(TEMPLATE, Path::new("/tmp")).unwrap();
        assert_eq!(config.trigger.http.port, 8080);
        assert!(config.infra.tr.rpc_url.contains("transmission"));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let content = MINIMAL.to_string() + "\n[service]\nlog_level = \"loud\"\n";
        assert!(Config::from_str(&content, Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_invalid_rpc_url_rejected() {
        let content = r#"
[trigger.http]
port = 9090

[infra.tr]
rpc_url = "not a url"
"#;
        assert!(Config::from_str(content, Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let content = MINIMAL.to_string().replace(
            "rpc_url = \"http://127.0.0.1:9091/transmission/rpc\"",
            "rpc_url = \"http://127.0.0.1:9091/transmission/rpc\"\nrequest_interval = 0",
        );
        assert!(Config::from_str(&content, Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_env_override_applies() {
        let dir = std::env::temp_dir().join(format!("trp-conf-{}", uuid::Uuid::new_v4()));
        std::env::set_var("TRP_TRIGGER_HTTP_PORT", "18080");
        let config = Config::load(&dir).unwrap();
        assert_eq!(config.trigger.http.port, 18080);
        std::env::remove_var("TRP_TRIGGER_HTTP_PORT");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_first_start_materialises_template() {
        let dir = std::env::temp_dir().join(format!("trp-conf-{}", uuid::Uuid::new_v4()));
        let config = Config::load(&dir).unwrap();
        assert!(dir.join(CONFIG_FILE_NAME).exists());
        assert_eq!(config.conf_dir, dir);
        fs::remove_dir_all(dir).unwrap();
    }
}
