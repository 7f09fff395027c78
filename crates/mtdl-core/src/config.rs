//! Configuration file (`~/.config/mtdl/config.toml`) and sectioned get/set access.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of simultaneous downloads.
pub const DEFAULT_MAX_DOWNLOADS: usize = 3;
/// Default number of segments per download.
pub const DEFAULT_SPLIT_NUM: usize = 8;

fn default_max_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_downloads() -> usize {
    DEFAULT_MAX_DOWNLOADS
}

fn default_split_num() -> usize {
    DEFAULT_SPLIT_NUM
}

/// `[download]` section: admission limits and destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSection {
    /// Maximum concurrent range-fetch workers across all downloads.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Maximum downloads in flight at once.
    #[serde(default = "default_max_downloads")]
    pub max_downloads: usize,
    /// Number of segments each download is split into.
    #[serde(default = "default_split_num")]
    pub split_num: usize,
    /// Destination directory; when unset the platform download directory is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
    /// Receive buffer (chunk) size for workers in bytes (None = 16 KiB).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_bytes: Option<usize>,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            split_num: DEFAULT_SPLIT_NUM,
            download_path: None,
            buffer_bytes: None,
        }
    }
}

/// Retry policy parameters (optional `[retry]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per worker (including the first).
    pub max_attempts: u32,
    /// Admission cycles a failing length probe is retried before the download fails.
    pub max_probe_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_probe_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Network timeouts (optional `[network]` section). Every probe and range
/// fetch is bounded by these so a hung server cannot hold a slot forever.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    /// Hard limit for each probe request. Probes run on the control thread,
    /// so a slow server delays reap and dispatch by up to twice this.
    pub probe_timeout_secs: u64,
    /// Abort a transfer slower than this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
    /// Hard limit for a single range fetch attempt.
    pub transfer_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            probe_timeout_secs: 15,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            transfer_timeout_secs: 3600,
        }
    }
}

/// Global configuration loaded from `~/.config/mtdl/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtdlConfig {
    #[serde(default)]
    pub download: DownloadSection,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional network timeouts; if missing, built-in defaults are used.
    #[serde(default)]
    pub network: Option<NetworkConfig>,
}

impl MtdlConfig {
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn network_or_default(&self) -> NetworkConfig {
        self.network.unwrap_or_default()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_threads == 0 {
            bail!("download.max_threads must be greater than 0");
        }
        if self.download.max_downloads == 0 {
            bail!("download.max_downloads must be greater than 0");
        }
        if self.download.split_num == 0 {
            bail!("download.split_num must be at least 1");
        }
        if self.download.buffer_bytes == Some(0) {
            bail!("download.buffer_bytes must be greater than 0");
        }
        // libcurl reads 0 as "no limit".
        if let Some(net) = &self.network {
            for (key, secs) in [
                ("connect_timeout_secs", net.connect_timeout_secs),
                ("probe_timeout_secs", net.probe_timeout_secs),
                ("low_speed_time_secs", net.low_speed_time_secs),
                ("transfer_timeout_secs", net.transfer_timeout_secs),
            ] {
                if secs == 0 {
                    bail!("network.{} must be greater than 0", key);
                }
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mtdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MtdlConfig> {
    ConfigStore::open(&config_path()?).map(|store| store.config)
}

/// A config file plus its parsed contents. `set` persists the whole file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: MtdlConfig,
}

impl ConfigStore {
    /// Open the store at the default XDG location.
    pub fn open_default() -> Result<Self> {
        Self::open(&config_path()?)
    }

    /// Open (or create with defaults) the config file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            let store = Self {
                path: path.to_path_buf(),
                config: MtdlConfig::default(),
            };
            store.save()?;
            tracing::info!("created default config at {}", path.display());
            return Ok(store);
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: MtdlConfig =
            toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &MtdlConfig {
        &self.config
    }

    /// Value of `section.key` rendered as a string.
    pub fn get(&self, section: &str, key: &str) -> Result<String> {
        let cfg = &self.config;
        let retry = cfg.retry_or_default();
        let net = cfg.network_or_default();
        let value = match (section, key) {
            ("download", "max_threads") => cfg.download.max_threads.to_string(),
            ("download", "max_downloads") => cfg.download.max_downloads.to_string(),
            ("download", "split_num") => cfg.download.split_num.to_string(),
            ("download", "download_path") => crate::paths::download_directory(cfg)?
                .display()
                .to_string(),
            ("download", "buffer_bytes") => cfg
                .download
                .buffer_bytes
                .unwrap_or(crate::transport::DEFAULT_BUFFER_BYTES)
                .to_string(),
            ("retry", "max_attempts") => retry.max_attempts.to_string(),
            ("retry", "max_probe_attempts") => retry.max_probe_attempts.to_string(),
            ("retry", "base_delay_secs") => retry.base_delay_secs.to_string(),
            ("retry", "max_delay_secs") => retry.max_delay_secs.to_string(),
            ("network", "connect_timeout_secs") => net.connect_timeout_secs.to_string(),
            ("network", "probe_timeout_secs") => net.probe_timeout_secs.to_string(),
            ("network", "low_speed_limit_bytes") => net.low_speed_limit_bytes.to_string(),
            ("network", "low_speed_time_secs") => net.low_speed_time_secs.to_string(),
            ("network", "transfer_timeout_secs") => net.transfer_timeout_secs.to_string(),
            _ => bail!("unknown config key {}.{}", section, key),
        };
        Ok(value)
    }

    /// Parse and store `section.key = value`, then write the file.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut next = self.config.clone();
        let mut retry = next.retry_or_default();
        let mut net = next.network_or_default();
        match (section, key) {
            ("download", "max_threads") => next.download.max_threads = parse(section, key, value)?,
            ("download", "max_downloads") => {
                next.download.max_downloads = parse(section, key, value)?
            }
            ("download", "split_num") => next.download.split_num = parse(section, key, value)?,
            ("download", "download_path") => {
                next.download.download_path = Some(PathBuf::from(value))
            }
            ("download", "buffer_bytes") => {
                next.download.buffer_bytes = Some(parse(section, key, value)?)
            }
            ("retry", "max_attempts") => retry.max_attempts = parse(section, key, value)?,
            ("retry", "max_probe_attempts") => {
                retry.max_probe_attempts = parse(section, key, value)?
            }
            ("retry", "base_delay_secs") => retry.base_delay_secs = parse(section, key, value)?,
            ("retry", "max_delay_secs") => retry.max_delay_secs = parse(section, key, value)?,
            ("network", "connect_timeout_secs") => {
                net.connect_timeout_secs = parse(section, key, value)?
            }
            ("network", "probe_timeout_secs") => {
                net.probe_timeout_secs = parse(section, key, value)?
            }
            ("network", "low_speed_limit_bytes") => {
                net.low_speed_limit_bytes = parse(section, key, value)?
            }
            ("network", "low_speed_time_secs") => {
                net.low_speed_time_secs = parse(section, key, value)?
            }
            ("network", "transfer_timeout_secs") => {
                net.transfer_timeout_secs = parse(section, key, value)?
            }
            _ => bail!("unknown config key {}.{}", section, key),
        }
        match section {
            "retry" => next.retry = Some(retry),
            "network" => next.network = Some(net),
            _ => {}
        }
        next.validate()?;
        self.config = next;
        self.save()?;
        tracing::info!(section, key, value, "config saved");
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(&self.config)?;
        fs::write(&self.path, toml)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}.{}: {}", value, section, key, e))
}
