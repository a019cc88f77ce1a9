//! Server configuration.
//!
//! The configuration lives in a JSON file (`./config/lpbackend.json` by
//! default). Loading is forgiving: a missing file is created with
//! defaults, missing options fall back to their defaults and are reported
//! as [`LoadNotice`]s, and the file is rewritten canonicalised after every
//! successful load so hand-edited files converge to the full set of
//! options.
//!
//! Load notices are returned to the caller instead of being logged here:
//! whether logging is colourised depends on the loaded configuration, so
//! the logging sink is only initialized afterwards.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "./config/lpbackend.json";

/// Every recognized configuration option, as a dotted JSON path.
const KNOWN_OPTIONS: &[&str] = &[
    "logging.color_logging",
    "networking.listen_address",
    "networking.listen_port",
    "networking.timeout_milliseconds",
    "ssl.certificate",
    "ssl.private_key",
    "ssl.tmp_dh",
    "ssl.force_ssl",
    "asio.worker_threads",
    "http.doc_root",
    "http.fallback_file",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingSection,
    pub networking: NetworkingSection,
    pub ssl: SslSection,
    pub asio: AsioSection,
    pub http: HttpSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Colourise the log sink.
    pub color_logging: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            color_logging: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkingSection {
    pub listen_address: String,
    pub listen_port: u16,
    /// Idle timeout hint. Advisory: carried in the file but not enforced
    /// as a per-request deadline.
    pub timeout_milliseconds: u64,
}

impl Default for NetworkingSection {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 443,
            timeout_milliseconds: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslSection {
    /// Server certificate chain, PEM.
    pub certificate: PathBuf,
    /// Private key, unencrypted PEM.
    pub private_key: PathBuf,
    /// DH parameter file. Accepted for compatibility; the TLS backend
    /// ships its own key-exchange groups and does not read it.
    pub tmp_dh: PathBuf,
    /// Reject cleartext connections instead of serving them.
    pub force_ssl: bool,
}

impl Default for SslSection {
    fn default() -> Self {
        Self {
            certificate: PathBuf::from("./ssl/cert.pem"),
            private_key: PathBuf::from("./ssl/key.pem"),
            tmp_dh: PathBuf::from("./ssl/dh.pem"),
            force_ssl: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsioSection {
    /// Size of the worker thread pool driving the scheduler.
    pub worker_threads: u32,
}

impl Default for AsioSection {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Root directory for served files. Created at startup.
    pub doc_root: PathBuf,
    /// File name appended to request targets ending in `/`.
    pub fallback_file: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            doc_root: PathBuf::from("./docroot"),
            fallback_file: "home.html".to_string(),
        }
    }
}

fn default_worker_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Events observed while loading, surfaced once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadNotice {
    /// The file did not exist and was created with defaults.
    Created,
    /// A recognized option was absent; its default is in effect.
    MissingOption(&'static str),
}

/// Configuration error types.
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "JSON parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// A missing file is created with defaults. After a successful load the
    /// file is rewritten canonicalised.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or rewritten.
    pub fn load(path: &Path) -> Result<(Config, Vec<LoadNotice>), ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            return Ok((config, vec![LoadNotice::Created]));
        }

        let text = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let notices = missing_options(&value);
        let config: Config = serde_json::from_value(value)?;
        config.save(path)?;
        Ok((config, notices))
    }

    /// Saves the configuration to `path`, creating parent directories as
    /// needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

fn missing_options(value: &serde_json::Value) -> Vec<LoadNotice> {
    KNOWN_OPTIONS
        .iter()
        .copied()
        .filter(|option| lookup(value, option).is_none())
        .map(LoadNotice::MissingOption)
        .collect()
}

fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}
