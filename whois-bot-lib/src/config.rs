//! Configuration file parsing and management.
//!
//! Settings are resolved with this precedence (highest first):
//! 1. Environment variables (`TELEGRAM_BOT_TOKEN`, `SERVER_IP`, ...)
//! 2. Local config file (`./whois-bot.toml`) or an explicit `--config` file
//! 3. XDG config file (`$XDG_CONFIG_HOME/whois-bot/config.toml`)
//! 4. Built-in defaults
//!
//! CLI flags are applied on top by the binary.

use crate::error::BotError;
use crate::protocols::{WhoisClient, DEFAULT_WHOIS_TIMEOUT};
use crate::store::DEFAULT_RECENT_LIMIT;
use crate::types::{ClassifierPolicy, Verdict};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Registration page linked from "available" replies.
pub const DEFAULT_REGISTER_URL: &str = "https://www.hostinger.com/domain-name-search";

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest long-poll wait the Bot API honors.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(50);
const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_DATA_DIR: &str = "data";

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois: Option<WhoisSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TelegramSection {
    /// Bot API token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Bot API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Long-poll timeout (e.g. "30s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WhoisSection {
    /// "remote" (default) or "local"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Remote host that runs `whois`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// SSH user on the remote host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SSH password on the remote host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Local program used in "local" mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Lookup timeout (e.g. "20s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BotSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_recent_searches: Option<usize>,

    /// How long `/broadcast` waits for the message text (e.g. "5m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_timeout: Option<String>,
}

/// Fallback verdicts, as strings: "available", "registered" or "unknown".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClassifierSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub com_net_default: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_default: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
}

/// Where WHOIS lookups run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhoisMode {
    Remote,
    Local,
}

impl FromStr for WhoisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "ssh" => Ok(WhoisMode::Remote),
            "local" => Ok(WhoisMode::Local),
            other => Err(format!("invalid WHOIS mode '{}', use remote/local", other)),
        }
    }
}

/// Fully resolved WHOIS settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WhoisSettings {
    pub mode: WhoisMode,
    pub host: Option<String>,
    pub user: String,
    pub password: Option<String>,
    pub program: String,
    pub timeout: Duration,
}

/// Fully resolved bot configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub telegram_token: Option<String>,
    pub telegram_api_url: String,
    pub poll_timeout: Duration,
    pub whois: WhoisSettings,
    pub admin_user_id: Option<i64>,
    pub register_url: String,
    pub data_dir: PathBuf,
    pub max_recent_searches: usize,
    pub broadcast_timeout: Duration,
    pub classifier: ClassifierPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            whois: WhoisSettings {
                mode: WhoisMode::Remote,
                host: None,
                user: DEFAULT_SSH_USER.to_string(),
                password: None,
                program: "whois".to_string(),
                timeout: DEFAULT_WHOIS_TIMEOUT,
            },
            admin_user_id: None,
            register_url: DEFAULT_REGISTER_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_recent_searches: DEFAULT_RECENT_LIMIT,
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
            classifier: ClassifierPolicy::default(),
        }
    }
}

impl BotConfig {
    /// Resolve file and environment configuration over the defaults.
    pub fn resolve(file: FileConfig, env: EnvConfig) -> Result<Self, BotError> {
        let mut config = BotConfig::default();

        if let Some(telegram) = file.telegram {
            if telegram.token.is_some() {
                config.telegram_token = telegram.token;
            }
            if let Some(api_url) = telegram.api_url {
                config.telegram_api_url = api_url;
            }
            if let Some(timeout) = telegram.poll_timeout {
                config.poll_timeout = parse_setting_duration("telegram.poll_timeout", &timeout)?;
            }
        }

        if let Some(whois) = file.whois {
            if let Some(mode) = whois.mode {
                config.whois.mode = mode.parse().map_err(BotError::config)?;
            }
            if whois.host.is_some() {
                config.whois.host = whois.host;
            }
            if let Some(user) = whois.user {
                config.whois.user = user;
            }
            if whois.password.is_some() {
                config.whois.password = whois.password;
            }
            if let Some(program) = whois.program {
                config.whois.program = program;
            }
            if let Some(timeout) = whois.timeout {
                config.whois.timeout = parse_setting_duration("whois.timeout", &timeout)?;
            }
        }

        if let Some(bot) = file.bot {
            if bot.admin_user_id.is_some() {
                config.admin_user_id = bot.admin_user_id;
            }
            if let Some(url) = bot.register_url {
                config.register_url = url;
            }
            if let Some(dir) = bot.data_dir {
                config.data_dir = PathBuf::from(dir);
            }
            if let Some(limit) = bot.max_recent_searches {
                config.max_recent_searches = limit;
            }
            if let Some(timeout) = bot.broadcast_timeout {
                config.broadcast_timeout =
                    parse_setting_duration("bot.broadcast_timeout", &timeout)?;
            }
        }

        if let Some(classifier) = file.classifier {
            if let Some(v) = classifier.com_net_default {
                config.classifier.com_net_default = parse_verdict("com_net_default", &v)?;
            }
            if let Some(v) = classifier.other_default {
                config.classifier.other_default = parse_verdict("other_default", &v)?;
            }
            if let Some(v) = classifier.on_error {
                config.classifier.on_error = parse_verdict("on_error", &v)?;
            }
        }

        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: EnvConfig) {
        if env.telegram_token.is_some() {
            self.telegram_token = env.telegram_token;
        }
        if env.server_ip.is_some() {
            self.whois.host = env.server_ip;
        }
        if let Some(user) = env.ssh_user {
            self.whois.user = user;
        }
        if env.root_password.is_some() {
            self.whois.password = env.root_password;
        }
        if let Some(mode) = env.mode {
            self.whois.mode = mode;
        }
        if let Some(timeout) = env.timeout {
            self.whois.timeout = timeout;
        }
        if env.admin_user_id.is_some() {
            self.admin_user_id = env.admin_user_id;
        }
        if let Some(dir) = env.data_dir {
            self.data_dir = dir;
        }
        if let Some(url) = env.register_url {
            self.register_url = url;
        }
    }

    /// Check the resolved configuration for values that can never work.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.max_recent_searches == 0 {
            return Err(BotError::config("max_recent_searches must be at least 1"));
        }
        if self.whois.timeout.is_zero() {
            return Err(BotError::config("WHOIS timeout must be greater than zero"));
        }
        if self.poll_timeout > MAX_POLL_TIMEOUT {
            return Err(BotError::config(format!(
                "poll timeout must be at most {}s",
                MAX_POLL_TIMEOUT.as_secs()
            )));
        }
        if self.broadcast_timeout.is_zero() {
            return Err(BotError::config("broadcast timeout must be greater than zero"));
        }
        if !self.register_url.starts_with("http://") && !self.register_url.starts_with("https://")
        {
            return Err(BotError::config(format!(
                "register_url '{}' must be an http(s) URL",
                self.register_url
            )));
        }
        Ok(())
    }

    /// The bot token, or an error explaining how to set it.
    pub fn require_token(&self) -> Result<&str, BotError> {
        match self.telegram_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(BotError::config(
                "Telegram bot token is not configured. Set TELEGRAM_BOT_TOKEN or [telegram].token",
            )),
        }
    }

    /// Build the WHOIS client these settings describe.
    pub fn whois_client(&self) -> Result<WhoisClient, BotError> {
        let client = match self.whois.mode {
            WhoisMode::Remote => {
                let host = self.whois.host.as_deref().filter(|h| !h.trim().is_empty());
                let host = host.ok_or_else(|| {
                    BotError::config(
                        "Remote WHOIS host is not configured. Set SERVER_IP or [whois].host",
                    )
                })?;
                WhoisClient::remote(host, self.whois.user.as_str(), self.whois.password.clone())
            }
            WhoisMode::Local => WhoisClient::local_program(self.whois.program.as_str()),
        };
        Ok(client.with_timeout(self.whois.timeout))
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn config_map_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

fn parse_setting_duration(name: &str, value: &str) -> Result<Duration, BotError> {
    parse_duration_string(value).ok_or_else(|| {
        BotError::config(format!(
            "Invalid {} '{}'. Use format like '5s', '30s', '2m'",
            name, value
        ))
    })
}

fn parse_verdict(name: &str, value: &str) -> Result<Verdict, BotError> {
    value
        .parse()
        .map_err(|e| BotError::config(format!("classifier.{}: {}", name, e)))
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which files were loaded
    pub verbose: bool,
}

impl ConfigManager {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, BotError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BotError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BotError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Discover and merge the XDG and local configuration files.
    ///
    /// Files that exist but fail to parse are reported as errors; missing
    /// files are skipped.
    pub fn discover_and_load(&self) -> Result<FileConfig, BotError> {
        let mut merged = FileConfig::default();

        for path in [self.get_xdg_config_path(), self.get_local_config_path()]
            .into_iter()
            .flatten()
        {
            let config = self.load_file(&path)?;
            merged = merge_configs(merged, config);
            if self.verbose {
                info!(path = %path.display(), "Loaded configuration file");
            }
        }

        Ok(merged)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./whois-bot.toml", "./.whois-bot.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("whois-bot").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }
}

/// Merge two configurations; values from `higher` win field by field.
pub fn merge_configs(lower: FileConfig, higher: FileConfig) -> FileConfig {
    FileConfig {
        telegram: match (lower.telegram, higher.telegram) {
            (Some(l), Some(h)) => Some(TelegramSection {
                token: h.token.or(l.token),
                api_url: h.api_url.or(l.api_url),
                poll_timeout: h.poll_timeout.or(l.poll_timeout),
            }),
            (l, h) => h.or(l),
        },
        whois: match (lower.whois, higher.whois) {
            (Some(l), Some(h)) => Some(WhoisSection {
                mode: h.mode.or(l.mode),
                host: h.host.or(l.host),
                user: h.user.or(l.user),
                password: h.password.or(l.password),
                program: h.program.or(l.program),
                timeout: h.timeout.or(l.timeout),
            }),
            (l, h) => h.or(l),
        },
        bot: match (lower.bot, higher.bot) {
            (Some(l), Some(h)) => Some(BotSection {
                admin_user_id: h.admin_user_id.or(l.admin_user_id),
                register_url: h.register_url.or(l.register_url),
                data_dir: h.data_dir.or(l.data_dir),
                max_recent_searches: h.max_recent_searches.or(l.max_recent_searches),
                broadcast_timeout: h.broadcast_timeout.or(l.broadcast_timeout),
            }),
            (l, h) => h.or(l),
        },
        classifier: match (lower.classifier, higher.classifier) {
            (Some(l), Some(h)) => Some(ClassifierSection {
                com_net_default: h.com_net_default.or(l.com_net_default),
                other_default: h.other_default.or(l.other_default),
                on_error: h.on_error.or(l.on_error),
            }),
            (l, h) => h.or(l),
        },
    }
}

/// Settings taken from environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub telegram_token: Option<String>,
    pub server_ip: Option<String>,
    pub ssh_user: Option<String>,
    pub root_password: Option<String>,
    pub admin_user_id: Option<i64>,
    pub data_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub mode: Option<WhoisMode>,
    pub register_url: Option<String>,
}

/// Load configuration from the process environment.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut env_config = EnvConfig {
        telegram_token: non_empty("TELEGRAM_BOT_TOKEN"),
        server_ip: non_empty("SERVER_IP"),
        ssh_user: non_empty("SSH_USER"),
        root_password: non_empty("ROOT_PASSWORD"),
        data_dir: non_empty("WHOIS_BOT_DATA_DIR").map(PathBuf::from),
        register_url: non_empty("WHOIS_BOT_REGISTER_URL"),
        ..Default::default()
    };

    if let Some(val) = non_empty("ADMIN_USER_ID") {
        match val.trim().parse::<i64>() {
            Ok(id) => env_config.admin_user_id = Some(id),
            Err(_) => warn!("Invalid ADMIN_USER_ID='{}', must be a numeric user id", val),
        }
    }

    if let Some(val) = non_empty("WHOIS_BOT_TIMEOUT") {
        match parse_duration_string(&val) {
            Some(timeout) => env_config.timeout = Some(timeout),
            None => warn!(
                "Invalid WHOIS_BOT_TIMEOUT='{}', use format like '5s', '30s', '2m'",
                val
            ),
        }
    }

    if let Some(val) = non_empty("WHOIS_BOT_MODE") {
        match val.parse::<WhoisMode>() {
            Ok(mode) => env_config.mode = Some(mode),
            Err(e) => warn!("Invalid WHOIS_BOT_MODE: {}", e),
        }
    }

    env_config
}

/// Parse a duration string like "5s", "30s", "2m" or bare seconds.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    let seconds = if let Some(s) = value.strip_suffix('s') {
        s.trim().parse::<u64>().ok()
    } else if let Some(m) = value.strip_suffix('m') {
        m.trim().parse::<u64>().ok().and_then(|m| m.checked_mul(60))
    } else {
        value.parse::<u64>().ok()
    }?;

    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_env_config_from(|key| map.get(key).cloned())
    }

    #[test]
    fn test_parse_duration_string() {
        assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration_string(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration_string("invalid"), None);
        assert_eq!(parse_duration_string(&format!("{}m", u64::MAX)), None);
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::resolve(FileConfig::default(), EnvConfig::default()).unwrap();
        assert_eq!(config.register_url, DEFAULT_REGISTER_URL);
        assert_eq!(config.max_recent_searches, 5);
        assert_eq!(config.whois.user, "root");
        assert_eq!(config.whois.mode, WhoisMode::Remote);
        assert_eq!(config.classifier, ClassifierPolicy::default());
        assert_eq!(config.users_path(), PathBuf::from("data").join("users.json"));
        assert!(config.require_token().is_err());
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[telegram]
token = "123:abc"

[whois]
host = "203.0.113.7"
timeout = "45s"

[bot]
admin_user_id = 402
max_recent_searches = 3
broadcast_timeout = "2m"

[classifier]
com_net_default = "unknown"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let manager = ConfigManager::new(false);
        let file = manager.load_file(temp_file.path()).unwrap();
        let config = BotConfig::resolve(file, EnvConfig::default()).unwrap();

        assert_eq!(config.require_token().unwrap(), "123:abc");
        assert_eq!(config.whois.host.as_deref(), Some("203.0.113.7"));
        assert_eq!(config.whois.timeout, Duration::from_secs(45));
        assert_eq!(config.admin_user_id, Some(402));
        assert_eq!(config.max_recent_searches, 3);
        assert_eq!(config.broadcast_timeout, Duration::from_secs(120));
        assert_eq!(config.classifier.com_net_default, Verdict::Unknown);
        assert_eq!(config.classifier.other_default, Verdict::Registered);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = FileConfig {
            bot: Some(BotSection {
                max_recent_searches: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(BotConfig::resolve(file, EnvConfig::default()).is_err());

        let file = FileConfig {
            whois: Some(WhoisSection {
                timeout: Some("soon".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(BotConfig::resolve(file, EnvConfig::default()).is_err());

        let file = FileConfig {
            telegram: Some(TelegramSection {
                poll_timeout: Some("10m".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(BotConfig::resolve(file, EnvConfig::default()).is_err());

        let file = FileConfig {
            classifier: Some(ClassifierSection {
                on_error: Some("maybe".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(BotConfig::resolve(file, EnvConfig::default()).is_err());
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[bot\nadmin_user_id = ").unwrap();
        temp_file.flush().unwrap();

        let manager = ConfigManager::new(false);
        assert!(matches!(
            manager.load_file(temp_file.path()),
            Err(BotError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig {
            whois: Some(WhoisSection {
                host: Some("file-host".to_string()),
                ..Default::default()
            }),
            bot: Some(BotSection {
                admin_user_id: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = env_from(&[
            ("SERVER_IP", "env-host"),
            ("ROOT_PASSWORD", "pw"),
            ("ADMIN_USER_ID", "99"),
            ("WHOIS_BOT_TIMEOUT", "1m"),
            ("WHOIS_BOT_MODE", "local"),
        ]);

        let config = BotConfig::resolve(file, env).unwrap();
        assert_eq!(config.whois.host.as_deref(), Some("env-host"));
        assert_eq!(config.whois.password.as_deref(), Some("pw"));
        assert_eq!(config.admin_user_id, Some(99));
        assert_eq!(config.whois.timeout, Duration::from_secs(60));
        assert_eq!(config.whois.mode, WhoisMode::Local);
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let env = env_from(&[
            ("ADMIN_USER_ID", "not-a-number"),
            ("WHOIS_BOT_TIMEOUT", "forever"),
            ("WHOIS_BOT_MODE", "carrier-pigeon"),
            ("TELEGRAM_BOT_TOKEN", "   "),
        ]);
        assert_eq!(env, EnvConfig::default());
    }

    #[test]
    fn test_whois_client_requires_host_in_remote_mode() {
        let config = BotConfig::default();
        assert!(config.whois_client().is_err());

        let mut config = BotConfig::default();
        config.whois.host = Some("203.0.113.7".to_string());
        assert!(config.whois_client().is_ok());

        let mut config = BotConfig::default();
        config.whois.mode = WhoisMode::Local;
        assert!(config.whois_client().is_ok());
    }

    #[test]
    fn test_merge_configs() {
        let lower = FileConfig {
            whois: Some(WhoisSection {
                host: Some("low".to_string()),
                user: Some("admin".to_string()),
                ..Default::default()
            }),
            bot: Some(BotSection {
                admin_user_id: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let higher = FileConfig {
            whois: Some(WhoisSection {
                host: Some("high".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = merge_configs(lower, higher);
        let whois = merged.whois.unwrap();
        assert_eq!(whois.host.as_deref(), Some("high")); // Higher wins
        assert_eq!(whois.user.as_deref(), Some("admin")); // Lower preserved
        assert_eq!(merged.bot.unwrap().admin_user_id, Some(1));
    }
}
