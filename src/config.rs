use serde::{Deserialize, Serialize};

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const PRODUCTION_ORIGINS: [&str; 2] = [
    "https://landing-page-base-drzy.onrender.com",
    "https://tudominio.com",
];
const DEVELOPMENT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8080"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment profile. Selects transport settings and whether error
/// details are echoed back to HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Account the relay authenticates as. Both halves are optional at load
/// time so the server can start and report a configuration failure per
/// request instead of refusing to boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
}

impl SenderConfig {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            pass: Some(pass.into()),
        }
    }

    /// Returns the sender address and its credential when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.user.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let pass = self.pass.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((user, pass))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub connection: Duration,
    #[serde(with = "humantime_serde")]
    pub greeting: Duration,
    #[serde(with = "humantime_serde")]
    pub socket: Duration,
}

impl Timeouts {
    pub const fn development() -> Self {
        Self {
            connection: Duration::from_secs(10),
            greeting: Duration::from_secs(10),
            socket: Duration::from_secs(15),
        }
    }

    pub const fn production() -> Self {
        Self {
            connection: Duration::from_secs(30),
            greeting: Duration::from_secs(30),
            socket: Duration::from_secs(30),
        }
    }

    /// Upper bound for a connection check: connect plus server greeting.
    pub fn verify_bound(&self) -> Duration {
        self.connection + self.greeting
    }

    /// Upper bound for a send, which may have to open a fresh connection.
    pub fn send_bound(&self) -> Duration {
        self.connection + self.greeting + self.socket
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// TLS from the first byte, usually port 465.
    Implicit,
    /// Plain connection upgraded with STARTTLS, usually port 587.
    StartTls,
    /// No encryption. Only for local mail catchers.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: Option<SmtpTls>,
    #[serde(default)]
    pub timeouts: Option<Timeouts>,
    #[serde(default = "default_true")]
    pub verify_connection: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: None,
            tls: None,
            timeouts: None,
            verify_connection: true,
        }
    }
}

impl SmtpConfig {
    pub fn port(&self, mode: Mode) -> u16 {
        self.port.unwrap_or(match mode {
            Mode::Development => 465,
            Mode::Production => 587,
        })
    }

    pub fn tls(&self, mode: Mode) -> SmtpTls {
        self.tls.unwrap_or(match mode {
            Mode::Development => SmtpTls::Implicit,
            Mode::Production => SmtpTls::StartTls,
        })
    }

    pub fn timeouts(&self, mode: Mode) -> Timeouts {
        self.timeouts.unwrap_or(match mode {
            Mode::Development => Timeouts::development(),
            Mode::Production => Timeouts::production(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            port: default_port(),
            public_dir: default_public_dir(),
            allowed_origins: Vec::new(),
            site_name: default_site_name(),
            sender: SenderConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Config {
    /// Origins accepted by the CORS layer. Falls back to the mode's
    /// defaults when none are configured.
    pub fn allowed_origins(&self) -> Vec<String> {
        let origins: Vec<String> = if self.allowed_origins.is_empty() {
            let defaults = match self.mode {
                Mode::Development => DEVELOPMENT_ORIGINS,
                Mode::Production => PRODUCTION_ORIGINS,
            };
            defaults.iter().map(ToString::to_string).collect()
        } else {
            self.allowed_origins.clone()
        };

        origins
            .into_iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    /// Builds a config purely from variables returned by `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(&lookup)?;
        Ok(config)
    }

    /// Overlays variables returned by `lookup` on top of the current values.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(mode) = lookup("APP_ENV") {
            self.mode = Mode::from_env_value(&mode);
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(dir) = lookup("PUBLIC_DIR") {
            self.public_dir = PathBuf::from(dir);
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = origins.split(',').map(ToString::to_string).collect();
        }
        if let Some(user) = lookup("SMTP_USER") {
            self.sender.user = Some(user);
        }
        if let Some(pass) = lookup("SMTP_PASS") {
            self.sender.pass = Some(pass);
        }
        if let Some(host) = lookup("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = lookup("SMTP_PORT") {
            self.smtp.port = Some(parse_var("SMTP_PORT", &port)?);
        }
        Ok(())
    }
}

fn parse_var(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidVar {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

pub fn load_config() -> Result<Config, ConfigError> {
    // Retrieve env variable
    let config_path =
        env::var("CONTACT_RELAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    let file_config = if Path::new(&config_path).exists() {
        // Try env path
        Some(read_config_file(Path::new(&config_path))?)
    } else if Path::new("config.yaml").exists() {
        // Fallback to config.yaml
        tracing::warn!(
            "Config file '{}' not found, falling back to 'config.yaml'",
            config_path
        );
        Some(read_config_file(Path::new("config.yaml"))?)
    } else if Path::new("config.example.yaml").exists() {
        // Fallback to config.example.yaml
        tracing::warn!(
            "Config file '{}' and 'config.yaml' not found, falling back to 'config.example.yaml'\
             \n This file should not be used and should be replaced with actual data",
            config_path
        );
        Some(read_config_file(Path::new("config.example.yaml"))?)
    } else {
        None
    };

    match file_config {
        Some(mut config) => {
            // Secrets and deployment settings from the environment win over the file
            config.apply_vars(env_lookup)?;
            Ok(config)
        }
        None => {
            tracing::info!(
                "No config file found, loading configuration from environment variables"
            );
            Config::from_vars(env_lookup)
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_site_name() -> String {
    "Medellín By Night Tours".to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

const fn default_true() -> bool {
    true
}
