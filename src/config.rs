use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mail::transport::Credentials;
use crate::summarize::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const ENV_ADDRESS: &str = "EMAIL_ADDRESS";
pub const ENV_PASSWORD: &str = "EMAIL_PASSWORD";
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";

const TEMPLATE: &str = r#"# mail_digest configuration
# EMAIL_ADDRESS, EMAIL_PASSWORD and GEMINI_API_KEY in the environment
# take precedence over the values below.

# email_address = "you@gmail.com"
# email_password = "your app password"
# gemini_api_key = "..."

imap_server = "imap.gmail.com"
imap_port = 993
limit = 10
output = "email_summaries.md"
"#;

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub email_address: Option<String>,
    pub email_password: Option<String>,
    pub gemini_api_key: Option<String>,
    pub imap_server: String,
    pub imap_port: u16,
    pub mailbox: String,
    /// Most unread messages processed per run.
    pub limit: usize,
    pub output: PathBuf,
    pub model: String,
    pub api_base_url: String,
    /// Applied to every mailbox round-trip and model call.
    pub timeout_secs: u64,
    pub mark_as_read: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email_address: None,
            email_password: None,
            gemini_api_key: None,
            imap_server: "imap.gmail.com".to_string(),
            imap_port: 993,
            mailbox: "INBOX".to_string(),
            limit: 10,
            output: PathBuf::from("email_summaries.md"),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            mark_as_read: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("email_address", &self.email_address)
            .field("email_password", &redact(&self.email_password))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("imap_server", &self.imap_server)
            .field("imap_port", &self.imap_port)
            .field("mailbox", &self.mailbox)
            .field("limit", &self.limit)
            .field("output", &self.output)
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("mark_as_read", &self.mark_as_read)
            .finish()
    }
}

/// The settings a run cannot start without.
#[derive(Debug, Clone)]
pub struct Required {
    pub credentials: Credentials,
    pub api_key: String,
}

impl Config {
    /// Overlay credentials from an environment-like lookup. Blank values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_ADDRESS) {
            self.email_address = Some(v);
        }
        if let Some(v) = get(ENV_PASSWORD) {
            self.email_password = Some(v);
        }
        if let Some(v) = get(ENV_API_KEY) {
            self.gemini_api_key = Some(v);
        }
    }

    /// Check that address, password and API key are all present.
    pub fn required(&self) -> Result<Required> {
        let present = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        let address = present(&self.email_address);
        let password = present(&self.email_password);
        let api_key = present(&self.gemini_api_key);

        match (address, password, api_key) {
            (Some(address), Some(password), Some(api_key)) => Ok(Required {
                credentials: Credentials { address, password },
                api_key,
            }),
            (address, password, api_key) => {
                let missing: Vec<&str> = [
                    (address.is_none(), ENV_ADDRESS),
                    (password.is_none(), ENV_PASSWORD),
                    (api_key.is_none(), ENV_API_KEY),
                ]
                .into_iter()
                .filter_map(|(absent, key)| absent.then_some(key))
                .collect();
                Err(Error::Config(format!("missing {}", missing.join(", "))))
            }
        }
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| Error::Config("no config dir available".into()))?
        .join("mail_digest"))
}

/// Default config file location. Nothing is created on disk.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, TEMPLATE)?;
    Ok(())
}

/// Load the config file, then apply environment overrides.
///
/// With no explicit path the default location is used, and a commented
/// template is written there on first run.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut cfg = match path {
        Some(path) => read_config(path)?,
        None => {
            let path = config_path()?;
            if path.exists() {
                read_config(&path)?
            } else {
                match write_template(&path) {
                    Ok(()) => info!("created template config at {}", path.display()),
                    Err(e) => warn!("could not write template config {}: {e}", path.display()),
                }
                Config::default()
            }
        }
    };

    cfg.apply_env(|key| std::env::var(key).ok());
    Ok(cfg)
}

fn read_config(path: &Path) -> Result<Config> {
    let s = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
