use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BotError, Result};

pub const CONFIG_ENV: &str = "REYWEN_CONFIG";
pub const TOKEN_ENV: &str = "REYWEN_TOKEN";
pub const DEFAULT_PATH: &str = "config/reywen.toml";

pub fn conf_from_file<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| BotError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str::<T>(&raw)
        .map_err(|e| BotError::Config(format!("invalid {}: {e}", path.display())))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Conf {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub auth: AuthConf,
    #[serde(default)]
    pub spam: SpamConf,
    #[serde(default)]
    pub welcome: WelcomeConf,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            auth: AuthConf::default(),
            spam: SpamConf::default(),
            welcome: WelcomeConf::default(),
        }
    }
}

impl Conf {
    /// Loads `$REYWEN_CONFIG` (or `config/reywen.toml`). A missing file is not an
    /// error, every field has a default. `$REYWEN_TOKEN` wins over the file token.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| String::from(DEFAULT_PATH));

        let mut conf = if Path::new(&path).exists() {
            conf_from_file::<Conf>(&path)?
        } else {
            tracing::warn!("{path} not found, using defaults");
            Conf::default()
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            conf.auth.token = Some(token);
        }
        conf.auth.token = conf.auth.token.filter(|token| !token.trim().is_empty());

        Ok(conf)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConf {
    #[serde(default = "default_api")]
    pub api: String,
    #[serde(default = "default_autumn")]
    pub autumn: String,
    /// Friendly name given to sessions created by the login flow.
    #[serde(default = "default_session_name")]
    pub session_name: String,
    pub token: Option<String>,
}

impl Default for AuthConf {
    fn default() -> Self {
        Self {
            api: default_api(),
            autumn: default_autumn(),
            session_name: default_session_name(),
            token: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpamConf {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Upper bound on repeats, unbounded when unset.
    pub max_repeats: Option<u32>,
}

impl Default for SpamConf {
    fn default() -> Self {
        Self {
            enabled: true,
            max_repeats: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WelcomeConf {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "enabled")]
    pub on_join: bool,
    #[serde(default = "enabled")]
    pub on_leave: bool,
    #[serde(default = "default_subtitle")]
    pub subtitle: String,
    /// TrueType/OpenType font replacing the bundled caption face.
    pub font: Option<String>,
}

impl Default for WelcomeConf {
    fn default() -> Self {
        Self {
            enabled: true,
            on_join: true,
            on_leave: true,
            subtitle: default_subtitle(),
            font: None,
        }
    }
}

fn enabled() -> bool {
    true
}
fn default_prefix() -> String {
    String::from("-")
}
fn default_api() -> String {
    String::from("https://api.revolt.chat")
}
fn default_autumn() -> String {
    String::from("https://autumn.revolt.chat")
}
fn default_session_name() -> String {
    String::from("reywen-welcome")
}
fn default_subtitle() -> String {
    String::from("to the server")
}
