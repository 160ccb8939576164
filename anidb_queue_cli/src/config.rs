//! Layered configuration for the daemon
//!
//! Values come from [`QueueClientConfig::default`], then the TOML file, then
//! `ANIDB_QUEUE_*` environment variables (`__` separates nested keys, so
//! `ANIDB_QUEUE_ANIDB__USERNAME` sets `anidb.username`). The `config`
//! subcommands edit the TOML file only.

use anidb_queue_core::QueueClientConfig;
use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Confirm, Input, Password};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ANIDB_QUEUE_";

/// Keys that have no default and so are missing from the default tree
const OPTIONAL_STRING_KEYS: [&str; 2] = ["anidb.username", "anidb.password"];

const PASSWORD_KEY: &str = "anidb.password";

const MASK: &str = "********";

/// Mistakes in a `config` subcommand
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("'{0}' is not set")]
    NotSet(String),

    #[error("'{0}' is a section, not a value")]
    Section(String),
}

/// Reads and edits one configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Manager for the default XDG configuration file
    pub fn new() -> Self {
        Self {
            config_path: crate::paths::config_path(),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn figment(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(QueueClientConfig::default()));
        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Defaults, file and environment merged
    pub fn load(&self) -> Result<QueueClientConfig> {
        self.figment().extract().with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }

    /// Effective value of `key` in dot notation; the password is masked
    pub fn get(&self, key: &str) -> Result<String> {
        let tree = to_tree(&self.load()?)?;
        match lookup(&tree, key) {
            Some(toml::Value::Table(_)) => Err(ConfigError::Section(key.to_string()).into()),
            Some(value) => Ok(display_value(key, value)),
            None if OPTIONAL_STRING_KEYS.contains(&key) => {
                Err(ConfigError::NotSet(key.to_string()).into())
            }
            None => Err(ConfigError::UnknownKey(key.to_string()).into()),
        }
    }

    /// Write `key = value` to the file
    ///
    /// The value is typed after the default it replaces and the resulting
    /// file must still load, so typos never reach the daemon.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed = parse_value(key, value)?;
        let mut document = self.read_file()?;

        let parts: Vec<&str> = key.split('.').collect();
        let (last, sections) = parts
            .split_last()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let mut table = &mut document;
        for section in sections {
            let entry = table
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            table = match entry {
                toml::Value::Table(inner) => inner,
                _ => return Err(ConfigError::UnknownKey(key.to_string()).into()),
            };
        }
        table.insert(last.to_string(), parsed);

        let content = toml::to_string_pretty(&document)?;
        Figment::from(Serialized::defaults(QueueClientConfig::default()))
            .merge(Toml::string(&content))
            .extract::<QueueClientConfig>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    /// Every effective value, sorted by key; the password is masked
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let tree = to_tree(&self.load()?)?;
        let mut items = Vec::new();
        collect_values(&tree, String::new(), &mut items);
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    fn read_file(&self) -> Result<toml::Table> {
        if !self.config_path.exists() {
            return Ok(toml::Table::new());
        }
        let content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read {}", self.config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("{} is not valid TOML", self.config_path.display()))
    }
}

fn to_tree(config: &QueueClientConfig) -> Result<toml::Value> {
    let text = toml::to_string(config)?;
    Ok(toml::from_str(&text)?)
}

fn lookup<'a>(tree: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.').try_fold(tree, |node, part| match node {
        toml::Value::Table(table) => table.get(part),
        _ => None,
    })
}

fn display_value(key: &str, value: &toml::Value) -> String {
    if key == PASSWORD_KEY {
        return MASK.to_string();
    }
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect_values(value: &toml::Value, prefix: String, items: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_values(val, path, items);
            }
        }
        other => {
            let shown = display_value(&prefix, other);
            items.push((prefix, shown));
        }
    }
}

/// Parse `value` as the type of the default at `key`
fn parse_value(key: &str, value: &str) -> Result<toml::Value> {
    if OPTIONAL_STRING_KEYS.contains(&key) {
        return Ok(toml::Value::String(value.to_string()));
    }
    let defaults = to_tree(&QueueClientConfig::default())?;
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let parsed = match lookup(&defaults, key) {
        None => return Err(ConfigError::UnknownKey(key.to_string()).into()),
        Some(toml::Value::Table(_)) => return Err(ConfigError::Section(key.to_string()).into()),
        Some(toml::Value::Integer(_)) => {
            let number: i64 = value.parse().map_err(|_| invalid("expected an integer"))?;
            if number < 0 {
                return Err(invalid("must not be negative").into());
            }
            toml::Value::Integer(number)
        }
        Some(toml::Value::Boolean(_)) => {
            toml::Value::Boolean(value.parse().map_err(|_| invalid("expected true or false"))?)
        }
        Some(toml::Value::Float(_)) => {
            toml::Value::Float(value.parse().map_err(|_| invalid("expected a number"))?)
        }
        Some(_) => toml::Value::String(value.to_string()),
    };
    Ok(parsed)
}

/// Prompt for the account and client registration, then save them
pub fn interactive_init(manager: &mut ConfigManager, force: bool) -> Result<()> {
    println!("{}", "AniDB queue setup".bold());
    println!("{}", "=================".bold());
    println!();

    let current = manager.load().ok();
    let configured = current
        .as_ref()
        .is_some_and(|c| c.anidb.login_target().is_ok());
    if configured && !force {
        let reconfigure = Confirm::new()
            .with_prompt("Credentials are already configured. Reconfigure?")
            .default(false)
            .interact()
            .context("Failed to read input")?;
        if !reconfigure {
            println!("Setup cancelled.");
            return Ok(());
        }
    }

    println!("This daemon needs:");
    println!("  • An AniDB account (create at https://anidb.net)");
    println!("  • A registered UDP client (register at https://anidb.net/software/add)");
    println!();

    println!("{}", "AniDB account".bold());
    let mut username = Input::<String>::new().with_prompt("Username");
    if let Some(existing) = current.as_ref().and_then(|c| c.anidb.username.clone()) {
        username = username.default(existing);
    }
    let username = username
        .interact_text()
        .context("Failed to read username")?;
    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;
    println!();

    println!("{}", "Client registration".bold());
    println!("Client names are case sensitive.");
    let defaults = current.unwrap_or_default();
    let client_name: String = Input::new()
        .with_prompt("Client name")
        .default(defaults.anidb.client_name)
        .interact_text()
        .context("Failed to read client name")?;
    let client_version: String = Input::new()
        .with_prompt("Client version")
        .default(defaults.anidb.client_version)
        .validate_with(|input: &String| -> Result<(), &str> {
            input
                .parse::<u32>()
                .map(|_| ())
                .map_err(|_| "Must be a positive integer")
        })
        .interact_text()
        .context("Failed to read client version")?;

    manager.set("anidb.username", &username)?;
    manager.set(PASSWORD_KEY, &password)?;
    manager.set("anidb.client_name", &client_name)?;
    manager.set("anidb.client_version", &client_version)?;

    println!();
    println!("{}", "✓ Configuration saved".green());
    println!("  {}", manager.config_path().display());
    println!();
    println!("Start the daemon with: anidb-queue run");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigManager {
        ConfigManager::with_path(dir.path().join("config.toml"))
    }

    #[test]
    fn test_values_are_typed_after_their_default() {
        assert_eq!(
            parse_value("anidb.port", "9001").unwrap(),
            toml::Value::Integer(9001)
        );
        assert_eq!(
            parse_value("mylist.add_files", "false").unwrap(),
            toml::Value::Boolean(false)
        );
        assert_eq!(
            parse_value("anidb.client_version", "3").unwrap(),
            toml::Value::String("3".to_string())
        );
        assert!(parse_value("anidb.port", "many").is_err());
        assert!(parse_value("anidb.port", "-1").is_err());
        assert!(parse_value("anidb.nonsense", "1").is_err());
        assert!(parse_value("anidb", "1").is_err());
    }

    #[test]
    fn test_password_is_masked() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir);
        manager.set("anidb.password", "hunter2").unwrap();

        assert_eq!(manager.get("anidb.password").unwrap(), MASK);
        let listed = manager.list().unwrap();
        let password = listed.iter().find(|(k, _)| k == "anidb.password").unwrap();
        assert_eq!(password.1, MASK);
        assert!(fs::read_to_string(manager.config_path()).unwrap().contains("hunter2"));
    }

    #[test]
    fn test_unset_username_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = manager(&dir).get("anidb.username").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotSet(_))
        ));
    }
}
