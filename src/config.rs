use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub config: ConfigOptions,
    pub store: StoreConfig,
    pub contacts: HashMap<String, Contact>,
    #[serde(default)]
    pub targets: Vec<WatchTarget>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigOptions {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_suspension_secs")]
    pub suspension_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    pub webhook_url: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_suspension_secs() -> u64 {
    // one day
    86_400
}

fn default_check_interval_secs() -> u64 {
    300
}

/// A known notification recipient; `id` is the opaque identifier handed to
/// the messaging channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    Memory,
}

/// A named group of recipients watching one or more URLs, sharing
/// suspension configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchTarget {
    pub name: String,
    pub contacts: Vec<String>,
    pub urls: Vec<WatchUrl>,
    pub suspension_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

/// One monitored resource plus its expected condition.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchUrl {
    pub url: Url,
    pub value: String,
    #[serde(default)]
    pub kind: WatchKind,
    pub comment: Option<String>,
}

/// Closed set of watch kinds so adding one is an exhaustive-match change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    #[default]
    Text,
}

impl WatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchKind::Text => "text",
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        // if webhook_url is not set use env with dotenvy
        if config.config.webhook_url.is_none() {
            if let Ok(webhook_url) = dotenvy::var("WEBHOOK_URL") {
                config.config.webhook_url = Some(webhook_url);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Every contact named by a target must resolve to a configured contact.
    fn validate(&self) -> Result<(), Error> {
        for target in &self.targets {
            for contact in &target.contacts {
                if !self.contacts.contains_key(contact) {
                    return Err(Error::Config(format!(
                        "target '{}' contact '{contact}' not found in config",
                        target.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Default config file location: `$XDG_CONFIG_HOME/sitewatch/config.toml`,
/// falling back to the working directory.
pub fn default_path() -> PathBuf {
    dirs::config_dir().map_or_else(
        || PathBuf::from("config.toml"),
        |dir| dir.join("sitewatch").join("config.toml"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
        [config]
        request_timeout_secs = 5
        suspension_secs = 3600
        check_interval_secs = 60
        webhook_url = "https://discord.com/api/webhooks/1234567890/abcdefg"

        [store]
        type = "sqlite"
        path = "watch.db"

        [contacts.alice]
        id = "1234567890"

        [contacts.bob]
        id = "9876543210"

        [[targets]]
        name = "blog"
        contacts = ["alice", "bob"]
        suspension_secs = 600
        log_dir = "/tmp/blog-content"

        [[targets.urls]]
        url = "https://example.org/blog"
        value = "Error 404"
        kind = "text"
        comment = "old post"

        [[targets.urls]]
        url = "https://example.org/feed"
        value = "subscribe"
    "#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        write!(temp_file, "{content}").expect("Failed to write to temp file");
        temp_file
    }

    #[test]
    fn test_load_full_config() {
        let temp_file = write_config(FULL_CONFIG);
        let config = Config::load(temp_file.path()).expect("Failed to parse config");

        assert_eq!(config.config.request_timeout_secs, 5);
        assert_eq!(config.config.suspension_secs, 3600);
        assert_eq!(config.config.check_interval_secs, 60);
        assert!(matches!(config.store, StoreConfig::Sqlite { .. }));
        assert_eq!(config.contacts.len(), 2);
        assert_eq!(config.contacts["alice"].id, "1234567890");

        let target = &config.targets[0];
        assert_eq!(target.name, "blog");
        assert_eq!(target.contacts, vec!["alice", "bob"]);
        assert_eq!(target.urls.len(), 2);
        assert_eq!(target.urls[0].value, "Error 404");
        assert_eq!(target.urls[0].kind, WatchKind::Text);
        assert_eq!(target.urls[0].comment.as_deref(), Some("old post"));
        // kind defaults to text when omitted
        assert_eq!(target.urls[1].kind, WatchKind::Text);
        assert_eq!(target.urls[1].comment, None);
    }

    #[test]
    fn test_unknown_contact_is_rejected() {
        let temp_file = write_config(
            r#"
            [config]

            [store]
            type = "memory"

            [contacts.alice]
            id = "1"

            [[targets]]
            name = "blog"
            contacts = ["mallory"]

            [[targets.urls]]
            url = "https://example.org"
            value = "hello"
            "#,
        );
        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_store_type_is_rejected() {
        let temp_file = write_config(
            r#"
            [config]

            [store]
            type = "postgres"
            "#,
        );
        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_defaults_applied() {
        let temp_file = write_config(
            r#"
            [config]
            webhook_url = "https://discord.com/api/webhooks/1/a"

            [store]
            type = "memory"

            [contacts]
            "#,
        );
        let config = Config::load(temp_file.path()).expect("Failed to parse config");
        assert_eq!(config.config.request_timeout_secs, 10);
        assert_eq!(config.config.suspension_secs, 86_400);
        assert_eq!(config.config.check_interval_secs, 300);
        assert!(config.targets.is_empty());
    }
}
