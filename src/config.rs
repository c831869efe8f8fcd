use std::{net::SocketAddr, path::PathBuf};

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite:lucky_quiz.db";
const DEFAULT_QUESTIONS_PATH: &str = "questions.json";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Webhook {
    pub url: Url,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    /// Username of the campaign group, without the leading `@`.
    pub chat_group: String,
    pub database_url: String,
    pub questions_path: PathBuf,
    /// Entries close after this instant. No deadline means always open.
    pub deadline: Option<DateTime<Utc>>,
    pub log_level: String,
    pub webhook: Option<Webhook>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let token = get("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;
        let chat_group = get("CHAT_GROUP")
            .ok_or(ConfigError::Missing("CHAT_GROUP"))?
            .trim()
            .trim_start_matches('@')
            .to_owned();

        let deadline = get("DEADLINE")
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .ok_or_else(|| ConfigError::Invalid {
                        name: "DEADLINE",
                        reason: format!("'{raw}' is not a unix timestamp"),
                    })
            })
            .transpose()?;

        let webhook = match (get("WEBHOOK_URL"), get("WEBHOOK_ADDR")) {
            (Some(url), Some(addr)) => Some(Webhook {
                url: url.parse().map_err(|e: url::ParseError| ConfigError::Invalid {
                    name: "WEBHOOK_URL",
                    reason: e.to_string(),
                })?,
                addr: addr.parse().map_err(|e: std::net::AddrParseError| {
                    ConfigError::Invalid {
                        name: "WEBHOOK_ADDR",
                        reason: e.to_string(),
                    }
                })?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("WEBHOOK_ADDR")),
            (None, Some(_)) => return Err(ConfigError::Missing("WEBHOOK_URL")),
        };

        Ok(Self {
            token,
            chat_group,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            questions_path: get("QUESTIONS_PATH")
                .unwrap_or_else(|| DEFAULT_QUESTIONS_PATH.into())
                .into(),
            deadline,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            webhook,
        })
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map_or(true, |deadline| now <= deadline)
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = config(&[("TELOXIDE_TOKEN", "123:abc"), ("CHAT_GROUP", "@campaign")]).unwrap();
        assert_eq!(config.chat_group, "campaign");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.questions_path, PathBuf::from(DEFAULT_QUESTIONS_PATH));
        assert!(config.deadline.is_none());
        assert!(config.webhook.is_none());
        assert!(config.is_open());
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        assert!(matches!(
            config(&[("CHAT_GROUP", "g")]),
            Err(ConfigError::Missing("TELOXIDE_TOKEN"))
        ));
        assert!(matches!(
            config(&[("TELOXIDE_TOKEN", "t"), ("CHAT_GROUP", " ")]),
            Err(ConfigError::Missing("CHAT_GROUP"))
        ));
        assert!(matches!(
            config(&[("TELOXIDE_TOKEN", "t"), ("CHAT_GROUP", "g"), ("DEADLINE", "soon")]),
            Err(ConfigError::Invalid { name: "DEADLINE", .. })
        ));
        assert!(matches!(
            config(&[("TELOXIDE_TOKEN", "t"), ("CHAT_GROUP", "g"), ("WEBHOOK_URL", "https://x.io")]),
            Err(ConfigError::Missing("WEBHOOK_ADDR"))
        ));
    }

    #[test]
    fn deadline_closes_the_campaign() {
        let config = config(&[
            ("TELOXIDE_TOKEN", "t"),
            ("CHAT_GROUP", "g"),
            ("DEADLINE", "1700000000"),
            ("WEBHOOK_URL", "https://bot.example.com/hook"),
            ("WEBHOOK_ADDR", "127.0.0.1:8443"),
        ])
        .unwrap();
        let deadline = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(config.is_open_at(deadline));
        assert!(!config.is_open_at(deadline + chrono::Duration::seconds(1)));
        assert_eq!(config.webhook.unwrap().addr.port(), 8443);
    }
}
