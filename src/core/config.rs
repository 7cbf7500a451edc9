//! # Configuration
//!
//! Environment-driven bot configuration (`.env` is loaded by the binary first).
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window for hot reloads
pub const DEFAULT_RELOAD_DEBOUNCE_SECS: u64 = 10;

/// Default Discord REST base used for command upload
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub discord_application_id: Option<u64>,
    pub discord_guild_id: Option<u64>,
    pub log_level: String,
    pub commands_dir: PathBuf,
    pub command_prefix: Option<String>,
    pub reload_debounce: Duration,
    pub allowed_executables: Vec<String>,
    pub api_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by `from_env` and tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("DISCORD_TOKEN must be set"))?;

        let discord_application_id = get("DISCORD_APPLICATION_ID")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("Invalid DISCORD_APPLICATION_ID '{v}': {e}"))
            })
            .transpose()?;

        let discord_guild_id = get("DISCORD_GUILD_ID")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("Invalid DISCORD_GUILD_ID '{v}': {e}"))
            })
            .transpose()?;

        let reload_debounce_secs = match get("RELOAD_DEBOUNCE_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid RELOAD_DEBOUNCE_SECS '{v}': {e}"))?,
            None => DEFAULT_RELOAD_DEBOUNCE_SECS,
        };

        let allowed_executables = get("ALLOWED_EXECUTABLES")
            .unwrap_or_else(|| "echo,sh".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            discord_token,
            discord_application_id,
            discord_guild_id,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            commands_dir: PathBuf::from(get("COMMANDS_DIR").unwrap_or_else(|| "commands".to_string())),
            command_prefix: get("COMMAND_PREFIX"),
            reload_debounce: Duration::from_secs(reload_debounce_secs),
            allowed_executables,
            api_base: get("DISCORD_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.commands_dir, PathBuf::from("commands"));
        assert_eq!(config.reload_debounce, Duration::from_secs(10));
        assert_eq!(config.allowed_executables, vec!["echo", "sh"]);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.discord_guild_id.is_none());
        assert!(config.command_prefix.is_none());
    }

    #[test]
    fn test_missing_token_is_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("DISCORD_GUILD_ID", "1234"),
            ("DISCORD_APPLICATION_ID", "99"),
            ("RELOAD_DEBOUNCE_SECS", "2"),
            ("ALLOWED_EXECUTABLES", "docker, sh ,"),
            ("COMMAND_PREFIX", "!"),
            ("DISCORD_API_BASE", "http://localhost:3000/"),
        ]))
        .unwrap();
        assert_eq!(config.discord_guild_id, Some(1234));
        assert_eq!(config.discord_application_id, Some(99));
        assert_eq!(config.reload_debounce, Duration::from_secs(2));
        assert_eq!(config.allowed_executables, vec!["docker", "sh"]);
        assert_eq!(config.command_prefix.as_deref(), Some("!"));
        assert_eq!(config.api_base, "http://localhost:3000");
    }

    #[test]
    fn test_bad_guild_id_is_error() {
        let result = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("DISCORD_GUILD_ID", "not-a-number"),
        ]));
        assert!(result.is_err());
    }
}
