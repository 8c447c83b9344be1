/// Configuration management
use crate::error::{BazaarError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:3000/socket";
const DEFAULT_DATA_DIR: &str = ".bazaar";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST backend (no trailing slash)
    pub api_url: String,

    /// Realtime chat endpoint
    pub socket_url: String,

    /// Directory holding the local key-value store
    pub data_dir: PathBuf,

    /// Per-request timeout for REST calls
    pub request_timeout: Duration,

    /// How long a socket request waits for its acknowledgement
    pub ack_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            request_timeout: Duration::from_secs(15),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Build config from command line flags, returning the remaining
    /// positional arguments (program name excluded).
    pub fn from_args(args: &[String]) -> Result<(Self, Vec<String>)> {
        let mut config = Config::default();
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        BazaarError::Config("--api-url requires a URL argument".to_string())
                    })?;
                    config.api_url = url.clone();
                    i += 2;
                }
                "--socket-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        BazaarError::Config("--socket-url requires a URL argument".to_string())
                    })?;
                    config.socket_url = url.clone();
                    i += 2;
                }
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        BazaarError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    config.data_dir = PathBuf::from(path);
                    i += 2;
                }
                "--ack-timeout-ms" => {
                    let ms = args.get(i + 1).ok_or_else(|| {
                        BazaarError::Config("--ack-timeout-ms requires a number".to_string())
                    })?;
                    let ms = ms.parse::<u64>().map_err(|_| {
                        BazaarError::Config("--ack-timeout-ms must be a valid number".to_string())
                    })?;
                    config.ack_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                other => {
                    positional.push(other.to_string());
                    i += 1;
                }
            }
        }

        // Env overrides (nice for scripts)
        config.apply_env(|key| std::env::var(key).ok());

        config.validate()?;
        Ok((config, positional))
    }

    /// Apply `BAZAAR_*` overrides from `lookup`; they win over flags
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BAZAAR_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("BAZAAR_SOCKET_URL") {
            self.socket_url = url;
        }
        if let Some(dir) = lookup("BAZAAR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Check that endpoints use the expected schemes
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(BazaarError::Config(format!(
                "API URL must start with http:// or https://, got {}",
                self.api_url
            )));
        }
        if !(self.socket_url.starts_with("ws://") || self.socket_url.starts_with("wss://")) {
            return Err(BazaarError::Config(format!(
                "Socket URL must start with ws:// or wss://, got {}",
                self.socket_url
            )));
        }
        Ok(())
    }

    /// REST URL for a path like `/posts/categories`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flags_and_positionals() {
        let (config, rest) = Config::from_args(&args(&[
            "bazaar",
            "u1",
            "--socket-url",
            "wss://chat.example.com/socket",
            "--ack-timeout-ms",
            "250",
            "u2",
            "Widget",
        ]))
        .unwrap();

        assert_eq!(config.socket_url, "wss://chat.example.com/socket");
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(rest, vec!["u1", "u2", "Widget"]);
    }

    #[test]
    fn test_missing_flag_value() {
        let err = Config::from_args(&args(&["bazaar", "--data-dir"])).unwrap_err();
        assert!(matches!(err, BazaarError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let config = Config {
            socket_url: "http://127.0.0.1:3000".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_api_scheme() {
        let config = Config {
            api_url: "ws://127.0.0.1:3000/api".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API URL"));
    }

    #[test]
    fn test_env_overrides_win_over_flags() {
        let (mut config, _) = Config::from_args(&args(&[
            "bazaar",
            "--api-url",
            "http://flag.example.com/api",
        ]))
        .unwrap();

        config.apply_env(|key| match key {
            "BAZAAR_API_URL" => Some("https://env.example.com/api".to_string()),
            "BAZAAR_DATA_DIR" => Some("/tmp/bazaar-env".to_string()),
            _ => None,
        });

        assert_eq!(config.api_url, "https://env.example.com/api");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/bazaar-env"));
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_is_validated() {
        let mut config = Config::default();
        config.apply_env(|key| {
            (key == "BAZAAR_SOCKET_URL").then(|| "http://127.0.0.1:3000/socket".to_string())
        });
        assert!(matches!(config.validate(), Err(BazaarError::Config(_))));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = Config {
            api_url: "https://api.example.com/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint("/posts/categories"),
            "https://api.example.com/api/posts/categories"
        );
    }
}
