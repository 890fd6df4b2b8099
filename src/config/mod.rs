//! Configuration module for the wiki backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::engine::EngineOptions;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Author recorded on commits when the caller gives none
    pub default_author: String,
    /// Email recorded on commits when the caller gives none
    pub default_email: String,
    /// Characters kept on each side of the first match in search previews
    pub preview_radius: usize,
    /// Search requests are cancelled after this many milliseconds
    pub search_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("WIKI_DB_PATH")
            .unwrap_or_else(|_| "./data/wiki.sqlite".to_string())
            .into();

        let bind_addr = env::var("WIKI_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .expect("Invalid WIKI_BIND_ADDR format");

        let log_level = env::var("WIKI_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let default_author =
            env::var("WIKI_DEFAULT_AUTHOR").unwrap_or_else(|_| "MD Wiki User".to_string());
        let default_email = env::var("WIKI_DEFAULT_EMAIL")
            .unwrap_or_else(|_| "user@md-wiki.example".to_string());

        let preview_radius = env::var("WIKI_PREVIEW_RADIUS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let search_timeout_ms = env::var("WIKI_SEARCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        Self {
            db_path,
            bind_addr,
            log_level,
            default_author,
            default_email,
            preview_radius,
            search_timeout_ms,
        }
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            default_author: self.default_author.clone(),
            default_email: self.default_email.clone(),
            preview_radius: self.preview_radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("WIKI_DB_PATH");
        env::remove_var("WIKI_BIND_ADDR");
        env::remove_var("WIKI_LOG_LEVEL");
        env::remove_var("WIKI_DEFAULT_AUTHOR");
        env::remove_var("WIKI_DEFAULT_EMAIL");
        env::remove_var("WIKI_PREVIEW_RADIUS");
        env::remove_var("WIKI_SEARCH_TIMEOUT_MS");

        let config = Config::from_env();

        assert_eq!(config.db_path, PathBuf::from("./data/wiki.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.default_author, "MD Wiki User");
        assert_eq!(config.default_email, "user@md-wiki.example");
        assert_eq!(config.preview_radius, 100);
        assert_eq!(config.search_timeout_ms, 5_000);

        let options = config.engine_options();
        assert_eq!(options.preview_radius, 100);
        assert_eq!(options.default_author, "MD Wiki User");
    }
}
