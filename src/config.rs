//! Configuration management for Bookshelf server

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Placeholder secret shipped in `config/default.toml`
pub const DEFAULT_JWT_SECRET: &str = "change-this-secret-in-production";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request deadline enforced by the router
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// `postgres://...` or `memory://` for the in-process store
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url.starts_with("memory:")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Relaxes transport policy for local work (no redirect, no HSTS, no Secure cookies)
    pub development: bool,
    pub ssl_redirect: bool,
    pub hsts_seconds: u64,
    pub hsts_include_subdomains: bool,
    pub hsts_preload: bool,
    pub secure_cookies: bool,
    /// Header set by the TLS-terminating proxy
    pub proxy_ssl_header: String,
    pub content_security_policy: String,
    pub referrer_policy: String,
}

impl SecurityConfig {
    /// Settings actually applied once the development flag is taken into account
    pub fn effective(&self) -> SecurityConfig {
        let mut applied = self.clone();
        if self.development {
            applied.ssl_redirect = false;
            applied.secure_cookies = false;
            applied.hsts_seconds = 0;
            applied.hsts_include_subdomains = false;
            applied.hsts_preload = false;
        }
        applied
    }

    pub fn hsts_header(&self) -> Option<String> {
        if self.hsts_seconds == 0 {
            return None;
        }
        let mut value = format!("max-age={}", self.hsts_seconds);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.hsts_preload {
            value.push_str("; preload");
        }
        Some(value)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Built-in defaults, then the on-disk files
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Environment variables (prefix BOOKSHELF_, e.g. BOOKSHELF_SERVER__PORT)
            .add_source(
                Environment::with_prefix("BOOKSHELF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Outside development the signing secret must be replaced
    pub fn check_secrets(&self) -> Result<(), ConfigError> {
        if !self.security.development && self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::Message(
                "auth.jwt_secret still has its default value; set JWT_SECRET".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            max_connections: 10,
            min_connections: 2,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration_hours: 24,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            development: false,
            ssl_redirect: true,
            hsts_seconds: 31_536_000,
            hsts_include_subdomains: true,
            hsts_preload: true,
            secure_cookies: true,
            proxy_ssl_header: "x-forwarded-proto".to_string(),
            content_security_policy: "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
                img-src 'self' data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'; \
                form-action 'self'; base-uri 'self'"
                .to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}
