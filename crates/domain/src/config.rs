//! Process configuration, read from the environment once at startup.

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Development,
    Production,
}

/// Backing store selector. Only the in-memory nanodb flavor exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoresType {
    NanodbMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Noop,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub env: EnvKind,
    pub stores_type: StoresType,
    pub auth_type: AuthType,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Unsupported values fail startup rather than falling back silently.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got {raw:?}")))?,
            None => DEFAULT_PORT,
        };

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let env = match get("ENV").as_deref() {
            None | Some("development") => EnvKind::Development,
            Some("production") => EnvKind::Production,
            Some(other) => {
                return Err(Error::Config(format!(
                    "ENV must be development or production, got {other:?}"
                )))
            }
        };

        let stores_type = match get("STORES_TYPE").as_deref() {
            None | Some("nanodb-memory") => StoresType::NanodbMemory,
            Some(other) => {
                return Err(Error::Config(format!("unsupported STORES_TYPE: {other:?}")))
            }
        };

        let auth_type = match get("AUTH_TYPE").as_deref() {
            None | Some("noop") => AuthType::Noop,
            Some(other) => return Err(Error::Config(format!("unsupported AUTH_TYPE: {other:?}"))),
        };

        Ok(Self {
            port,
            log_level,
            env,
            stores_type,
            auth_type,
        })
    }
}
