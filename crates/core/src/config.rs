use std::{collections::BTreeMap, time::Duration};

use crate::{ConnectionError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    /// Parses the leading `major.minor.patch` digits of a server banner.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().next()?.split('.');
        let major = parse_version_component(parts.next()?)?;
        let minor = parts.next().and_then(parse_version_component).unwrap_or(0);
        let patch = parts.next().and_then(parse_version_component).unwrap_or(0);

        Some(Self {
            major,
            minor,
            patch,
        })
    }

    #[must_use]
    pub fn at_least(&self, major: u16, minor: u16) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

fn parse_version_component(raw: &str) -> Option<u16> {
    let digits = raw
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u16>().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_open: u32,
    pub max_idle: u32,
    pub conn_max_lifetime: Option<Duration>,
    pub conn_max_idle_time: Option<Duration>,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(ConnectionError::invalid_config("pool max_open must be at least 1").into());
        }
        if self.max_idle > self.max_open {
            return Err(ConnectionError::invalid_config(format!(
                "pool max_idle ({}) exceeds max_open ({})",
                self.max_idle, self.max_open
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub socket: Option<String>,
    pub application_name: Option<String>,
    pub timezone: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub pool: Option<PoolConfig>,
    pub extra: BTreeMap<String, String>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Resolves the pool sizing against a dialect default and rejects malformed values.
    pub fn resolved_pool(&self, default: PoolConfig) -> Result<PoolConfig> {
        if self.database.trim().is_empty() {
            return Err(ConnectionError::invalid_config("database must not be empty").into());
        }

        let pool = self.pool.unwrap_or(default);
        pool.validate()?;
        Ok(pool)
    }
}
