use anyhow::{Context, Result};
use chrono::FixedOffset;

use crate::clock::DayZone;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Host timezone unless `ACADEMY_UTC_OFFSET` pins a fixed offset.
    pub day_zone: DayZone,
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(val) => val
                .parse()
                .context("Failed to parse DATABASE_MAX_CONNECTIONS")?,
            None => 5,
        };

        let day_zone = match lookup("ACADEMY_UTC_OFFSET") {
            Some(val) => DayZone::Fixed(
                parse_offset(&val).context("Failed to parse ACADEMY_UTC_OFFSET")?,
            ),
            None => DayZone::Local,
        };

        let history_limit = match lookup("ACADEMY_HISTORY_LIMIT") {
            Some(val) => val.parse().context("Failed to parse ACADEMY_HISTORY_LIMIT")?,
            None => 10,
        };

        Ok(Config {
            database_url,
            max_connections,
            day_zone,
            history_limit,
        })
    }
}

/// Accepts `Z`, `UTC`, or `+HH:MM` / `-HH:MM`.
pub fn parse_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("invalid zero offset");
    }
    value
        .parse::<FixedOffset>()
        .with_context(|| format!("Unknown UTC offset: {}", value))
}
