use std::str::FromStr;

use thiserror::Error;

/// HS256 keys shorter than the digest size are rejected at startup.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration `{0}`")]
    Missing(&'static str),
    #[error("invalid value `{value}` for `{key}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
}

/// Refresh-token lifetimes for the two session classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLifetimes {
    pub normal_days: i64,
    pub remember_me_days: i64,
}

impl Default for SessionLifetimes {
    fn default() -> Self {
        Self {
            normal_days: 7,
            remember_me_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub sessions: SessionLifetimes,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let defaulted = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let secret = required("JWT_SECRET")?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                value: format!("<{} bytes>", secret.len()),
            });
        }

        let sessions = SessionLifetimes {
            normal_days: positive(&lookup, "REFRESH_TTL_DAYS", 7)?,
            remember_me_days: positive(&lookup, "REFRESH_TTL_DAYS_REMEMBER_ME", 30)?,
        };
        if sessions.remember_me_days <= sessions.normal_days {
            return Err(ConfigError::Invalid {
                key: "REFRESH_TTL_DAYS_REMEMBER_ME",
                value: sessions.remember_me_days.to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: positive(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            host: defaulted("APP_HOST", "0.0.0.0"),
            port: positive(&lookup, "APP_PORT", 8080)?,
            jwt: JwtConfig {
                secret,
                issuer: defaulted("JWT_ISSUER", "PlandIA.AuthService"),
                audience: defaulted("JWT_AUDIENCE", "PlandIA.Clients"),
                access_ttl_minutes: positive(&lookup, "JWT_ACCESS_TTL_MINUTES", 15)?,
            },
            sessions,
        })
    }
}

fn positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}
