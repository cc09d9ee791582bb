use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

/// Settings shared by token issuance (login) and validation (`AuthUser`).
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiration_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://eshop.db?mode=rwc".to_string());
        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("APP_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let secret = lookup("JWT_SECRET").context("JWT_SECRET is not set")?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        let jwt = JwtConfig {
            secret,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "EShop".to_string()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "EShopUsers".to_string()),
            expiration_minutes: lookup("JWT_EXPIRATION_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|m| *m > 0)
                .unwrap_or(60),
        };

        Ok(Self {
            database_url,
            max_connections,
            host,
            port,
            jwt,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.database_url, "sqlite://eshop.db?mode=rwc");
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.jwt.issuer, "EShop");
        assert_eq!(config.jwt.audience, "EShopUsers");
        assert_eq!(config.jwt.expiration_minutes, 60);
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(AppConfig::from_lookup(lookup_from(&[])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "  ")])).is_err());
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("APP_PORT", "not-a-port"),
            ("JWT_EXPIRATION_MINUTES", "-5"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt.expiration_minutes, 60);
    }
}
