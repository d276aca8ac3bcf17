use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub db_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

fn default_port() -> u16 {
    8080
}

fn default_token_ttl_hours() -> i64 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_apply_defaults_for_optional_settings() {
        let settings = config::Config::builder()
            .set_override("db_url", "sqlite::memory:")
            .unwrap()
            .set_override("jwt_secret", "secret")
            .unwrap()
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.db_url, "sqlite::memory:");
    }

    #[test]
    fn cannot_load_without_jwt_secret() {
        let settings = config::Config::builder()
            .set_override("db_url", "sqlite::memory:")
            .unwrap()
            .build()
            .unwrap();

        assert!(settings.try_deserialize::<Config>().is_err());
    }
}
