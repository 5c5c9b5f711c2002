use core::fmt::{Debug, Display};
use std::net::SocketAddr;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "sign-up-sheet.toml";
pub const ENV_PREFIX: &str = "SUS_";

/// `database_url` selecting the in-process repository.
pub const MEMORY_DATABASE: &str = "memory";

/// Minimum length of the secret the session cookie signing key is derived from.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Either `memory` for the in-process repository or a postgres connection url.
    pub database_url: String,
    pub session_secret: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_log_filter() -> String {
    "info,sign_up_sheet_backend=debug,sign_up_sheet_database=debug,hyper=info".to_owned()
}

impl Config {
    #[must_use]
    pub fn uses_memory_database(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_address", &self.listen_address)
            .field("database_url", &self.database_url)
            .field("session_secret", &"<redacted>")
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("session_secret must be at least {MIN_SESSION_SECRET_LEN} bytes long, got {0}")]
    SessionSecretTooShort(usize),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

pub fn get_config() -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Toml::file(CONFIG_FILE))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    if config.session_secret.len() < MIN_SESSION_SECRET_LEN {
        return Err(ConfigError::SessionSecretTooShort(
            config.session_secret.len(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn reads_file_and_env_overrides_it() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                &format!(
                    r#"
                    database_url = "postgres://localhost/sign_up_sheet"
                    session_secret = "{SECRET}"
                    "#
                ),
            )?;
            jail.set_env("SUS_DATABASE_URL", "memory");

            let config = get_config().map_err(|err| err.to_string())?;
            assert!(config.uses_memory_database());
            assert_eq!(config.listen_address, default_listen_address());
            assert_eq!(config.log_filter, default_log_filter());
            Ok(())
        });
    }

    #[test]
    fn rejects_short_session_secret() {
        Jail::expect_with(|jail| {
            jail.set_env("SUS_DATABASE_URL", "memory");
            jail.set_env("SUS_SESSION_SECRET", "short");

            match get_config() {
                Err(ConfigError::SessionSecretTooShort(5)) => Ok(()),
                other => Err(format!("unexpected result: {:?}", other.map(|_| ())).into()),
            }
        });
    }

    #[test]
    fn debug_output_hides_the_secret() {
        Jail::expect_with(|jail| {
            jail.set_env("SUS_DATABASE_URL", "memory");
            jail.set_env("SUS_SESSION_SECRET", SECRET);

            let config = get_config().map_err(|err| err.to_string())?;
            assert!(!format!("{config:?}").contains(SECRET));
            Ok(())
        });
    }
}
