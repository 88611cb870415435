use crate::error::{BadEnvVarSnafu, EscolaResult, ParseNumberSnafu, UnknownStorageBackendSnafu};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use std::sync::Arc;

pub const DEFAULT_SERVER_IP: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 15;

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    server_ip: String,
    storage: StorageConfig,
    default_page_size: Option<u64>,
}

#[derive(Clone, Debug)]
pub enum StorageConfig {
    Postgres {
        db_config: Arc<DbConfig>,
        max_connections: u32,
    },
    Memory,
}

impl RuntimeConfiguration {
    pub fn new() -> EscolaResult<Self> {
        Self::from_lookup(|name| dotenvy::var(name))
    }

    /// Builds the configuration from an arbitrary variable lookup, so tests don't need to touch the
    /// process environment.
    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Result<String, dotenvy::Error>,
    ) -> EscolaResult<Self> {
        let optional = |name| lookup(name).ok().filter(|value: &String| !value.is_empty());

        let server_ip = optional("ESCOLA_SERVER_IP").unwrap_or_else(|| DEFAULT_SERVER_IP.to_string());
        let default_page_size = optional("ESCOLA_PAGE_SIZE")
            .map(|size| size.parse().context(ParseNumberSnafu { name: "ESCOLA_PAGE_SIZE" }))
            .transpose()?;

        let storage = match optional("ESCOLA_STORAGE").as_deref() {
            None | Some("postgres") => StorageConfig::Postgres {
                db_config: Arc::new(DbConfig::from_lookup(&lookup)?),
                max_connections: optional("ESCOLA_MAX_CONNECTIONS")
                    .map(|max| {
                        max.parse().context(ParseNumberSnafu {
                            name: "ESCOLA_MAX_CONNECTIONS",
                        })
                    })
                    .transpose()?
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            },
            Some("memory") => StorageConfig::Memory,
            Some(other) => {
                return UnknownStorageBackendSnafu { found: other }.fail();
            }
        };

        Ok(Self {
            server_ip,
            storage,
            default_page_size,
        })
    }

    #[cfg(test)]
    pub fn in_memory(default_page_size: Option<u64>) -> Self {
        Self {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            storage: StorageConfig::Memory,
            default_page_size,
        }
    }

    pub fn server_ip(&self) -> &str {
        &self.server_ip
    }

    pub const fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub const fn default_page_size(&self) -> Option<u64> {
        self.default_page_size
    }
}

#[derive(Debug)]
pub struct DbConfig {
    user: String,
    password: SecretString,
    path: String,
    port: u16,
    database: String,
}

impl DbConfig {
    fn from_lookup(
        lookup: &impl Fn(&'static str) -> Result<String, dotenvy::Error>,
    ) -> EscolaResult<Self> {
        let get_env_var = |name| lookup(name).context(BadEnvVarSnafu { name });

        Ok(Self {
            user: get_env_var("DB_USER")?,
            password: SecretString::from(get_env_var("DB_PASSWORD")?),
            path: get_env_var("DB_PATH")?,
            port: get_env_var("DB_PORT")?
                .parse()
                .context(ParseNumberSnafu { name: "DB_PORT" })?,
            database: get_env_var("DB_NAME")?,
        })
    }

    pub fn get_db_path(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.path,
            self.port,
            self.database
        )
    }
}
