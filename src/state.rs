use crate::{
    config::{RuntimeConfiguration, StorageConfig},
    data::{StudentStore, memory::MemoryStudentStore, postgres::PostgresStudentStore},
    error::EscolaResult,
};
use sqlx::postgres::PgPoolOptions;
use std::{ops::Deref, sync::Arc};

#[derive(Clone, Debug)]
pub struct EscolaState {
    store: Arc<dyn StudentStore>,
    config: RuntimeConfiguration,
}

impl EscolaState {
    pub async fn new(config: RuntimeConfiguration) -> EscolaResult<Self> {
        let store: Arc<dyn StudentStore> = match config.storage() {
            StorageConfig::Postgres {
                db_config,
                max_connections,
            } => {
                let options = PgPoolOptions::new().max_connections(*max_connections);
                Arc::new(PostgresStudentStore::new(options, db_config).await?)
            }
            StorageConfig::Memory => {
                warn!("Using in-memory storage, students will not survive a restart");
                Arc::new(MemoryStudentStore::new())
            }
        };

        Ok(Self::with_store(store, config))
    }

    pub fn with_store(store: Arc<dyn StudentStore>, config: RuntimeConfiguration) -> Self {
        Self { store, config }
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub async fn sensible_shutdown(&self) {
        self.store.close().await;
    }
}

impl Deref for EscolaState {
    type Target = dyn StudentStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}
