mod config;
mod db;
mod events;
mod guest;
mod host;
mod identity;
mod presence;
mod proxy;
mod storage;
mod streaming;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use backseat_core::StreamingApi;

pub use config::*;
pub use db::*;
pub use events::*;
pub use guest::*;
pub use host::*;
pub use identity::*;
pub use presence::*;
pub use proxy::*;
pub use storage::*;
pub use streaming::*;

/// The backseat client side, handing out host and guest controllers that share one store.
pub struct Collab<Db, S> {
    store: Arc<Db>,
    storage: Arc<S>,
    config: ClientConfig,
}

impl<S> Collab<PgStore, S>
where
    S: LocalStorage,
{
    /// Connects to the postgres backend named in the config
    pub async fn connect(
        config: ClientConfig,
        storage: S,
    ) -> std::result::Result<Self, StoreError> {
        let store = PgStore::new(&config.database_url).await?;

        Ok(Self::new(store, storage, config))
    }
}

impl<Db, S> Collab<Db, S>
where
    Db: Store,
    S: LocalStorage,
{
    pub fn new(store: Db, storage: S, config: ClientConfig) -> Self {
        Self {
            store: Arc::new(store),
            storage: Arc::new(storage),
            config,
        }
    }

    pub fn store(&self) -> &Arc<Db> {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The streaming client described by the config
    pub fn streaming_client(&self) -> StreamingClient {
        StreamingClient::new(
            StreamingApi::new(self.config.streaming.clone()),
            ProxyClient::new(&self.config.proxy_url),
        )
    }

    /// Hosts the session persisted on this device, or a new one
    pub fn host<St>(
        &self,
        streaming: &Arc<St>,
    ) -> std::result::Result<Arc<SessionController<Db, S, St>>, SessionError>
    where
        St: StreamingService,
    {
        SessionController::new(&self.store, &self.storage, streaming, self.config.clone())
    }

    /// Takes part in the session named by a join url
    pub fn join(&self, join_url: &str) -> Arc<ParticipantController<Db, S>> {
        ParticipantController::new(
            &self.store,
            &self.storage,
            self.config.cadence.clone(),
            join_url,
        )
    }
}
