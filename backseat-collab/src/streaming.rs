use async_trait::async_trait;
use backseat_core::{StreamingApi, StreamingError, Track};

use crate::{ProxyClient, ProxyError};

/// What the host needs from the streaming service
#[async_trait]
pub trait StreamingService: Send + Sync + 'static {
    /// The track playing on the account, [None] when the service has no content
    async fn currently_playing(&self, access_token: &str) -> Result<Option<Track>, StreamingError>;
    async fn enqueue(&self, access_token: &str, uri: &str) -> Result<(), ProxyError>;
    async fn search(&self, access_token: &str, query: &str) -> Result<Vec<Track>, ProxyError>;
}

/// Reads playback straight from the Web API, queue and search go through the proxy
#[derive(Debug, Clone)]
pub struct StreamingClient {
    api: StreamingApi,
    proxy: ProxyClient,
}

impl StreamingClient {
    pub fn new(api: StreamingApi, proxy: ProxyClient) -> Self {
        Self { api, proxy }
    }
}

#[async_trait]
impl StreamingService for StreamingClient {
    async fn currently_playing(&self, access_token: &str) -> Result<Option<Track>, StreamingError> {
        self.api.currently_playing(access_token).await
    }

    async fn enqueue(&self, access_token: &str, uri: &str) -> Result<(), ProxyError> {
        self.proxy.enqueue(access_token, uri).await
    }

    async fn search(&self, access_token: &str, query: &str) -> Result<Vec<Track>, ProxyError> {
        self.proxy.search(access_token, query).await
    }
}
