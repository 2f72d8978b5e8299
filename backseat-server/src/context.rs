use std::sync::Arc;

use backseat_core::StreamingApi;

use crate::ProxyConfig;

#[derive(Clone)]
pub struct ServerContext {
    pub streaming: Arc<StreamingApi>,
    pub app_origin: Arc<str>,
}

impl ServerContext {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            streaming: Arc::new(StreamingApi::new(config.streaming.clone())),
            app_origin: config.app_origin.as_str().into(),
        }
    }
}
