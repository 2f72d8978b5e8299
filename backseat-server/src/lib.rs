use std::net::{Ipv6Addr, SocketAddr};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod callback;
mod config;
mod context;
mod docs;
mod errors;
mod queue;
mod schemas;
mod search;

pub use auth::*;
pub use config::*;
pub use context::*;
pub use errors::*;
pub use schemas::*;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Builds the proxy's routes around the given context
pub fn router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(callback::router())
        .merge(search::router())
        .merge(queue::router())
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the backseat proxy
pub async fn run_server(config: ProxyConfig) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();
    let context = ServerContext::new(&config);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}, delivering tokens to {}", addr, config.app_origin);

    axum::serve(listener, router(context).into_make_service()).await
}
