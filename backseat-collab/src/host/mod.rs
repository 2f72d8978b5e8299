use backseat_core::StreamingError;
use thiserror::Error;

use crate::{ProxyError, StorageError, StoreError};

mod connection;
pub use connection::*;

mod session;
pub use session::*;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Streaming(#[from] StreamingError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("Could not build the authorization url: {0}")]
    AuthorizeUrl(#[from] url::ParseError),
    /// There is no access token to act with
    #[error("Not connected to the streaming service")]
    NotConnected,
    #[error("No authorization is in progress")]
    NotAuthorizing,
    #[error("Token message from untrusted origin {0}")]
    UntrustedOrigin(String),
    #[error("Token message does not belong to this authorization")]
    StateMismatch,
    #[error("Token message is invalid: {0}")]
    InvalidTokens(String),
    #[error("{0} can't be queued")]
    InvalidUri(String),
}
