mod config;
mod pkce;
mod streaming;
mod track;
mod util;

pub use config::*;
pub use pkce::*;
pub use streaming::*;
pub use track::*;
pub use util::*;
