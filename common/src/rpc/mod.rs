mod error;
mod http_client;
mod types;
mod ws_client;

pub use error::*;
pub use http_client::*;
pub use types::*;
pub use ws_client::*;
