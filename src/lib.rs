pub mod api;
pub mod backend;
pub mod config;
pub(crate) mod error;
pub mod mcp;
pub mod stream;

pub use error::{BridgeError, Result};
