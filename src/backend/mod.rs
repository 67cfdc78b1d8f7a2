pub mod client;
pub mod credentials;

pub use client::{Backend, BackendResponse, HttpBackend};
pub use credentials::Credentials;
