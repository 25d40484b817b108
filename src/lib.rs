pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod gateway;
pub mod ingest;
pub mod model;

pub use config::Config;
pub use error::{ErrorKind, GatewayError};
