pub mod bind;
pub mod catalog;
mod error;
mod pool;
mod store;
pub mod value;

pub use error::*;
pub use pool::*;
pub use store::PgStore;
