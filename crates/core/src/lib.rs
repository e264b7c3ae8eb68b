pub mod blob_manager;
pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use blob_manager::BlobManager;
pub use config::AppConfig;
pub use errors::*;
pub use models::*;
pub use traits::*;
