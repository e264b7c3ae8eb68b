pub mod blob;
pub mod lock;
pub mod message_queue;
pub mod plan_executor;
pub mod repository;

pub use blob::*;
pub use lock::*;
pub use message_queue::*;
pub use plan_executor::*;
pub use repository::*;
