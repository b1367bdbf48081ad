pub mod retry;
pub mod rows;
pub mod schema;
pub mod store;

pub use retry::{PendingWrite, RetryQueue, WriteKind};
pub use store::Store;
