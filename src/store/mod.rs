//! User-data store: delegated credentials, caption overrides, daily usage.

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, StoreSeed};
pub use traits::UserStore;
