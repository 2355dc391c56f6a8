pub mod error;
pub mod memory;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use query::{bind_named, KpiQuery, ParamValue};
pub use store::{KpiStore, QuestStore, StoreConfig};
