pub mod error;
pub mod memory;
pub mod store;

pub use error::StorageError;
pub use memory::{MemoryObjectStore, StoredObject};
pub use store::{DynObjectStore, ObjectStore};
