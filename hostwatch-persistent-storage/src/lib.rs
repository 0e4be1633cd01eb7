mod errors;
pub use errors::StorageError;

pub mod store;
pub use store::{Store, StoreConfig};

// Shared frame utilities (header size, CRC-checked scanning)
mod frames;
