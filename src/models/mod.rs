//! Data models for the mongo reader.
//!
//! This module re-exports all model types used throughout the application.

pub mod item;
pub mod mount;
pub mod query;

// Re-export commonly used types
pub use item::{AccessLevel, Item, StoredFile};
pub use mount::{
    CreateMountInput, DEFAULT_MONGO_HOST, DEFAULT_MONGO_PORT, MountConfig, PortInput,
};
pub use query::{DEFAULT_SORT_FIELD, FilterValue, QueryDescriptor, SortDirection};
