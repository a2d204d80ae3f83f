//! Database access layer.
//!
//! This module provides access to mounted MongoDB collections:
//! - Connector and collection handle traits with the driver implementation
//! - Process-wide cache of collection handles
//! - Incremental JSON array streaming of cursor results
//! - BSON to JSON type mappings

pub mod cache;
pub mod connector;
pub mod stream;
pub mod types;

pub use cache::ConnectionCache;
pub use connector::{
    CollectionHandle, Connector, MongoCollectionHandle, MongoConnector, RecordStream,
    SharedHandle,
};
pub use stream::{JsonArrayStream, OpenStreams, StreamGuard, stream_results};
pub use types::{bson_to_json, document_to_json};
