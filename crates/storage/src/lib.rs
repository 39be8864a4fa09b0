pub mod conformance;
pub mod dump;
mod error;
mod memory;
pub mod migration;
mod record;
mod traits;

pub use dump::{parse_dump, StoreDump, SCHEMA_VERSION};
pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use migration::{add_is_screened_column, MigrationError, MigrationReport};
pub use record::{EventRecord, NewEvent, NewResult, Recipient, ResultRecord};
pub use traits::TrackingStorage;
