pub mod dynamo;
pub mod error;
pub mod kv;
pub mod ledger;
pub mod memory;
pub mod messages;
pub mod metadata;
pub mod preferences;
pub mod prices;
pub mod sessions;

pub use dynamo::DynamoStore;
pub use error::{Result, StoreError};
pub use kv::{Item, KvStore, Page, QuerySpec, WriteOp};
pub use ledger::{CostLedger, LedgerEntry};
pub use memory::MemoryStore;
pub use messages::MessageStore;
pub use metadata::MetadataStore;
pub use preferences::{CustomAgent, Preferences};
pub use sessions::{SessionRecord, SessionStore};
