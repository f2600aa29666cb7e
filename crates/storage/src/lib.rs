//! formsync-storage: persistence trait, record types and backends.

mod clock;
mod error;
mod memory;
mod record;
mod traits;

pub mod conformance;

pub use clock::{now_rfc3339, now_unix};
pub use error::StorageError;
pub use memory::{MemoryStore, SeedData};
pub use record::{OAuthStateRecord, UserRecord, OAUTH_STATE_TTL_SECS};
pub use traits::FormStore;
