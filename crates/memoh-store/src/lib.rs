pub mod db;
pub mod store;
pub mod types;

pub use store::SqliteMessageStore;
pub use types::{NewMessage, PersistedMessage};
