pub mod client;
pub mod db;

pub use client::{AddMessage, SearchRequest, SqliteMemoryClient};
