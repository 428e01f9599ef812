pub mod config;
pub mod error;
pub mod types;

pub use config::MemohConfig;
pub use error::{MemohError, Result};
pub use types::*;
