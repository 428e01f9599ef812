pub mod db;
pub mod directory;

pub use directory::{IdentityDirectory, SenderResolution, DEFAULT_DISPLAY_NAME};
