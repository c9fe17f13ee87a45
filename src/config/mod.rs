/// Database configuration and connection management
pub mod database;

/// Library policy loading from library.toml
pub mod settings;

pub use settings::{DuplicatePolicy, LibrarySettings};
