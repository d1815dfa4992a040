//! Configuration for the runtime dispatch table.

pub mod runtime;

// Re-export key items
pub use runtime::{runtime_config, LibrarySet, RuntimeConfig, RuntimeConfigBuilder};
