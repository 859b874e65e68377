//! Command implementations for the Quay CLI.

pub mod dev;

// Re-export execute functions for convenience
pub use dev::execute as dev_execute;
