//! CLI command implementations.

pub mod join;
pub mod share;
pub mod show_config;
