//! CLI command implementations.

pub mod assets;
pub mod common;
pub mod config;
pub mod download;
pub mod versions;
