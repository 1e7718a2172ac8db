//! moeplex - tools for multiplexed media containers
//!
//! This library crate exposes the command implementations for integration testing.

pub mod config;
pub mod dict;
pub mod extract;
pub mod probe;
pub mod recompress;
