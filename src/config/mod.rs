//! Configuration Module
//!
//! Handles key configuration loading and validation.

pub mod duration;
pub mod loader;
pub mod schema;

pub use loader::{ConfigLoader, ConfigSource};
pub use schema::{BalancerSettings, KeyEntry, KeysConfig};
