pub mod cache;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod policy;
pub mod provider;
pub mod selector;
pub mod types;
pub mod version;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, WardenError};
