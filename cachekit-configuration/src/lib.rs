#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod file;

pub use error::ConfigError;
pub use file::{ConfigurationFile, MethodPolicyEntry, WatchedConfigurationFile};
