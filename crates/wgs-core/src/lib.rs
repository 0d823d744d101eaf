//! wgs-core: Core abstractions and configuration for wgs
//!
//! This crate provides the configuration structures, error types, and
//! collaborator traits shared by the supervisor agent and its backends.

pub mod config;
pub mod error;
pub mod settings;
pub mod time;
pub mod traits;
pub mod types;

pub use error::WgsError;
pub use types::{LinkEvent, LinkState};
