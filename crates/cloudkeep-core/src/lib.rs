//! Core domain model and ports for cloudkeep.
//!
//! This crate defines the entities tracked by the backup catalog, the
//! validated value types they are built from, the port traits the rest of
//! the workspace implements ([`ports::Catalog`], [`ports::ProviderClient`]),
//! the YAML configuration, and the OAuth secrets store.

pub mod config;
pub mod domain;
pub mod ports;
pub mod secrets;

pub use config::Config;
pub use domain::errors::DomainError;
