//! # Scout Common Library
//!
//! Shared code for the studio classification tools including:
//! - Error type used by database and configuration code
//! - Configuration loading (TOML file, environment, defaults)
//! - Taxonomy model (classification hierarchy and tag vocabularies)
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod taxonomy;
pub mod time;

pub use error::{Error, Result};
pub use taxonomy::{Hierarchy, TagEntry, Taxonomy, Vocabulary};
