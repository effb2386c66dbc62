//! # SourceDive Common Library
//!
//! Shared code for the SourceDive contact manager including:
//! - Database initialization, migrations and repositories
//! - Privacy rules for row and field visibility
//! - CSV import/export of sources
//! - Configuration loading
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod privacy;
pub mod time;
pub mod transfer;

pub use error::{Error, Result};
pub use privacy::{PrivacyLevel, Viewer};
