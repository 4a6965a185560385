//! Keyporter Core - Shared types library.
//!
//! This crate provides common types used across all Keyporter components:
//! - `exporter` - Entitlement extraction and claim pipeline
//! - `cli` - Command-line surface for exports and claims
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage
//! access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Canonical product, category, and redemption-result types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
