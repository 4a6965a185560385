//! Keyporter exporter - entitlement extraction and claim pipeline.
//!
//! # Architecture
//!
//! Raw purchase records live in an external key-value store (an export of the
//! storefront extension's browser storage). This crate turns those records
//! into a canonical product list and drives the multi-step claim flow for
//! Humble Choice subscription bundles:
//!
//! - [`store`] - record store port, codec, and order decoding
//! - [`expiry`] - timezone-aware expiry resolution for entitlements
//! - [`products`] - raw order -> canonical [`keyporter_core::Product`]
//! - [`steam`] - owned-apps lookup with a storage-backed cache
//! - [`humble`] - authenticated storefront client (choice pages, selection,
//!   key redemption)
//! - [`choices`] - the claim orchestrator: select, then redeem, one item at
//!   a time, with per-session failure memory
//!
//! All remote calls are strictly sequential; the pipeline never redeems two
//! items concurrently. Per-item failures are captured as data on the output
//! records, per-order failures are reported through the progress callback,
//! and neither aborts the remaining work.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod choices;
pub mod config;
pub mod expiry;
pub mod html;
pub mod humble;
pub mod products;
pub mod steam;
pub mod store;

pub use choices::{ClaimSession, process_all_choices, process_choice, redeem_product};
pub use config::{Config, ConfigError};
pub use expiry::ExpiryResolver;
pub use humble::{HumbleApi, HumbleClient, HumbleError};
pub use products::products;
pub use steam::{OwnedAppsCache, OwnedAppsSource, SteamClient, SteamError};
pub use store::{
    ChoiceOrder, FileStore, KvStore, MemoryStore, Order, Tpk, find_choice_orders, load_orders,
};
