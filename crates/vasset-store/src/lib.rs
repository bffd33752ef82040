//! # vasset-store
//!
//! Persistent local tier of the broker's cache hierarchy.
//!
//! Asset metadata and asset data are immutable once minted by the origin, so
//! anything found here can be served without revalidation. Lists are never
//! stored.

pub mod lmdb;

pub use lmdb::{AssetStore, StoreError, StoreResult};
