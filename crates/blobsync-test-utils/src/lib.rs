//! Shared test fixtures for the blobsync workspace.
//!
//! This crate is a dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`memory`] — [`MemoryReplica`], an in-process replica with a settable
//!   clock and fault injection
//! - [`tree`] — [`TestTree`] builder for on-disk local roots

pub mod memory;
pub mod tree;

pub use memory::{Fault, MemoryReplica};
pub use tree::TestTree;
