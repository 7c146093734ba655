//! # Tessera Testkit
//!
//! Test utilities for the Tessera adapter.
//!
//! This crate provides:
//! - Adapter fixtures for every backend, with temporary directories
//! - Property-based test generators using proptest
//! - Concurrency stress helpers
//!
//! The cross-module integration suite lives in `tests/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_testkit::prelude::*;
//!
//! #[test]
//! fn create_is_visible_after_commit() {
//!     with_each_backend(|adapter| {
//!         let ctx = RequestContext::new();
//!         adapter.transaction(&ctx, |ctx| {
//!             adapter.operations().create(Some(ctx), "posts", doc(json!({"title": "a"})))
//!         }).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use tessera_core::{
        AdapterConfig, AdapterError, BackendKind, Document, Query, RequestContext, Where,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
