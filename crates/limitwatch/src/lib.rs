//! Public facade crate for `limitwatch`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `limitwatch-core`.

pub use limitwatch_core::*;
