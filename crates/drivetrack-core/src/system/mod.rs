//! # System Module
//!
//! Stage progression of drives.
//!
//! The transition logic is pure and deterministic: it reads a drive snapshot
//! plus readiness counts and returns a transition for the caller to persist.

mod stage;

pub use stage::*;
