//! Type definitions for the resumable state engine.
//!
//! This module contains the closed tag registry, the arena-backed value
//! model shared by both serialization directions, and the error taxonomy.

/// Type tag registry and pre-interned constants
pub mod tag;
/// Value model and arena graph
pub mod value;
/// Engine-wide error types
pub mod error;

pub use error::{Error, Result};
pub use tag::{Constant, TypeTag};
pub use value::{CellKind, DeferredState, Marker, Value, ValueGraph, ValueHandle};
