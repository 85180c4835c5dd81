//! Deserialization engine.
//!
//! Reconstruction is two-phase. Phase 1 ([`preprocess`]) linearly scans the
//! parsed slot list, collapses multi-hop path references to single hops and
//! collects the side tables. Phase 2 ([`Container`]) lazily materializes
//! each slot on first access, with an allocate-then-inflate two-step for
//! kinds that can participate in cycles.

pub(crate) mod preprocess;
mod container;

pub use container::{Container, ContainerOptions};
