//! Domain Layer - Core relay types and invariants.
//!
//! Pure types with no I/O: the decoded trade tick and its broker record, the
//! subscription set and control request, and the session lifecycle.

/// Trade ticks and publish record derivation.
pub mod tick;

/// Symbol sets and upstream control requests.
pub mod subscription;

/// Session lifecycle and shared health state.
pub mod session;
