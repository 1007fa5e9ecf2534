//! Cross-layer integration tests for Brindle
//!
//! Packages are compiled against a shared catalog and run in sessions, end to
//! end: import resolution, firing order, negation, snapshots, and listeners.

mod fixtures;
mod imports;
mod sessions;
mod snapshots;
