//! One-time storage migrations.
//!
//! Moves sensitive values from the plaintext store into the encrypted store.
//! A persisted version number gates which steps run; it advances, and the
//! legacy plaintext keys are deleted, only after every step of a run
//! succeeded, so a failed run is safe to retry.

mod runner;

pub use runner::{MigrationReport, MigrationRunner, MigrationStep, Payload, DEFAULT_STEPS, VERSION_KEY};
