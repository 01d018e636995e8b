//! Deterministic test harness utilities.
//!
//! Synthetic sessions stand in for real recordings in unit tests,
//! integration tests and the `simulate` CLI command.

pub mod synthetic;

pub use synthetic::{erd_tensor, motor_montage, SessionGenerator, SyntheticConfig};
