//! Profile-driven front-end for the tablestorm harness
//!
//! Exposed as a library so integration tests and embedders can load profiles
//! and drive runs without going through the binary.

pub mod config;
pub mod driver;

pub use config::ProfileConfig;
pub use driver::{run_profile, run_profile_with_cancel, RunReport};
