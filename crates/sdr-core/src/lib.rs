//! Shared types, configuration, and error kinds for the SolarPrime SDR engine.
//!
//! Every other crate in the workspace depends on this one and only this one
//! for cross-cutting vocabulary: identifiers, the funnel `Stage` enum, the
//! qualification/emotional-read value types, and `SolarPrimeConfig`.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CoreError, Result};
