//! # VeriXOS
//!
//! Shared foundation for the VeriXOS spacecraft thermal simulation stack.
//!
//! This crate hosts the cross-cutting pieces `verixos-thermal` (and any other
//! VeriXOS crate) builds on: physical constants, the generic validation
//! error, and process-wide ambient configuration. It carries no simulation
//! logic itself — that lives in `verixos-thermal`.
//!
//! ## Modules
//!
//! - [`types`] — shared physical constants and identifier aliases
//! - [`error`] — generic validation error
//! - [`config`] — ambient, process-wide configuration (worker pool sizing, etc.)
//!
//! ## Links
//!
//! - [Documentation](https://docs.rs/verixos)
//! - [GitHub](https://github.com/verixos/verixos-rust)

#![doc(html_root_url = "https://docs.rs/verixos/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use error::ValidationError;
pub use types::{
    ConductorId, NodeId, EARTH_ALBEDO, EARTH_IR, EARTH_MU, EARTH_RADIUS_KM, MIN_PHYSICAL_TEMP_K,
    SOLAR_CONSTANT, STEFAN_BOLTZMANN,
};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
