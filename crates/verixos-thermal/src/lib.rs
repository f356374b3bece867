//! # VeriXOS Thermal
//!
//! Spacecraft thermal network simulator: a lumped-mass thermal solver with
//! orbital environment heating, energy-balance accounting, finite-difference
//! sensitivities and enumerated failure-case sweeps.
//!
//! thermal@: this crate models nodes interconnected by conduction, contact,
//! heat-pipe and radiation couplings under time-varying and orbital loads,
//! and computes their temperatures either as a function of time (transient)
//! or at equilibrium (steady state).
//!
//! ## Overview
//!
//! - **Model** ([`model`]) — the declarative node/conductor/load graph.
//! - **Operator** ([`operator`]) — the validated, solve-ready view of a model.
//! - **Orbital geometry** ([`orbital`]) — eclipse factor and per-surface view factors.
//! - **Transient stepper** ([`transient`]) — adaptive implicit ODE integration.
//! - **Steady-state solver** ([`steady`]) — damped Newton equilibrium solve.
//! - **Energy accountant** ([`energy`]) — Q_in/Q_rad/ΔE_stored bookkeeping.
//! - **Sensitivity engine** ([`sensitivity`]) — ∂T/∂p finite differencing.
//! - **Failure-case dispatcher** ([`failure`]) — named model mutations and sweeps.
//! - **Results** ([`results`]) — histories, `.vxm` serialization, CSV export.
//!
//! ## Example
//!
//! ```rust
//! use verixos_thermal::model::*;
//! use verixos_thermal::run_steady_state;
//!
//! let model = Model {
//!     nodes: vec![
//!         Node { id: "space".into(), initial_temperature_k: 3.0, kind: NodeKind::Boundary { boundary_temperature_k: 3.0 } },
//!         Node { id: "bus".into(), initial_temperature_k: 280.0, kind: NodeKind::Diffusion {
//!             capacitance_j_k: 500.0, area_m2: 1.0, absorptivity: 0.3, emissivity: 0.85, mass_kg: None,
//!         }},
//!     ],
//!     conductors: vec![Conductor {
//!         id: "radiator".into(), node_from: "bus".into(), node_to: "space".into(),
//!         law: ConductorLaw::Radiation { area_m2: 0.5, view_factor: 1.0, emissivity_eff: 0.85 },
//!         tag: None,
//!     }],
//!     heat_loads: vec![HeatLoad { id: "avionics".into(), node_id: "bus".into(), kind: HeatLoadKind::Constant { watts: 40.0 }, is_heater: false }],
//!     orbital_config: None,
//! };
//!
//! let env = EnvironmentPreset::default();
//! let ss_config = SteadyStateConfig { max_iterations: 50, tolerance: 1e-6, reference_time_s: 0.0 };
//! let result = run_steady_state(&model, &env, &ss_config).unwrap();
//! println!("bus equilibrium temperature: {:.2} K", result.temperatures_k["bus"]);
//! ```
//!
//! ## Links
//!
//! - [Documentation](https://docs.rs/verixos-thermal)
//! - [GitHub](https://github.com/verixos/verixos-rust)

#![doc(html_root_url = "https://docs.rs/verixos-thermal/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod concurrency;
pub mod energy;
pub mod error;
pub mod failure;
pub mod loads;
pub mod model;
pub mod operator;
pub mod orbital;
pub mod residual;
pub mod results;
pub mod sensitivity;
pub mod steady;
pub mod transient;

pub use concurrency::{CancellationToken, RunDeadline, WorkerPool};
pub use error::{Result, ThermalError};
pub use failure::{run_failure_sweep, FailureCase, NodeLimit};
pub use model::Model;
pub use operator::{Operator, StateIndex};
pub use results::{
    FailureSweepResult, History, ParameterRef, SensitivityResult, SteadyStateResult, TransientResult,
};
pub use sensitivity::run_sensitivity;
pub use steady::run_steady_state;
pub use transient::run_transient;

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
