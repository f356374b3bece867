//! Declarative thermal network model.
//!
//! thermal@: This is the only mutable-looking surface in the crate, and even
//! it isn't: a [`Model`] is built once by the caller and treated as immutable
//! for the duration of a run. Failure-case and sensitivity sweeps clone it
//! and mutate the clone; the original is never touched (§3 Lifecycle).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verixos::{NodeId, ConductorId, EARTH_ALBEDO, EARTH_IR, SOLAR_CONSTANT};

/// Orbital surface-flux target for an [`HeatLoadKind::Orbital`] load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "surface", rename_all = "snake_case")]
pub enum SurfaceType {
    /// Always normal to the sun vector (e.g. a gimbaled solar array).
    SolarTracking,
    /// Normal fixed toward nadir (Earth-facing).
    EarthFacing,
    /// Normal fixed away from nadir.
    AntiEarth,
    /// Fixed body-frame normal, given in the orbit frame.
    CustomNormal {
        /// Outward unit normal `[x, y, z]` in the orbit frame.
        normal: [f64; 3],
    },
    /// Incident flux averaged isotropically over all attitudes.
    ///
    /// Used by the `attitude_loss_tumble` failure case (§4.9) rather than
    /// written directly by model authors.
    IsotropicAverage,
}

/// One orbital-facing surface's optical and geometric properties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalSurface {
    /// How the surface is pointed relative to the orbit frame.
    pub surface_type: SurfaceType,
    /// Solar absorptivity (0.0-1.0).
    pub absorptivity: f64,
    /// Infrared emissivity (0.0-1.0).
    pub emissivity: f64,
    /// Surface area in square meters.
    pub area_m2: f64,
}

/// Variant of a [`Node`]'s thermal behavior (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Integrated node: one row in the operator, governed by `C*dT/dt = Q_net`.
    Diffusion {
        /// Thermal capacitance in J/K. Must be strictly positive.
        capacitance_j_k: f64,
        /// Radiating/absorbing area in m^2.
        area_m2: f64,
        /// Solar absorptivity (0.0-1.0).
        absorptivity: f64,
        /// Infrared emissivity (0.0-1.0).
        emissivity: f64,
        /// Optional mass, carried for reporting only (not used by the solver).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mass_kg: Option<f64>,
    },
    /// Instantaneous node: its row enforces `0 = Sum(Q)` with no storage term.
    Arithmetic {
        /// Radiating/absorbing area in m^2.
        area_m2: f64,
        /// Solar absorptivity (0.0-1.0).
        absorptivity: f64,
        /// Infrared emissivity (0.0-1.0).
        emissivity: f64,
    },
    /// Fixed-temperature node; its row is held at `boundary_temperature_k` for all time.
    Boundary {
        /// Fixed temperature in Kelvin.
        boundary_temperature_k: f64,
    },
}

/// A lumped thermal mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque stable identifier.
    pub id: NodeId,
    /// Initial temperature in Kelvin (ignored for boundary nodes; their
    /// temperature is always `boundary_temperature_k`).
    pub initial_temperature_k: f64,
    /// Node variant and its physical attributes.
    pub kind: NodeKind,
}

/// Physical law and coefficients of a [`Conductor`] (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConductorLaw {
    /// `Q = G*(T_a - T_b)`.
    Linear {
        /// Conductance in W/K.
        conductance_w_k: f64,
    },
    /// Same law as `Linear`, distinguished only for reporting/failure-case matching.
    Contact {
        /// Conductance in W/K.
        conductance_w_k: f64,
    },
    /// `Q = emissivity_eff * sigma * area * view_factor * (T_a^4 - T_b^4)`.
    Radiation {
        /// Radiating area in m^2. Must be non-negative.
        area_m2: f64,
        /// Geometric view factor in [0, 1]. Must be non-negative.
        view_factor: f64,
        /// Effective emissivity. Must be non-negative.
        emissivity_eff: f64,
    },
    /// `Q = G(T_avg)*(T_a - T_b)`, with `G` from a piecewise-linear table in `T_avg`.
    HeatPipe {
        /// `(temperature_k, conductance_w_k)` pairs, strictly increasing in temperature.
        table: Vec<(f64, f64)>,
    },
}

/// A directed-but-symmetric thermal coupling between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conductor {
    /// Opaque stable identifier.
    pub id: ConductorId,
    /// Source node id (sign convention: positive flow is `node_from -> node_to`).
    pub node_from: NodeId,
    /// Destination node id.
    pub node_to: NodeId,
    /// Physical law and coefficients.
    pub law: ConductorLaw,
    /// Free-form classification tag (e.g. `"mli"`), used by failure-case
    /// mutations such as `mli_degradation` to select matching conductors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Variant of an [`HeatLoad`] (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeatLoadKind {
    /// A fixed wattage, independent of time.
    Constant {
        /// Heat input in watts (may be negative to model a heat sink).
        watts: f64,
    },
    /// Time series with linear interpolation and flat extrapolation at the ends.
    PiecewiseLinear {
        /// `(time_s, watts)` samples, strictly increasing in time.
        samples: Vec<(f64, f64)>,
    },
    /// Flux driven by orbital geometry (§4.2), evaluated against the run's
    /// [`crate::model::OrbitalConfig`] and [`crate::model::EnvironmentPreset`].
    Orbital {
        /// Surface pointing, optical properties and area.
        surface: OrbitalSurface,
    },
}

/// A heat source or sink attached to exactly one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatLoad {
    /// Opaque stable identifier.
    pub id: String,
    /// The node this load is attached to.
    pub node_id: NodeId,
    /// Load variant.
    pub kind: HeatLoadKind,
    /// Marks this as a heater load for the `heater_failure` failure case (§4.9).
    #[serde(default)]
    pub is_heater: bool,
}

/// Orbital parameters driving the environment sampler (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalConfig {
    /// Circular-orbit altitude above Earth's surface in kilometers.
    pub altitude_km: f64,
    /// Orbital inclination in degrees.
    pub inclination_deg: f64,
    /// Right ascension of the ascending node in degrees.
    pub raan_deg: f64,
    /// Absolute epoch the orbital elements are referenced to.
    pub epoch: DateTime<Utc>,
    /// Eclipse penumbra ramp width in seconds of orbital time. Defaults to
    /// `verixos::config::Config::default_penumbra_s` (60s) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penumbra_width_s: Option<f64>,
}

/// Scalar environmental fluxes at the satellite (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPreset {
    /// Solar flux at the satellite's distance from the sun, in W/m^2.
    pub solar_flux_w_m2: f64,
    /// Earth bond albedo, in [0, 1].
    pub bond_albedo: f64,
    /// Earth infrared flux at the satellite, in W/m^2.
    pub earth_ir_w_m2: f64,
    /// Eclipse penumbra ramp width in seconds, used by [`crate::orbital::eclipse_factor`]
    /// when an [`OrbitalConfig::penumbra_width_s`] override is absent. Defaults to
    /// `verixos::config::Config::default().default_penumbra_s` (60s, or
    /// `VERIXOS_PENUMBRA_S` when set).
    pub default_penumbra_s: f64,
}

impl Default for EnvironmentPreset {
    fn default() -> Self {
        Self {
            solar_flux_w_m2: SOLAR_CONSTANT,
            bond_albedo: EARTH_ALBEDO,
            earth_ir_w_m2: EARTH_IR,
            default_penumbra_s: verixos::config::Config::default().default_penumbra_s,
        }
    }
}

/// Backward Euler vs. Crank-Nicolson selector for the transient stepper (§4.5; see DESIGN.md Open Question (c)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Stiff-stable, first order. The default.
    #[default]
    BackwardEuler,
    /// Second order, less numerically damped; selected explicitly by callers.
    CrankNicolson,
}

/// Transient run configuration (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Start time in seconds.
    pub t_start_s: f64,
    /// End time in seconds.
    pub t_end_s: f64,
    /// Initial step size in seconds.
    pub initial_step_s: f64,
    /// Newton and step-acceptance tolerance.
    pub tolerance: f64,
    /// Output sampling interval in seconds.
    pub output_grid_s: f64,
    /// Minimum permitted adaptive step size in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_min_s: Option<f64>,
    /// Maximum permitted adaptive step size in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_max_s: Option<f64>,
    /// Maximum Newton iterations per step attempt. Defaults to 20.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_newton_iterations: Option<usize>,
    /// Backward Euler (default) or Crank-Nicolson.
    #[serde(default)]
    pub integration_method: IntegrationMethod,
}

impl SimulationConfig {
    /// Resolve `h_min_s`, falling back to a small fraction of the initial step.
    pub fn resolved_h_min(&self) -> f64 {
        self.h_min_s.unwrap_or(self.initial_step_s * 1e-6).max(1e-9)
    }

    /// Resolve `h_max_s`, falling back to the full run span.
    pub fn resolved_h_max(&self) -> f64 {
        self.h_max_s.unwrap_or((self.t_end_s - self.t_start_s).max(self.initial_step_s))
    }

    /// Resolve the Newton iteration cap, defaulting to 20 (§4.5).
    pub fn resolved_max_newton_iterations(&self) -> usize {
        self.max_newton_iterations.unwrap_or(20)
    }
}

/// Steady-state solve configuration (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateConfig {
    /// Maximum damped-Newton outer iterations.
    pub max_iterations: usize,
    /// Convergence tolerance on `||R||_inf`.
    pub tolerance: f64,
    /// Reference time passed to the load evaluator (orbital/time-varying
    /// loads are frozen at this instant for the steady solve).
    pub reference_time_s: f64,
}

/// The declarative thermal network (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// All nodes, in the order the caller wishes discovery/indexing to follow.
    pub nodes: Vec<Node>,
    /// All conductors. Duplicates between the same pair of nodes are legal
    /// (parallel physical paths) and are preserved, not merged.
    pub conductors: Vec<Conductor>,
    /// All heat loads.
    pub heat_loads: Vec<HeatLoad>,
    /// Orbital parameters, required only if any heat load is `Orbital`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbital_config: Option<OrbitalConfig>,
}

impl Model {
    /// True if any heat load requires orbital geometry to evaluate.
    pub fn needs_orbital_geometry(&self) -> bool {
        self.heat_loads
            .iter()
            .any(|l| matches!(l.kind, HeatLoadKind::Orbital { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(id: &str, t: f64) -> Node {
        Node {
            id: id.to_string(),
            initial_temperature_k: t,
            kind: NodeKind::Boundary {
                boundary_temperature_k: t,
            },
        }
    }

    fn diffusion(id: &str, c: f64, t0: f64) -> Node {
        Node {
            id: id.to_string(),
            initial_temperature_k: t0,
            kind: NodeKind::Diffusion {
                capacitance_j_k: c,
                area_m2: 0.0,
                absorptivity: 0.0,
                emissivity: 0.0,
                mass_kg: None,
            },
        }
    }

    #[test]
    fn needs_orbital_geometry_detects_orbital_loads() {
        let model = Model {
            nodes: vec![boundary("a", 300.0), diffusion("b", 100.0, 300.0)],
            conductors: vec![],
            heat_loads: vec![HeatLoad {
                id: "hl1".into(),
                node_id: "b".into(),
                kind: HeatLoadKind::Orbital {
                    surface: OrbitalSurface {
                        surface_type: SurfaceType::EarthFacing,
                        absorptivity: 0.8,
                        emissivity: 0.85,
                        area_m2: 0.01,
                    },
                },
                is_heater: false,
            }],
            orbital_config: None,
        };
        assert!(model.needs_orbital_geometry());
    }

    #[test]
    fn simulation_config_resolves_defaults() {
        let cfg = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 1000.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 10.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::default(),
        };
        assert_eq!(cfg.resolved_max_newton_iterations(), 20);
        assert!(cfg.resolved_h_min() > 0.0);
        assert_eq!(cfg.resolved_h_max(), 1000.0);
    }
}
