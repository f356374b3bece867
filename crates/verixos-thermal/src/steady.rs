//! Damped Newton steady-state solver (§4.6).

use nalgebra::DVector;
use verixos::MIN_PHYSICAL_TEMP_K;

use crate::error::{Result, ThermalError};
use crate::loads::evaluate_loads;
use crate::model::{EnvironmentPreset, Model, SteadyStateConfig};
use crate::operator::Operator;
use crate::residual::{assemble, is_arithmetic_row};
use crate::results::SteadyStateResult;

const MAX_BACKTRACKS: u32 = 20;

/// Solve `R_int(T) = Q_load(t_ref, T)` for steady state (§4.6): the same
/// Jacobian as the transient stepper, minus the `C/h` term, with damped
/// backtracking Newton iteration.
pub fn run_steady_state(
    model: &Model,
    env: &EnvironmentPreset,
    config: &SteadyStateConfig,
) -> Result<SteadyStateResult> {
    let operator = Operator::build(model.clone())?;
    let n = operator.state_len();

    let mut state = DVector::<f64>::zeros(n);
    for (idx, id) in operator.state_node_ids().iter().enumerate() {
        state[idx] = operator.node(id).map(|node| node.initial_temperature_k).unwrap_or(0.0);
    }

    let loads = evaluate_loads(model, &operator, env, config.reference_time_s);
    let mut residual_norm_2 = f64::INFINITY;
    let mut last_residual_inf = f64::INFINITY;

    for iter in 0..config.max_iterations {
        let assembly = assemble(&operator, &state, &loads);
        let residual_inf = assembly.residual.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        last_residual_inf = residual_inf;

        if residual_inf <= config.tolerance {
            log::debug!(target: "verixos_thermal::steady", "converged after {iter} iterations, ||R||={residual_inf:.3e}");
            return Ok(build_result(&operator, &state, iter, residual_inf));
        }

        let delta = match assembly.jacobian.clone().lu().solve(&(-&assembly.residual)) {
            Some(d) => d,
            None => {
                return Err(ThermalError::SteadyStateNonConvergent {
                    iterations: iter,
                    residual_norm: residual_inf,
                })
            }
        };

        let mut damping = 1.0_f64;
        let current_norm_2 = assembly.residual.norm();
        residual_norm_2 = current_norm_2;

        for _ in 0..MAX_BACKTRACKS {
            let candidate = &state + damping * &delta;
            let candidate_assembly = assemble(&operator, &candidate, &loads);
            let candidate_norm_2 = candidate_assembly.residual.norm();
            if candidate_norm_2 <= residual_norm_2 || damping <= (1.0 / (1u64 << MAX_BACKTRACKS) as f64) {
                state = candidate;
                break;
            }
            damping *= 0.5;
        }

        if !state.iter().all(|v| v.is_finite()) {
            return Err(ThermalError::NumericalOverflow {
                time_s: config.reference_time_s,
                detail: "non-finite temperature during steady-state Newton iteration".to_string(),
            });
        }
        floor_state(&mut state);
    }

    Err(ThermalError::SteadyStateNonConvergent {
        iterations: config.max_iterations,
        residual_norm: last_residual_inf,
    })
}

fn floor_state(state: &mut DVector<f64>) {
    for v in state.iter_mut() {
        if *v < MIN_PHYSICAL_TEMP_K {
            *v = MIN_PHYSICAL_TEMP_K;
        }
    }
}

fn build_result(operator: &Operator, state: &DVector<f64>, iterations: usize, residual_norm: f64) -> SteadyStateResult {
    let mut temperatures_k = std::collections::BTreeMap::new();
    for (idx, id) in operator.state_node_ids().iter().enumerate() {
        temperatures_k.insert(id.clone(), state[idx]);
    }
    for node in &operator.model().nodes {
        if let crate::model::NodeKind::Boundary { boundary_temperature_k } = node.kind {
            temperatures_k.insert(node.id.clone(), boundary_temperature_k);
        }
    }
    SteadyStateResult {
        temperatures_k,
        iterations,
        residual_norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conductor, ConductorLaw, Model, Node, NodeKind};

    fn boundary(id: &str, t: f64) -> Node {
        Node { id: id.into(), initial_temperature_k: t, kind: NodeKind::Boundary { boundary_temperature_k: t } }
    }

    fn diffusion(id: &str, c: f64, t0: f64) -> Node {
        Node {
            id: id.into(),
            initial_temperature_k: t0,
            kind: NodeKind::Diffusion { capacitance_j_k: c, area_m2: 0.0, absorptivity: 0.0, emissivity: 0.0, mass_kg: None },
        }
    }

    #[test]
    fn two_node_conduction_reaches_boundary_temperature() {
        let model = Model {
            nodes: vec![boundary("a", 400.0), diffusion("b", 100.0, 300.0)],
            conductors: vec![Conductor {
                id: "c1".into(),
                node_from: "a".into(),
                node_to: "b".into(),
                law: ConductorLaw::Linear { conductance_w_k: 2.0 },
                tag: None,
            }],
            heat_loads: vec![],
            orbital_config: None,
        };
        let env = EnvironmentPreset::default();
        let config = SteadyStateConfig { max_iterations: 50, tolerance: 1e-8, reference_time_s: 0.0 };
        let result = run_steady_state(&model, &env, &config).unwrap();
        assert!((result.temperatures_k["b"] - 400.0).abs() < 1e-6);
    }

    #[test]
    fn radiative_steady_state_converges_with_newton() {
        let model = Model {
            nodes: vec![boundary("space", 3.0), diffusion("a", 1.0, 300.0)],
            conductors: vec![Conductor {
                id: "c1".into(),
                node_from: "a".into(),
                node_to: "space".into(),
                law: ConductorLaw::Radiation { area_m2: 1.0, view_factor: 1.0, emissivity_eff: 1.0 },
                tag: None,
            }],
            heat_loads: vec![crate::model::HeatLoad {
                id: "h".into(),
                node_id: "a".into(),
                kind: crate::model::HeatLoadKind::Constant { watts: 100.0 },
                is_heater: false,
            }],
            orbital_config: None,
        };
        let env = EnvironmentPreset::default();
        let config = SteadyStateConfig { max_iterations: 100, tolerance: 1e-6, reference_time_s: 0.0 };
        let result = run_steady_state(&model, &env, &config).unwrap();
        let t = result.temperatures_k["a"];
        let expected = (100.0 / verixos::STEFAN_BOLTZMANN).powf(0.25);
        assert!((t - expected).abs() < 1e-2, "t={t} expected={expected}");
    }
}
