//! Finite-difference sensitivity engine (§4.8).
//!
//! thermal@: each parameter's two perturbed runs are independent of every
//! other parameter's, so the whole table is computed by fanning the work
//! out onto the shared worker pool (§5) and reassembling in request order.

use crate::concurrency::{run_on_pool, CancellationToken, RunDeadline, WorkerPool};
use crate::error::Result;
use crate::model::{ConductorLaw, HeatLoadKind, Model, NodeKind, SimulationConfig, EnvironmentPreset};
use crate::results::{ParameterRef, SensitivityResult, SensitivityRow};
use crate::transient::run_transient;

const DEFAULT_FRACTIONAL_STEP: f64 = 0.01;

/// Read a parameter's baseline value out of `model`.
fn read_parameter(model: &Model, param: &ParameterRef) -> Option<f64> {
    match param {
        ParameterRef::NodeProperty { node_id, property } => {
            let node = model.nodes.iter().find(|n| &n.id == node_id)?;
            match (&node.kind, property.as_str()) {
                (NodeKind::Diffusion { capacitance_j_k, .. }, "capacitance_j_k") => Some(*capacitance_j_k),
                (NodeKind::Diffusion { area_m2, .. }, "area_m2") => Some(*area_m2),
                (NodeKind::Diffusion { absorptivity, .. }, "absorptivity") => Some(*absorptivity),
                (NodeKind::Diffusion { emissivity, .. }, "emissivity") => Some(*emissivity),
                (NodeKind::Arithmetic { area_m2, .. }, "area_m2") => Some(*area_m2),
                (NodeKind::Arithmetic { absorptivity, .. }, "absorptivity") => Some(*absorptivity),
                (NodeKind::Arithmetic { emissivity, .. }, "emissivity") => Some(*emissivity),
                _ => None,
            }
        }
        ParameterRef::ConductorCoefficient { conductor_id, coefficient } => {
            let c = model.conductors.iter().find(|c| &c.id == conductor_id)?;
            match (&c.law, coefficient.as_str()) {
                (ConductorLaw::Linear { conductance_w_k }, "conductance_w_k") => Some(*conductance_w_k),
                (ConductorLaw::Contact { conductance_w_k }, "conductance_w_k") => Some(*conductance_w_k),
                (ConductorLaw::Radiation { area_m2, .. }, "area_m2") => Some(*area_m2),
                (ConductorLaw::Radiation { view_factor, .. }, "view_factor") => Some(*view_factor),
                (ConductorLaw::Radiation { emissivity_eff, .. }, "emissivity_eff") => Some(*emissivity_eff),
                _ => None,
            }
        }
        ParameterRef::HeatLoadScalar { heat_load_id } => {
            let load = model.heat_loads.iter().find(|l| &l.id == heat_load_id)?;
            match &load.kind {
                HeatLoadKind::Constant { watts } => Some(*watts),
                _ => None,
            }
        }
    }
}

/// Write a perturbed value of `param` into a cloned model.
fn with_parameter(model: &Model, param: &ParameterRef, value: f64) -> Model {
    let mut model = model.clone();
    match param {
        ParameterRef::NodeProperty { node_id, property } => {
            if let Some(node) = model.nodes.iter_mut().find(|n| &n.id == node_id) {
                match (&mut node.kind, property.as_str()) {
                    (NodeKind::Diffusion { capacitance_j_k, .. }, "capacitance_j_k") => *capacitance_j_k = value,
                    (NodeKind::Diffusion { area_m2, .. }, "area_m2") => *area_m2 = value,
                    (NodeKind::Diffusion { absorptivity, .. }, "absorptivity") => *absorptivity = value,
                    (NodeKind::Diffusion { emissivity, .. }, "emissivity") => *emissivity = value,
                    (NodeKind::Arithmetic { area_m2, .. }, "area_m2") => *area_m2 = value,
                    (NodeKind::Arithmetic { absorptivity, .. }, "absorptivity") => *absorptivity = value,
                    (NodeKind::Arithmetic { emissivity, .. }, "emissivity") => *emissivity = value,
                    _ => {}
                }
            }
        }
        ParameterRef::ConductorCoefficient { conductor_id, coefficient } => {
            if let Some(c) = model.conductors.iter_mut().find(|c| &c.id == conductor_id) {
                match (&mut c.law, coefficient.as_str()) {
                    (ConductorLaw::Linear { conductance_w_k }, "conductance_w_k") => *conductance_w_k = value,
                    (ConductorLaw::Contact { conductance_w_k }, "conductance_w_k") => *conductance_w_k = value,
                    (ConductorLaw::Radiation { area_m2, .. }, "area_m2") => *area_m2 = value,
                    (ConductorLaw::Radiation { view_factor, .. }, "view_factor") => *view_factor = value,
                    (ConductorLaw::Radiation { emissivity_eff, .. }, "emissivity_eff") => *emissivity_eff = value,
                    _ => {}
                }
            }
        }
        ParameterRef::HeatLoadScalar { heat_load_id } => {
            if let Some(load) = model.heat_loads.iter_mut().find(|l| &l.id == heat_load_id) {
                if let HeatLoadKind::Constant { watts } = &mut load.kind {
                    *watts = value;
                }
            }
        }
    }
    model
}

/// Run the sensitivity sweep (§4.8): a shared baseline run plus two
/// perturbed runs per requested parameter, scheduled on `pool`.
pub fn run_sensitivity(
    model: &Model,
    params: &[ParameterRef],
    config: &SimulationConfig,
    env: &EnvironmentPreset,
    pool: &WorkerPool,
    cancel: &CancellationToken,
    deadline: &RunDeadline,
) -> Result<SensitivityResult> {
    let baseline = run_transient(model, config, env, cancel, deadline)?;

    let jobs: Vec<_> = params
        .iter()
        .filter_map(|p| read_parameter(model, p).map(|p0| (p.clone(), p0)))
        .collect();

    let outcomes = run_on_pool(pool, jobs.into_iter(), |(param, p0)| {
        let delta = DEFAULT_FRACTIONAL_STEP * p0;
        let plus_model = with_parameter(model, &param, p0 + delta);
        let minus_model = with_parameter(model, &param, p0 - delta);
        let plus = run_transient(&plus_model, config, env, cancel, deadline);
        let minus = run_transient(&minus_model, config, env, cancel, deadline);
        (param, p0, delta, plus, minus)
    });

    let mut rows = Vec::new();
    for (param, p0, delta, plus, minus) in outcomes.into_iter().flatten() {
        let (Ok(plus), Ok(minus)) = (plus, minus) else { continue };
        for node_id in plus.history.node_series.iter().map(|s| s.node_id.clone()) {
            let t_plus = *plus.history.node(&node_id).unwrap().temperatures_k.last().unwrap();
            let t_minus = *minus.history.node(&node_id).unwrap().temperatures_k.last().unwrap();
            let t0 = *baseline
                .history
                .node(&node_id)
                .map(|s| s.temperatures_k.last().copied().unwrap_or(0.0))
                .unwrap_or(0.0);

            let d_t_d_p = if delta.abs() > 0.0 { (t_plus - t_minus) / (2.0 * delta) } else { 0.0 };
            let second_order = if delta.abs() > 0.0 {
                (t_plus - 2.0 * t0 + t_minus) / (delta * delta)
            } else {
                0.0
            };

            rows.push(SensitivityRow {
                parameter: param.clone(),
                node_id,
                d_t_d_p,
                second_order,
                baseline_value: p0,
            });
        }
    }

    Ok(SensitivityResult { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::{CancellationToken, RunDeadline, WorkerPool};
    use crate::model::{Conductor, ConductorLaw, IntegrationMethod, Model, Node};

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
    fn sensitivity_on_conductance_matches_analytic_derivative() {
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
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 1000.0,
            initial_step_s: 1.0,
            tolerance: 1e-8,
            output_grid_s: 1000.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::BackwardEuler,
        };
        let env = EnvironmentPreset::default();
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        let params = vec![ParameterRef::ConductorCoefficient {
            conductor_id: "c1".into(),
            coefficient: "conductance_w_k".into(),
        }];

        let result = run_sensitivity(&model, &params, &config, &env, &pool, &cancel, &deadline).unwrap();
        let row = result.rows.iter().find(|r| r.node_id == "b").unwrap();

        let g = 2.0_f64;
        let c = 100.0_f64;
        let t_span = 1000.0_f64;
        // T_B(t) = 400 - 100*exp(-G t / C); dT/dG = -t/C * (400-300) * exp(-G t/C) ... use numeric check
        let h = 1e-4;
        let f = |g: f64| 400.0 - 100.0 * (-g * t_span / c).exp();
        let analytic = (f(g + h) - f(g - h)) / (2.0 * h);
        assert!((row.d_t_d_p - analytic).abs() < 1e-3, "got {} expected {}", row.d_t_d_p, analytic);
    }
}
