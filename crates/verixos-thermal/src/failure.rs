//! Failure-case dispatcher (§4.9): applies a named mutation to a clone of
//! the baseline model, runs the transient, and aggregates per-node risk
//! stats against caller-supplied limits.

use std::collections::HashMap;

use crate::concurrency::{run_on_pool, CancellationToken, RunDeadline, WorkerPool};
use crate::model::{
    ConductorLaw, EnvironmentPreset, HeatLoadKind, Model, NodeKind, SimulationConfig, SurfaceType,
};
use crate::results::{FailureCaseResult, FailureStatus, FailureSweepResult, NodeFailureStats};
use crate::transient::run_transient;

/// One requested failure case plus its named parameters (§4.9).
#[derive(Debug, Clone)]
pub enum FailureCase {
    /// Zero every constant load tagged as a heater.
    HeaterFailure,
    /// Multiply `ε_eff` of radiation conductors tagged `"MLI"` by `factor` (default 5).
    MliDegradation { factor: Option<f64> },
    /// Raise `α` of named nodes by `delta_alpha` (default 0.05), clamped to [0, 1].
    CoatingDegradationEol { node_ids: Vec<String>, delta_alpha: Option<f64> },
    /// Force every orbital load's surface type to isotropic averaging.
    AttitudeLossTumble,
    /// Scale every internal constant load by `factor` in (0, 1).
    PowerBudgetReduction { factor: f64 },
    /// Force a named conductor's conductance to zero.
    ConductorFailure { conductor_id: String },
    /// Multiply a node's heat load(s) by `spike_factor`.
    ComponentPowerSpike { node_id: String, spike_factor: f64 },
}

impl FailureCase {
    /// Stable name used in [`FailureCaseResult::case_name`].
    pub fn name(&self) -> &'static str {
        match self {
            FailureCase::HeaterFailure => "heater_failure",
            FailureCase::MliDegradation { .. } => "mli_degradation",
            FailureCase::CoatingDegradationEol { .. } => "coating_degradation_eol",
            FailureCase::AttitudeLossTumble => "attitude_loss_tumble",
            FailureCase::PowerBudgetReduction { .. } => "power_budget_reduction",
            FailureCase::ConductorFailure { .. } => "conductor_failure",
            FailureCase::ComponentPowerSpike { .. } => "component_power_spike",
        }
    }
}

fn apply_mutation(model: &Model, case: &FailureCase) -> Model {
    let mut model = model.clone();
    match case {
        FailureCase::HeaterFailure => {
            for load in model.heat_loads.iter_mut() {
                if load.is_heater {
                    if let HeatLoadKind::Constant { watts } = &mut load.kind {
                        *watts = 0.0;
                    }
                }
            }
        }
        FailureCase::MliDegradation { factor } => {
            let factor = factor.unwrap_or(5.0);
            for c in model.conductors.iter_mut() {
                let is_mli = c.tag.as_deref().map(|t| t.eq_ignore_ascii_case("mli")).unwrap_or(false);
                if is_mli {
                    if let ConductorLaw::Radiation { emissivity_eff, .. } = &mut c.law {
                        *emissivity_eff *= factor;
                    }
                }
            }
        }
        FailureCase::CoatingDegradationEol { node_ids, delta_alpha } => {
            let delta = delta_alpha.unwrap_or(0.05);
            for node in model.nodes.iter_mut() {
                if !node_ids.iter().any(|id| id == &node.id) {
                    continue;
                }
                match &mut node.kind {
                    NodeKind::Diffusion { absorptivity, .. } | NodeKind::Arithmetic { absorptivity, .. } => {
                        *absorptivity = (*absorptivity + delta).clamp(0.0, 1.0);
                    }
                    NodeKind::Boundary { .. } => {}
                }
            }
        }
        FailureCase::AttitudeLossTumble => {
            for load in model.heat_loads.iter_mut() {
                if let HeatLoadKind::Orbital { surface } = &mut load.kind {
                    surface.surface_type = SurfaceType::IsotropicAverage;
                }
            }
        }
        FailureCase::PowerBudgetReduction { factor } => {
            for load in model.heat_loads.iter_mut() {
                if !load.is_heater {
                    if let HeatLoadKind::Constant { watts } = &mut load.kind {
                        *watts *= factor;
                    }
                }
            }
        }
        FailureCase::ConductorFailure { conductor_id } => {
            for c in model.conductors.iter_mut() {
                if &c.id == conductor_id {
                    match &mut c.law {
                        ConductorLaw::Linear { conductance_w_k } | ConductorLaw::Contact { conductance_w_k } => {
                            *conductance_w_k = 0.0;
                        }
                        ConductorLaw::Radiation { area_m2, .. } => *area_m2 = 0.0,
                        ConductorLaw::HeatPipe { table } => {
                            for (_, g) in table.iter_mut() {
                                *g = 0.0;
                            }
                        }
                    }
                }
            }
        }
        FailureCase::ComponentPowerSpike { node_id, spike_factor } => {
            for load in model.heat_loads.iter_mut() {
                if &load.node_id == node_id {
                    if let HeatLoadKind::Constant { watts } = &mut load.kind {
                        *watts *= spike_factor;
                    }
                }
            }
        }
    }
    model
}

/// Per-node temperature limit used to classify failure-case outcomes.
#[derive(Debug, Clone, Copy)]
pub struct NodeLimit {
    /// Minimum acceptable temperature, Kelvin.
    pub t_min_k: f64,
    /// Maximum acceptable temperature, Kelvin.
    pub t_max_k: f64,
    /// Fractional margin (of the limit span) inside which a pass becomes a warn.
    pub warn_margin: f64,
}

fn classify(stats: (f64, f64, f64), limit: Option<&NodeLimit>) -> FailureStatus {
    let (t_min, t_max, _t_mean) = stats;
    let Some(limit) = limit else { return FailureStatus::Informational };
    if t_min < limit.t_min_k || t_max > limit.t_max_k {
        return FailureStatus::Fail;
    }
    let span = (limit.t_max_k - limit.t_min_k).max(1e-9);
    let margin = limit.warn_margin * span;
    if t_min < limit.t_min_k + margin || t_max > limit.t_max_k - margin {
        return FailureStatus::Warn;
    }
    FailureStatus::Pass
}

/// Run the failure-case sweep (§4.9): each case against a fresh clone of
/// `model`, in parallel on `pool`, reassembled in request order.
pub fn run_failure_sweep(
    model: &Model,
    cases: &[FailureCase],
    limits: &HashMap<String, NodeLimit>,
    config: &SimulationConfig,
    env: &EnvironmentPreset,
    pool: &WorkerPool,
    cancel: &CancellationToken,
    deadline: &RunDeadline,
) -> FailureSweepResult {
    let outcomes = run_on_pool(pool, cases.iter().cloned(), |case| {
        let mutated = apply_mutation(model, &case);
        let result = run_transient(&mutated, config, env, cancel, deadline);
        (case, result)
    });

    let mut results = Vec::new();
    for outcome in outcomes {
        let Some((case, result)) = outcome else { continue };
        match result {
            Ok(transient) => {
                let mut node_stats = Vec::new();
                let mut worst = FailureStatus::Informational;
                for series in &transient.history.node_series {
                    let t_min = series.temperatures_k.iter().cloned().fold(f64::INFINITY, f64::min);
                    let t_max = series.temperatures_k.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let t_mean = time_weighted_mean(&series.times_s, &series.temperatures_k);
                    let status = classify((t_min, t_max, t_mean), limits.get(&series.node_id));
                    worst = worse(worst, status);
                    node_stats.push(NodeFailureStats { node_id: series.node_id.clone(), t_min_k: t_min, t_max_k: t_max, t_mean_k: t_mean, status });
                }
                results.push(FailureCaseResult { case_name: case.name().to_string(), node_stats, status: worst, error: None });
            }
            Err(e) => {
                results.push(FailureCaseResult {
                    case_name: case.name().to_string(),
                    node_stats: Vec::new(),
                    status: FailureStatus::Fail,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    FailureSweepResult { cases: results }
}

fn worse(a: FailureStatus, b: FailureStatus) -> FailureStatus {
    fn rank(s: FailureStatus) -> u8 {
        match s {
            FailureStatus::Informational => 0,
            FailureStatus::Pass => 1,
            FailureStatus::Warn => 2,
            FailureStatus::Fail => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn time_weighted_mean(times: &[f64], values: &[f64]) -> f64 {
    if times.len() < 2 {
        return values.first().copied().unwrap_or(0.0);
    }
    let mut acc = 0.0;
    let mut span = 0.0;
    for w in times.windows(2).zip(values.windows(2)) {
        let ((t0, t1), (v0, v1)) = ((w.0[0], w.0[1]), (w.1[0], w.1[1]));
        let dt = t1 - t0;
        acc += 0.5 * (v0 + v1) * dt;
        span += dt;
    }
    if span > 0.0 {
        acc / span
    } else {
        values[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conductor, HeatLoad, IntegrationMethod, Node};

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

    fn two_node_model() -> Model {
        Model {
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
        }
    }

    #[test]
    fn conductor_failure_keeps_node_at_initial_temperature() {
        let model = two_node_model();
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 500.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 100.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::BackwardEuler,
        };
        let env = EnvironmentPreset::default();
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        let cases = vec![FailureCase::ConductorFailure { conductor_id: "c1".into() }];
        let limits = HashMap::new();

        let sweep = run_failure_sweep(&model, &cases, &limits, &config, &env, &pool, &cancel, &deadline);
        let case = &sweep.cases[0];
        assert_eq!(case.case_name, "conductor_failure");
        let b_stats = case.node_stats.iter().find(|s| s.node_id == "b").unwrap();
        assert!((b_stats.t_max_k - 300.0).abs() < 1e-6);
        assert!((b_stats.t_min_k - 300.0).abs() < 1e-6);
    }

    #[test]
    fn heater_failure_zeroes_tagged_heater_loads() {
        let mut model = two_node_model();
        model.heat_loads.push(HeatLoad {
            id: "h1".into(),
            node_id: "b".into(),
            kind: HeatLoadKind::Constant { watts: 10.0 },
            is_heater: true,
        });
        let case = FailureCase::HeaterFailure;
        let mutated = apply_mutation(&model, &case);
        if let HeatLoadKind::Constant { watts } = mutated.heat_loads[0].kind {
            assert_eq!(watts, 0.0);
        } else {
            panic!("expected constant load");
        }
    }

    #[test]
    fn informational_status_when_no_limits_supplied() {
        assert_eq!(classify((300.0, 310.0, 305.0), None), FailureStatus::Informational);
    }
}
