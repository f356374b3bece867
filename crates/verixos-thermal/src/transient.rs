//! Adaptive implicit transient stepper (§4.5).
//!
//! thermal@: backward Euler by default, Crank-Nicolson as a blend selectable
//! via [`IntegrationMethod`], damped Newton inner loop, PI step-size control
//! against an embedded explicit-Euler predictor. The Newton loop is never
//! interrupted by cancellation (§5: determinism over responsiveness); only
//! the "between accepted steps" boundary polls the token and deadline.

use std::time::Instant;

use nalgebra::DVector;
use verixos::MIN_PHYSICAL_TEMP_K;

use crate::concurrency::{CancellationToken, RunDeadline};
use crate::energy::EnergyAccumulator;
use crate::error::{Result, ThermalError};
use crate::loads::evaluate_loads;
use crate::model::{EnvironmentPreset, IntegrationMethod, Model, SimulationConfig};
use crate::operator::Operator;
use crate::residual::{assemble, capacitance_vector, is_arithmetic_row};
use crate::results::{ConductorFlowSeries, History, NodeTemperatureSeries, TransientResult};

const MAX_STEP_HALVINGS: u32 = 10;

struct StepOutcome {
    state: DVector<f64>,
    newton_iterations: usize,
}

/// Run a transient simulation of `model` under `config` and `env` (§4.5).
///
/// `cancel` is polled between accepted steps; `deadline`, if set, aborts the
/// run once elapsed. Both return `Cancelled`/`DeadlineExceeded` carrying the
/// history accumulated so far.
pub fn run_transient(
    model: &Model,
    config: &SimulationConfig,
    env: &EnvironmentPreset,
    cancel: &CancellationToken,
    deadline: &RunDeadline,
) -> Result<TransientResult> {
    let operator = Operator::build(model.clone())?;
    let n = operator.state_len();
    let c = capacitance_vector(&operator);
    let h_min = config.resolved_h_min();
    let h_max = config.resolved_h_max();
    let max_newton = config.resolved_max_newton_iterations();

    let mut state = DVector::<f64>::zeros(n);
    for (idx, id) in operator.state_node_ids().iter().enumerate() {
        state[idx] = operator.node(id).map(|node| node.initial_temperature_k).unwrap_or(0.0);
    }

    let mut t = config.t_start_s;
    let mut h = config.initial_step_s.clamp(h_min, h_max);
    let mut steps_accepted: u64 = 0;
    let mut steps_rejected: u64 = 0;

    let mut recorder = Recorder::new(&operator, config.t_start_s, config.output_grid_s);
    recorder.record(config.t_start_s, &operator, &state);
    let mut energy = EnergyAccumulator::new(&operator);

    while t < config.t_end_s - 1e-12 {
        if cancel.is_cancelled() {
            return Err(ThermalError::Cancelled { partial: Box::new(recorder.finish(energy.balance())) });
        }
        if deadline.is_expired() {
            return Err(ThermalError::DeadlineExceeded { partial: Box::new(recorder.finish(energy.balance())) });
        }

        let step_h = h.min(config.t_end_s - t);
        let result = attempt_step(
            &model,
            &operator,
            env,
            &c,
            &state,
            t,
            step_h,
            config.tolerance,
            max_newton,
            config.integration_method,
        );

        match result {
            Ok((outcome, err_estimate)) => {
                if err_estimate > config.tolerance {
                    steps_rejected += 1;
                    h = (h * (0.9 * (config.tolerance / err_estimate).sqrt()).max(0.2)).clamp(h_min, h_max);
                    if h <= h_min && err_estimate > config.tolerance {
                        return Err(ThermalError::StepSizeUnderflow { time_s: t, h_min_s: h_min });
                    }
                    continue;
                }

                let mut next_state = outcome.state;
                floor_temperatures(&mut next_state);
                if !next_state.iter().all(|v| v.is_finite()) {
                    return Err(ThermalError::NumericalOverflow {
                        time_s: t + step_h,
                        detail: "non-finite temperature after step acceptance".to_string(),
                    });
                }

                energy.accumulate(&operator, model, env, t, &state, t + step_h, &next_state);
                t += step_h;
                state = next_state;
                steps_accepted += 1;
                recorder.record(t, &operator, &state);

                log::trace!(
                    target: "verixos_thermal::transient",
                    "accepted step t={t:.6} h={step_h:.6} newton_iters={}",
                    outcome.newton_iterations
                );

                let scale = if err_estimate > 0.0 {
                    (0.9 * (config.tolerance / err_estimate).sqrt()).clamp(0.2, 5.0)
                } else {
                    2.0
                };
                h = (h * scale).clamp(h_min, h_max);
            }
            Err(e) => return Err(e),
        }
    }

    let history = recorder.finish(energy.balance());
    Ok(TransientResult {
        history,
        steps_accepted,
        steps_rejected,
        final_time_s: t,
    })
}

/// Attempt one step of size `h` from `state` at time `t`; returns the
/// accepted candidate state plus the embedded-predictor error estimate, or
/// `SolverDiverged` if Newton failed after all step-halvings.
fn attempt_step(
    model: &Model,
    operator: &Operator,
    env: &EnvironmentPreset,
    c: &DVector<f64>,
    state: &DVector<f64>,
    t: f64,
    h0: f64,
    tolerance: f64,
    max_newton: usize,
    method: IntegrationMethod,
) -> Result<(StepOutcome, f64)> {
    let mut h = h0;
    for attempt in 0..=MAX_STEP_HALVINGS {
        match newton_solve(model, operator, env, c, state, t, h, tolerance, max_newton, method) {
            Ok(outcome) => {
                let predictor = explicit_euler_predictor(model, operator, env, state, t, h);
                let err = (&outcome.state - &predictor)
                    .iter()
                    .fold(0.0_f64, |acc, v| acc.max(v.abs()));
                return Ok((outcome, err));
            }
            Err(ThermalError::SolverDiverged { .. }) if attempt < MAX_STEP_HALVINGS => {
                h *= 0.5;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(ThermalError::SolverDiverged {
        iterations: max_newton,
        residual_norm: f64::INFINITY,
    })
}

/// Damped Newton solve of the backward-Euler (or Crank-Nicolson) stage
/// system `F(T_new) = C*(T_new - T_old)/h + R_int(T_new, t+h) [blend] = 0`.
fn newton_solve(
    model: &Model,
    operator: &Operator,
    env: &EnvironmentPreset,
    c: &DVector<f64>,
    state_old: &DVector<f64>,
    t: f64,
    h: f64,
    tolerance: f64,
    max_newton: usize,
    method: IntegrationMethod,
) -> Result<StepOutcome> {
    let mut state = state_old.clone();
    let n = state.len();
    let loads_new = evaluate_loads(model, operator, env, t + h);
    let loads_old = evaluate_loads(model, operator, env, t);

    let mut last_residual_norm = f64::INFINITY;
    for iter in 0..max_newton {
        let assembly_new = assemble(operator, &state, &loads_new);
        // Arithmetic rows have no time-derivative term: they enforce
        // `0 = sum(Q)` at the new state alone, never blended with the old
        // state, regardless of `method` (§4.4).
        let (residual, jacobian) = match method {
            IntegrationMethod::BackwardEuler => (assembly_new.residual.clone(), assembly_new.jacobian.clone()),
            IntegrationMethod::CrankNicolson => {
                let assembly_old = assemble(operator, state_old, &loads_old);
                (
                    0.5 * (&assembly_new.residual + &assembly_old.residual),
                    assembly_new.jacobian.clone() * 0.5,
                )
            }
        };

        let mut f = DVector::<f64>::zeros(n);
        let mut jf = jacobian.clone();
        for i in 0..n {
            if is_arithmetic_row(operator, i) {
                f[i] = assembly_new.residual[i];
                for j in 0..n {
                    jf[(i, j)] = assembly_new.jacobian[(i, j)];
                }
            } else {
                f[i] = c[i] * (state[i] - state_old[i]) / h + residual[i];
                jf[(i, i)] += c[i] / h;
            }
        }

        let residual_norm = f.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        last_residual_norm = residual_norm;
        let t_norm = state.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if residual_norm <= tolerance * (1.0 + t_norm) {
            return Ok(StepOutcome { state, newton_iterations: iter });
        }

        let delta = match jf.clone().lu().solve(&(-&f)) {
            Some(d) => d,
            None => {
                return Err(ThermalError::SolverDiverged {
                    iterations: iter,
                    residual_norm,
                })
            }
        };

        let delta_norm = delta.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        state += &delta;
        if delta_norm <= tolerance * (1.0 + t_norm) {
            return Ok(StepOutcome { state, newton_iterations: iter + 1 });
        }
    }

    Err(ThermalError::SolverDiverged {
        iterations: max_newton,
        residual_norm: last_residual_norm,
    })
}

/// One explicit-Euler step from `state` at `t`, used only as the error
/// estimator's reference trajectory (§4.5 step 3); never itself accepted.
fn explicit_euler_predictor(
    model: &Model,
    operator: &Operator,
    env: &EnvironmentPreset,
    state: &DVector<f64>,
    t: f64,
    h: f64,
) -> DVector<f64> {
    let c = capacitance_vector(operator);
    let loads = evaluate_loads(model, operator, env, t);
    let assembly = assemble(operator, state, &loads);
    let mut next = state.clone();
    for i in 0..state.len() {
        if is_arithmetic_row(operator, i) {
            continue;
        }
        if c[i] > 0.0 {
            next[i] = state[i] - h * assembly.residual[i] / c[i];
        }
    }
    next
}

fn floor_temperatures(state: &mut DVector<f64>) {
    for v in state.iter_mut() {
        if *v < MIN_PHYSICAL_TEMP_K {
            *v = MIN_PHYSICAL_TEMP_K;
        }
    }
}

/// Accumulates per-node/per-conductor samples onto the output grid (§4.5
/// step 4, §6 results model). Samples are recorded at every accepted step
/// whose time crosses (or lands exactly on) a grid point, linearly
/// interpolated between the two bracketing accepted states.
struct Recorder {
    grid_s: f64,
    next_grid_t: f64,
    node_ids: Vec<String>,
    node_series: Vec<Vec<(f64, f64)>>,
    conductor_ids: Vec<(String, String, String)>,
    conductor_series: Vec<Vec<(f64, f64)>>,
    last_t: f64,
    last_state: Option<DVector<f64>>,
}

impl Recorder {
    fn new(operator: &Operator, t_start: f64, grid_s: f64) -> Self {
        let node_ids = operator.state_node_ids().to_vec();
        let conductor_ids = operator
            .conductors()
            .iter()
            .map(|c| (c.id.clone(), c.node_from.clone(), c.node_to.clone()))
            .collect();
        Recorder {
            grid_s: grid_s.max(1e-9),
            next_grid_t: t_start,
            node_series: vec![Vec::new(); node_ids.len()],
            conductor_series: vec![Vec::new(); operator.conductors().len()],
            conductor_ids,
            node_ids,
            last_t: t_start,
            last_state: None,
        }
    }

    fn record(&mut self, t: f64, operator: &Operator, state: &DVector<f64>) {
        if let Some(last_state) = self.last_state.clone() {
            while self.next_grid_t <= t + 1e-12 {
                let grid_t = self.next_grid_t;
                let frac = if t > self.last_t { (grid_t - self.last_t) / (t - self.last_t) } else { 1.0 };
                let interp = &last_state + frac.clamp(0.0, 1.0) * (state - &last_state);
                self.push_sample(grid_t, operator, &interp);
                self.next_grid_t += self.grid_s;
            }
        } else {
            self.push_sample(t, operator, state);
            self.next_grid_t += self.grid_s;
        }
        self.last_t = t;
        self.last_state = Some(state.clone());
    }

    fn push_sample(&mut self, t: f64, operator: &Operator, state: &DVector<f64>) {
        for (idx, _) in self.node_ids.iter().enumerate() {
            self.node_series[idx].push((t, state[idx]));
        }
        let temps = crate::residual::full_temperatures(operator, state);
        for (idx, conductor) in operator.conductors().iter().enumerate() {
            let flow = crate::residual::conductor_flow(
                &conductor.law,
                temps[&conductor.node_from],
                temps[&conductor.node_to],
            );
            self.conductor_series[idx].push((t, flow));
        }
    }

    fn finish(self, energy_balance: crate::results::EnergyBalance) -> History {
        let node_series = self
            .node_ids
            .into_iter()
            .zip(self.node_series)
            .map(|(id, samples)| NodeTemperatureSeries {
                node_id: id,
                times_s: samples.iter().map(|(t, _)| *t).collect(),
                temperatures_k: samples.iter().map(|(_, v)| *v).collect(),
            })
            .collect();

        let conductor_series = self
            .conductor_ids
            .into_iter()
            .zip(self.conductor_series)
            .map(|((id, from, to), samples)| ConductorFlowSeries {
                conductor_id: id,
                node_from: from,
                node_to: to,
                times_s: samples.iter().map(|(t, _)| *t).collect(),
                flows_w: samples.iter().map(|(_, v)| *v).collect(),
            })
            .collect();

        History {
            node_series,
            conductor_series,
            energy_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::{CancellationToken, RunDeadline};
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
    fn two_node_conduction_matches_analytic_exponential() {
        let model = two_node_model();
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 1000.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 100.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::BackwardEuler,
        };
        let env = EnvironmentPreset::default();
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        let result = run_transient(&model, &config, &env, &cancel, &deadline).unwrap();

        let g = 2.0;
        let c = 100.0;
        let analytic = 400.0 - (400.0 - 300.0) * (-g * 1000.0 / c).exp();
        let series = result.history.node("b").unwrap();
        let final_t = *series.temperatures_k.last().unwrap();
        assert!((final_t - analytic).abs() < 1e-1, "final_t={final_t} analytic={analytic}");
    }

    #[test]
    fn crank_nicolson_also_matches_analytic_exponential() {
        let model = two_node_model();
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 1000.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 100.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::CrankNicolson,
        };
        let env = EnvironmentPreset::default();
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        let result = run_transient(&model, &config, &env, &cancel, &deadline).unwrap();

        let g = 2.0;
        let c = 100.0;
        let analytic = 400.0 - (400.0 - 300.0) * (-g * 1000.0 / c).exp();
        let series = result.history.node("b").unwrap();
        let final_t = *series.temperatures_k.last().unwrap();
        assert!((final_t - analytic).abs() < 1e-1, "final_t={final_t} analytic={analytic}");
    }

    #[test]
    fn boundary_node_never_appears_in_state_series() {
        let model = two_node_model();
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 10.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 5.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::BackwardEuler,
        };
        let env = EnvironmentPreset::default();
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        let result = run_transient(&model, &config, &env, &cancel, &deadline).unwrap();
        assert!(result.history.node("a").is_none());
    }

    #[test]
    fn rejects_zero_capacitance_model_before_stepping() {
        let mut model = two_node_model();
        if let NodeKind::Diffusion { capacitance_j_k, .. } = &mut model.nodes[1].kind {
            *capacitance_j_k = 0.0;
        }
        let config = SimulationConfig {
            t_start_s: 0.0,
            t_end_s: 10.0,
            initial_step_s: 1.0,
            tolerance: 1e-6,
            output_grid_s: 5.0,
            h_min_s: None,
            h_max_s: None,
            max_newton_iterations: None,
            integration_method: IntegrationMethod::BackwardEuler,
        };
        let env = EnvironmentPreset::default();
        let cancel = CancellationToken::new();
        let deadline = RunDeadline::none();
        assert!(matches!(
            run_transient(&model, &config, &env, &cancel, &deadline),
            Err(ThermalError::InvalidModel { .. })
        ));
    }
}
