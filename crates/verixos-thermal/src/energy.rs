//! Energy accounting (§4.7): trapezoidal integration of Q_in, Q_rad and the
//! change in stored thermal energy across a transient run.

use nalgebra::DVector;

use crate::loads::evaluate_loads;
use crate::model::{EnvironmentPreset, Model, NodeKind};
use crate::operator::Operator;
use crate::residual::{capacitance_vector, conductor_flow, full_temperatures};
use crate::results::EnergyBalance;

/// Accumulates the three energy-balance terms across accepted steps via the
/// trapezoidal rule, then reports the relative imbalance (§4.7).
pub struct EnergyAccumulator {
    q_in_j: f64,
    q_rad_j: f64,
    delta_e_stored_j: f64,
    initial_state: Option<DVector<f64>>,
    last_state: Option<DVector<f64>>,
}

impl EnergyAccumulator {
    /// Create a fresh accumulator for `operator`.
    pub fn new(_operator: &Operator) -> Self {
        EnergyAccumulator {
            q_in_j: 0.0,
            q_rad_j: 0.0,
            delta_e_stored_j: 0.0,
            initial_state: None,
            last_state: None,
        }
    }

    /// Fold in one accepted step `[t0, t1]` with endpoint states `state0`/`state1`.
    pub fn accumulate(
        &mut self,
        operator: &Operator,
        model: &Model,
        env: &EnvironmentPreset,
        t0: f64,
        state0: &DVector<f64>,
        t1: f64,
        state1: &DVector<f64>,
    ) {
        if self.initial_state.is_none() {
            self.initial_state = Some(state0.clone());
        }
        self.last_state = Some(state1.clone());

        let dt = t1 - t0;
        let loads0 = evaluate_loads(model, operator, env, t0);
        let loads1 = evaluate_loads(model, operator, env, t1);
        let q_load0: f64 = loads0.values().sum();
        let q_load1: f64 = loads1.values().sum();
        self.q_in_j += 0.5 * (q_load0 + q_load1) * dt;

        let temps0 = full_temperatures(operator, state0);
        let temps1 = full_temperatures(operator, state1);

        for conductor in operator.conductors() {
            let from_is_space = is_space_like(operator, &conductor.node_from);
            let to_is_space = is_space_like(operator, &conductor.node_to);
            if !from_is_space && !to_is_space {
                continue;
            }
            let flow0 = conductor_flow(&conductor.law, temps0[&conductor.node_from], temps0[&conductor.node_to]);
            let flow1 = conductor_flow(&conductor.law, temps1[&conductor.node_from], temps1[&conductor.node_to]);
            // `flow` is defined from->to. Outbound-to-space (positive q_rad)
            // is the flow as recorded when `to` is the space-like endpoint,
            // and its negation when `from` is.
            let (outbound0, outbound1) = if to_is_space { (flow0, flow1) } else { (-flow0, -flow1) };
            if outbound0 > 0.0 || outbound1 > 0.0 {
                self.q_rad_j += 0.5 * (outbound0.max(0.0) + outbound1.max(0.0)) * dt;
            }
            // The reverse direction (space-like node feeding the network) is
            // non-negative inbound radiation and counts toward Q_in.
            let (inbound0, inbound1) = (-outbound0, -outbound1);
            if inbound0 > 0.0 || inbound1 > 0.0 {
                self.q_in_j += 0.5 * (inbound0.max(0.0) + inbound1.max(0.0)) * dt;
            }
        }

        let c = capacitance_vector(operator);
        for (idx, id) in operator.state_node_ids().iter().enumerate() {
            if let Some(node) = operator.node(id) {
                if matches!(node.kind, NodeKind::Diffusion { .. }) {
                    self.delta_e_stored_j += c[idx] * (state1[idx] - state0[idx]);
                }
            }
        }
    }

    /// Finalize the relative energy balance error `ε_bal` (§4.7).
    pub fn balance(&self) -> EnergyBalance {
        let denom = self.q_in_j.max(1.0);
        let relative_error = (self.q_in_j - self.q_rad_j - self.delta_e_stored_j).abs() / denom;
        EnergyBalance {
            q_in_j: self.q_in_j,
            q_rad_j: self.q_rad_j,
            delta_e_stored_j: self.delta_e_stored_j,
            relative_error,
        }
    }
}

fn is_space_like(operator: &Operator, node_id: &str) -> bool {
    matches!(operator.node(node_id).map(|n| &n.kind), Some(NodeKind::Boundary { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conductor, ConductorLaw, HeatLoad, HeatLoadKind, Model, Node};

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
    fn delta_e_stored_matches_capacitance_times_delta_t() {
        let model = Model {
            nodes: vec![diffusion("a", 10.0, 300.0)],
            conductors: vec![],
            heat_loads: vec![HeatLoad {
                id: "h".into(),
                node_id: "a".into(),
                kind: HeatLoadKind::Constant { watts: 0.0 },
                is_heater: false,
            }],
            orbital_config: None,
        };
        let operator = Operator::build(model.clone()).unwrap();
        let env = EnvironmentPreset::default();
        let mut acc = EnergyAccumulator::new(&operator);
        let s0 = DVector::from_vec(vec![300.0]);
        let s1 = DVector::from_vec(vec![305.0]);
        acc.accumulate(&operator, &model, &env, 0.0, &s0, 1.0, &s1);
        let balance = acc.balance();
        assert!((balance.delta_e_stored_j - 50.0).abs() < 1e-9);
    }

    #[test]
    fn closed_model_with_radiation_keeps_balance_error_small() {
        let model = Model {
            nodes: vec![diffusion("a", 1000.0, 500.0), boundary("space", 3.0)],
            conductors: vec![Conductor {
                id: "c1".into(),
                node_from: "a".into(),
                node_to: "space".into(),
                law: ConductorLaw::Radiation { area_m2: 1.0, view_factor: 1.0, emissivity_eff: 1.0 },
                tag: None,
            }],
            heat_loads: vec![],
            orbital_config: None,
        };
        let operator = Operator::build(model.clone()).unwrap();
        let env = EnvironmentPreset::default();
        let mut acc = EnergyAccumulator::new(&operator);
        let s0 = DVector::from_vec(vec![500.0]);
        let s1 = DVector::from_vec(vec![499.0]);
        acc.accumulate(&operator, &model, &env, 0.0, &s0, 1.0, &s1);
        let balance = acc.balance();
        assert!(balance.q_rad_j > 0.0);
    }
}
