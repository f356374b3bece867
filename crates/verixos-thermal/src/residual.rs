//! Network residual and analytic Jacobian assembly (§4.4).
//!
//! thermal@: the Jacobian is assembled densely over the operator's node
//! ordering into an `nalgebra::DMatrix<f64>` (Open Question (d)) rather than
//! through a dedicated sparse solver — grounded on `kyleas-thermoflow`'s and
//! `gnss-rtk`'s use of `nalgebra` for small-to-moderate dense systems, which
//! is the scale this crate targets (tens to low hundreds of nodes).

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use verixos::STEFAN_BOLTZMANN;

use crate::model::{Conductor, ConductorLaw, Model, Node, NodeKind};
use crate::operator::Operator;

/// Signed heat flow (watts) from `node_from` to `node_to` for one conductor,
/// given both endpoint temperatures.
pub fn conductor_flow(law: &ConductorLaw, t_from: f64, t_to: f64) -> f64 {
    match law {
        ConductorLaw::Linear { conductance_w_k } | ConductorLaw::Contact { conductance_w_k } => {
            conductance_w_k * (t_from - t_to)
        }
        ConductorLaw::Radiation { area_m2, view_factor, emissivity_eff } => {
            emissivity_eff * STEFAN_BOLTZMANN * area_m2 * view_factor * (t_from.powi(4) - t_to.powi(4))
        }
        ConductorLaw::HeatPipe { table } => {
            let t_avg = 0.5 * (t_from + t_to);
            heat_pipe_conductance(table, t_avg) * (t_from - t_to)
        }
    }
}

/// Derivative of `conductor_flow` with respect to `t_from` and `t_to`
/// respectively, evaluated analytically (§4.4).
fn conductor_flow_derivatives(law: &ConductorLaw, t_from: f64, t_to: f64) -> (f64, f64) {
    match law {
        ConductorLaw::Linear { conductance_w_k } | ConductorLaw::Contact { conductance_w_k } => {
            (*conductance_w_k, -conductance_w_k)
        }
        ConductorLaw::Radiation { area_m2, view_factor, emissivity_eff } => {
            let coeff = emissivity_eff * STEFAN_BOLTZMANN * area_m2 * view_factor;
            (4.0 * coeff * t_from.powi(3), -4.0 * coeff * t_to.powi(3))
        }
        ConductorLaw::HeatPipe { table } => {
            let t_avg = 0.5 * (t_from + t_to);
            let g = heat_pipe_conductance(table, t_avg);
            let dg_dtavg = heat_pipe_conductance_slope(table, t_avg);
            let flow_d_from = g + dg_dtavg * 0.5 * (t_from - t_to);
            let flow_d_to = -g + dg_dtavg * 0.5 * (t_from - t_to);
            (flow_d_from, flow_d_to)
        }
    }
}

/// Piecewise-linear conductance lookup with clamped endpoints (§9: small
/// sorted tables, linear scan).
fn heat_pipe_conductance(table: &[(f64, f64)], t_avg: f64) -> f64 {
    if table.len() == 1 {
        return table[0].1;
    }
    if t_avg <= table[0].0 {
        return table[0].1;
    }
    if t_avg >= table[table.len() - 1].0 {
        return table[table.len() - 1].1;
    }
    for w in table.windows(2) {
        let (t0, g0) = w[0];
        let (t1, g1) = w[1];
        if t_avg >= t0 && t_avg <= t1 {
            let frac = (t_avg - t0) / (t1 - t0);
            return g0 + frac * (g1 - g0);
        }
    }
    table[table.len() - 1].1
}

/// Segment slope of the heat-pipe conductance table at `t_avg` (zero for a
/// single-point table, per §8's boundary-behavior requirement).
fn heat_pipe_conductance_slope(table: &[(f64, f64)], t_avg: f64) -> f64 {
    if table.len() < 2 {
        return 0.0;
    }
    if t_avg <= table[0].0 || t_avg >= table[table.len() - 1].0 {
        return 0.0;
    }
    for w in table.windows(2) {
        let (t0, g0) = w[0];
        let (t1, g1) = w[1];
        if t_avg >= t0 && t_avg <= t1 {
            return (g1 - g0) / (t1 - t0);
        }
    }
    0.0
}

/// Dense residual and Jacobian over the state vector, for the internal
/// (conductor + load) terms only — callers add the `C/h` transient term.
pub struct ResidualAssembly {
    /// `R_int(T)` over the state vector, watts (sign convention: outbound
    /// positive for diffusion/arithmetic rows, per §4.4).
    pub residual: DVector<f64>,
    /// `d(R_int)/dT`, dense, `state_len x state_len`.
    pub jacobian: DMatrix<f64>,
}

/// Full state-vector temperature lookup: state entries plus fixed boundary
/// values, addressable by node id.
pub fn full_temperatures(operator: &Operator, state: &DVector<f64>) -> HashMap<String, f64> {
    let mut temps = HashMap::new();
    for node in &operator.model().nodes {
        if let NodeKind::Boundary { boundary_temperature_k } = node.kind {
            temps.insert(node.id.clone(), boundary_temperature_k);
        }
    }
    for (idx, id) in operator.state_node_ids().iter().enumerate() {
        temps.insert(id.clone(), state[idx]);
    }
    temps
}

/// Assemble `R_int(T)` and its Jacobian over the state vector (§4.4).
///
/// `loads` is the node-indexed load vector from [`crate::loads::evaluate_loads`]
/// at the residual's evaluation time.
pub fn assemble(
    operator: &Operator,
    state: &DVector<f64>,
    loads: &HashMap<String, f64>,
) -> ResidualAssembly {
    let n = operator.state_len();
    let temps = full_temperatures(operator, state);
    let mut residual = DVector::<f64>::zeros(n);
    let mut jacobian = DMatrix::<f64>::zeros(n, n);

    for id in operator.state_node_ids() {
        if let Some(i) = operator.state_index_of(id) {
            let q = loads.get(id).copied().unwrap_or(0.0);
            residual[i.0] -= q;
        }
    }

    for conductor in operator.conductors() {
        let t_from = temps[&conductor.node_from];
        let t_to = temps[&conductor.node_to];
        let flow = conductor_flow(&conductor.law, t_from, t_to);
        let (d_from, d_to) = conductor_flow_derivatives(&conductor.law, t_from, t_to);

        let idx_from = operator.state_index_of(&conductor.node_from);
        let idx_to = operator.state_index_of(&conductor.node_to);

        if let Some(i) = idx_from {
            residual[i.0] += flow;
            jacobian[(i.0, i.0)] += d_from;
            if let Some(j) = idx_to {
                jacobian[(i.0, j.0)] += d_to;
            }
        }
        if let Some(j) = idx_to {
            residual[j.0] -= flow;
            jacobian[(j.0, j.0)] -= d_to;
            if let Some(i) = idx_from {
                jacobian[(j.0, i.0)] -= d_from;
            }
        }
    }

    ResidualAssembly { residual, jacobian }
}

/// `C[i]` for every state-vector row: capacitance for diffusion nodes, zero
/// for arithmetic nodes (whose row has no `C·dT/dt` term, §4.4).
pub fn capacitance_vector(operator: &Operator) -> DVector<f64> {
    let mut c = DVector::<f64>::zeros(operator.state_len());
    for (idx, id) in operator.state_node_ids().iter().enumerate() {
        if let Some(node) = operator.node(id) {
            if let NodeKind::Diffusion { capacitance_j_k, .. } = node.kind {
                c[idx] = capacitance_j_k;
            }
        }
    }
    c
}

/// `true` for arithmetic-node rows, which enforce `0 = sum(Q)` with no
/// accumulation term (§4.4).
pub fn is_arithmetic_row(operator: &Operator, idx: usize) -> bool {
    let id = &operator.state_node_ids()[idx];
    matches!(operator.node(id).map(|n| &n.kind), Some(NodeKind::Arithmetic { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeatLoadKind, Node};

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

    fn two_node_operator() -> Operator {
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
        Operator::build(model).unwrap()
    }

    #[test]
    fn linear_conductor_flow_matches_ohms_law_analog() {
        let law = ConductorLaw::Linear { conductance_w_k: 2.0 };
        assert_eq!(conductor_flow(&law, 400.0, 300.0), 200.0);
    }

    #[test]
    fn residual_assembly_matches_steady_state_expectation_at_target() {
        let operator = two_node_operator();
        let state = DVector::from_vec(vec![400.0]);
        let loads = HashMap::new();
        let assembly = assemble(&operator, &state, &loads);
        assert_eq!(assembly.residual[0], 0.0);
    }

    #[test]
    fn residual_jacobian_matches_linear_conductance() {
        let operator = two_node_operator();
        let state = DVector::from_vec(vec![310.0]);
        let loads = HashMap::new();
        let assembly = assemble(&operator, &state, &loads);
        // dR_b/dT_b = -d(flow a->b)/dT_b = -(-G) = G
        assert!((assembly.jacobian[(0, 0)] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn heat_pipe_single_point_table_is_constant_conductance() {
        let table = vec![(300.0, 5.0)];
        assert_eq!(heat_pipe_conductance(&table, 100.0), 5.0);
        assert_eq!(heat_pipe_conductance(&table, 900.0), 5.0);
        assert_eq!(heat_pipe_conductance_slope(&table, 500.0), 0.0);
    }

    #[test]
    fn radiation_flow_sign_matches_temperature_difference() {
        let law = ConductorLaw::Radiation { area_m2: 1.0, view_factor: 1.0, emissivity_eff: 1.0 };
        let flow = conductor_flow(&law, 500.0, 3.0);
        assert!(flow > 0.0);
    }

    #[test]
    fn arithmetic_row_detection() {
        let model = Model {
            nodes: vec![Node {
                id: "arith".into(),
                initial_temperature_k: 280.0,
                kind: NodeKind::Arithmetic { area_m2: 1.0, absorptivity: 0.5, emissivity: 0.5 },
            }],
            conductors: vec![],
            heat_loads: vec![crate::model::HeatLoad {
                id: "h".into(),
                node_id: "arith".into(),
                kind: HeatLoadKind::Constant { watts: 1.0 },
                is_heater: false,
            }],
            orbital_config: None,
        };
        let operator = Operator::build(model).unwrap();
        assert!(is_arithmetic_row(&operator, 0));
    }
}
