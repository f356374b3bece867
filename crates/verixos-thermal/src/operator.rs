//! Model validation and the prepared [`Operator`] (§4.1).
//!
//! thermal@: an `Operator` is what every solver driver actually runs
//! against. Building one performs every structural and physical check up
//! front so the Newton loop never has to special-case a malformed model —
//! the same split the teacher draws between `Config` (free-form) and
//! `Config::build()` (validated) in `rotastellar::config`.

use std::collections::{BTreeMap, HashSet};

use verixos::ValidationError;

use crate::error::{Result, ThermalError};
use crate::model::{Conductor, ConductorLaw, HeatLoadKind, Model, Node, NodeKind};

/// A node's position in the dense state vector used by the residual and
/// Jacobian assembly (§4.4). Boundary nodes are excluded from the state
/// vector entirely — their temperature is a fixed input, not an unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateIndex(pub usize);

/// One entry of the Jacobian's symbolic sparsity pattern: `(row, col)` of a
/// structurally possibly-nonzero entry, in `(min, max, conductor index)`
/// order matching the conductor ordering below.
pub type SparsityEntry = (usize, usize);

/// Validated, solve-ready view of a [`Model`] (§4.1).
///
/// Construction performs every check called out in §4.1: dangling node
/// references, self-loop conductors, non-positive diffusion capacitance,
/// negative radiation coefficients, malformed heat-pipe tables, and
/// orbital-altitude sanity. Conductors are re-sorted into a canonical
/// `(min(i,j), max(i,j), kind)` order so that two models differing only in
/// conductor list order produce identical residual assembly (§8 determinism
/// law).
#[derive(Debug, Clone)]
pub struct Operator {
    model: Model,
    /// Non-boundary node ids in state-vector order.
    state_node_ids: Vec<String>,
    /// Maps every node id (boundary included) to its index in `state_node_ids`,
    /// or `None` for boundary nodes.
    state_index: BTreeMap<String, Option<StateIndex>>,
    /// Conductors in canonical order.
    conductors: Vec<Conductor>,
    /// Symbolic sparsity pattern of the Jacobian over the state vector.
    sparsity: Vec<SparsityEntry>,
}

impl Operator {
    /// Validate `model` and build a solve-ready operator over it.
    pub fn build(model: Model) -> Result<Operator> {
        validate_model(&model)?;

        let mut state_node_ids = Vec::new();
        let mut state_index = BTreeMap::new();
        for node in &model.nodes {
            match &node.kind {
                NodeKind::Boundary { .. } => {
                    state_index.insert(node.id.clone(), None);
                }
                _ => {
                    state_index.insert(node.id.clone(), Some(StateIndex(state_node_ids.len())));
                    state_node_ids.push(node.id.clone());
                }
            }
        }

        let mut conductors = model.conductors.clone();
        conductors.sort_by(|a, b| canonical_key(a).cmp(&canonical_key(b)));

        let mut sparsity_set = HashSet::new();
        for c in &conductors {
            if let (Some(StateIndex(i)), Some(StateIndex(j))) =
                (state_index[&c.node_from].clone(), state_index[&c.node_to].clone())
            {
                sparsity_set.insert((i, i));
                sparsity_set.insert((j, j));
                sparsity_set.insert((i, j));
                sparsity_set.insert((j, i));
            } else if let Some(StateIndex(i)) = state_index[&c.node_from]
                .clone()
                .or_else(|| state_index[&c.node_to].clone())
            {
                sparsity_set.insert((i, i));
            }
        }
        let mut sparsity: Vec<SparsityEntry> = sparsity_set.into_iter().collect();
        sparsity.sort_unstable();

        Ok(Operator {
            model,
            state_node_ids,
            state_index,
            conductors,
            sparsity,
        })
    }

    /// The validated model this operator was built from.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Non-boundary node ids, in the order they appear in the state vector.
    pub fn state_node_ids(&self) -> &[String] {
        &self.state_node_ids
    }

    /// Number of unknowns in the state vector (excludes boundary nodes).
    pub fn state_len(&self) -> usize {
        self.state_node_ids.len()
    }

    /// Look up a node's position in the state vector, `None` for boundary nodes.
    pub fn state_index_of(&self, node_id: &str) -> Option<StateIndex> {
        self.state_index.get(node_id).copied().flatten()
    }

    /// Look up a node definition by id.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.model.nodes.iter().find(|n| n.id == node_id)
    }

    /// Conductors in canonical `(min(i,j), max(i,j), kind)` order.
    pub fn conductors(&self) -> &[Conductor] {
        &self.conductors
    }

    /// Symbolic sparsity pattern of the Jacobian, `(row, col)` pairs, sorted.
    pub fn sparsity(&self) -> &[SparsityEntry] {
        &self.sparsity
    }
}

fn canonical_key(c: &Conductor) -> (String, String, u8) {
    let (lo, hi) = if c.node_from <= c.node_to {
        (c.node_from.clone(), c.node_to.clone())
    } else {
        (c.node_to.clone(), c.node_from.clone())
    };
    let kind_rank = match c.law {
        ConductorLaw::Linear { .. } => 0,
        ConductorLaw::Contact { .. } => 1,
        ConductorLaw::Radiation { .. } => 2,
        ConductorLaw::HeatPipe { .. } => 3,
    };
    (lo, hi, kind_rank)
}

/// Run every §4.1 structural and physical check against `model`.
pub fn validate_model(model: &Model) -> Result<()> {
    if model.nodes.is_empty() {
        return Err(ThermalError::from(ValidationError::new(
            "nodes",
            "model must declare at least one node",
        )));
    }

    let mut ids = HashSet::new();
    for node in &model.nodes {
        if !ids.insert(node.id.clone()) {
            return Err(ThermalError::from(ValidationError::new(
                "nodes",
                format!("duplicate node id '{}'", node.id),
            )));
        }
        match &node.kind {
            NodeKind::Diffusion { capacitance_j_k, area_m2, .. } => {
                if !(*capacitance_j_k > 0.0) {
                    return Err(ThermalError::from(ValidationError::new(
                        "capacitance_j_k",
                        format!("node '{}' must have positive capacitance", node.id),
                    )));
                }
                if *area_m2 < 0.0 {
                    return Err(ThermalError::from(ValidationError::new(
                        "area_m2",
                        format!("node '{}' has negative area", node.id),
                    )));
                }
                if !(node.initial_temperature_k > verixos::MIN_PHYSICAL_TEMP_K) {
                    return Err(ThermalError::from(ValidationError::new(
                        "initial_temperature_k",
                        format!("node '{}' initial temperature below physical floor", node.id),
                    )));
                }
            }
            NodeKind::Arithmetic { area_m2, .. } => {
                if *area_m2 < 0.0 {
                    return Err(ThermalError::from(ValidationError::new(
                        "area_m2",
                        format!("node '{}' has negative area", node.id),
                    )));
                }
                if !(node.initial_temperature_k > verixos::MIN_PHYSICAL_TEMP_K) {
                    return Err(ThermalError::from(ValidationError::new(
                        "initial_temperature_k",
                        format!("node '{}' initial temperature below physical floor", node.id),
                    )));
                }
            }
            NodeKind::Boundary { boundary_temperature_k } => {
                if !(*boundary_temperature_k > 0.0) {
                    return Err(ThermalError::from(ValidationError::new(
                        "boundary_temperature_k",
                        format!("node '{}' has non-physical boundary temperature", node.id),
                    )));
                }
            }
        }
    }

    let mut conductor_ids = HashSet::new();
    for c in &model.conductors {
        if !conductor_ids.insert(c.id.clone()) {
            return Err(ThermalError::from(ValidationError::new(
                "conductors",
                format!("duplicate conductor id '{}'", c.id),
            )));
        }
        if c.node_from == c.node_to {
            return Err(ThermalError::from(ValidationError::new(
                "conductors",
                format!("conductor '{}' is a self-loop on node '{}'", c.id, c.node_from),
            )));
        }
        if !ids.contains(&c.node_from) {
            return Err(ThermalError::from(ValidationError::new(
                "node_from",
                format!("conductor '{}' references unknown node '{}'", c.id, c.node_from),
            )));
        }
        if !ids.contains(&c.node_to) {
            return Err(ThermalError::from(ValidationError::new(
                "node_to",
                format!("conductor '{}' references unknown node '{}'", c.id, c.node_to),
            )));
        }
        match &c.law {
            ConductorLaw::Linear { conductance_w_k } | ConductorLaw::Contact { conductance_w_k } => {
                if *conductance_w_k < 0.0 {
                    return Err(ThermalError::from(ValidationError::new(
                        "conductance_w_k",
                        format!("conductor '{}' has negative conductance", c.id),
                    )));
                }
            }
            ConductorLaw::Radiation { area_m2, view_factor, emissivity_eff } => {
                if *area_m2 < 0.0 || *view_factor < 0.0 || *emissivity_eff < 0.0 {
                    return Err(ThermalError::from(ValidationError::new(
                        "radiation coefficients",
                        format!("conductor '{}' has a negative radiation coefficient", c.id),
                    )));
                }
                if *view_factor > 1.0 {
                    return Err(ThermalError::from(ValidationError::new(
                        "view_factor",
                        format!("conductor '{}' has view factor above 1.0", c.id),
                    )));
                }
            }
            ConductorLaw::HeatPipe { table } => {
                if table.is_empty() {
                    return Err(ThermalError::from(ValidationError::new(
                        "table",
                        format!("conductor '{}' has an empty heat-pipe table", c.id),
                    )));
                }
                if !table.windows(2).all(|w| w[0].0 < w[1].0) {
                    return Err(ThermalError::from(ValidationError::new(
                        "table",
                        format!(
                            "conductor '{}' heat-pipe table is not strictly increasing in temperature",
                            c.id
                        ),
                    )));
                }
            }
        }
    }

    for load in &model.heat_loads {
        if !ids.contains(&load.node_id) {
            return Err(ThermalError::from(ValidationError::new(
                "node_id",
                format!("heat load '{}' references unknown node '{}'", load.id, load.node_id),
            )));
        }
        if let HeatLoadKind::PiecewiseLinear { samples } = &load.kind {
            if samples.len() < 2 {
                return Err(ThermalError::from(ValidationError::new(
                    "samples",
                    format!("heat load '{}' needs at least two piecewise-linear samples", load.id),
                )));
            }
            if !samples.windows(2).all(|w| w[0].0 < w[1].0) {
                return Err(ThermalError::from(ValidationError::new(
                    "samples",
                    format!("heat load '{}' samples are not strictly increasing in time", load.id),
                )));
            }
        }
        if matches!(load.kind, HeatLoadKind::Orbital { .. }) && model.orbital_config.is_none() {
            return Err(ThermalError::from(ValidationError::new(
                "orbital_config",
                format!("heat load '{}' is orbital but model has no orbital_config", load.id),
            )));
        }
    }

    if let Some(orbit) = &model.orbital_config {
        if !(orbit.altitude_km > -verixos::EARTH_RADIUS_KM) {
            return Err(ThermalError::from(ValidationError::new(
                "altitude_km",
                "orbital altitude implies a sub-surface orbit",
            )));
        }
        if !(0.0..=180.0).contains(&orbit.inclination_deg) {
            return Err(ThermalError::from(ValidationError::new(
                "inclination_deg",
                "orbital inclination must be within [0, 180] degrees",
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeatLoad, Node};

    fn boundary(id: &str, t: f64) -> Node {
        Node {
            id: id.to_string(),
            initial_temperature_k: t,
            kind: NodeKind::Boundary { boundary_temperature_k: t },
        }
    }

    fn diffusion(id: &str, c: f64, t0: f64) -> Node {
        Node {
            id: id.to_string(),
            initial_temperature_k: t0,
            kind: NodeKind::Diffusion {
                capacitance_j_k: c,
                area_m2: 0.1,
                absorptivity: 0.2,
                emissivity: 0.8,
                mass_kg: None,
            },
        }
    }

    fn linear_conductor(id: &str, from: &str, to: &str, g: f64) -> Conductor {
        Conductor {
            id: id.to_string(),
            node_from: from.to_string(),
            node_to: to.to_string(),
            law: ConductorLaw::Linear { conductance_w_k: g },
            tag: None,
        }
    }

    #[test]
    fn rejects_dangling_conductor_reference() {
        let model = Model {
            nodes: vec![diffusion("a", 10.0, 280.0)],
            conductors: vec![linear_conductor("c1", "a", "ghost", 1.0)],
            heat_loads: vec![],
            orbital_config: None,
        };
        assert!(matches!(validate_model(&model), Err(ThermalError::InvalidModel { .. })));
    }

    #[test]
    fn rejects_self_loop_conductor() {
        let model = Model {
            nodes: vec![diffusion("a", 10.0, 280.0)],
            conductors: vec![linear_conductor("c1", "a", "a", 1.0)],
            heat_loads: vec![],
            orbital_config: None,
        };
        assert!(validate_model(&model).is_err());
    }

    #[test]
    fn rejects_non_positive_capacitance() {
        let mut node = diffusion("a", 10.0, 280.0);
        if let NodeKind::Diffusion { capacitance_j_k, .. } = &mut node.kind {
            *capacitance_j_k = 0.0;
        }
        let model = Model {
            nodes: vec![node],
            conductors: vec![],
            heat_loads: vec![],
            orbital_config: None,
        };
        assert!(validate_model(&model).is_err());
    }

    #[test]
    fn accepts_minimal_two_node_model() {
        let model = Model {
            nodes: vec![diffusion("a", 10.0, 280.0), boundary("space", 3.0)],
            conductors: vec![linear_conductor("c1", "a", "space", 0.5)],
            heat_loads: vec![HeatLoad {
                id: "h1".into(),
                node_id: "a".into(),
                kind: HeatLoadKind::Constant { watts: 5.0 },
                is_heater: false,
            }],
            orbital_config: None,
        };
        let operator = Operator::build(model).expect("valid model");
        assert_eq!(operator.state_len(), 1);
        assert_eq!(operator.state_node_ids(), &["a".to_string()]);
        assert!(operator.state_index_of("space").is_none());
    }

    #[test]
    fn conductor_canonical_ordering_is_stable_regardless_of_input_order() {
        let model_a = Model {
            nodes: vec![
                diffusion("a", 10.0, 280.0),
                diffusion("b", 12.0, 280.0),
                boundary("space", 3.0),
            ],
            conductors: vec![
                linear_conductor("c2", "b", "space", 0.2),
                linear_conductor("c1", "a", "b", 0.5),
            ],
            heat_loads: vec![],
            orbital_config: None,
        };
        let mut model_b = model_a.clone();
        model_b.conductors.reverse();

        let op_a = Operator::build(model_a).unwrap();
        let op_b = Operator::build(model_b).unwrap();
        let ids_a: Vec<_> = op_a.conductors().iter().map(|c| c.id.clone()).collect();
        let ids_b: Vec<_> = op_b.conductors().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
